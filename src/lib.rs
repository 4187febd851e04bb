//! OGP survey uploader
//!
//! Reads metrology surveys of detector-assembly components, computes the
//! placement offsets and grade of protomodules and modules, and uploads one
//! inspection row per survey file, at most once.

pub mod alignment;
pub mod cli;
pub mod core;
pub mod entities;
pub mod parser;
pub mod record;

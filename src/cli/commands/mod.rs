//! CLI command implementations

pub mod check;
pub mod completions;
pub mod config;
pub mod inventory;
pub mod parse;
pub mod upload;

//! Upload records: alignment measurement, column assembly and rendered plots

pub mod builder;
pub mod render;

pub use builder::{MeasureError, RecordBuilder};
pub use render::{HeightMapSpec, PlotRenderer, PngRenderer};

//! Survey file parsing
//!
//! The OGP writes one text file per survey: a header of `Key: value` lines,
//! a `---` delimiter, then one block per measured feature.

mod export;
mod ogp;

pub use export::{export_survey, ExportedFiles};
pub use ogp::OgpTextParser;

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

use crate::entities::SurveyRecord;

/// Header keys that must be present
pub const REQUIRED_KEYS: &[&str] = &[
    "TrayNo",
    "ComponentID",
    "Operator",
    "Geometry",
    "Density",
    "Flatness",
    "PositionID",
    "Runtime",
];

/// Header keys whose absence is only reported
pub const OPTIONAL_KEYS: &[&str] = &[
    "Thickness",
    "SensorSize",
    "Comment",
    "Thickness_Offset",
    "Weight",
];

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("cannot read {path}: {message}")]
    #[diagnostic(code(ogp::input))]
    Io { path: PathBuf, message: String },

    #[error("expected exactly one '---' delimiter between header and features, found {0}")]
    #[diagnostic(code(ogp::input))]
    Delimiter(usize),

    #[error("required header field '{0}' is missing")]
    #[diagnostic(
        code(ogp::input),
        help("check the survey routine writes this key into the header")
    )]
    MissingField(&'static str),

    #[error("header field '{field}' has invalid value '{value}': {message}")]
    #[diagnostic(code(ogp::input))]
    InvalidField {
        field: &'static str,
        value: String,
        message: String,
    },

    #[error("header field '{0}' is empty after removing illegal characters")]
    #[diagnostic(code(ogp::input))]
    EmptyIdentifier(&'static str),

    #[error("feature '{feature}' has a malformed point line '{line}'")]
    #[diagnostic(
        code(ogp::input),
        help("a point line holds exactly three coordinates: 'Point <x> <y> <z>'")
    )]
    MalformedPoint { feature: String, line: String },
}

/// Turns a survey file into metadata and feature points
pub trait SurveyParser {
    fn parse(&self, path: &Path) -> Result<SurveyRecord, ParseError>;
}

//! Parser for the OGP text output

use std::collections::HashMap;
use std::path::Path;

use chrono::{NaiveDate, NaiveTime};

use super::{ParseError, SurveyParser, OPTIONAL_KEYS, REQUIRED_KEYS};
use crate::entities::survey::sanitize_identifier;
use crate::entities::{FeaturePoint, Metadata, SurveyRecord};

const DELIMITER: &str = "---";
const DATE_FORMAT: &str = "%m:%d:%y";
const TIME_FORMAT: &str = "%H:%M:%S";

/// Parser for the header/feature text written by the OGP survey routines
#[derive(Debug, Clone, Copy, Default)]
pub struct OgpTextParser;

impl OgpTextParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse the full text of a survey file
    pub fn parse_str(&self, text: &str) -> Result<SurveyRecord, ParseError> {
        let parts: Vec<&str> = text.split(DELIMITER).collect();
        if parts.len() != 2 {
            return Err(ParseError::Delimiter(parts.len().saturating_sub(1)));
        }

        let header = parse_header(parts[0]);
        let metadata = build_metadata(&header)?;
        let points = parse_features(parts[1])?;

        tracing::debug!(
            component = %metadata.component_id,
            features = points.len(),
            "parsed survey"
        );
        Ok(SurveyRecord { metadata, points })
    }
}

impl SurveyParser for OgpTextParser {
    fn parse(&self, path: &Path) -> Result<SurveyRecord, ParseError> {
        let text = std::fs::read_to_string(path).map_err(|e| ParseError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.parse_str(&text)
    }
}

/// Header key as written by the OGP mapped to its canonical name
fn canonical_key(label: &str) -> Option<&'static str> {
    let squashed: String = label.chars().filter(|c| !c.is_whitespace()).collect();
    let key = match squashed.to_lowercase().as_str() {
        "runtime" => "Runtime",
        "componentid" => "ComponentID",
        "operator" => "Operator",
        "geometry" => "Geometry",
        "density" => "Density",
        "sensorsize" => "SensorSize",
        "flatness" => "Flatness",
        "thickness" => "Thickness",
        "thickness_offset" => "Thickness_Offset",
        "positionid" => "PositionID",
        "trayno" => "TrayNo",
        "comment" => "Comment",
        "weight" => "Weight",
        _ => return None,
    };
    Some(key)
}

fn parse_header(text: &str) -> HashMap<&'static str, String> {
    let mut header = HashMap::new();
    for line in text.lines() {
        let Some((label, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if let Some(key) = canonical_key(label) {
            header.entry(key).or_insert_with(|| value.to_string());
        }
    }
    header
}

fn build_metadata(header: &HashMap<&'static str, String>) -> Result<Metadata, ParseError> {
    for &key in REQUIRED_KEYS {
        if !header.contains_key(key) {
            return Err(ParseError::MissingField(key));
        }
    }
    let missing_optional: Vec<&str> = OPTIONAL_KEYS
        .iter()
        .copied()
        .filter(|k| !header.contains_key(k))
        .collect();
    if !missing_optional.is_empty() {
        tracing::warn!(keys = ?missing_optional, "optional header keys missing");
    }

    let field = |key: &'static str| required(header, key);

    let (run_date, run_time) = parse_runtime(field("Runtime")?)?;

    Ok(Metadata {
        component_id: identifier("ComponentID", field("ComponentID")?)?,
        operator: identifier("Operator", field("Operator")?)?,
        geometry: typed("Geometry", field("Geometry")?)?,
        density: typed("Density", field("Density")?)?,
        position_id: typed("PositionID", field("PositionID")?)?,
        tray_no: numeric("TrayNo", field("TrayNo")?)?,
        flatness: numeric("Flatness", field("Flatness")?)?,
        thickness: optional_numeric(header, "Thickness")?,
        thickness_offset: optional_numeric(header, "Thickness_Offset")?,
        sensor_size: header.get("SensorSize").cloned(),
        weight: optional_numeric(header, "Weight")?,
        run_date,
        run_time,
        comment: header.get("Comment").cloned(),
    })
}

fn required<'a>(
    header: &'a HashMap<&'static str, String>,
    key: &'static str,
) -> Result<&'a str, ParseError> {
    header
        .get(key)
        .map(String::as_str)
        .ok_or(ParseError::MissingField(key))
}

fn parse_runtime(value: &str) -> Result<(NaiveDate, NaiveTime), ParseError> {
    let invalid = |message: String| ParseError::InvalidField {
        field: "Runtime",
        value: value.to_string(),
        message,
    };

    let mut parts = value.split_whitespace();
    let (Some(date), Some(time)) = (parts.next(), parts.next()) else {
        return Err(invalid("expected '<date> <time>'".to_string()));
    };
    let date = NaiveDate::parse_from_str(date, DATE_FORMAT).map_err(|e| invalid(e.to_string()))?;
    let time = NaiveTime::parse_from_str(time, TIME_FORMAT).map_err(|e| invalid(e.to_string()))?;
    Ok((date, time))
}

fn identifier(field: &'static str, value: &str) -> Result<String, ParseError> {
    let (cleaned, changed) = sanitize_identifier(value);
    if changed {
        tracing::warn!(field, original = value, cleaned = %cleaned, "removed illegal characters");
    }
    if cleaned.is_empty() {
        return Err(ParseError::EmptyIdentifier(field));
    }
    Ok(cleaned)
}

fn typed<T>(field: &'static str, value: &str) -> Result<T, ParseError>
where
    T: std::str::FromStr<Err = String>,
{
    value.parse().map_err(|message| ParseError::InvalidField {
        field,
        value: value.to_string(),
        message,
    })
}

fn numeric<T>(field: &'static str, value: &str) -> Result<T, ParseError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ParseError::InvalidField {
        field,
        value: value.to_string(),
        message: e.to_string(),
    })
}

fn optional_numeric(
    header: &HashMap<&'static str, String>,
    field: &'static str,
) -> Result<Option<f64>, ParseError> {
    header.get(field).map(|v| numeric(field, v)).transpose()
}

/// Feature block being assembled
#[derive(Default)]
struct Block {
    feature_type: String,
    name: String,
    xyz: Option<(f64, f64, f64)>,
    ijk: Option<(f64, f64, f64)>,
    radius: Option<f64>,
}

impl Block {
    fn finish(self) -> Option<FeaturePoint> {
        let Some((x, y, z)) = self.xyz else {
            tracing::debug!(feature = %self.name, "feature without a point, skipped");
            return None;
        };
        Some(FeaturePoint {
            name: self.name,
            feature_type: self.feature_type,
            x,
            y,
            z,
            i: self.ijk.map(|v| v.0),
            j: self.ijk.map(|v| v.1),
            k: self.ijk.map(|v| v.2),
            radius: self.radius,
        })
    }
}

fn three_floats(text: &str) -> Option<(f64, f64, f64)> {
    let values: Vec<f64> = text
        .split_whitespace()
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    match values.as_slice() {
        [a, b, c] => Some((*a, *b, *c)),
        _ => None,
    }
}

fn push_block(block: Option<Block>, points: &mut Vec<FeaturePoint>) {
    if let Some(point) = block.and_then(Block::finish) {
        if points.contains(&point) {
            tracing::debug!(feature = %point.name, "duplicate feature dropped");
        } else {
            points.push(point);
        }
    }
}

/// Coordinates of a `Point x y z` data line, `None` when the line opens a block
fn point_data(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("Point")?;
    let first = rest.split_whitespace().next()?;
    first.parse::<f64>().is_ok().then_some(rest)
}

fn parse_features(text: &str) -> Result<Vec<FeaturePoint>, ParseError> {
    let mut points: Vec<FeaturePoint> = Vec::new();
    let mut current: Option<Block> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        // "Point x y z" is data; "Point Thick1" opens a block
        if let Some(rest) = point_data(line) {
            let xyz = three_floats(rest).ok_or_else(|| ParseError::MalformedPoint {
                feature: current
                    .as_ref()
                    .map(|b| b.name.clone())
                    .unwrap_or_default(),
                line: line.to_string(),
            })?;
            if let Some(block) = current.as_mut() {
                block.xyz = Some(xyz);
            }
        } else if let Some(rest) = line.strip_prefix("direction cosine:") {
            if let Some(block) = current.as_mut() {
                block.ijk = three_floats(rest);
            }
        } else if let Some(radius) = line
            .strip_prefix("Radius")
            .and_then(|rest| rest.trim().parse::<f64>().ok())
        {
            if let Some(block) = current.as_mut() {
                block.radius = Some(radius);
            }
        } else {
            let mut words = line.split_whitespace();
            if let (Some(feature_type), Some(name)) = (words.next(), words.next()) {
                push_block(current.take(), &mut points);
                current = Some(Block {
                    feature_type: feature_type.to_string(),
                    name: name.to_string(),
                    ..Default::default()
                });
            }
        }
    }
    push_block(current.take(), &mut points);

    Ok(points)
}

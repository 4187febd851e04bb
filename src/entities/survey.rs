//! Parsed OGP survey: header metadata plus the measured feature points

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Characters that cannot appear in a file name built from an identifier
pub const ILLEGAL_CHARS: &[char] = &['/', '\\', ':', '*', '?', '<', '>', '|'];

/// Sensor geometry of the surveyed component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Geometry {
    Full,
    Left,
    Right,
    Top,
    Bottom,
    Five,
}

impl Geometry {
    pub const ALL: [Geometry; 6] = [
        Geometry::Full,
        Geometry::Left,
        Geometry::Right,
        Geometry::Top,
        Geometry::Bottom,
        Geometry::Five,
    ];
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Geometry::Full => "Full",
            Geometry::Left => "Left",
            Geometry::Right => "Right",
            Geometry::Top => "Top",
            Geometry::Bottom => "Bottom",
            Geometry::Five => "Five",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Geometry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" => Ok(Geometry::Full),
            "left" => Ok(Geometry::Left),
            "right" => Ok(Geometry::Right),
            "top" => Ok(Geometry::Top),
            "bottom" => Ok(Geometry::Bottom),
            "five" => Ok(Geometry::Five),
            _ => Err(format!(
                "Invalid geometry: {}. Use Full, Left, Right, Top, Bottom, or Five",
                s
            )),
        }
    }
}

/// Sensor channel density
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Density {
    LD,
    HD,
}

impl Density {
    pub const ALL: [Density; 2] = [Density::LD, Density::HD];
}

impl std::fmt::Display for Density {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Density::LD => write!(f, "LD"),
            Density::HD => write!(f, "HD"),
        }
    }
}

impl std::str::FromStr for Density {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LD" => Ok(Density::LD),
            "HD" => Ok(Density::HD),
            _ => Err(format!("Invalid density: {}. Use LD or HD", s)),
        }
    }
}

/// Position on the assembly tray (1 or 2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PositionId {
    One,
    Two,
}

impl PositionId {
    pub const ALL: [PositionId; 2] = [PositionId::One, PositionId::Two];

    pub fn number(&self) -> u8 {
        match self {
            PositionId::One => 1,
            PositionId::Two => 2,
        }
    }
}

impl TryFrom<u8> for PositionId {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(PositionId::One),
            2 => Ok(PositionId::Two),
            _ => Err(format!("Invalid position ID: {}. Use 1 or 2", n)),
        }
    }
}

impl From<PositionId> for u8 {
    fn from(p: PositionId) -> u8 {
        p.number()
    }
}

impl std::fmt::Display for PositionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.number())
    }
}

impl std::str::FromStr for PositionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let n: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("Invalid position ID: {}. Use 1 or 2", s))?;
        PositionId::try_from(n)
    }
}

/// Survey header block
///
/// Serializes with the header keys the OGP writes (`ComponentID`, `TrayNo`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(rename = "ComponentID")]
    pub component_id: String,
    #[serde(rename = "Operator")]
    pub operator: String,
    #[serde(rename = "Geometry")]
    pub geometry: Geometry,
    #[serde(rename = "Density")]
    pub density: Density,
    #[serde(rename = "PositionID")]
    pub position_id: PositionId,
    /// Tray identifier; reference files are named by its 3-digit form
    #[serde(rename = "TrayNo")]
    pub tray_no: u16,
    #[serde(rename = "Flatness")]
    pub flatness: f64,
    #[serde(rename = "Thickness", default, skip_serializing_if = "Option::is_none")]
    pub thickness: Option<f64>,
    #[serde(rename = "Thickness_Offset", default, skip_serializing_if = "Option::is_none")]
    pub thickness_offset: Option<f64>,
    #[serde(rename = "SensorSize", default, skip_serializing_if = "Option::is_none")]
    pub sensor_size: Option<String>,
    #[serde(rename = "Weight", default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(rename = "RunDate")]
    pub run_date: NaiveDate,
    #[serde(rename = "RunTime")]
    pub run_time: NaiveTime,
    #[serde(rename = "Comment", default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Metadata {
    /// 3-digit tray identifier used to find the tray reference file
    pub fn tray_id(&self) -> String {
        format!("{:03}", self.tray_no)
    }

    /// Prefix for files derived from this survey
    pub fn file_stem(&self) -> String {
        format!("{}_{}", self.component_id, self.operator)
    }
}

/// One measured feature of the survey
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturePoint {
    pub name: String,
    #[serde(rename = "type")]
    pub feature_type: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub i: Option<f64>,
    pub j: Option<f64>,
    pub k: Option<f64>,
    pub radius: Option<f64>,
}

impl FeaturePoint {
    /// Convenience constructor for a bare point feature
    pub fn point(name: &str, x: f64, y: f64, z: f64) -> Self {
        Self {
            name: name.to_string(),
            feature_type: "Point".to_string(),
            x,
            y,
            z,
            i: None,
            j: None,
            k: None,
            radius: None,
        }
    }

    /// Fixture features (tray surface points) are not part of the component
    pub fn is_tray_feature(&self) -> bool {
        self.name.to_lowercase().contains("tray")
    }
}

/// One parsed survey file
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyRecord {
    pub metadata: Metadata,
    pub points: Vec<FeaturePoint>,
}

impl SurveyRecord {
    /// Features that belong to the component itself, in file order
    pub fn component_points(&self) -> impl Iterator<Item = &FeaturePoint> {
        self.points.iter().filter(|p| !p.is_tray_feature())
    }

    /// Height samples of the component surface
    pub fn heights(&self) -> Vec<f64> {
        self.component_points().map(|p| p.z).collect()
    }
}

/// Strip path-illegal characters; returns the cleaned value and whether anything changed
pub fn sanitize_identifier(value: &str) -> (String, bool) {
    let cleaned: String = value
        .trim()
        .chars()
        .filter(|c| !ILLEGAL_CHARS.contains(c))
        .collect();
    let changed = cleaned != value.trim();
    (cleaned, changed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_parse_is_case_insensitive() {
        assert_eq!("full".parse::<Geometry>().unwrap(), Geometry::Full);
        assert_eq!("BOTTOM".parse::<Geometry>().unwrap(), Geometry::Bottom);
        assert!("Semi".parse::<Geometry>().is_err());
    }

    #[test]
    fn test_density_and_position_parse() {
        assert_eq!("ld".parse::<Density>().unwrap(), Density::LD);
        assert_eq!(" 2 ".parse::<PositionId>().unwrap(), PositionId::Two);
        assert!("3".parse::<PositionId>().is_err());
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("320-ML/F3:W2"), ("320-MLF3W2".to_string(), true));
        assert_eq!(sanitize_identifier("alice"), ("alice".to_string(), false));
        assert_eq!(sanitize_identifier("/:*").0, "");
    }

    #[test]
    fn test_tray_features_excluded() {
        let record = SurveyRecord {
            metadata: Metadata {
                component_id: "M1".into(),
                operator: "op".into(),
                geometry: Geometry::Full,
                density: Density::LD,
                position_id: PositionId::One,
                tray_no: 7,
                flatness: 0.1,
                thickness: None,
                thickness_offset: None,
                sensor_size: None,
                weight: None,
                run_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                run_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
                comment: None,
            },
            points: vec![
                FeaturePoint::point("Tray1", 0.0, 0.0, 0.5),
                FeaturePoint::point("Thick1", 1.0, 1.0, 1.5),
                FeaturePoint::point("Thick2", 2.0, 1.0, 1.7),
            ],
        };
        assert_eq!(record.heights(), vec![1.5, 1.7]);
        assert_eq!(record.metadata.tray_id(), "007");
        assert_eq!(record.metadata.file_stem(), "M1_op");
    }
}

//! Tray reference files
//!
//! Each tray has a YAML file named by its 3-digit number (`007.yaml`) listing
//! nominal pin coordinates as `<pin>_xy: [x, y]`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use thiserror::Error;

use crate::alignment::geometry::Point2;
use crate::alignment::ReferenceLookup;
use crate::entities::{Metadata, ReferencePins};

#[derive(Debug, Error, Diagnostic)]
pub enum TrayError {
    #[error("no reference file for tray {tray_id} in {dir}")]
    #[diagnostic(code(ogp::input), help("tray files are named <NNN>.yaml"))]
    NotFound { tray_id: String, dir: PathBuf },

    #[error("tray {tray_id} has no coordinates for pin '{pin}'")]
    #[diagnostic(code(ogp::input))]
    MissingPin { tray_id: String, pin: String },

    #[error("no pin mapping for geometry={geometry}, density={density}, position={position}")]
    #[diagnostic(code(ogp::config))]
    NoPinMapping {
        geometry: String,
        density: String,
        position: String,
    },

    #[error("cannot read tray file {path}: {message}")]
    #[diagnostic(code(ogp::input))]
    Unreadable { path: PathBuf, message: String },
}

/// Pin coordinates of one tray
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrayReferences {
    pub tray_id: String,
    pins: BTreeMap<String, Point2>,
}

impl TrayReferences {
    /// Parse the YAML contents of a tray file; keys not ending in `_xy` are ignored
    pub fn from_yaml(tray_id: &str, contents: &str) -> Result<Self, String> {
        let raw: BTreeMap<String, serde_yml::Value> =
            serde_yml::from_str(contents).map_err(|e| e.to_string())?;

        let mut pins = BTreeMap::new();
        for (key, value) in raw {
            let Some(name) = key.strip_suffix("_xy") else {
                continue;
            };
            let xy: Vec<f64> = serde_yml::from_value(value)
                .map_err(|e| format!("{}: {}", key, e))?;
            if xy.len() < 2 {
                return Err(format!("{}: expected [x, y]", key));
            }
            pins.insert(name.to_string(), Point2::new(xy[0], xy[1]));
        }

        Ok(Self {
            tray_id: tray_id.to_string(),
            pins,
        })
    }

    pub fn pin(&self, name: &str) -> Result<Point2, TrayError> {
        self.pins
            .get(name)
            .copied()
            .ok_or_else(|| TrayError::MissingPin {
                tray_id: self.tray_id.clone(),
                pin: name.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

/// Source of tray reference coordinates
pub trait TrayStore {
    fn load_tray_references(&self, tray_id: &str) -> Result<TrayReferences, TrayError>;

    /// Hole and slot pins for a survey, resolved through the pin map
    fn reference_pins(
        &self,
        metadata: &Metadata,
        lookup: &ReferenceLookup,
    ) -> Result<ReferencePins, TrayError> {
        let tray_id = metadata.tray_id();
        let tray = self.load_tray_references(&tray_id)?;

        let names = lookup.pin_names(metadata.geometry, metadata.density, metadata.position_id);
        if names.is_empty() {
            return Err(TrayError::NoPinMapping {
                geometry: metadata.geometry.to_string(),
                density: metadata.density.to_string(),
                position: metadata.position_id.to_string(),
            });
        }

        let pins = ReferencePins {
            hole: tray.pin(names.hole)?,
            slot: tray.pin(names.slot)?,
        };
        tracing::debug!(
            tray = %tray_id,
            hole_pin = names.hole,
            hole = %pins.hole,
            slot_pin = names.slot,
            slot = %pins.slot,
            "pin coordinates"
        );
        Ok(pins)
    }
}

/// Tray files in a directory
#[derive(Debug, Clone)]
pub struct DirTrayStore {
    dir: PathBuf,
}

impl DirTrayStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl TrayStore for DirTrayStore {
    fn load_tray_references(&self, tray_id: &str) -> Result<TrayReferences, TrayError> {
        if tray_id.len() != 3 || !tray_id.chars().all(|c| c.is_ascii_digit()) {
            tracing::warn!(tray_id, "tray number is not a 3-digit identifier");
        }

        let path = self.dir.join(format!("{}.yaml", tray_id));
        if !path.is_file() {
            return Err(TrayError::NotFound {
                tray_id: tray_id.to_string(),
                dir: self.dir.clone(),
            });
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| TrayError::Unreadable {
            path: path.clone(),
            message: e.to_string(),
        })?;
        TrayReferences::from_yaml(tray_id, &contents)
            .map_err(|message| TrayError::Unreadable { path, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Density, Geometry, PositionId};
    use chrono::{NaiveDate, NaiveTime};
    use tempfile::tempdir;

    const TRAY: &str = "\
p1_center_pin_xy: [100.0, 100.0]
p1O_xy: [200.0, 100.0]
p2_center_pin_xy: [100.0, 300.0]
p2M_xy: [0.0, 300.0]
FD1_xy: [1.0, 2.0]
comment: tray one
";

    fn meta(position: PositionId) -> Metadata {
        Metadata {
            component_id: "PM1".into(),
            operator: "op".into(),
            geometry: Geometry::Full,
            density: Density::LD,
            position_id: position,
            tray_no: 1,
            flatness: 0.0,
            thickness: None,
            thickness_offset: None,
            sensor_size: None,
            weight: None,
            run_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            run_time: NaiveTime::from_hms_opt(3, 4, 5).unwrap(),
            comment: None,
        }
    }

    #[test]
    fn test_parse_tray_yaml() {
        let tray = TrayReferences::from_yaml("001", TRAY).unwrap();
        assert_eq!(tray.len(), 5);
        assert_eq!(tray.pin("p1O").unwrap(), Point2::new(200.0, 100.0));
        assert!(matches!(tray.pin("p9Z"), Err(TrayError::MissingPin { .. })));
    }

    #[test]
    fn test_reference_pins_from_dir() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("001.yaml"), TRAY).unwrap();
        let store = DirTrayStore::new(dir.path());
        let lookup = ReferenceLookup::standard().unwrap();

        let pins = store.reference_pins(&meta(PositionId::Two), &lookup).unwrap();
        assert_eq!(pins.hole, Point2::new(100.0, 300.0));
        assert_eq!(pins.slot, Point2::new(0.0, 300.0));
    }

    #[test]
    fn test_missing_tray_file() {
        let dir = tempdir().unwrap();
        let store = DirTrayStore::new(dir.path());
        let err = store.load_tray_references("042").unwrap_err();
        assert!(matches!(err, TrayError::NotFound { ref tray_id, .. } if tray_id == "042"));
    }
}

//! Reference lookup tables
//!
//! Which tray pins, fiducials, corrections and angle conventions apply to a
//! component depends on its geometry, density and tray position. The rules
//! are written with partial keys and flattened once, when the lookup is
//! built, into exact `(geometry, density, position)` maps. Resolution order
//! for a key is:
//!
//! 1. exact `(geometry, density, position)`
//! 2. `(geometry, density, *)`
//! 3. `(geometry, *, position)`
//! 4. `(geometry, *, *)`

use std::collections::HashMap;

use thiserror::Error;

use crate::alignment::geometry::{vector_angle_deg, wrap_degrees, Point2};
use crate::entities::{ComponentKind, Density, Geometry, PositionId};

#[derive(Debug, Error, PartialEq)]
pub enum LookupError {
    #[error("no {table} rule for geometry={geometry}, density={density}, position={position}")]
    Missing {
        table: &'static str,
        geometry: Geometry,
        density: Density,
        position: PositionId,
    },

    #[error("duplicate {table} rule for {key}")]
    Conflict { table: &'static str, key: String },

    #[error("no fiducial selection for {kind} with geometry={geometry}, density={density}")]
    NoFiducialSelection {
        kind: ComponentKind,
        geometry: Geometry,
        density: Density,
    },
}

/// Partial key of a lookup rule; `None` matches any value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleKey {
    pub geometry: Geometry,
    pub density: Option<Density>,
    pub position: Option<PositionId>,
}

impl RuleKey {
    pub const fn exact(geometry: Geometry, density: Density, position: PositionId) -> Self {
        Self {
            geometry,
            density: Some(density),
            position: Some(position),
        }
    }

    pub const fn density(geometry: Geometry, density: Density) -> Self {
        Self {
            geometry,
            density: Some(density),
            position: None,
        }
    }

    pub const fn position(geometry: Geometry, position: PositionId) -> Self {
        Self {
            geometry,
            density: None,
            position: Some(position),
        }
    }

    pub const fn geometry(geometry: Geometry) -> Self {
        Self {
            geometry,
            density: None,
            position: None,
        }
    }
}

impl std::fmt::Display for RuleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let density = self.density.map(|d| d.to_string()).unwrap_or_else(|| "*".into());
        let position = self.position.map(|p| p.to_string()).unwrap_or_else(|| "*".into());
        write!(f, "({}, {}, {})", self.geometry, density, position)
    }
}

/// A rule table flattened to exact keys
#[derive(Debug, Clone)]
pub struct RuleTable<T> {
    name: &'static str,
    entries: HashMap<(Geometry, Density, PositionId), T>,
}

impl<T: Clone> RuleTable<T> {
    /// Flatten partial-key rules; two rules with the same key are a conflict
    pub fn resolve(name: &'static str, rules: &[(RuleKey, T)]) -> Result<Self, LookupError> {
        let mut by_key: HashMap<RuleKey, &T> = HashMap::new();
        for (key, value) in rules {
            if by_key.insert(*key, value).is_some() {
                return Err(LookupError::Conflict {
                    table: name,
                    key: key.to_string(),
                });
            }
        }

        let mut entries = HashMap::new();
        for geometry in Geometry::ALL {
            for density in Density::ALL {
                for position in PositionId::ALL {
                    let candidates = [
                        RuleKey::exact(geometry, density, position),
                        RuleKey::density(geometry, density),
                        RuleKey::position(geometry, position),
                        RuleKey::geometry(geometry),
                    ];
                    if let Some(value) = candidates.iter().find_map(|k| by_key.get(k)) {
                        entries.insert((geometry, density, position), (*value).clone());
                    }
                }
            }
        }

        Ok(Self { name, entries })
    }

    pub fn get(&self, geometry: Geometry, density: Density, position: PositionId) -> Option<&T> {
        self.entries.get(&(geometry, density, position))
    }

    /// Like [`RuleTable::get`], reporting a missing rule as an error
    pub fn require(
        &self,
        geometry: Geometry,
        density: Density,
        position: PositionId,
    ) -> Result<&T, LookupError> {
        self.get(geometry, density, position)
            .ok_or(LookupError::Missing {
                table: self.name,
                geometry,
                density,
                position,
            })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Names of the two tray pins defining the reference frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinNames {
    pub hole: &'static str,
    pub slot: &'static str,
}

impl PinNames {
    pub fn is_empty(&self) -> bool {
        self.hole.is_empty() || self.slot.is_empty()
    }
}

/// How a reference angle is read off a vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AngleRule {
    /// Direction of the vector
    Direct,
    /// Direction of the reversed vector
    Reversed,
    /// Direction of the vector shifted by a fixed angle (degrees)
    Shifted(f64),
}

impl AngleRule {
    pub fn apply(&self, v: Point2) -> f64 {
        match self {
            AngleRule::Direct => vector_angle_deg(v.x, v.y),
            AngleRule::Reversed => vector_angle_deg(-v.x, -v.y),
            AngleRule::Shifted(shift) => wrap_degrees(vector_angle_deg(v.x, v.y) + shift),
        }
    }
}

use Density::{HD, LD};
use Geometry::{Bottom, Five, Full, Left, Right, Top};
use PositionId::{One, Two};

const fn pins(hole: &'static str, slot: &'static str) -> PinNames {
    PinNames { hole, slot }
}

/// Tray pins per geometry, density and position
const PIN_RULES: &[(RuleKey, PinNames)] = &[
    (RuleKey::position(Full, One), pins("p1_center_pin", "p1O")),
    (RuleKey::position(Full, Two), pins("p2_center_pin", "p2M")),
    (RuleKey::exact(Left, LD, One), pins("p1C", "p1I")),
    (RuleKey::exact(Left, LD, Two), pins("p2A", "p2K")),
    (RuleKey::exact(Left, HD, One), pins("p1F", "p1P")),
    (RuleKey::exact(Left, HD, Two), pins("p2H", "p2N")),
    (RuleKey::exact(Right, LD, One), pins("p1A", "p1K")),
    (RuleKey::exact(Right, LD, Two), pins("p2C", "p2I")),
    (RuleKey::exact(Right, HD, One), pins("p1H", "p1N")),
    (RuleKey::exact(Right, HD, Two), pins("p2F", "p2P")),
    (RuleKey::exact(Top, LD, One), pins("p1D", "p1O")),
    (RuleKey::exact(Top, LD, Two), pins("p2B", "p2M")),
    (RuleKey::exact(Top, HD, One), pins("p1E", "p1O")),
    (RuleKey::exact(Top, HD, Two), pins("p2G", "p2M")),
    (RuleKey::exact(Bottom, LD, One), pins("p1B", "p1M")),
    (RuleKey::exact(Bottom, LD, Two), pins("p2D", "p2O")),
    (RuleKey::exact(Bottom, HD, One), pins("p1_center_pin", "p1M")),
    (RuleKey::exact(Bottom, HD, Two), pins("p2_center_pin", "p2O")),
    (RuleKey::position(Five, One), pins("p1_center_pin", "p1I")),
    (RuleKey::position(Five, Two), pins("p2_center_pin", "p2K")),
];

/// Reference angle of the hole→slot pin vector
const PIN_ANGLE_RULES: &[(RuleKey, AngleRule)] = &[
    (RuleKey::position(Full, One), AngleRule::Direct),
    (RuleKey::position(Full, Two), AngleRule::Reversed),
    (RuleKey::geometry(Five), AngleRule::Direct),
    (RuleKey::density(Left, LD), AngleRule::Direct),
    (RuleKey::exact(Left, HD, One), AngleRule::Direct),
    (RuleKey::exact(Left, HD, Two), AngleRule::Reversed),
    (RuleKey::geometry(Right), AngleRule::Direct),
    (RuleKey::position(Top, One), AngleRule::Direct),
    (RuleKey::position(Top, Two), AngleRule::Reversed),
    (RuleKey::position(Bottom, One), AngleRule::Direct),
    (RuleKey::position(Bottom, Two), AngleRule::Reversed),
];

/// Angle of the FD3→FD1 vector
const FIDUCIAL_ANGLE_RULES: &[(RuleKey, AngleRule)] = &[
    (RuleKey::geometry(Full), AngleRule::Direct),
    (RuleKey::geometry(Five), AngleRule::Direct),
    (RuleKey::geometry(Left), AngleRule::Shifted(60.0)),
    (RuleKey::geometry(Right), AngleRule::Shifted(-60.0)),
    (RuleKey::geometry(Top), AngleRule::Direct),
    (RuleKey::geometry(Bottom), AngleRule::Direct),
];

/// Fixture corrections (mm) subtracted from protomodule offsets
const PROTOMODULE_ADJUSTMENTS: &[(RuleKey, Point2)] = &[
    (RuleKey::geometry(Full), Point2::new(0.0, 0.0)),
    (RuleKey::geometry(Five), Point2::new(0.0, 0.0)),
    (RuleKey::geometry(Left), Point2::new(0.0, 0.0)),
    (RuleKey::geometry(Right), Point2::new(0.0, 0.0)),
    (RuleKey::geometry(Top), Point2::new(0.0, 0.0)),
    (RuleKey::geometry(Bottom), Point2::new(0.0, 0.0)),
];

/// Fixture corrections (mm) subtracted from module offsets
const MODULE_ADJUSTMENTS: &[(RuleKey, Point2)] = &[
    (RuleKey::geometry(Full), Point2::new(0.0, 0.0)),
    (RuleKey::geometry(Five), Point2::new(0.0, 0.0)),
    (RuleKey::geometry(Left), Point2::new(0.0, 0.0)),
    (RuleKey::exact(Left, HD, Two), Point2::new(-0.012, 0.008)),
    (RuleKey::geometry(Right), Point2::new(0.0, 0.0)),
    (RuleKey::exact(Right, HD, One), Point2::new(0.012, 0.008)),
    (RuleKey::geometry(Top), Point2::new(0.0, 0.0)),
    (RuleKey::geometry(Bottom), Point2::new(0.0, 0.0)),
];

/// Calibration channels carrying FD1..FD8, per geometry
const FIDUCIAL_CHANNELS: &[(Geometry, [u32; 8])] = &[
    (Full, [1, 8, 189, 197, 190, 196, 2, 7]),
    (Left, [1, 8, 97, 104, 98, 103, 2, 7]),
    (Right, [1, 8, 93, 100, 94, 99, 2, 7]),
    (Top, [1, 8, 126, 131, 127, 130, 2, 7]),
    (Bottom, [1, 8, 64, 71, 65, 70, 2, 7]),
    (Five, [1, 8, 158, 165, 159, 164, 2, 7]),
];

/// Fiducials averaged to find the component center
///
/// Only protomodules and modules carry an alignment measurement.
pub fn fiducial_indices(
    kind: ComponentKind,
    geometry: Geometry,
    density: Density,
) -> Result<&'static [usize], LookupError> {
    use ComponentKind::{Baseplate, Hexaboard, Module, Protomodule};

    match (kind, geometry, density) {
        (Protomodule | Module, Full, HD) => Ok(&[1, 2, 3, 4]),
        (Protomodule, Full, LD) => Ok(&[1, 2, 3, 4]),
        (Module, Full, LD) => Ok(&[3, 6]),
        (Protomodule | Module, Left | Right | Top | Bottom | Five, _) => Ok(&[1, 3]),
        (Baseplate | Hexaboard, _, _) => Err(LookupError::NoFiducialSelection {
            kind,
            geometry,
            density,
        }),
    }
}

/// Resolve a feature name to its fiducial index (1-based)
///
/// `FD<n>` names map directly; `CH<n>` names go through the geometry's
/// calibration-channel table.
pub fn fiducial_index(geometry: Geometry, name: &str) -> Option<usize> {
    let upper = name.to_uppercase();

    if let Some(n) = number_after(&upper, "FD") {
        return usize::try_from(n).ok().filter(|i| (1..=8).contains(i));
    }

    let channel = number_after(&upper, "CH")?;
    FIDUCIAL_CHANNELS
        .iter()
        .find(|(g, _)| *g == geometry)
        .and_then(|(_, channels)| channels.iter().position(|c| *c == channel))
        .map(|pos| pos + 1)
}

/// Digits immediately following the first occurrence of `tag`
fn number_after(s: &str, tag: &str) -> Option<u32> {
    let start = s.find(tag)? + tag.len();
    let digits: String = s[start..].chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

/// All reference rules, resolved to exact keys
#[derive(Debug, Clone)]
pub struct ReferenceLookup {
    pins: RuleTable<PinNames>,
    pin_angles: RuleTable<AngleRule>,
    fiducial_angles: RuleTable<AngleRule>,
    protomodule_adjustments: RuleTable<Point2>,
    module_adjustments: RuleTable<Point2>,
}

impl ReferenceLookup {
    /// Build the lookup from the built-in fixture tables
    pub fn standard() -> Result<Self, LookupError> {
        Ok(Self {
            pins: RuleTable::resolve("pin", PIN_RULES)?,
            pin_angles: RuleTable::resolve("pin angle", PIN_ANGLE_RULES)?,
            fiducial_angles: RuleTable::resolve("fiducial angle", FIDUCIAL_ANGLE_RULES)?,
            protomodule_adjustments: RuleTable::resolve("adjustment", PROTOMODULE_ADJUSTMENTS)?,
            module_adjustments: RuleTable::resolve("adjustment", MODULE_ADJUSTMENTS)?,
        })
    }

    /// Hole and slot pin names; a missing combination is logged and yields empty names
    pub fn pin_names(&self, geometry: Geometry, density: Density, position: PositionId) -> PinNames {
        match self.pins.get(geometry, density, position) {
            Some(names) => *names,
            None => {
                tracing::warn!(
                    %geometry, %density, %position,
                    "could not find the hole and slot pins for this combination"
                );
                PinNames::default()
            }
        }
    }

    pub fn pin_angle_rule(
        &self,
        geometry: Geometry,
        density: Density,
        position: PositionId,
    ) -> Result<AngleRule, LookupError> {
        self.pin_angles.require(geometry, density, position).copied()
    }

    pub fn fiducial_angle_rule(
        &self,
        geometry: Geometry,
        density: Density,
        position: PositionId,
    ) -> Result<AngleRule, LookupError> {
        self.fiducial_angles.require(geometry, density, position).copied()
    }

    pub fn fiducial_indices(
        &self,
        kind: ComponentKind,
        geometry: Geometry,
        density: Density,
    ) -> Result<&'static [usize], LookupError> {
        fiducial_indices(kind, geometry, density)
    }

    /// Correction subtracted from the raw offset
    pub fn adjustment(
        &self,
        kind: ComponentKind,
        geometry: Geometry,
        density: Density,
        position: PositionId,
    ) -> Result<Point2, LookupError> {
        let table = match kind {
            ComponentKind::Protomodule => &self.protomodule_adjustments,
            ComponentKind::Module => &self.module_adjustments,
            ComponentKind::Baseplate | ComponentKind::Hexaboard => {
                return Err(LookupError::NoFiducialSelection {
                    kind,
                    geometry,
                    density,
                })
            }
        };
        table.require(geometry, density, position).copied()
    }

    pub fn fiducial_index(&self, geometry: Geometry, name: &str) -> Option<usize> {
        fiducial_index(geometry, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_tables_cover_every_combination() {
        let lookup = ReferenceLookup::standard().unwrap();
        for g in Geometry::ALL {
            for d in Density::ALL {
                for p in PositionId::ALL {
                    assert!(!lookup.pin_names(g, d, p).is_empty(), "{g} {d} {p}");
                    assert!(lookup.pin_angle_rule(g, d, p).is_ok());
                    assert!(lookup.fiducial_angle_rule(g, d, p).is_ok());
                    assert!(lookup.adjustment(ComponentKind::Module, g, d, p).is_ok());
                    assert!(lookup.adjustment(ComponentKind::Protomodule, g, d, p).is_ok());
                }
            }
        }
    }

    #[test]
    fn test_partial_key_resolution_order() {
        let rules = [
            (RuleKey::geometry(Top), 1),
            (RuleKey::position(Top, Two), 2),
            (RuleKey::density(Top, HD), 3),
            (RuleKey::exact(Top, HD, Two), 4),
        ];
        let table = RuleTable::resolve("test", &rules).unwrap();
        assert_eq!(table.get(Top, LD, One), Some(&1));
        assert_eq!(table.get(Top, LD, Two), Some(&2));
        assert_eq!(table.get(Top, HD, One), Some(&3));
        assert_eq!(table.get(Top, HD, Two), Some(&4));
        assert_eq!(table.get(Full, LD, One), None);
    }

    #[test]
    fn test_missing_rule_reports_key() {
        let table = RuleTable::resolve("angle", &[(RuleKey::geometry(Full), 0)]).unwrap();
        let err = table.require(Five, HD, Two).unwrap_err();
        assert_eq!(
            err.to_string(),
            "no angle rule for geometry=Five, density=HD, position=2"
        );
    }

    #[test]
    fn test_duplicate_rule_is_conflict() {
        let rules = [(RuleKey::geometry(Full), 0), (RuleKey::geometry(Full), 1)];
        let err = RuleTable::resolve("dup", &rules).unwrap_err();
        assert!(matches!(err, LookupError::Conflict { .. }));
    }

    #[test]
    fn test_pin_names_by_density() {
        let lookup = ReferenceLookup::standard().unwrap();
        assert_eq!(lookup.pin_names(Full, HD, Two), pins("p2_center_pin", "p2M"));
        assert_eq!(lookup.pin_names(Left, LD, One), pins("p1C", "p1I"));
        assert_eq!(lookup.pin_names(Left, HD, One), pins("p1F", "p1P"));
    }

    #[test]
    fn test_fiducial_selection_depends_on_kind() {
        assert_eq!(
            fiducial_indices(ComponentKind::Protomodule, Full, LD).unwrap(),
            &[1, 2, 3, 4]
        );
        assert_eq!(fiducial_indices(ComponentKind::Module, Full, LD).unwrap(), &[3, 6]);
        assert_eq!(fiducial_indices(ComponentKind::Module, Full, HD).unwrap(), &[1, 2, 3, 4]);
        assert_eq!(fiducial_indices(ComponentKind::Module, Five, HD).unwrap(), &[1, 3]);
        assert!(fiducial_indices(ComponentKind::Baseplate, Full, LD).is_err());
    }

    #[test]
    fn test_fiducial_index_from_names() {
        assert_eq!(fiducial_index(Full, "FD3"), Some(3));
        assert_eq!(fiducial_index(Full, "fd8_circle"), Some(8));
        assert_eq!(fiducial_index(Full, "FD9"), None);
        assert_eq!(fiducial_index(Full, "CH189"), Some(3));
        assert_eq!(fiducial_index(Left, "CH189"), None);
        assert_eq!(fiducial_index(Full, "CH1"), Some(1));
        assert_eq!(fiducial_index(Full, "Thick1"), None);
    }

    #[test]
    fn test_angle_rules() {
        let v = Point2::new(0.0, 1.0);
        assert!((AngleRule::Direct.apply(v) - 90.0).abs() < 1e-12);
        assert!((AngleRule::Reversed.apply(v) + 90.0).abs() < 1e-12);
        assert!((AngleRule::Shifted(100.0).apply(v) + 170.0).abs() < 1e-12);
    }
}

//! Component kinds surveyed on the OGP and their fixed per-kind parameters

use serde::{Deserialize, Serialize};

/// Kind of detector-assembly component a survey belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Baseplate,
    Hexaboard,
    Protomodule,
    Module,
}

/// Per-kind rendering and database parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KindParams {
    /// Lower bound of the height color scale (mm)
    pub vmin: f64,
    /// Upper bound of the height color scale (mm)
    pub vmax: f64,
    /// Canonical orientation the point cloud is rotated to before rendering
    pub new_angle: f64,
    /// Inspection table receiving the upload
    pub table: &'static str,
    /// Table holding the registered components of this kind
    pub mother_table: &'static str,
    /// Column prefix (`<prefix>_name`, `<prefix>_no`)
    pub prefix: &'static str,
}

impl ComponentKind {
    /// All kinds, in the order a batch processes them
    pub const ALL: [ComponentKind; 4] = [
        ComponentKind::Baseplate,
        ComponentKind::Hexaboard,
        ComponentKind::Protomodule,
        ComponentKind::Module,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Baseplate => "baseplate",
            ComponentKind::Hexaboard => "hexaboard",
            ComponentKind::Protomodule => "protomodule",
            ComponentKind::Module => "module",
        }
    }

    /// Name of the survey subdirectory holding files of this kind
    pub fn dir_name(&self) -> &'static str {
        match self {
            ComponentKind::Baseplate => "baseplates",
            ComponentKind::Hexaboard => "hexaboards",
            ComponentKind::Protomodule => "protomodules",
            ComponentKind::Module => "modules",
        }
    }

    /// Whether surveys of this kind carry fiducials and get an alignment result
    pub fn has_alignment(&self) -> bool {
        matches!(self, ComponentKind::Protomodule | ComponentKind::Module)
    }

    pub fn params(&self) -> KindParams {
        match self {
            ComponentKind::Baseplate => KindParams {
                vmin: 1.2,
                vmax: 2.2,
                new_angle: 0.0,
                table: "bp_inspect",
                mother_table: "baseplate",
                prefix: "bp",
            },
            ComponentKind::Hexaboard => KindParams {
                vmin: 1.2,
                vmax: 2.9,
                new_angle: 0.0,
                table: "hxb_inspect",
                mother_table: "hexaboard",
                prefix: "hxb",
            },
            ComponentKind::Protomodule => KindParams {
                vmin: 1.37,
                vmax: 1.79,
                new_angle: 270.0,
                table: "proto_inspect",
                mother_table: "protomodule",
                prefix: "proto",
            },
            ComponentKind::Module => KindParams {
                vmin: 2.75,
                vmax: 4.0,
                new_angle: 270.0,
                table: "module_inspect",
                mother_table: "module",
                prefix: "module",
            },
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ComponentKind {
    type Err = String;

    /// Accepts singular or plural names (`module`, `modules`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.strip_suffix('s').unwrap_or(&lower) {
            "baseplate" | "bp" => Ok(ComponentKind::Baseplate),
            "hexaboard" | "hxb" => Ok(ComponentKind::Hexaboard),
            "protomodule" | "proto" => Ok(ComponentKind::Protomodule),
            "module" => Ok(ComponentKind::Module),
            _ => Err(format!(
                "Invalid component type: {}. Use baseplate, hexaboard, protomodule, or module",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parse_singular_and_plural() {
        assert_eq!("modules".parse::<ComponentKind>().unwrap(), ComponentKind::Module);
        assert_eq!("Protomodule".parse::<ComponentKind>().unwrap(), ComponentKind::Protomodule);
        assert_eq!("hxb".parse::<ComponentKind>().unwrap(), ComponentKind::Hexaboard);
        assert!("sensor".parse::<ComponentKind>().is_err());
    }

    #[test]
    fn test_kind_params() {
        let p = ComponentKind::Module.params();
        assert_eq!(p.table, "module_inspect");
        assert_eq!(p.prefix, "module");
        assert_eq!(ComponentKind::Baseplate.params().mother_table, "baseplate");
        assert!(ComponentKind::Protomodule.has_alignment());
        assert!(!ComponentKind::Hexaboard.has_alignment());
    }
}

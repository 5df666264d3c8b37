// SPDX-License-Identifier: MIT OR Apache-2.0
//! Mapping configuration: how model entities become BoQ lines.
//!
//! Loaded from `<storage>/config/mapping.yml` when present, otherwise the
//! built-in defaults apply.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Which measurement an IFC class contributes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantityKind {
    /// Instance count.
    Count,
    /// Summed length quantities.
    Length,
    /// Summed area quantities.
    Area,
    /// Summed volume quantities.
    Volume,
}

/// Mapping entry for one IFC entity class.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IfcMapEntry {
    /// Catalog code for the produced row.
    pub code: Option<String>,
    /// Row description.
    pub description: String,
    /// Row unit.
    pub unit: String,
    /// Measurement the row carries.
    pub quantity: QuantityKind,
    /// When set, only quantity records with this name are summed
    /// (e.g. `NetSideArea`); otherwise all records of the kind count.
    #[serde(default)]
    pub quantity_name: Option<String>,
}

/// Mapping entry for one DXF layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DxfMapEntry {
    /// Catalog code for the produced row.
    pub code: Option<String>,
    /// Row description.
    pub description: String,
    /// Row unit; lengths are converted into it from the drawing units.
    pub unit: String,
}

/// Per-page preset for PDF plans.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PdfPreset {
    /// Catalog code for the produced row.
    pub code: Option<String>,
    /// Row description.
    pub description: String,
    /// Row unit.
    pub unit: String,
    /// Quantity contributed per plan page.
    pub qty_per_page: f64,
}

/// Complete mapping configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingConfig {
    /// IFC entity class (uppercase, e.g. `IFCWALL`) to row mapping.
    pub ifc: BTreeMap<String, IfcMapEntry>,
    /// DXF layer name to row mapping.
    pub dxf_layers: BTreeMap<String, DxfMapEntry>,
    /// PDF per-page presets.
    pub pdf: Vec<PdfPreset>,
}

impl Default for MappingConfig {
    fn default() -> Self {
        let mut ifc = BTreeMap::new();
        ifc.insert(
            "IFCWALL".to_string(),
            IfcMapEntry {
                code: Some("05-100".into()),
                description: "Walls".into(),
                unit: "m2".into(),
                quantity: QuantityKind::Area,
                quantity_name: None,
            },
        );
        ifc.insert(
            "IFCWALLSTANDARDCASE".to_string(),
            IfcMapEntry {
                code: Some("05-100".into()),
                description: "Walls".into(),
                unit: "m2".into(),
                quantity: QuantityKind::Area,
                quantity_name: None,
            },
        );
        ifc.insert(
            "IFCSLAB".to_string(),
            IfcMapEntry {
                code: Some("03-300".into()),
                description: "Slabs".into(),
                unit: "m3".into(),
                quantity: QuantityKind::Volume,
                quantity_name: None,
            },
        );
        ifc.insert(
            "IFCDOOR".to_string(),
            IfcMapEntry {
                code: Some("08-100".into()),
                description: "Doors".into(),
                unit: "pcs".into(),
                quantity: QuantityKind::Count,
                quantity_name: None,
            },
        );
        ifc.insert(
            "IFCWINDOW".to_string(),
            IfcMapEntry {
                code: Some("08-500".into()),
                description: "Windows".into(),
                unit: "pcs".into(),
                quantity: QuantityKind::Count,
                quantity_name: None,
            },
        );
        ifc.insert(
            "IFCBEAM".to_string(),
            IfcMapEntry {
                code: Some("05-120".into()),
                description: "Beams".into(),
                unit: "m".into(),
                quantity: QuantityKind::Length,
                quantity_name: None,
            },
        );

        let mut dxf_layers = BTreeMap::new();
        dxf_layers.insert(
            "WALLS".to_string(),
            DxfMapEntry {
                code: Some("05-100".into()),
                description: "Walls".into(),
                unit: "m".into(),
            },
        );
        dxf_layers.insert(
            "DOORS".to_string(),
            DxfMapEntry {
                code: Some("08-100".into()),
                description: "Doors".into(),
                unit: "pcs".into(),
            },
        );

        Self {
            ifc,
            dxf_layers,
            pdf: vec![PdfPreset {
                code: None,
                description: "Plan sheets".into(),
                unit: "pcs".into(),
                qty_per_page: 1.0,
            }],
        }
    }
}

impl MappingConfig {
    /// Load from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path).map_err(|e| format!("read {path:?}: {e}"))?;
        serde_yaml::from_str(&raw).map_err(|e| format!("parse {path:?}: {e}"))
    }

    /// Load `<config_dir>/mapping.yml` when present, defaults otherwise.
    ///
    /// A present-but-broken file is an error; silently ignoring it would
    /// price jobs against the wrong catalog.
    pub fn load_or_default(config_dir: &Path) -> Result<Self, String> {
        let candidate = config_dir.join("mapping.yml");
        if candidate.exists() {
            Self::from_yaml_file(&candidate)
        } else {
            Ok(Self::default())
        }
    }
}

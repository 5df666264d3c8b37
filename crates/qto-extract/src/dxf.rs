// SPDX-License-Identifier: MIT OR Apache-2.0
//! CAD engine: DXF group-code reader.
//!
//! Handles text DXF. Binary DWG uploads pass magic validation but cannot
//! be parsed here; the engine reports that a DXF conversion is required.
//! Lengths are taken from LINE / LWPOLYLINE / CIRCLE entities, counts from
//! INSERTs; rows are produced per mapped layer.

use crate::mapping::DxfMapEntry;
use crate::{BoqRow, ExtractError, ExtractRequest, ExtractResult, Extractor};
use qto_core::units::UnitClass;

/// Extractor for DWG/DXF inputs.
pub struct CadExtractor;

/// A parsed `(code, value)` pair stream plus header facts.
#[derive(Debug, Default)]
pub struct DxfDocument {
    /// `$INSUNITS` header value, when present.
    pub insunits: Option<i32>,
    entities: Vec<DxfEntity>,
}

#[derive(Debug, Default, Clone)]
struct DxfEntity {
    etype: String,
    layer: String,
    points: Vec<(f64, f64)>,
    end_point: Option<(f64, f64)>,
    radius: Option<f64>,
    closed: bool,
}

impl DxfDocument {
    /// Parse DXF text into entities and header facts.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut lines = text.lines().map(str::trim);
        let mut pairs = Vec::new();
        while let (Some(code), Some(value)) = (lines.next(), lines.next()) {
            let Ok(code) = code.parse::<i32>() else {
                return Err(format!("bad group code: {code}"));
            };
            pairs.push((code, value.to_string()));
        }
        if !pairs.iter().any(|(c, v)| *c == 0 && v == "SECTION") {
            return Err("no SECTION records".into());
        }

        let mut doc = DxfDocument::default();
        let mut current: Option<DxfEntity> = None;
        let mut pending_x: Option<f64> = None;
        let mut awaiting_insunits = false;
        let mut in_entities = false;

        for (code, value) in pairs {
            match code {
                9 => awaiting_insunits = value == "$INSUNITS",
                70 if awaiting_insunits => {
                    doc.insunits = value.trim().parse::<i32>().ok();
                    awaiting_insunits = false;
                }
                2 if !in_entities && value == "ENTITIES" => in_entities = true,
                0 => {
                    if value == "ENDSEC" {
                        in_entities = false;
                    }
                    if let Some(e) = current.take() {
                        doc.entities.push(e);
                    }
                    if in_entities && value != "ENDSEC" {
                        current = Some(DxfEntity {
                            etype: value.clone(),
                            ..Default::default()
                        });
                    }
                    pending_x = None;
                }
                8 => {
                    if let Some(e) = current.as_mut() {
                        e.layer = value.to_ascii_uppercase();
                    }
                }
                10 => pending_x = value.trim().parse::<f64>().ok(),
                20 => {
                    if let (Some(x), Ok(y), Some(e)) =
                        (pending_x.take(), value.trim().parse::<f64>(), current.as_mut())
                    {
                        e.points.push((x, y));
                    }
                }
                11 => pending_x = value.trim().parse::<f64>().ok(),
                21 => {
                    if let (Some(x), Ok(y), Some(e)) =
                        (pending_x.take(), value.trim().parse::<f64>(), current.as_mut())
                    {
                        e.end_point = Some((x, y));
                    }
                }
                40 => {
                    if let (Ok(r), Some(e)) = (value.trim().parse::<f64>(), current.as_mut()) {
                        e.radius = Some(r);
                    }
                }
                70 => {
                    if let (Ok(flags), Some(e)) = (value.trim().parse::<i32>(), current.as_mut()) {
                        e.closed = flags & 1 == 1;
                    }
                }
                _ => {}
            }
        }
        if let Some(e) = current.take() {
            doc.entities.push(e);
        }
        Ok(doc)
    }

    /// Scale from drawing units to millimetres. `None` when `$INSUNITS`
    /// is absent or unitless.
    pub fn unit_scale_mm(&self) -> Option<f64> {
        match self.insunits? {
            1 => Some(25.4),
            2 => Some(304.8),
            4 => Some(1.0),
            5 => Some(10.0),
            6 => Some(1000.0),
            _ => None,
        }
    }

    fn entity_length(e: &DxfEntity) -> f64 {
        match e.etype.as_str() {
            "LINE" => match (e.points.first(), e.end_point) {
                (Some(&a), Some(b)) => dist(a, b),
                _ => 0.0,
            },
            "LWPOLYLINE" | "POLYLINE" => {
                let mut len: f64 = e
                    .points
                    .windows(2)
                    .map(|w| dist(w[0], w[1]))
                    .sum();
                if e.closed && e.points.len() > 2 {
                    len += dist(*e.points.last().unwrap(), e.points[0]);
                }
                len
            }
            "CIRCLE" => e.radius.map_or(0.0, |r| 2.0 * std::f64::consts::PI * r),
            _ => 0.0,
        }
    }
}

fn dist(a: (f64, f64), b: (f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

impl Extractor for CadExtractor {
    fn extract(&self, req: &ExtractRequest<'_>) -> ExtractResult<Vec<BoqRow>> {
        let bytes = std::fs::read(req.path)?;
        if looks_like_binary_dwg(&bytes) {
            return Err(ExtractError::Unsupported(
                "binary DWG is not handled by the built-in engine; convert to DXF".into(),
            ));
        }
        let text = String::from_utf8(bytes)
            .map_err(|_| ExtractError::Parse("drawing is not valid UTF-8 text".into()))?;
        let doc = DxfDocument::parse(&text).map_err(ExtractError::Parse)?;

        // Unknown insertion units: assume millimetres, per validation policy.
        let scale_mm = doc.unit_scale_mm().unwrap_or(1.0);

        let mut rows = Vec::new();
        for (layer, entry) in &req.mapping.dxf_layers {
            let on_layer: Vec<&DxfEntity> = doc
                .entities
                .iter()
                .filter(|e| &e.layer == layer)
                .collect();
            if on_layer.is_empty() {
                continue;
            }
            let qty = match UnitClass::classify(&entry.unit) {
                UnitClass::Count => on_layer.len() as f64,
                _ => {
                    let total_mm: f64 = on_layer
                        .iter()
                        .map(|e| DxfDocument::entity_length(e) * scale_mm)
                        .sum();
                    convert_mm(total_mm, &entry.unit)
                }
            };
            if qty <= 0.0 {
                continue;
            }
            rows.push(row_for(entry, layer, qty, on_layer.len()));
        }
        Ok(rows)
    }
}

fn row_for(entry: &DxfMapEntry, layer: &str, qty: f64, entities: usize) -> BoqRow {
    BoqRow::new(
        entry.code.clone(),
        entry.description.clone(),
        entry.unit.clone(),
        qty,
        Some(format!("layer {layer} ({entities} entities)")),
    )
}

/// Millimetres into the mapping's target length unit.
fn convert_mm(mm: f64, unit: &str) -> f64 {
    match unit.trim().to_ascii_lowercase().as_str() {
        "mm" => mm,
        "cm" => mm / 10.0,
        "m" | "lm" => mm / 1000.0,
        "km" => mm / 1_000_000.0,
        _ => mm,
    }
}

/// DWG magic: `AC` plus four release digits.
pub fn looks_like_binary_dwg(bytes: &[u8]) -> bool {
    bytes.len() >= 6 && bytes.starts_with(b"AC") && bytes[2..6].iter().all(|b| b.is_ascii_digit())
}

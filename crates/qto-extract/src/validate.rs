// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pre-takeoff model validation.
//!
//! The engine runs this before invoking an extractor. Errors fail the job
//! with `validation_error`; warnings are emitted as a `warnings` stage
//! event and processing continues.

use crate::dxf::{DxfDocument, looks_like_binary_dwg};
use crate::pdf::count_pages;
use crate::step::StepModel;
use qto_core::FileType;
use std::collections::HashSet;
use std::path::Path;

/// IFC schema identifiers the pipeline accepts.
pub const SUPPORTED_IFC_SCHEMAS: &[&str] = &["IFC2X3", "IFC4", "IFC4X1", "IFC4X3"];

/// Result of validating one uploaded model.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValidationOutcome {
    /// Fatal findings; any entry fails the job.
    pub errors: Vec<String>,
    /// Non-fatal findings, surfaced as a `warnings` stage event.
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    /// True when no fatal finding was recorded.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

/// Validate the uploaded bytes at `path` as `file_type`.
pub fn validate_file(file_type: FileType, path: &Path) -> std::io::Result<ValidationOutcome> {
    let bytes = std::fs::read(path)?;
    Ok(validate_bytes(file_type, &bytes))
}

/// Validate in-memory content (used by the upload handler for the magic
/// check and by the engine for the full pass).
pub fn validate_bytes(file_type: FileType, bytes: &[u8]) -> ValidationOutcome {
    let mut out = ValidationOutcome::default();
    match file_type {
        FileType::Ifc => validate_ifc(bytes, &mut out),
        FileType::Dwg => validate_dwg(bytes, &mut out),
        FileType::Dxf => validate_dxf(bytes, &mut out),
        FileType::Pdf => validate_pdf(bytes, &mut out),
    }
    out
}

fn validate_ifc(bytes: &[u8], out: &mut ValidationOutcome) {
    let Ok(text) = std::str::from_utf8(bytes) else {
        out.error("IFC file is not valid text");
        return;
    };
    let model = match StepModel::parse(text) {
        Ok(m) => m,
        Err(e) => {
            out.error(format!("IFC parse failed: {e}"));
            return;
        }
    };

    match model.schemas.first() {
        None => out.error("IFC file declares no schema"),
        Some(schema) if !SUPPORTED_IFC_SCHEMAS.contains(&schema.as_str()) => {
            out.error(format!("unsupported IFC schema: {schema}"));
        }
        Some(_) => {}
    }

    // Bounding box: the model must have spatial extent.
    let points = model.cartesian_points();
    if points.is_empty() {
        out.error("model has no geometry (empty bounding box)");
    } else {
        let extent_is_zero = (0..3).all(|axis| {
            let coords: Vec<f64> = points.iter().filter_map(|p| p.get(axis).copied()).collect();
            match (
                coords.iter().cloned().fold(f64::INFINITY, f64::min),
                coords.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            ) {
                (min, max) if min.is_finite() && max.is_finite() => (max - min).abs() < f64::EPSILON,
                _ => true,
            }
        });
        if extent_is_zero {
            out.error("model has zero spatial extent (empty bounding box)");
        }
    }

    // GlobalIds must be unique.
    let ids = model.global_ids();
    let mut seen = HashSet::new();
    for id in &ids {
        if !seen.insert(id) {
            out.error(format!("duplicate GlobalId: {id}"));
        }
    }

    if model.length_unit_scale_mm().is_none() {
        out.warn("length units not resolvable; assuming millimetres");
    }
}

fn validate_dwg(bytes: &[u8], out: &mut ValidationOutcome) {
    if !looks_like_binary_dwg(bytes) {
        // A text payload declared as DWG may actually be DXF content;
        // treat it as such for validation.
        validate_dxf(bytes, out);
        return;
    }
    // Binary DWG: magic is all we can check; insertion units live in the
    // binary header the built-in engine does not read.
    out.warn("insertion units not resolvable; assuming millimetres");
}

fn validate_dxf(bytes: &[u8], out: &mut ValidationOutcome) {
    let Ok(text) = std::str::from_utf8(bytes) else {
        out.error("DXF file is not valid text");
        return;
    };
    let doc = match DxfDocument::parse(text) {
        Ok(d) => d,
        Err(e) => {
            out.error(format!("DXF parse failed: {e}"));
            return;
        }
    };
    if doc.unit_scale_mm().is_none() {
        out.warn("insertion units not resolvable; assuming millimetres");
    }
}

fn validate_pdf(bytes: &[u8], out: &mut ValidationOutcome) {
    if !bytes.starts_with(b"%PDF-") {
        out.error("missing %PDF- header");
        return;
    }
    if count_pages(bytes) == 0 {
        out.warn("no page objects found");
    }
}

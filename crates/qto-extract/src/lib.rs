// SPDX-License-Identifier: MIT OR Apache-2.0
//! Pluggable quantity extractors.
//!
//! The job engine talks to exactly one interface: [`Extractor::extract`]
//! turns a model file into [`BoqRow`]s. Implementations are selected by
//! [`FileType`] through an [`ExtractorSet`]. Extractors never touch the
//! store or the broker — the engine is the sole writer.
//!
//! The built-in engines are deliberately lightweight: a STEP scanner for
//! IFC, a group-code reader for DXF, and a page-based measurer for PDF
//! plans. Production deployments slot heavier engines in behind the same
//! trait.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod dxf;
pub mod ifc;
pub mod mapping;
pub mod mock;
pub mod pdf;
pub mod step;
pub mod validate;

pub use mapping::{MappingConfig, QuantityKind};

use qto_core::units::round_qty;
use qto_core::{BoqItem, FileType, JobId};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Errors raised by extractors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// The file could not be read.
    #[error("cannot read model file: {0}")]
    Io(#[from] std::io::Error),

    /// The format (or dialect) is not handled by this engine.
    #[error("unsupported input: {0}")]
    Unsupported(String),

    /// The file was readable but structurally broken.
    #[error("parse error: {0}")]
    Parse(String),
}

/// Result alias for extractor operations.
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;

/// One extracted quantity line, before persistence.
#[derive(Clone, Debug, PartialEq)]
pub struct BoqRow {
    /// Catalog code, when the mapping provides one.
    pub code: Option<String>,
    /// Work description.
    pub description: String,
    /// Measurement unit.
    pub unit: String,
    /// Extracted quantity (already rounded per unit class).
    pub qty: f64,
    /// Pointer back into the source model.
    pub source_ref: Option<String>,
    /// Fixed allowance; extractors emit 0.
    pub allowance: f64,
    /// Unit rate; extractors emit 0 (pricing happens later).
    pub unit_price: f64,
    /// Derived total; extractors emit 0.
    pub total_price: f64,
}

impl BoqRow {
    /// Build a row with rounding applied and money fields zeroed.
    pub fn new(
        code: Option<String>,
        description: impl Into<String>,
        unit: impl Into<String>,
        qty: f64,
        source_ref: Option<String>,
    ) -> Self {
        let unit = unit.into();
        Self {
            code,
            description: description.into(),
            qty: round_qty(&unit, qty),
            unit,
            source_ref,
            allowance: 0.0,
            unit_price: 0.0,
            total_price: 0.0,
        }
    }

    /// Convert into a persistable [`BoqItem`] for `job_id`.
    pub fn into_item(self, job_id: JobId, now: chrono::DateTime<chrono::Utc>) -> BoqItem {
        BoqItem {
            id: uuid::Uuid::new_v4(),
            job_id,
            code: self.code,
            description: self.description,
            unit: self.unit,
            qty: self.qty,
            source_ref: self.source_ref,
            mapped_price_item_id: None,
            allowance: self.allowance,
            unit_price: self.unit_price,
            total_price: self.total_price,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A single extraction request.
pub struct ExtractRequest<'a> {
    /// Declared format of the input.
    pub file_type: FileType,
    /// Location of the uploaded bytes.
    pub path: &'a Path,
    /// Mapping configuration resolved for this deployment.
    pub mapping: &'a MappingConfig,
}

/// Uniform call-site over the per-format engines.
pub trait Extractor: Send + Sync {
    /// Produce BoQ rows from the input file.
    fn extract(&self, req: &ExtractRequest<'_>) -> ExtractResult<Vec<BoqRow>>;
}

/// Registry of extractors keyed by file type.
#[derive(Clone)]
pub struct ExtractorSet {
    engines: HashMap<FileType, Arc<dyn Extractor>>,
}

impl ExtractorSet {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            engines: HashMap::new(),
        }
    }

    /// Registry wired with the built-in engines.
    pub fn defaults() -> Self {
        let mut set = Self::new();
        let cad: Arc<dyn Extractor> = Arc::new(dxf::CadExtractor);
        set.register(FileType::Ifc, Arc::new(ifc::IfcExtractor));
        set.register(FileType::Dwg, cad.clone());
        set.register(FileType::Dxf, cad);
        set.register(FileType::Pdf, Arc::new(pdf::PdfExtractor));
        set
    }

    /// Register (or replace) the engine for `file_type`.
    pub fn register(&mut self, file_type: FileType, engine: Arc<dyn Extractor>) {
        self.engines.insert(file_type, engine);
    }

    /// Run the engine registered for the request's file type.
    pub fn extract(&self, req: &ExtractRequest<'_>) -> ExtractResult<Vec<BoqRow>> {
        let engine = self.engines.get(&req.file_type).ok_or_else(|| {
            ExtractError::Unsupported(format!(
                "no extractor registered for {}",
                req.file_type.as_str()
            ))
        })?;
        engine.extract(req)
    }
}

impl Default for ExtractorSet {
    fn default() -> Self {
        Self::defaults()
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Test doubles for the extractor seam.

use crate::{BoqRow, ExtractError, ExtractRequest, ExtractResult, Extractor};

/// Returns a fixed row set regardless of input.
pub struct StaticExtractor {
    rows: Vec<BoqRow>,
}

impl StaticExtractor {
    /// Create an extractor that always yields `rows`.
    pub fn new(rows: Vec<BoqRow>) -> Self {
        Self { rows }
    }
}

impl Extractor for StaticExtractor {
    fn extract(&self, _req: &ExtractRequest<'_>) -> ExtractResult<Vec<BoqRow>> {
        Ok(self.rows.clone())
    }
}

/// Always fails with the configured message.
pub struct FailingExtractor {
    message: String,
}

impl FailingExtractor {
    /// Create an extractor that always errors with `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Extractor for FailingExtractor {
    fn extract(&self, _req: &ExtractRequest<'_>) -> ExtractResult<Vec<BoqRow>> {
        Err(ExtractError::Parse(self.message.clone()))
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! PDF plan engine: page counting plus per-page measure presets.

use crate::{BoqRow, ExtractError, ExtractRequest, ExtractResult, Extractor};

/// Extractor for PDF plans.
pub struct PdfExtractor;

/// Count page objects in raw PDF bytes.
///
/// Looks for `/Type /Page` (and the unspaced variant) while excluding the
/// `/Pages` tree nodes. Good enough for plan sets produced by CAD tools.
pub fn count_pages(bytes: &[u8]) -> usize {
    count_occurrences(bytes, b"/Type /Page", b"/Type /Pages")
        + count_occurrences(bytes, b"/Type/Page", b"/Type/Pages")
}

fn count_occurrences(haystack: &[u8], needle: &[u8], exclude: &[u8]) -> usize {
    let mut count = 0;
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if &haystack[i..i + needle.len()] == needle {
            let is_excluded = i + exclude.len() <= haystack.len()
                && &haystack[i..i + exclude.len()] == exclude;
            if !is_excluded {
                count += 1;
            }
            i += needle.len();
        } else {
            i += 1;
        }
    }
    count
}

impl Extractor for PdfExtractor {
    fn extract(&self, req: &ExtractRequest<'_>) -> ExtractResult<Vec<BoqRow>> {
        let bytes = std::fs::read(req.path)?;
        if !bytes.starts_with(b"%PDF-") {
            return Err(ExtractError::Parse("missing %PDF- header".into()));
        }
        let pages = count_pages(&bytes);
        if pages == 0 {
            return Err(ExtractError::Parse("document has no pages".into()));
        }

        Ok(req
            .mapping
            .pdf
            .iter()
            .map(|preset| {
                BoqRow::new(
                    preset.code.clone(),
                    preset.description.clone(),
                    preset.unit.clone(),
                    preset.qty_per_page * pages as f64,
                    Some(format!("{pages} pages")),
                )
            })
            .collect())
    }
}

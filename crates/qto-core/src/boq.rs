// SPDX-License-Identifier: MIT OR Apache-2.0
//! Bill-of-Quantities rows and their revision trail.

use crate::{BoqItemId, JobId, TOTAL_PRICE_TOLERANCE, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One priced work item in a job's Bill of Quantities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoqItem {
    /// Unique identifier.
    pub id: BoqItemId,
    /// Job the row was extracted for.
    pub job_id: JobId,
    /// Catalog code used for price mapping; may be empty.
    pub code: Option<String>,
    /// Work description.
    pub description: String,
    /// Measurement unit (`m`, `m2`, `pcs`, ...).
    pub unit: String,
    /// Quantity, non-negative.
    pub qty: f64,
    /// Reference back into the source model (GlobalId, layer, page).
    pub source_ref: Option<String>,
    /// Price item the row was mapped to, if any.
    pub mapped_price_item_id: Option<Uuid>,
    /// Fixed allowance added on top of `qty * unit_price`, non-negative.
    pub allowance: f64,
    /// Unit rate, non-negative.
    pub unit_price: f64,
    /// Derived total; kept within [`TOTAL_PRICE_TOLERANCE`] of
    /// `qty * unit_price + allowance` by every writer.
    pub total_price: f64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Optimistic-concurrency version token.
    pub updated_at: DateTime<Utc>,
}

impl BoqItem {
    /// The total the pricing invariant demands.
    pub fn expected_total(&self) -> f64 {
        self.qty * self.unit_price + self.allowance
    }

    /// Recompute `total_price` from quantity, rate, and allowance.
    pub fn recompute_total(&mut self) {
        self.total_price = self.expected_total();
    }

    /// True when the stored total satisfies the pricing invariant.
    pub fn total_in_tolerance(&self) -> bool {
        (self.total_price - self.expected_total()).abs() <= TOTAL_PRICE_TOLERANCE
    }
}

/// Partial update to a [`BoqItem`].
///
/// Absent fields are left untouched. `expected_updated_at` is the
/// optimistic version token the caller read; it is consumed by the editor
/// and the store's conditional update, never written to the row.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoqItemPatch {
    /// New catalog code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// New description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// New quantity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qty: Option<f64>,
    /// New unit rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<f64>,
    /// New allowance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowance: Option<f64>,
    /// New price-item mapping.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapped_price_item_id: Option<Uuid>,
    /// Version token the caller read, for conflict detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_updated_at: Option<DateTime<Utc>>,
}

impl BoqItemPatch {
    /// True when the patch carries no field changes at all.
    pub fn is_empty(&self) -> bool {
        self.code.is_none()
            && self.description.is_none()
            && self.unit.is_none()
            && self.qty.is_none()
            && self.unit_price.is_none()
            && self.allowance.is_none()
            && self.mapped_price_item_id.is_none()
    }

    /// Compute the field-wise diff this patch would cause on `item`.
    ///
    /// Returns `{field: {"old": .., "new": ..}}` for fields whose value
    /// actually changes; fields patched to their current value are omitted.
    pub fn diff(&self, item: &BoqItem) -> serde_json::Map<String, serde_json::Value> {
        use serde_json::json;
        let mut changes = serde_json::Map::new();
        let mut record = |field: &str, old: serde_json::Value, new: serde_json::Value| {
            if old != new {
                changes.insert(field.to_string(), json!({"old": old, "new": new}));
            }
        };
        if let Some(code) = &self.code {
            record("code", json!(item.code), json!(code));
        }
        if let Some(description) = &self.description {
            record("description", json!(item.description), json!(description));
        }
        if let Some(unit) = &self.unit {
            record("unit", json!(item.unit), json!(unit));
        }
        if let Some(qty) = self.qty {
            record("qty", json!(item.qty), json!(qty));
        }
        if let Some(unit_price) = self.unit_price {
            record("unit_price", json!(item.unit_price), json!(unit_price));
        }
        if let Some(allowance) = self.allowance {
            record("allowance", json!(item.allowance), json!(allowance));
        }
        if let Some(mapped) = self.mapped_price_item_id {
            record(
                "mapped_price_item_id",
                json!(item.mapped_price_item_id),
                json!(mapped),
            );
        }
        changes
    }

    /// Apply the patch in place, recomputing `total_price` when quantity,
    /// rate, or allowance change. Returns the diff of fields that changed.
    pub fn apply(&self, item: &mut BoqItem) -> serde_json::Map<String, serde_json::Value> {
        let changes = self.diff(item);
        if let Some(code) = &self.code {
            item.code = Some(code.clone());
        }
        if let Some(description) = &self.description {
            item.description = description.clone();
        }
        if let Some(unit) = &self.unit {
            item.unit = unit.clone();
        }
        if let Some(qty) = self.qty {
            item.qty = qty;
        }
        if let Some(unit_price) = self.unit_price {
            item.unit_price = unit_price;
        }
        if let Some(allowance) = self.allowance {
            item.allowance = allowance;
        }
        if let Some(mapped) = self.mapped_price_item_id {
            item.mapped_price_item_id = Some(mapped);
        }
        if changes.contains_key("qty")
            || changes.contains_key("unit_price")
            || changes.contains_key("allowance")
        {
            item.recompute_total();
        }
        changes
    }
}

/// Append-only record of one accepted edit to a BoQ row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    /// Unique identifier.
    pub id: Uuid,
    /// Row the edit applied to.
    pub boq_item_id: BoqItemId,
    /// Account that made the edit.
    pub actor: UserId,
    /// Field-wise diff: `{field: {"old": .., "new": ..}}`.
    pub changes: serde_json::Value,
    /// Timestamp of the commit.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(qty: f64, rate: f64, allowance: f64) -> BoqItem {
        let mut item = BoqItem {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            code: Some("C-100".into()),
            description: "Concrete wall".into(),
            unit: "m3".into(),
            qty,
            source_ref: None,
            mapped_price_item_id: None,
            allowance,
            unit_price: rate,
            total_price: 0.0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        item.recompute_total();
        item
    }

    #[test]
    fn recompute_includes_allowance() {
        let item = row(10.0, 25.0, 5.0);
        assert_eq!(item.total_price, 255.0);
        assert!(item.total_in_tolerance());
    }

    #[test]
    fn tolerance_boundary() {
        let mut item = row(2.0, 3.0, 0.0);
        item.total_price = 6.01;
        assert!(item.total_in_tolerance());
        item.total_price = 6.02;
        assert!(!item.total_in_tolerance());
    }

    #[test]
    fn patch_diff_skips_unchanged_values() {
        let item = row(10.0, 25.0, 0.0);
        let patch = BoqItemPatch {
            qty: Some(10.0),
            unit: Some("m3".into()),
            description: Some("Concrete column".into()),
            ..Default::default()
        };
        let diff = patch.diff(&item);
        assert_eq!(diff.len(), 1);
        assert!(diff.contains_key("description"));
    }

    #[test]
    fn patch_apply_recomputes_total() {
        let mut item = row(10.0, 25.0, 5.0);
        let patch = BoqItemPatch {
            qty: Some(12.0),
            ..Default::default()
        };
        let diff = patch.apply(&mut item);
        assert_eq!(item.qty, 12.0);
        assert_eq!(item.total_price, 12.0 * 25.0 + 5.0);
        assert_eq!(diff["qty"]["old"], serde_json::json!(10.0));
        assert_eq!(diff["qty"]["new"], serde_json::json!(12.0));
    }

    #[test]
    fn patch_without_price_fields_keeps_total() {
        let mut item = row(10.0, 25.0, 0.0);
        let before = item.total_price;
        let patch = BoqItemPatch {
            description: Some("Renamed".into()),
            ..Default::default()
        };
        patch.apply(&mut item);
        assert_eq!(item.total_price, before);
    }

    #[test]
    fn empty_patch_is_empty() {
        assert!(BoqItemPatch::default().is_empty());
        let p = BoqItemPatch {
            expected_updated_at: Some(Utc::now()),
            ..Default::default()
        };
        // A bare version token does not count as a field change.
        assert!(p.is_empty());
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Price catalogs: admin price lists and supplier overrides.
//!
//! Rates are keyed by work-item `code`. When both an admin price item and
//! a supplier price item exist for the same code, the supplier rate wins.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An admin-curated price list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceList {
    /// Unique identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// ISO currency code shown on exports.
    pub currency: String,
    /// Whether this list is the current default.
    pub is_active: bool,
    /// Date the list becomes applicable.
    pub effective_from: Option<NaiveDate>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One rate inside a [`PriceList`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceItem {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning price list.
    pub price_list_id: Uuid,
    /// Work-item code this rate applies to.
    pub code: String,
    /// Description of the priced work.
    pub description: String,
    /// Measurement unit.
    pub unit: String,
    /// Unit rate.
    pub rate: f64,
}

/// A supplier whose catalog can shadow admin rates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Supplier {
    /// Unique identifier.
    pub id: Uuid,
    /// Display name.
    pub name: String,
    /// Contact email.
    pub email: Option<String>,
    /// Default price list used for jobs billed to this supplier.
    pub default_price_list_id: Option<Uuid>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// A supplier-specific rate for a work-item code.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SupplierPriceItem {
    /// Unique identifier.
    pub id: Uuid,
    /// Owning supplier.
    pub supplier_id: Uuid,
    /// Work-item code this rate applies to.
    pub code: String,
    /// Unit rate; shadows the admin rate for the same code.
    pub rate: f64,
    /// Measurement unit.
    pub unit: String,
}

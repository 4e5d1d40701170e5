//! Database row types. These map directly to SQLite rows and are converted
//! into the shared `kiosk-types` models at the storage boundary.

use kiosk_types::models::{
    MediaKind, MediaRef, MethodId, Product, ProductId, PurchaseKind, PurchaseMethod,
    SubcategoryId,
};
use rusqlite::Row;

use crate::error::StoreError;

pub const PRODUCT_COLUMNS: &str =
    "id, subcategory_id, title, price, description, media_kind, media_ref, is_active, sort";

pub const METHOD_COLUMNS: &str = "id, product_id, kind, payload, label, sort";

pub struct ProductRow {
    pub id: i64,
    pub subcategory_id: i64,
    pub title: String,
    pub price: String,
    pub description: String,
    pub media_kind: Option<String>,
    pub media_ref: Option<String>,
    pub is_active: bool,
    pub sort: i64,
}

impl ProductRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            subcategory_id: row.get(1)?,
            title: row.get(2)?,
            price: row.get(3)?,
            description: row.get(4)?,
            media_kind: row.get(5)?,
            media_ref: row.get(6)?,
            is_active: row.get(7)?,
            sort: row.get(8)?,
        })
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let media = match (row.media_kind, row.media_ref) {
            (Some(kind), Some(token)) => {
                let kind = MediaKind::parse(&kind).ok_or_else(|| {
                    StoreError::Corrupt(format!("product {}: media kind '{}'", row.id, kind))
                })?;
                Some(MediaRef { kind, token })
            }
            (None, None) => None,
            _ => {
                return Err(StoreError::Corrupt(format!(
                    "product {}: half-set media columns",
                    row.id
                )));
            }
        };

        Ok(Product {
            id: ProductId(row.id),
            subcategory_id: SubcategoryId(row.subcategory_id),
            title: row.title,
            price: row.price,
            description: row.description,
            media,
            active: row.is_active,
            sort: row.sort,
        })
    }
}

pub struct MethodRow {
    pub id: i64,
    pub product_id: i64,
    pub kind: String,
    pub payload: String,
    pub label: String,
    pub sort: i64,
}

impl MethodRow {
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            product_id: row.get(1)?,
            kind: row.get(2)?,
            payload: row.get(3)?,
            label: row.get(4)?,
            sort: row.get(5)?,
        })
    }
}

impl TryFrom<MethodRow> for PurchaseMethod {
    type Error = StoreError;

    fn try_from(row: MethodRow) -> Result<Self, Self::Error> {
        let kind: PurchaseKind = serde_json::from_str(&row.payload).map_err(|e| {
            StoreError::Corrupt(format!("purchase method {}: payload: {}", row.id, e))
        })?;

        if kind.tag().as_str() != row.kind {
            return Err(StoreError::Corrupt(format!(
                "purchase method {}: kind column '{}' disagrees with payload",
                row.id, row.kind
            )));
        }

        Ok(PurchaseMethod {
            id: MethodId(row.id),
            product_id: ProductId(row.product_id),
            kind,
            label: row.label,
            sort: row.sort,
        })
    }
}

/// Encodes a purchase kind for the `payload` column.
pub fn encode_payload(kind: &PurchaseKind) -> Result<String, StoreError> {
    serde_json::to_string(kind)
        .map_err(|e| StoreError::Corrupt(format!("encode purchase payload: {}", e)))
}

use kiosk_types::models::{
    Entity, MethodId, NewMethod, ProductId, PurchaseKind, PurchaseMethod,
};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{Result, StoreError};
use crate::models::{METHOD_COLUMNS, MethodRow, encode_payload};
use crate::Database;

impl Database {
    pub fn add_method(&self, product: ProductId, method: &NewMethod) -> Result<MethodId> {
        let id = self.with_tx(|conn| insert_method(conn, product, method))?;
        info!(
            "Purchase method {} ({}) added to product {}",
            id,
            method.kind.tag().as_str(),
            product
        );
        Ok(id)
    }

    pub fn update_method(&self, id: MethodId, method: &NewMethod) -> Result<()> {
        self.with_tx(|conn| update_method(conn, id, method))
    }

    pub fn delete_method(&self, id: MethodId) -> Result<()> {
        self.with_tx(|conn| delete_method(conn, id))?;
        info!("Purchase method {} deleted", id);
        Ok(())
    }

    pub fn list_methods(&self, product: ProductId) -> Result<Vec<PurchaseMethod>> {
        self.with_conn(|conn| list_methods(conn, product))
    }

    pub fn get_method(&self, id: MethodId) -> Result<PurchaseMethod> {
        self.with_conn(|conn| get_method(conn, id))
    }
}

fn checked(method: &NewMethod) -> Result<(&PurchaseKind, &str)> {
    method.kind.validate()?;
    let label = method.label.trim();
    if label.is_empty() {
        return Err(StoreError::InvalidInput("label must not be empty"));
    }
    Ok((&method.kind, label))
}

pub fn insert_method(conn: &Connection, product: ProductId, method: &NewMethod) -> Result<MethodId> {
    let (kind, label) = checked(method)?;
    let parent: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM products WHERE id = ?1)",
        [product.0],
        |row| row.get(0),
    )?;
    if !parent {
        return Err(StoreError::ReferentialViolation(Entity::Product));
    }
    conn.execute(
        "INSERT INTO purchase_methods (product_id, kind, payload, label) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![product.0, kind.tag().as_str(), encode_payload(kind)?, label],
    )?;
    Ok(MethodId(conn.last_insert_rowid()))
}

/// Replaces kind, payload and label of an existing method.
pub fn update_method(conn: &Connection, id: MethodId, method: &NewMethod) -> Result<()> {
    let (kind, label) = checked(method)?;
    let rows = conn.execute(
        "UPDATE purchase_methods SET kind = ?1, payload = ?2, label = ?3 WHERE id = ?4",
        rusqlite::params![kind.tag().as_str(), encode_payload(kind)?, label, id.0],
    )?;
    if rows == 0 {
        return Err(StoreError::NotFound(Entity::PurchaseMethod));
    }
    Ok(())
}

pub fn delete_method(conn: &Connection, id: MethodId) -> Result<()> {
    let rows = conn.execute("DELETE FROM purchase_methods WHERE id = ?1", [id.0])?;
    if rows == 0 {
        return Err(StoreError::NotFound(Entity::PurchaseMethod));
    }
    Ok(())
}

pub fn list_methods(conn: &Connection, product: ProductId) -> Result<Vec<PurchaseMethod>> {
    let sql = format!(
        "SELECT {} FROM purchase_methods WHERE product_id = ?1 ORDER BY sort, id",
        METHOD_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([product.0], MethodRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(PurchaseMethod::try_from).collect()
}

pub fn get_method(conn: &Connection, id: MethodId) -> Result<PurchaseMethod> {
    let sql = format!("SELECT {} FROM purchase_methods WHERE id = ?1", METHOD_COLUMNS);
    let row = conn
        .query_row(&sql, [id.0], MethodRow::from_row)
        .optional()?
        .ok_or(StoreError::NotFound(Entity::PurchaseMethod))?;
    PurchaseMethod::try_from(row)
}

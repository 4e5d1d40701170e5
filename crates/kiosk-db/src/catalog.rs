use kiosk_types::models::{
    Category, CategoryId, Entity, NewProduct, Product, ProductId, ProductUpdate, Subcategory,
    SubcategoryId,
};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{Result, StoreError};
use crate::models::{PRODUCT_COLUMNS, ProductRow};
use crate::Database;

impl Database {
    // -- Categories --

    pub fn add_category(&self, title: &str) -> Result<CategoryId> {
        let id = self.with_tx(|conn| insert_category(conn, title))?;
        info!("Category {} created", id);
        Ok(id)
    }

    pub fn rename_category(&self, id: CategoryId, title: &str) -> Result<()> {
        self.with_tx(|conn| rename_category(conn, id, title))
    }

    /// Removes the category with every subcategory, product and purchase
    /// method under it.
    pub fn delete_category(&self, id: CategoryId) -> Result<()> {
        self.with_tx(|conn| delete_category(conn, id))?;
        info!("Category {} deleted (cascade)", id);
        Ok(())
    }

    pub fn list_categories(&self) -> Result<Vec<Category>> {
        self.with_conn(list_categories)
    }

    pub fn get_category(&self, id: CategoryId) -> Result<Category> {
        self.with_conn(|conn| get_category(conn, id))
    }

    // -- Subcategories --

    pub fn add_subcategory(&self, category: CategoryId, title: &str) -> Result<SubcategoryId> {
        let id = self.with_tx(|conn| insert_subcategory(conn, category, title))?;
        info!("Subcategory {} created in category {}", id, category);
        Ok(id)
    }

    pub fn rename_subcategory(&self, id: SubcategoryId, title: &str) -> Result<()> {
        self.with_tx(|conn| rename_subcategory(conn, id, title))
    }

    pub fn delete_subcategory(&self, id: SubcategoryId) -> Result<()> {
        self.with_tx(|conn| delete_subcategory(conn, id))?;
        info!("Subcategory {} deleted (cascade)", id);
        Ok(())
    }

    pub fn list_subcategories(&self, category: CategoryId) -> Result<Vec<Subcategory>> {
        self.with_conn(|conn| list_subcategories(conn, category))
    }

    pub fn get_subcategory(&self, id: SubcategoryId) -> Result<Subcategory> {
        self.with_conn(|conn| get_subcategory(conn, id))
    }

    // -- Products --

    pub fn add_product(&self, product: &NewProduct) -> Result<ProductId> {
        let id = self.with_tx(|conn| insert_product(conn, product))?;
        info!("Product {} created in subcategory {}", id, product.subcategory_id);
        Ok(id)
    }

    pub fn update_product(&self, id: ProductId, update: &ProductUpdate) -> Result<()> {
        self.with_tx(|conn| update_product(conn, id, update))
    }

    /// Flips the active flag and returns the new value.
    pub fn toggle_product(&self, id: ProductId) -> Result<bool> {
        let active = self.with_tx(|conn| toggle_product(conn, id))?;
        info!("Product {} is now {}", id, if active { "active" } else { "inactive" });
        Ok(active)
    }

    pub fn delete_product(&self, id: ProductId) -> Result<()> {
        self.with_tx(|conn| delete_product(conn, id))?;
        info!("Product {} deleted (cascade)", id);
        Ok(())
    }

    pub fn list_products(&self, sub: SubcategoryId, include_inactive: bool) -> Result<Vec<Product>> {
        self.with_conn(|conn| list_products(conn, sub, include_inactive))
    }

    pub fn get_product(&self, id: ProductId) -> Result<Product> {
        self.with_conn(|conn| get_product(conn, id))
    }
}

fn clean_title(title: &str) -> Result<&str> {
    let title = title.trim();
    if title.is_empty() {
        return Err(StoreError::InvalidInput("title must not be empty"));
    }
    Ok(title)
}

fn exists(conn: &Connection, table: &str, id: i64) -> Result<bool> {
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table);
    Ok(conn.query_row(&sql, [id], |row| row.get(0))?)
}

fn changed(rows: usize, entity: Entity) -> Result<()> {
    if rows == 0 {
        return Err(StoreError::NotFound(entity));
    }
    Ok(())
}

// -- Category queries --

pub fn insert_category(conn: &Connection, title: &str) -> Result<CategoryId> {
    let title = clean_title(title)?;
    conn.execute("INSERT INTO categories (title) VALUES (?1)", [title])?;
    Ok(CategoryId(conn.last_insert_rowid()))
}

pub fn rename_category(conn: &Connection, id: CategoryId, title: &str) -> Result<()> {
    let title = clean_title(title)?;
    let rows = conn.execute(
        "UPDATE categories SET title = ?1 WHERE id = ?2",
        rusqlite::params![title, id.0],
    )?;
    changed(rows, Entity::Category)
}

pub fn delete_category(conn: &Connection, id: CategoryId) -> Result<()> {
    let rows = conn.execute("DELETE FROM categories WHERE id = ?1", [id.0])?;
    changed(rows, Entity::Category)
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare("SELECT id, title, sort FROM categories ORDER BY sort, id")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(Category {
                id: CategoryId(row.get(0)?),
                title: row.get(1)?,
                sort: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get_category(conn: &Connection, id: CategoryId) -> Result<Category> {
    conn.query_row(
        "SELECT id, title, sort FROM categories WHERE id = ?1",
        [id.0],
        |row| {
            Ok(Category {
                id: CategoryId(row.get(0)?),
                title: row.get(1)?,
                sort: row.get(2)?,
            })
        },
    )
    .optional()?
    .ok_or(StoreError::NotFound(Entity::Category))
}

// -- Subcategory queries --

fn subcategory_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Subcategory> {
    Ok(Subcategory {
        id: SubcategoryId(row.get(0)?),
        category_id: CategoryId(row.get(1)?),
        title: row.get(2)?,
        sort: row.get(3)?,
    })
}

pub fn insert_subcategory(
    conn: &Connection,
    category: CategoryId,
    title: &str,
) -> Result<SubcategoryId> {
    let title = clean_title(title)?;
    if !exists(conn, "categories", category.0)? {
        return Err(StoreError::ReferentialViolation(Entity::Category));
    }
    conn.execute(
        "INSERT INTO subcategories (category_id, title) VALUES (?1, ?2)",
        rusqlite::params![category.0, title],
    )?;
    Ok(SubcategoryId(conn.last_insert_rowid()))
}

pub fn rename_subcategory(conn: &Connection, id: SubcategoryId, title: &str) -> Result<()> {
    let title = clean_title(title)?;
    let rows = conn.execute(
        "UPDATE subcategories SET title = ?1 WHERE id = ?2",
        rusqlite::params![title, id.0],
    )?;
    changed(rows, Entity::Subcategory)
}

pub fn delete_subcategory(conn: &Connection, id: SubcategoryId) -> Result<()> {
    let rows = conn.execute("DELETE FROM subcategories WHERE id = ?1", [id.0])?;
    changed(rows, Entity::Subcategory)
}

pub fn list_subcategories(conn: &Connection, category: CategoryId) -> Result<Vec<Subcategory>> {
    let mut stmt = conn.prepare(
        "SELECT id, category_id, title, sort FROM subcategories
         WHERE category_id = ?1 ORDER BY sort, id",
    )?;
    let rows = stmt
        .query_map([category.0], subcategory_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn get_subcategory(conn: &Connection, id: SubcategoryId) -> Result<Subcategory> {
    conn.query_row(
        "SELECT id, category_id, title, sort FROM subcategories WHERE id = ?1",
        [id.0],
        subcategory_from_row,
    )
    .optional()?
    .ok_or(StoreError::NotFound(Entity::Subcategory))
}

// -- Product queries --

pub fn insert_product(conn: &Connection, product: &NewProduct) -> Result<ProductId> {
    let title = clean_title(&product.title)?;
    if !exists(conn, "subcategories", product.subcategory_id.0)? {
        return Err(StoreError::ReferentialViolation(Entity::Subcategory));
    }
    let (media_kind, media_ref) = match &product.media {
        Some(media) => (Some(media.kind.as_str()), Some(media.token.as_str())),
        None => (None, None),
    };
    conn.execute(
        "INSERT INTO products (subcategory_id, title, price, description, media_kind, media_ref)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            product.subcategory_id.0,
            title,
            product.price.trim(),
            product.description.trim(),
            media_kind,
            media_ref,
        ],
    )?;
    Ok(ProductId(conn.last_insert_rowid()))
}

pub fn update_product(conn: &Connection, id: ProductId, update: &ProductUpdate) -> Result<()> {
    let rows = match update {
        ProductUpdate::Title(title) => conn.execute(
            "UPDATE products SET title = ?1 WHERE id = ?2",
            rusqlite::params![clean_title(title)?, id.0],
        )?,
        ProductUpdate::Price(price) => conn.execute(
            "UPDATE products SET price = ?1 WHERE id = ?2",
            rusqlite::params![price.trim(), id.0],
        )?,
        ProductUpdate::Description(description) => conn.execute(
            "UPDATE products SET description = ?1 WHERE id = ?2",
            rusqlite::params![description.trim(), id.0],
        )?,
        ProductUpdate::Media(media) => {
            let (kind, token) = match media {
                Some(media) => (Some(media.kind.as_str()), Some(media.token.as_str())),
                None => (None, None),
            };
            conn.execute(
                "UPDATE products SET media_kind = ?1, media_ref = ?2 WHERE id = ?3",
                rusqlite::params![kind, token, id.0],
            )?
        }
    };
    changed(rows, Entity::Product)
}

pub fn toggle_product(conn: &Connection, id: ProductId) -> Result<bool> {
    conn.query_row(
        "UPDATE products SET is_active = NOT is_active WHERE id = ?1 RETURNING is_active",
        [id.0],
        |row| row.get(0),
    )
    .optional()?
    .ok_or(StoreError::NotFound(Entity::Product))
}

pub fn delete_product(conn: &Connection, id: ProductId) -> Result<()> {
    let rows = conn.execute("DELETE FROM products WHERE id = ?1", [id.0])?;
    changed(rows, Entity::Product)
}

/// Products of a subcategory in display order. A missing subcategory simply
/// has no products.
pub fn list_products(
    conn: &Connection,
    sub: SubcategoryId,
    include_inactive: bool,
) -> Result<Vec<Product>> {
    let sql = format!(
        "SELECT {} FROM products WHERE subcategory_id = ?1 {} ORDER BY sort, id",
        PRODUCT_COLUMNS,
        if include_inactive { "" } else { "AND is_active = 1" }
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([sub.0], ProductRow::from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(Product::try_from).collect()
}

pub fn get_product(conn: &Connection, id: ProductId) -> Result<Product> {
    let sql = format!("SELECT {} FROM products WHERE id = ?1", PRODUCT_COLUMNS);
    let row = conn
        .query_row(&sql, [id.0], ProductRow::from_row)
        .optional()?
        .ok_or(StoreError::NotFound(Entity::Product))?;
    Product::try_from(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_types::models::{MediaKind, MediaRef, NewMethod, PurchaseKind, UserId};

    fn db() -> Database {
        Database::open_in_memory(UserId(1)).unwrap()
    }

    fn new_product(sub: SubcategoryId, title: &str) -> NewProduct {
        NewProduct {
            subcategory_id: sub,
            title: title.into(),
            price: String::new(),
            description: String::new(),
            media: None,
        }
    }

    #[test]
    fn empty_titles_are_rejected() {
        let db = db();
        assert!(matches!(db.add_category("   "), Err(StoreError::InvalidInput(_))));

        let cat = db.add_category("Drinks").unwrap();
        assert!(matches!(db.rename_category(cat, ""), Err(StoreError::InvalidInput(_))));
        assert_eq!(db.get_category(cat).unwrap().title, "Drinks");
    }

    #[test]
    fn titles_are_trimmed() {
        let db = db();
        let cat = db.add_category("  Drinks ").unwrap();
        assert_eq!(db.get_category(cat).unwrap().title, "Drinks");
    }

    #[test]
    fn orphan_inserts_are_rejected() {
        let db = db();
        assert!(matches!(
            db.add_subcategory(CategoryId(99), "Soda"),
            Err(StoreError::ReferentialViolation(Entity::Category))
        ));
        assert!(matches!(
            db.add_product(&new_product(SubcategoryId(99), "Cola")),
            Err(StoreError::ReferentialViolation(Entity::Subcategory))
        ));
    }

    #[test]
    fn missing_ids_are_not_found() {
        let db = db();
        assert!(matches!(
            db.rename_subcategory(SubcategoryId(5), "x"),
            Err(StoreError::NotFound(Entity::Subcategory))
        ));
        assert!(matches!(
            db.delete_category(CategoryId(5)),
            Err(StoreError::NotFound(Entity::Category))
        ));
        assert!(matches!(
            db.toggle_product(ProductId(5)),
            Err(StoreError::NotFound(Entity::Product))
        ));
        assert!(matches!(db.get_product(ProductId(5)), Err(StoreError::NotFound(Entity::Product))));
    }

    #[test]
    fn category_delete_cascades_to_every_descendant() {
        let db = db();
        let cat = db.add_category("Drinks").unwrap();
        let soda = db.add_subcategory(cat, "Soda").unwrap();
        let juice = db.add_subcategory(cat, "Juice").unwrap();
        let cola = db.add_product(&new_product(soda, "Cola")).unwrap();
        db.add_product(&new_product(soda, "Lemonade")).unwrap();
        db.add_product(&new_product(juice, "Orange")).unwrap();
        db.add_method(
            cola,
            &NewMethod {
                kind: PurchaseKind::link("https://example.com/buy").unwrap(),
                label: "Buy".into(),
            },
        )
        .unwrap();

        db.delete_category(cat).unwrap();

        assert!(db.list_categories().unwrap().is_empty());
        assert!(db.list_subcategories(cat).unwrap().is_empty());
        assert!(db.list_products(soda, true).unwrap().is_empty());
        assert!(db.list_products(juice, true).unwrap().is_empty());
        assert!(db.list_methods(cola).unwrap().is_empty());
        assert!(matches!(db.get_product(cola), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn listing_is_stable_and_ordered_by_sort_then_id() {
        let db = db();
        let a = db.add_category("B first").unwrap();
        let b = db.add_category("A second").unwrap();
        db.with_tx(|conn| {
            conn.execute("UPDATE categories SET sort = 1 WHERE id = ?1", [a.0])?;
            Ok(())
        })
        .unwrap();

        let first = db.list_categories().unwrap();
        let ids: Vec<_> = first.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![b, a]);
        assert_eq!(db.list_categories().unwrap(), first);
    }

    #[test]
    fn inactive_products_are_hidden_unless_requested() {
        let db = db();
        let cat = db.add_category("Drinks").unwrap();
        let soda = db.add_subcategory(cat, "Soda").unwrap();
        let cola = db.add_product(&new_product(soda, "Cola")).unwrap();

        assert!(!db.toggle_product(cola).unwrap());
        assert!(db.list_products(soda, false).unwrap().is_empty());

        let staff_view = db.list_products(soda, true).unwrap();
        assert_eq!(staff_view.len(), 1);
        assert!(!staff_view[0].active);

        assert!(db.toggle_product(cola).unwrap());
        assert_eq!(db.list_products(soda, false).unwrap().len(), 1);
    }

    #[test]
    fn product_fields_update_independently() {
        let db = db();
        let cat = db.add_category("Drinks").unwrap();
        let soda = db.add_subcategory(cat, "Soda").unwrap();
        let cola = db.add_product(&new_product(soda, "Cola")).unwrap();

        db.update_product(cola, &ProductUpdate::Price("2".into())).unwrap();
        let photo = MediaRef {
            kind: MediaKind::Photo,
            token: "AgAD-photo".into(),
        };
        db.update_product(cola, &ProductUpdate::Media(Some(photo.clone()))).unwrap();

        let product = db.get_product(cola).unwrap();
        assert_eq!(product.title, "Cola");
        assert_eq!(product.price, "2");
        assert_eq!(product.media, Some(photo));

        db.update_product(cola, &ProductUpdate::Media(None)).unwrap();
        assert_eq!(db.get_product(cola).unwrap().media, None);

        assert!(matches!(
            db.update_product(cola, &ProductUpdate::Title(" ".into())),
            Err(StoreError::InvalidInput(_))
        ));
    }
}

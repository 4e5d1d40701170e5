use kiosk_types::models::SettingKey;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::Result;
use crate::Database;

impl Database {
    /// Stored value, or the key's default when the row is absent.
    pub fn setting(&self, key: SettingKey) -> Result<String> {
        self.with_conn(|conn| get_setting(conn, key))
    }

    pub fn set_setting(&self, key: SettingKey, value: &str) -> Result<()> {
        self.with_tx(|conn| set_setting(conn, key, value))?;
        info!("Setting '{}' updated", key.as_str());
        Ok(())
    }
}

/// Inserts defaults for absent keys only. Returns how many were added.
pub fn seed_defaults(conn: &Connection) -> Result<usize> {
    let mut added = 0;
    for key in SettingKey::ALL {
        added += conn.execute(
            "INSERT OR IGNORE INTO settings (key, value) VALUES (?1, ?2)",
            [key.as_str(), key.default_value()],
        )?;
    }
    Ok(added)
}

pub fn get_setting(conn: &Connection, key: SettingKey) -> Result<String> {
    let stored: Option<String> = conn
        .query_row("SELECT value FROM settings WHERE key = ?1", [key.as_str()], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(stored.unwrap_or_else(|| key.default_value().to_string()))
}

pub fn set_setting(conn: &Connection, key: SettingKey, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [key.as_str(), value],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiosk_types::models::UserId;

    #[test]
    fn defaults_are_seeded() {
        let db = Database::open_in_memory(UserId(1)).unwrap();
        for key in SettingKey::ALL {
            assert_eq!(db.setting(key).unwrap(), key.default_value());
        }
    }

    #[test]
    fn init_does_not_overwrite_custom_values() {
        let db = Database::open_in_memory(UserId(1)).unwrap();
        db.set_setting(SettingKey::SupportText, "Write to @help").unwrap();
        db.init_stores().unwrap();
        assert_eq!(db.setting(SettingKey::SupportText).unwrap(), "Write to @help");
    }

    #[test]
    fn empty_value_is_kept_as_empty() {
        let db = Database::open_in_memory(UserId(1)).unwrap();
        db.set_setting(SettingKey::CatalogPrompt, "").unwrap();
        assert_eq!(db.setting(SettingKey::CatalogPrompt).unwrap(), "");
    }

    #[test]
    fn missing_row_falls_back_to_default() {
        let db = Database::open_in_memory(UserId(1)).unwrap();
        db.with_tx(|conn| {
            conn.execute("DELETE FROM settings WHERE key = 'shop_greeting'", [])?;
            Ok(())
        })
        .unwrap();
        assert_eq!(
            db.setting(SettingKey::ShopGreeting).unwrap(),
            SettingKey::ShopGreeting.default_value()
        );
        assert_eq!(db.with_tx(seed_defaults).unwrap(), 1);
    }
}

pub mod catalog;
pub mod error;
pub mod migrations;
pub mod models;
pub mod purchase;
pub mod roles;
pub mod settings;

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use kiosk_types::models::UserId;
use rusqlite::{OpenFlags, TransactionBehavior};
use tracing::info;
use uuid::Uuid;

pub use error::{Result, StoreError};
pub use rusqlite::Connection;

const READER_POOL_SIZE: usize = 4;

/// SQLite-backed store for the catalog, purchase methods, staff roles and
/// settings.
///
/// All writes go through a single writer connection inside an immediate
/// transaction. Reads are served round-robin from read-only connections; in
/// WAL mode each read sees a committed snapshot, never a half-applied delete.
pub struct Database {
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    reader_idx: AtomicUsize,
    owner: UserId,
}

impl Database {
    /// Opens (or creates) the database file, migrates it, and runs
    /// [`Database::init_stores`].
    pub fn open(path: &Path, owner: UserId) -> Result<Self> {
        let writer = Connection::open(path)?;

        // WAL mode for concurrent reads
        writer.pragma_update(None, "journal_mode", "WAL")?;
        writer.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&writer)?;

        let mut readers = Vec::with_capacity(READER_POOL_SIZE);
        for _ in 0..READER_POOL_SIZE {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            readers.push(Mutex::new(conn));
        }

        let db = Self {
            writer: Mutex::new(writer),
            readers,
            reader_idx: AtomicUsize::new(0),
            owner,
        };
        db.init_stores()?;

        info!(
            "Database opened at {} (1 writer + {} readers)",
            path.display(),
            READER_POOL_SIZE
        );
        Ok(db)
    }

    /// Single-connection in-memory database. Reads share the writer.
    pub fn open_in_memory(owner: UserId) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        let db = Self {
            writer: Mutex::new(conn),
            readers: Vec::new(),
            reader_idx: AtomicUsize::new(0),
            owner,
        };
        db.init_stores()?;
        Ok(db)
    }

    /// The fixed owner identity this store was opened with.
    pub fn owner(&self) -> UserId {
        self.owner
    }

    /// Idempotent bootstrap: asserts the owner's role and inserts any missing
    /// default settings. Customized settings are left untouched.
    pub fn init_stores(&self) -> Result<()> {
        let owner = self.owner;
        let seeded = self.with_tx(|conn| {
            roles::seed_owner(conn, owner)?;
            settings::seed_defaults(conn)
        })?;
        info!("Stores initialized (owner {}, {} default settings added)", owner, seeded);
        Ok(())
    }

    /// Run a read against a pooled read-only connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        if self.readers.is_empty() {
            let conn = self
                .writer
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            return f(&conn);
        }

        let idx = self.reader_idx.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let conn = self.readers[idx]
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        f(&conn)
    }

    /// Run several reads against one consistent snapshot.
    pub fn with_snapshot<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let out = f(&tx)?;
            tx.finish()?;
            Ok(out)
        })
    }

    /// Run `f` inside one write transaction. Any error rolls everything back.
    pub fn with_tx<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self
            .writer
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Commit the result of a conversation form. The session key is recorded
    /// in the same transaction as the change, so a session commits at most
    /// once; a repeat fails with [`StoreError::AlreadyCommitted`] and writes
    /// nothing.
    pub fn commit_form<F, T>(&self, session: Uuid, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        self.with_tx(|conn| {
            let claimed = conn.execute(
                "INSERT OR IGNORE INTO form_commits (session_id) VALUES (?1)",
                [session.to_string()],
            )?;
            if claimed == 0 {
                return Err(StoreError::AlreadyCommitted(session));
            }
            f(conn)
        })
    }
}

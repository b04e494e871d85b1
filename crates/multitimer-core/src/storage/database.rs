//! SQLite-backed key-value persistence.
//!
//! Application state lives as JSON documents under fixed keys:
//! - `timers`: array of timer snapshots, in creation order
//! - `projectData`: the project ledger
//! - `weeklyGoals`: weekly hour targets per project
//!
//! Loading is fail-soft. A document that cannot be parsed is logged and
//! treated as absent so a damaged store never prevents startup.

use std::path::Path;

use rusqlite::{params, Connection};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use super::data_dir;
use crate::error::{DatabaseError, Result};
use crate::ledger::{ProjectLedger, WeeklyGoals};
use crate::timer::TimerSnapshot;

pub const TIMERS_KEY: &str = "timers";
pub const PROJECT_DATA_KEY: &str = "projectData";
pub const WEEKLY_GOALS_KEY: &str = "weeklyGoals";

/// SQLite database holding the key-value store.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/multitimer/multitimer.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self> {
        Self::open_at(&data_dir()?.join("multitimer.db"))
    }

    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, rusqlite::Error> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.kv_set(key, &json)?;
        debug!(key, bytes = json.len(), "stored");
        Ok(())
    }

    fn get_json_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> Result<T> {
        let Some(raw) = self.kv_get(key)? else {
            return Ok(T::default());
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!(key, "ignoring unreadable stored value: {e}");
                Ok(T::default())
            }
        }
    }

    /// Stored timer snapshots in saved order.
    ///
    /// Entries that fail to decode are skipped individually.
    pub fn load_timers(&self) -> Result<Vec<TimerSnapshot>> {
        let entries: Vec<serde_json::Value> = self.get_json_or_default(TIMERS_KEY)?;
        let mut snapshots = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<TimerSnapshot>(entry) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) => warn!(index, "skipping unreadable timer: {e}"),
            }
        }
        Ok(snapshots)
    }

    pub fn save_timers(&self, snapshots: &[TimerSnapshot]) -> Result<()> {
        self.put_json(TIMERS_KEY, snapshots)
    }

    pub fn load_ledger(&self) -> Result<ProjectLedger> {
        self.get_json_or_default(PROJECT_DATA_KEY)
    }

    pub fn save_ledger(&self, ledger: &ProjectLedger) -> Result<()> {
        self.put_json(PROJECT_DATA_KEY, ledger)
    }

    pub fn load_goals(&self) -> Result<WeeklyGoals> {
        self.get_json_or_default(WEEKLY_GOALS_KEY)
    }

    pub fn save_goals(&self, goals: &WeeklyGoals) -> Result<()> {
        self.put_json(WEEKLY_GOALS_KEY, goals)
    }
}

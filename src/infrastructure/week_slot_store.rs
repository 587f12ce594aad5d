use crate::infrastructure::error::InfraError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

pub fn initialize_database(path: &Path) -> Result<(), InfraError> {
    let connection = Connection::open(path)?;
    connection.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Namespaced key/value slot holding one serialized week per key.
pub trait WeekSlotStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, InfraError>;
    fn save(&self, key: &str, payload: &str) -> Result<(), InfraError>;
    fn remove(&self, key: &str) -> Result<(), InfraError>;
}

#[derive(Debug, Clone)]
pub struct SqliteWeekSlotStore {
    db_path: PathBuf,
}

impl SqliteWeekSlotStore {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        Connection::open(&self.db_path).map_err(InfraError::from)
    }
}

impl WeekSlotStore for SqliteWeekSlotStore {
    fn load(&self, key: &str) -> Result<Option<String>, InfraError> {
        let connection = self.connect()?;
        let payload: Option<String> = connection
            .query_row(
                "SELECT payload FROM week_slots WHERE slot_key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn save(&self, key: &str, payload: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute(
            "INSERT INTO week_slots (slot_key, payload, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(slot_key) DO UPDATE SET
               payload = excluded.payload,
               updated_at = excluded.updated_at",
            params![key, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        let connection = self.connect()?;
        connection.execute("DELETE FROM week_slots WHERE slot_key = ?1", params![key])?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryWeekSlotStore {
    slots: Mutex<HashMap<String, String>>,
}

impl InMemoryWeekSlotStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, InfraError> {
        self.slots
            .lock()
            .map_err(|error| InfraError::Store(format!("week slot lock poisoned: {error}")))
    }
}

impl WeekSlotStore for InMemoryWeekSlotStore {
    fn load(&self, key: &str) -> Result<Option<String>, InfraError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn save(&self, key: &str, payload: &str) -> Result<(), InfraError> {
        self.lock()?.insert(key.to_string(), payload.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), InfraError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

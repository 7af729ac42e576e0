use std::sync::{Arc, OnceLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::engine::Store;
use super::error::StorageError;

type Table = DashMap<String, Vec<u8>>;

/// In-memory [`Store`] backed by nested `DashMap`s.
#[derive(Default)]
pub struct MemoryStore {
    tables: DashMap<String, Arc<Table>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared process-wide store, created on first use.
    #[must_use]
    pub fn global() -> Arc<Self> {
        static GLOBAL: OnceLock<Arc<MemoryStore>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(Self::new())))
    }

    /// Drops every table.
    pub fn clear(&self) {
        self.tables.clear();
    }

    fn table(&self, name: &str) -> Result<Arc<Table>, StorageError> {
        self.tables
            .get(name)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }
}

fn not_found(table: &str, key: &str) -> StorageError {
    StorageError::RecordNotFound {
        table: table.to_string(),
        key: key.to_string(),
    }
}

fn insert_vacant(rows: &Table, table: &str, key: &str, row: Vec<u8>) -> Result<(), StorageError> {
    match rows.entry(key.to_string()) {
        Entry::Occupied(_) => Err(StorageError::PrimaryKeyConflict {
            table: table.to_string(),
            key: key.to_string(),
        }),
        Entry::Vacant(vacant) => {
            vacant.insert(row);
            Ok(())
        }
    }
}

impl Store for MemoryStore {
    fn create_table_if_not_exists(&self, table: &str) {
        self.tables.entry(table.to_string()).or_default();
    }

    fn get(&self, table: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.table(table)?
            .get(key)
            .map(|row| row.value().clone())
            .ok_or_else(|| not_found(table, key))
    }

    fn insert(&self, table: &str, key: &str, row: Vec<u8>) -> Result<(), StorageError> {
        insert_vacant(&*self.table(table)?, table, key, row)
    }

    fn update(&self, table: &str, key: &str, row: Vec<u8>) -> Result<Vec<u8>, StorageError> {
        let rows = self.table(table)?;
        let mut existing = rows.get_mut(key).ok_or_else(|| not_found(table, key))?;
        let previous = std::mem::replace(existing.value_mut(), row);
        Ok(previous)
    }

    fn delete(&self, table: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        self.table(table)?
            .remove(key)
            .map(|(_, row)| row)
            .ok_or_else(|| not_found(table, key))
    }

    fn scan(&self, table: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError> {
        Ok(self
            .table(table)?
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }
}

//! Key/value store interface and typed row access.
//!
//! [`Store`] works on encoded rows so it stays object-safe; [`StoreExt`]
//! layers typed access on top of any store. Rows are `MessagePack`-encoded,
//! which makes every read an independent copy of the stored value.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::error::StorageError;

/// Encodes a row with named fields.
///
/// # Errors
///
/// Returns [`StorageError::Codec`] if serialization fails.
pub fn encode<T: Serialize + ?Sized>(row: &T) -> Result<Vec<u8>, StorageError> {
    rmp_serde::to_vec_named(row).map_err(|e| StorageError::Codec(e.to_string()))
}

/// # Errors
///
/// Returns [`StorageError::Codec`] if the bytes are not a valid `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    rmp_serde::from_slice(bytes).map_err(|e| StorageError::Codec(e.to_string()))
}

/// Tables of encoded rows keyed by primary key.
///
/// Each call is atomic for its one key; nothing isolates a sequence of
/// calls from concurrent writers.
pub trait Store: Send + Sync {
    /// Creates an empty table unless one with that name exists.
    fn create_table_if_not_exists(&self, table: &str);

    /// # Errors
    ///
    /// [`StorageError::TableNotFound`] or [`StorageError::RecordNotFound`].
    fn get(&self, table: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// # Errors
    ///
    /// [`StorageError::TableNotFound`] or [`StorageError::PrimaryKeyConflict`].
    fn insert(&self, table: &str, key: &str, row: Vec<u8>) -> Result<(), StorageError>;

    /// Replaces an existing row and returns the previous one.
    ///
    /// # Errors
    ///
    /// [`StorageError::TableNotFound`] or [`StorageError::RecordNotFound`].
    fn update(&self, table: &str, key: &str, row: Vec<u8>) -> Result<Vec<u8>, StorageError>;

    /// Removes a row and returns it.
    ///
    /// # Errors
    ///
    /// [`StorageError::TableNotFound`] or [`StorageError::RecordNotFound`].
    fn delete(&self, table: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Snapshot of every row, in no particular order.
    ///
    /// # Errors
    ///
    /// [`StorageError::TableNotFound`].
    fn scan(&self, table: &str) -> Result<Vec<(String, Vec<u8>)>, StorageError>;
}

/// Predicate applied to each row of a full-table scan.
pub trait TableVisitor<R>: Send + Sync {
    fn visit(&self, key: &str, row: &R) -> bool;
}

impl<R, F> TableVisitor<R> for F
where
    F: Fn(&str, &R) -> bool + Send + Sync,
{
    fn visit(&self, key: &str, row: &R) -> bool {
        (self)(key, row)
    }
}

/// Typed access for every [`Store`].
pub trait StoreExt: Store {
    /// # Errors
    ///
    /// As [`Store::get`], plus [`StorageError::Codec`].
    fn get_row<T: DeserializeOwned>(&self, table: &str, key: &str) -> Result<T, StorageError> {
        decode(&self.get(table, key)?)
    }

    /// Like [`StoreExt::get_row`] but maps a missing record to `None`.
    ///
    /// # Errors
    ///
    /// [`StorageError::TableNotFound`] or [`StorageError::Codec`].
    fn find_row<T: DeserializeOwned>(
        &self,
        table: &str,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        match self.get(table, key) {
            Ok(bytes) => decode(&bytes).map(Some),
            Err(StorageError::RecordNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// # Errors
    ///
    /// As [`Store::insert`], plus [`StorageError::Codec`].
    fn insert_row<T: Serialize>(
        &self,
        table: &str,
        key: &str,
        row: &T,
    ) -> Result<(), StorageError> {
        self.insert(table, key, encode(row)?)
    }

    /// Decodes every row of `table` and keeps those `visitor` accepts.
    ///
    /// # Errors
    ///
    /// [`StorageError::TableNotFound`] or [`StorageError::Codec`].
    fn query_by_visitor<R, V>(&self, table: &str, visitor: &V) -> Result<Vec<R>, StorageError>
    where
        R: DeserializeOwned,
        V: TableVisitor<R> + ?Sized,
    {
        let mut matched = Vec::new();
        for (key, bytes) in self.scan(table)? {
            let row: R = decode(&bytes)?;
            if visitor.visit(&key, &row) {
                matched.push(row);
            }
        }
        Ok(matched)
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

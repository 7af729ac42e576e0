//! Command-log transactions with reverse-order rollback.
//!
//! Commands are queued first and only run on [`Transaction::commit`]. Each
//! successfully applied command leaves behind its inverse; when a later
//! command fails, the inverses run newest first, so a failed commit leaves
//! no partial effects behind.

use serde::Serialize;
use tracing::{debug, warn};

use super::engine::{encode, Store};
use super::error::StorageError;

/// A queued mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Insert {
        table: String,
        key: String,
        row: Vec<u8>,
    },
    Update {
        table: String,
        key: String,
        row: Vec<u8>,
    },
    Delete {
        table: String,
        key: String,
    },
}

/// Inverse of an applied command, holding the pre-image it needs.
enum Undo {
    Remove { table: String, key: String },
    Restore { table: String, key: String, row: Vec<u8> },
    Reinsert { table: String, key: String, row: Vec<u8> },
}

impl Command {
    fn apply(self, store: &dyn Store) -> Result<Undo, StorageError> {
        match self {
            Self::Insert { table, key, row } => {
                store.insert(&table, &key, row)?;
                Ok(Undo::Remove { table, key })
            }
            Self::Update { table, key, row } => {
                let previous = store.update(&table, &key, row)?;
                Ok(Undo::Restore {
                    table,
                    key,
                    row: previous,
                })
            }
            Self::Delete { table, key } => {
                let previous = store.delete(&table, &key)?;
                Ok(Undo::Reinsert {
                    table,
                    key,
                    row: previous,
                })
            }
        }
    }
}

impl Undo {
    fn apply(self, store: &dyn Store) -> Result<(), StorageError> {
        match self {
            Self::Remove { table, key } => store.delete(&table, &key).map(|_| ()),
            Self::Restore { table, key, row } => store.update(&table, &key, row).map(|_| ()),
            Self::Reinsert { table, key, row } => store.insert(&table, &key, row),
        }
    }
}

/// An ordered batch of mutations applied all-or-nothing.
///
/// Serializes its own commands only; nothing stops another writer from
/// touching the same rows between two commands of one commit.
pub struct Transaction<'a> {
    store: &'a dyn Store,
    name: String,
    commands: Vec<Command>,
}

impl<'a> Transaction<'a> {
    #[must_use]
    pub fn begin(store: &'a dyn Store, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
            commands: Vec::new(),
        }
    }

    /// Queues an insert of `row` at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Codec`] if `row` cannot be encoded.
    pub fn insert<T: Serialize>(
        &mut self,
        table: &str,
        key: &str,
        row: &T,
    ) -> Result<&mut Self, StorageError> {
        self.commands.push(Command::Insert {
            table: table.to_string(),
            key: key.to_string(),
            row: encode(row)?,
        });
        Ok(self)
    }

    /// Queues a replacement of the existing row at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Codec`] if `row` cannot be encoded.
    pub fn update<T: Serialize>(
        &mut self,
        table: &str,
        key: &str,
        row: &T,
    ) -> Result<&mut Self, StorageError> {
        self.commands.push(Command::Update {
            table: table.to_string(),
            key: key.to_string(),
            row: encode(row)?,
        });
        Ok(self)
    }

    /// Queues a delete of the row at `key`.
    pub fn delete(&mut self, table: &str, key: &str) -> &mut Self {
        self.commands.push(Command::Delete {
            table: table.to_string(),
            key: key.to_string(),
        });
        self
    }

    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Runs the queued commands in order.
    ///
    /// # Errors
    ///
    /// Returns the first command's error after every previously applied
    /// command has been undone.
    pub fn commit(self) -> Result<(), StorageError> {
        let mut applied = Vec::with_capacity(self.commands.len());
        for command in self.commands {
            match command.apply(self.store) {
                Ok(undo) => applied.push(undo),
                Err(e) => {
                    debug!(
                        transaction = %self.name,
                        error = %e,
                        undo = applied.len(),
                        "rolling back"
                    );
                    for undo in applied.into_iter().rev() {
                        if let Err(undo_err) = undo.apply(self.store) {
                            warn!(
                                transaction = %self.name,
                                error = %undo_err,
                                "rollback step failed"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

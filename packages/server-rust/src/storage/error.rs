#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("table {0} does not exist")]
    TableNotFound(String),
    #[error("primary key {key} already exists in {table}")]
    PrimaryKeyConflict { table: String, key: String },
    #[error("no record {key} in {table}")]
    RecordNotFound { table: String, key: String },
    #[error("row codec failed: {0}")]
    Codec(String),
}

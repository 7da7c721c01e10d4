/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use intelwatch_storage::error::StorageError;
///
/// let err = StorageError::NotFound {
///     entity: "threat",
///     id: "42".to_string(),
/// };
/// assert!(err.to_string().contains("threat"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A required record was not found in the database.
    #[error("Storage: {entity} not found (id={id})")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness constraint was violated, e.g. a second active record for
    /// an already-claimed dedup key, or a duplicate username.
    #[error("Storage: {entity} conflicts with an existing row ({detail})")]
    Conflict { entity: &'static str, detail: String },

    /// A column held a value that does not parse into its domain type.
    #[error("Storage: invalid value in column '{column}': {value}")]
    InvalidColumn { column: &'static str, value: String },

    /// An underlying database error.
    #[error("Storage: database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// JSON serialization or deserialization failure (geolocation, tags and
    /// metadata are stored as JSON text columns).
    #[error("Storage: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Password hashing failure.
    #[error("Storage: bcrypt error: {0}")]
    Password(#[from] bcrypt::BcryptError),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    /// The pipeline does not declare any table to sync.
    #[error("`pipeline.tables` must contain at least one table")]
    NoTables,
    /// The same destination table is declared more than once.
    #[error("table `{0}` is declared more than once in `pipeline.tables`")]
    DuplicateTable(String),
    /// A field holds a value outside of its accepted range.
    #[error("invalid value for `{field}`: {constraint}")]
    InvalidFieldValue { field: String, constraint: String },
}

use config::LoadConfigError;
use config::shared::ValidationError;
use etl::error::EtlError;
use telemetry::tracing::TracingError;
use thiserror::Error;

pub type SyncerResult<T> = Result<T, SyncerError>;

/// Errors that stop the syncer.
#[derive(Debug, Error)]
pub enum SyncerError {
    #[error("failed to load the configuration: {0}")]
    Config(#[from] LoadConfigError),

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to initialize tracing: {0}")]
    Tracing(#[from] TracingError),

    #[error("failed to migrate the watermark table: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Etl(#[from] EtlError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

use secrecy::SecretString;
use serde::Deserialize;

use crate::shared::ValidationError;

/// Dataset used for staging tables when none is configured.
const DEFAULT_STAGING_DATASET_ID: &str = "staging_tables";

fn default_staging_dataset_id() -> String {
    DEFAULT_STAGING_DATASET_ID.to_string()
}

/// Configuration of the analytical warehouse receiving the merged rows.
///
/// This intentionally does not implement `Serialize` to avoid leaking the service account key.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationConfig {
    /// In-memory warehouse, useful for local runs and tests.
    Memory,
    /// Google BigQuery warehouse.
    BigQuery {
        /// Google Cloud project identifier.
        project_id: String,
        /// Dataset holding the destination tables.
        dataset_id: String,
        /// Dataset holding the per-table staging relations.
        #[serde(default = "default_staging_dataset_id")]
        staging_dataset_id: String,
        /// Service account key (JSON) used to authenticate with BigQuery.
        service_account_key: SecretString,
    },
}

impl DestinationConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let DestinationConfig::BigQuery {
            dataset_id,
            staging_dataset_id,
            ..
        } = self
            && dataset_id == staging_dataset_id
        {
            return Err(ValidationError::InvalidFieldValue {
                field: "destination.big_query.staging_dataset_id".to_string(),
                constraint: "must differ from `dataset_id`".to_string(),
            });
        }

        Ok(())
    }
}

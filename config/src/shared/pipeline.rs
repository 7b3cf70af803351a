use std::collections::HashSet;

use serde::Deserialize;

use crate::shared::{RetryConfig, ValidationError};

/// Tables synced when the configuration does not list any explicitly.
pub const DEFAULT_TABLES: &[&str] = &[
    "users",
    "user_addresses",
    "products",
    "product_categories",
    "product_pricings",
    "product_reviews",
    "events",
    "event_categories",
    "event_locations",
];

/// Static description of one destination table kept in sync.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TableConfig {
    /// Destination table name. It also selects the registered transform.
    pub name: String,
    /// Source schema containing the input tables.
    #[serde(default = "default_schema")]
    pub schema: String,
    /// Column used to match staged rows with destination rows.
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    /// Whether soft deleted rows (`deleted_at`) are picked up as changes.
    #[serde(default)]
    pub track_deletes: bool,
}

impl TableConfig {
    pub const DEFAULT_SCHEMA: &'static str = "public";

    pub const DEFAULT_PRIMARY_KEY: &'static str = "id";

    /// Creates a table config with the default schema, primary key and delete tracking.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: default_schema(),
            primary_key: default_primary_key(),
            track_deletes: false,
        }
    }
}

fn default_schema() -> String {
    TableConfig::DEFAULT_SCHEMA.to_string()
}

fn default_primary_key() -> String {
    TableConfig::DEFAULT_PRIMARY_KEY.to_string()
}

fn default_tables() -> Vec<TableConfig> {
    DEFAULT_TABLES.iter().map(|name| TableConfig::new(*name)).collect()
}

/// Settings for one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Tables synced on every run.
    #[serde(default = "default_tables")]
    pub tables: Vec<TableConfig>,
    /// Maximum number of table pipelines running at the same time.
    #[serde(default = "default_max_concurrent_tables")]
    pub max_concurrent_tables: u16,
    /// Upper bound on the rows a single extraction may return.
    #[serde(default = "default_max_extracted_rows")]
    pub max_extracted_rows: u64,
    /// Retry settings for source extraction.
    #[serde(default)]
    pub extract_retry: RetryConfig,
    /// Retry settings for staging writes.
    #[serde(default)]
    pub load_retry: RetryConfig,
}

impl PipelineConfig {
    pub const DEFAULT_MAX_CONCURRENT_TABLES: u16 = 4;

    pub const DEFAULT_MAX_EXTRACTED_ROWS: u64 = 1_000_000;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.tables.is_empty() {
            return Err(ValidationError::NoTables);
        }

        let mut seen = HashSet::new();
        for table in &self.tables {
            if !seen.insert(table.name.as_str()) {
                return Err(ValidationError::DuplicateTable(table.name.clone()));
            }
        }

        if self.max_concurrent_tables == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.max_concurrent_tables".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        if self.max_extracted_rows == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "pipeline.max_extracted_rows".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tables: default_tables(),
            max_concurrent_tables: default_max_concurrent_tables(),
            max_extracted_rows: default_max_extracted_rows(),
            extract_retry: RetryConfig::default(),
            load_retry: RetryConfig::default(),
        }
    }
}

const fn default_max_concurrent_tables() -> u16 {
    PipelineConfig::DEFAULT_MAX_CONCURRENT_TABLES
}

const fn default_max_extracted_rows() -> u64 {
    PipelineConfig::DEFAULT_MAX_EXTRACTED_ROWS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_synced_table() {
        let config: PipelineConfig = serde_json::from_str("{}").unwrap();

        assert_eq!(config.tables.len(), DEFAULT_TABLES.len());
        assert!(config.tables.iter().all(|t| t.primary_key == "id"));
        assert!(config.tables.iter().all(|t| t.schema == "public"));
        assert_eq!(config.extract_retry.max_retries, 3);
        assert_eq!(config.load_retry.delay_ms, 60_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn table_fields_can_be_overridden() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"tables": [{"name": "orders", "schema": "sales", "primary_key": "order_id", "track_deletes": true}]}"#,
        )
        .unwrap();

        assert_eq!(
            config.tables,
            vec![TableConfig {
                name: "orders".to_string(),
                schema: "sales".to_string(),
                primary_key: "order_id".to_string(),
                track_deletes: true,
            }]
        );
    }

    #[test]
    fn duplicate_tables_are_rejected() {
        let config = PipelineConfig {
            tables: vec![TableConfig::new("users"), TableConfig::new("users")],
            ..PipelineConfig::default()
        };

        assert_eq!(
            config.validate(),
            Err(ValidationError::DuplicateTable("users".to_string()))
        );
    }

    #[test]
    fn empty_table_list_is_rejected() {
        let config = PipelineConfig {
            tables: vec![],
            ..PipelineConfig::default()
        };

        assert_eq!(config.validate(), Err(ValidationError::NoTables));
    }

    #[test]
    fn zero_bounds_are_rejected() {
        let config = PipelineConfig {
            max_concurrent_tables: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue { .. })
        ));

        let config = PipelineConfig {
            max_extracted_rows: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue { .. })
        ));
    }
}

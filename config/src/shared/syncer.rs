use serde::Deserialize;

use crate::Config;
use crate::shared::{
    DestinationConfig, PgConnectionConfig, PipelineConfig, ValidationError, WatermarkConfig,
};

/// Interval at which the syncer repeats sync runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ScheduleConfig {
    /// Seconds between the start of two consecutive runs.
    pub interval_secs: u64,
}

impl ScheduleConfig {
    /// Hourly cadence of the production deployment.
    pub const HOURLY_SECS: u64 = 3600;
}

/// Top level configuration of the syncer binary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SyncerConfig {
    /// Operational Postgres database changes are extracted from.
    pub source: PgConnectionConfig,
    /// Warehouse receiving the merged rows.
    pub destination: DestinationConfig,
    #[serde(default)]
    pub watermark: WatermarkConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// When absent the syncer performs a single run and exits.
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
}

impl SyncerConfig {
    /// Validates every section, returning the first error found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.source.validate()?;
        self.destination.validate()?;
        self.watermark.validate()?;
        self.pipeline.validate()?;

        if let Some(schedule) = &self.schedule
            && schedule.interval_secs == 0
        {
            return Err(ValidationError::InvalidFieldValue {
                field: "schedule.interval_secs".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Config for SyncerConfig {
    const LIST_PARSE_KEYS: &'static [&'static str] = &[];
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> SyncerConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse(
            r#"{
                "source": {"host": "localhost", "name": "shop", "username": "etl", "password": null},
                "destination": "memory"
            }"#,
        );

        assert_eq!(config.watermark, WatermarkConfig::default());
        assert_eq!(config.pipeline, PipelineConfig::default());
        assert!(config.schedule.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn big_query_destination_is_parsed() {
        let config = parse(
            r#"{
                "source": {"host": "localhost", "name": "shop", "username": "etl", "password": null},
                "destination": {"big_query": {
                    "project_id": "analytics",
                    "dataset_id": "shop",
                    "service_account_key": "{}"
                }},
                "schedule": {"interval_secs": 3600}
            }"#,
        );

        match &config.destination {
            DestinationConfig::BigQuery {
                staging_dataset_id, ..
            } => assert_eq!(staging_dataset_id, "staging_tables"),
            other => panic!("unexpected destination {other:?}"),
        }
        assert_eq!(
            config.schedule,
            Some(ScheduleConfig {
                interval_secs: ScheduleConfig::HOURLY_SECS
            })
        );
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = parse(
            r#"{
                "source": {"host": "localhost", "name": "shop", "username": "etl", "password": null},
                "destination": "memory",
                "schedule": {"interval_secs": 0}
            }"#,
        );

        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue { .. })
        ));
    }

    #[test]
    fn oversized_lookback_is_rejected() {
        let config = parse(
            r#"{
                "source": {"host": "localhost", "name": "shop", "username": "etl", "password": null},
                "destination": "memory",
                "watermark": {"default_lookback_days": 4294967295}
            }"#,
        );

        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue { .. })
        ));
    }

    #[test]
    fn staging_dataset_must_differ_from_dataset() {
        let config = parse(
            r#"{
                "source": {"host": "localhost", "name": "shop", "username": "etl", "password": null},
                "destination": {"big_query": {
                    "project_id": "analytics",
                    "dataset_id": "shop",
                    "staging_dataset_id": "shop",
                    "service_account_key": "{}"
                }}
            }"#,
        );

        assert!(config.validate().is_err());
    }
}

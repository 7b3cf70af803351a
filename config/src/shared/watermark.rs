use serde::Deserialize;

use crate::shared::ValidationError;

/// Where the watermark is persisted between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkStoreConfig {
    /// Kept in process memory, every restart starts from the default lookback.
    #[default]
    Memory,
    /// Stored in the `etl.watermarks` table of the source database.
    Postgres,
}

/// Watermark settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WatermarkConfig {
    /// Name under which the watermark is stored.
    #[serde(default = "default_name")]
    pub name: String,
    /// How far back the first run looks when no watermark has been stored yet.
    #[serde(default = "default_lookback_days")]
    pub default_lookback_days: u32,
    #[serde(default)]
    pub store: WatermarkStoreConfig,
}

impl WatermarkConfig {
    pub const DEFAULT_NAME: &'static str = "last_extracted_at";

    pub const DEFAULT_LOOKBACK_DAYS: u32 = 20;

    /// Longest accepted default lookback, ten years.
    pub const MAX_LOOKBACK_DAYS: u32 = 3650;

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::InvalidFieldValue {
                field: "watermark.name".to_string(),
                constraint: "must not be empty".to_string(),
            });
        }

        if self.default_lookback_days > Self::MAX_LOOKBACK_DAYS {
            return Err(ValidationError::InvalidFieldValue {
                field: "watermark.default_lookback_days".to_string(),
                constraint: format!("must be at most {}", Self::MAX_LOOKBACK_DAYS),
            });
        }

        Ok(())
    }
}

impl Default for WatermarkConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            default_lookback_days: default_lookback_days(),
            store: WatermarkStoreConfig::default(),
        }
    }
}

fn default_name() -> String {
    WatermarkConfig::DEFAULT_NAME.to_string()
}

const fn default_lookback_days() -> u32 {
    WatermarkConfig::DEFAULT_LOOKBACK_DAYS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(WatermarkConfig::default().validate().is_ok());
    }

    #[test]
    fn lookback_above_the_bound_is_rejected() {
        let config = WatermarkConfig {
            default_lookback_days: u32::MAX,
            ..WatermarkConfig::default()
        };

        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidFieldValue { field, .. }) if field == "watermark.default_lookback_days"
        ));

        let config = WatermarkConfig {
            default_lookback_days: WatermarkConfig::MAX_LOOKBACK_DAYS,
            ..WatermarkConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}

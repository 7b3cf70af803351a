use serde::Deserialize;

/// Fixed-delay retry settings for a pipeline step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Number of retries performed after the first failed attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay between two attempts, in milliseconds.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl RetryConfig {
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    pub const DEFAULT_DELAY_MS: u64 = 60_000;
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay_ms: default_delay_ms(),
        }
    }
}

const fn default_max_retries() -> u32 {
    RetryConfig::DEFAULT_MAX_RETRIES
}

const fn default_delay_ms() -> u64 {
    RetryConfig::DEFAULT_DELAY_MS
}

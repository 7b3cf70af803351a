use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{ErrorKind, EtlResult};
use crate::watermark::base::WatermarkStore;
use crate::bail;

#[derive(Debug, Default)]
struct Inner {
    values: HashMap<String, String>,
    failing_sets: u32,
}

/// Process-local [`WatermarkStore`]. Values are lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryWatermarkStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` writes fail.
    pub async fn fail_next_sets(&self, times: u32) {
        let mut inner = self.inner.lock().await;
        inner.failing_sets = times;
    }

    /// Returns every stored value.
    pub async fn values(&self) -> HashMap<String, String> {
        let inner = self.inner.lock().await;
        inner.values.clone()
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    async fn get(&self, name: &str) -> EtlResult<Option<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.values.get(name).cloned())
    }

    async fn set(&self, name: &str, value: &str) -> EtlResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.failing_sets > 0 {
            inner.failing_sets -= 1;
            bail!(
                ErrorKind::WatermarkStoreError,
                "Injected watermark store failure",
                format!("writing `{name}` failed")
            );
        }

        inner.values.insert(name.to_string(), value.to_string());

        Ok(())
    }
}

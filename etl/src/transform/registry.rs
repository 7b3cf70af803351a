use std::collections::HashMap;
use std::sync::Arc;

use config::shared::TableConfig;

use crate::error::{ErrorKind, EtlError, EtlResult};
use crate::etl_error;
use crate::transform::base::Transform;
use crate::transform::builtin::builtin_transforms;

/// Explicit wiring of destination tables to their transforms.
#[derive(Debug, Clone, Default)]
pub struct TransformRegistry {
    transforms: HashMap<String, Arc<dyn Transform>>,
}

impl TransformRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every built-in transform.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for (table, transform) in builtin_transforms() {
            registry.transforms.insert(table.to_string(), transform);
        }

        registry
    }

    /// Registers `transform` for `table`, replacing any previous one.
    pub fn register<T>(&mut self, table: impl Into<String>, transform: T)
    where
        T: Transform + 'static,
    {
        self.transforms.insert(table.into(), Arc::new(transform));
    }

    pub fn get(&self, table: &str) -> Option<Arc<dyn Transform>> {
        self.transforms.get(table).cloned()
    }

    /// Fails with [`ErrorKind::MissingTransform`] for every configured table without a
    /// registered transform.
    pub fn validate(&self, tables: &[TableConfig]) -> EtlResult<()> {
        let errors: Vec<EtlError> = tables
            .iter()
            .filter(|table| !self.transforms.contains_key(&table.name))
            .map(|table| {
                etl_error!(
                    ErrorKind::MissingTransform,
                    "No transform registered for table",
                    format!("table `{}` has no registered transform", table.name)
                )
            })
            .collect();

        if errors.is_empty() {
            return Ok(());
        }

        Err(errors.into())
    }
}

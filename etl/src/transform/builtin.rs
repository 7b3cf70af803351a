//! Transforms of the shop and events tables.

use std::sync::Arc;

use crate::error::{ErrorKind, EtlResult};
use crate::etl_error;
use crate::transform::base::{Transform, TransformInputs};
use crate::transform::ops::{DEFAULT_SUFFIXES, ProjectedColumn, inner_join, project};
use crate::types::{LoadBatch, TableBatch};

fn input<'a>(inputs: &'a TransformInputs, name: &str) -> EtlResult<&'a TableBatch> {
    inputs.get(name).ok_or_else(|| {
        etl_error!(
            ErrorKind::InvalidState,
            "Transform input was not extracted",
            format!("input `{name}` is missing")
        )
    })
}

/// Loads the extracted batch unchanged.
#[derive(Debug, Clone)]
pub struct PassThrough {
    inputs: Vec<String>,
}

impl PassThrough {
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            inputs: vec![input.into()],
        }
    }
}

impl Transform for PassThrough {
    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn apply(&self, inputs: &TransformInputs) -> EtlResult<LoadBatch> {
        Ok(input(inputs, &self.inputs[0])?.clone())
    }
}

/// Selects and derives a fixed set of columns from a single input.
#[derive(Debug, Clone)]
pub struct Projection {
    inputs: Vec<String>,
    columns: Vec<ProjectedColumn>,
}

impl Projection {
    pub fn new(input: impl Into<String>, columns: Vec<ProjectedColumn>) -> Self {
        Self {
            inputs: vec![input.into()],
            columns,
        }
    }

    /// Projects `columns` followed by the tracking timestamps.
    pub fn with_timestamps(input: impl Into<String>, columns: &[&str]) -> Self {
        let columns = columns
            .iter()
            .map(|name| ProjectedColumn::column(*name))
            .collect();

        Self::new(input, columns).push_timestamps()
    }

    fn push_timestamps(mut self) -> Self {
        self.columns.extend(ProjectedColumn::timestamps());
        self
    }
}

impl Transform for Projection {
    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn apply(&self, inputs: &TransformInputs) -> EtlResult<LoadBatch> {
        project(input(inputs, &self.inputs[0])?, &self.columns)
    }
}

/// Joins the running result with the next input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinStep {
    pub right: String,
    pub left_on: String,
    pub right_on: String,
    pub suffixes: (String, String),
}

impl JoinStep {
    pub fn new(
        right: impl Into<String>,
        left_on: impl Into<String>,
        right_on: impl Into<String>,
    ) -> Self {
        Self {
            right: right.into(),
            left_on: left_on.into(),
            right_on: right_on.into(),
            suffixes: (DEFAULT_SUFFIXES.0.to_string(), DEFAULT_SUFFIXES.1.to_string()),
        }
    }

    pub fn with_suffixes(mut self, left: impl Into<String>, right: impl Into<String>) -> Self {
        self.suffixes = (left.into(), right.into());
        self
    }
}

/// Chains inner joins starting from a base input, then projects the result.
#[derive(Debug, Clone)]
pub struct JoinTransform {
    inputs: Vec<String>,
    steps: Vec<JoinStep>,
    columns: Vec<ProjectedColumn>,
}

impl JoinTransform {
    pub fn new(base: impl Into<String>, steps: Vec<JoinStep>, columns: Vec<ProjectedColumn>) -> Self {
        let mut inputs = vec![base.into()];
        inputs.extend(steps.iter().map(|step| step.right.clone()));

        Self {
            inputs,
            steps,
            columns,
        }
    }
}

impl Transform for JoinTransform {
    fn inputs(&self) -> &[String] {
        &self.inputs
    }

    fn apply(&self, inputs: &TransformInputs) -> EtlResult<LoadBatch> {
        let mut joined = input(inputs, &self.inputs[0])?.clone();
        for step in &self.steps {
            let right = input(inputs, &step.right)?;
            joined = inner_join(
                &joined,
                right,
                &step.left_on,
                &step.right_on,
                (&step.suffixes.0, &step.suffixes.1),
            )?;
        }

        project(&joined, &self.columns)
    }
}

fn users() -> Projection {
    let mut columns = vec![
        ProjectedColumn::column("id"),
        ProjectedColumn::Concat {
            name: "fullname".to_string(),
            parts: vec!["first_name".to_string(), "last_name".to_string()],
            separator: " ".to_string(),
        },
    ];
    columns.extend(
        ["email", "phone", "gender", "date_of_birth"]
            .into_iter()
            .map(ProjectedColumn::column),
    );

    Projection::new("users", columns).push_timestamps()
}

fn product_transactions() -> JoinTransform {
    JoinTransform::new(
        "product_transactions",
        vec![
            JoinStep::new("product_transaction_items", "id", "product_transaction_id"),
            JoinStep::new("product_variants", "product_variant_id", "id"),
            JoinStep::new("products", "product_id", "id").with_suffixes("_a", "_b"),
        ],
        vec![
            ProjectedColumn::renamed("id_x", "id"),
            ProjectedColumn::column("user_id"),
            ProjectedColumn::column("product_id"),
            ProjectedColumn::column("category_id"),
            ProjectedColumn::column("transaction_method_id"),
            ProjectedColumn::column("quantity"),
            ProjectedColumn::column("total_amount"),
        ],
    )
}

fn event_transactions() -> JoinTransform {
    JoinTransform::new(
        "event_transactions",
        vec![
            JoinStep::new("event_transaction_items", "id", "event_transaction_id"),
            JoinStep::new("events", "event_id", "id"),
            JoinStep::new("event_locations", "location_id", "id").with_suffixes("_a", "_b"),
        ],
        vec![
            ProjectedColumn::renamed("id_x", "id"),
            ProjectedColumn::column("user_id"),
            ProjectedColumn::column("event_id"),
            ProjectedColumn::column("category_id"),
            ProjectedColumn::column("location_id"),
            ProjectedColumn::column("transaction_method_id"),
            ProjectedColumn::column("quantity"),
            ProjectedColumn::column("total_amount"),
        ],
    )
}

fn entry<T>(table: &'static str, transform: T) -> (&'static str, Arc<dyn Transform>)
where
    T: Transform + 'static,
{
    (table, Arc::new(transform))
}

/// Returns every built-in transform keyed by destination table.
pub fn builtin_transforms() -> Vec<(&'static str, Arc<dyn Transform>)> {
    vec![
        entry("users", users()),
        entry(
            "user_addresses",
            Projection::with_timestamps(
                "user_addresses",
                &[
                    "id",
                    "user_id",
                    "label",
                    "address",
                    "city",
                    "province",
                    "postal_code",
                    "is_primary",
                ],
            ),
        ),
        entry(
            "products",
            Projection::with_timestamps("products", &["id", "category_id", "name", "description"]),
        ),
        entry(
            "product_variants",
            Projection::with_timestamps("product_variants", &["id", "product_id", "size", "stock"]),
        ),
        entry(
            "events",
            Projection::with_timestamps(
                "events",
                &["id", "location_id", "category_id", "name", "description", "date"],
            ),
        ),
        entry("product_transactions", product_transactions()),
        entry("event_transactions", event_transactions()),
        entry("product_categories", PassThrough::new("product_categories")),
        entry("product_pricings", PassThrough::new("product_pricings")),
        entry("product_reviews", PassThrough::new("product_reviews")),
        entry("event_categories", PassThrough::new("event_categories")),
        entry("event_locations", PassThrough::new("event_locations")),
    ]
}

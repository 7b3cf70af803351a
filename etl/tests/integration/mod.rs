mod pipeline_test;
mod postgres_test;
mod scenarios_test;

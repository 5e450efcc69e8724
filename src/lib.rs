pub mod config;
pub mod datasets;
pub mod decode;
mod id;
pub mod jobs;
pub mod ledger;
pub mod persist;
pub mod pipeline;
pub mod schema;
pub mod telemetry;
pub mod validation;

pub use pipeline::{Pipeline, PipelineError};

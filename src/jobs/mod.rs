//! Job definitions and the immutable job registry.

mod definition;
mod error;
mod registry;

pub use definition::{
    JobConfiguration, JobDefaults, JobDefinition, MultiSheetDefinition, MultiSheetJob,
    SaveDefinition, SheetDefinition, SheetJob, SingleSheetDefinition, SingleSheetJob,
};
pub use error::ConfigurationError;
pub use registry::JobRegistry;

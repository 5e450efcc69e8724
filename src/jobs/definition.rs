//! Job definitions and their compiled configurations.
//!
//! A definition is the JSON document an operator writes. A single-sheet job:
//!
//! ```json
//! {
//!   "name": "Sample",
//!   "schema": {"age": {"type": "int", "constraints": [{"kind": "isin", "args": [1, 2, 3]}]}},
//!   "load": {"type": "csv", "params": {"sep": ";"}},
//!   "save": {"provider": "local", "format": "parquet", "path": "sample/age.parquet"}
//! }
//! ```
//!
//! A multi-sheet job replaces `schema`/`save` with an ordered `sheets` list of
//! `{sheet, schema, save}` entries that share one `load`.

use super::ConfigurationError;
use crate::datasets::SheetKey;
use crate::decode::LoadDescriptor;
use crate::persist::{Provider, SaveDescriptor, TableFormat};
use crate::schema::{Schema, SchemaSpec};
use serde::Deserialize;
use std::collections::HashSet;

/// Values a definition inherits when it leaves them out.
#[derive(Debug, Clone, Copy)]
pub struct JobDefaults {
    pub default_provider: Provider,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            default_provider: Provider::Local,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SaveDefinition {
    #[serde(default)]
    pub provider: Option<Provider>,
    #[serde(default)]
    pub format: TableFormat,
    pub path: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SingleSheetDefinition {
    #[serde(default)]
    pub name: Option<String>,
    pub schema: SchemaSpec,
    #[serde(default)]
    pub load: LoadDescriptor,
    pub save: SaveDefinition,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SheetDefinition {
    pub sheet: SheetKey,
    pub schema: SchemaSpec,
    pub save: SaveDefinition,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MultiSheetDefinition {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub load: LoadDescriptor,
    pub sheets: Vec<SheetDefinition>,
}

#[derive(Debug, Clone)]
pub enum JobDefinition {
    Single(SingleSheetDefinition),
    MultiSheet(MultiSheetDefinition),
}

impl JobDefinition {
    /// Parse a definition; a top-level `sheets` key makes it multi-sheet.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        if value.get("sheets").is_some() {
            serde_json::from_value(value).map(JobDefinition::MultiSheet)
        } else {
            serde_json::from_value(value).map(JobDefinition::Single)
        }
    }
}

#[derive(Debug, Clone)]
pub struct SingleSheetJob {
    pub name: String,
    pub schema: Schema,
    pub load: LoadDescriptor,
    pub save: SaveDescriptor,
}

#[derive(Debug, Clone)]
pub struct SheetJob {
    pub sheet: SheetKey,
    pub schema: Schema,
    pub save: SaveDescriptor,
}

#[derive(Debug, Clone)]
pub struct MultiSheetJob {
    pub name: String,
    pub load: LoadDescriptor,
    pub sheets: Vec<SheetJob>,
}

impl MultiSheetJob {
    pub fn sheet_keys(&self) -> Vec<SheetKey> {
        self.sheets.iter().map(|s| s.sheet.clone()).collect()
    }
}

/// Immutable, validated job configuration.
#[derive(Debug, Clone)]
pub enum JobConfiguration {
    Single(SingleSheetJob),
    MultiSheet(MultiSheetJob),
}

impl JobConfiguration {
    pub fn name(&self) -> &str {
        match self {
            JobConfiguration::Single(job) => &job.name,
            JobConfiguration::MultiSheet(job) => &job.name,
        }
    }

    pub fn load(&self) -> &LoadDescriptor {
        match self {
            JobConfiguration::Single(job) => &job.load,
            JobConfiguration::MultiSheet(job) => &job.load,
        }
    }

    pub fn is_multi_sheet(&self) -> bool {
        matches!(self, JobConfiguration::MultiSheet(_))
    }

    /// Validate a definition and compile its schemas.
    pub fn compile(
        job_id: &str,
        definition: JobDefinition,
        defaults: &JobDefaults,
    ) -> Result<Self, ConfigurationError> {
        match definition {
            JobDefinition::Single(def) => Ok(JobConfiguration::Single(SingleSheetJob {
                name: def.name.unwrap_or_else(|| job_id.to_string()),
                schema: compile_schema(job_id, &def.schema)?,
                load: def.load,
                save: resolve_save(job_id, def.save, defaults)?,
            })),
            JobDefinition::MultiSheet(def) => {
                if def.sheets.is_empty() {
                    return Err(ConfigurationError::invalid(job_id, "sheets must not be empty"));
                }

                let mut seen = HashSet::new();
                let mut sheets = Vec::with_capacity(def.sheets.len());
                for sheet in def.sheets {
                    if !seen.insert(sheet.sheet.clone()) {
                        return Err(ConfigurationError::invalid(
                            job_id,
                            format!("sheet '{}' is listed more than once", sheet.sheet),
                        ));
                    }
                    sheets.push(SheetJob {
                        schema: compile_schema(job_id, &sheet.schema)?,
                        save: resolve_save(job_id, sheet.save, defaults)?,
                        sheet: sheet.sheet,
                    });
                }

                Ok(JobConfiguration::MultiSheet(MultiSheetJob {
                    name: def.name.unwrap_or_else(|| job_id.to_string()),
                    load: def.load,
                    sheets,
                }))
            }
        }
    }
}

fn compile_schema(job_id: &str, spec: &SchemaSpec) -> Result<Schema, ConfigurationError> {
    Schema::from_spec(spec).map_err(|source| ConfigurationError::Schema {
        job_id: job_id.to_string(),
        source,
    })
}

fn resolve_save(
    job_id: &str,
    save: SaveDefinition,
    defaults: &JobDefaults,
) -> Result<SaveDescriptor, ConfigurationError> {
    if save.path.trim().is_empty() {
        return Err(ConfigurationError::invalid(job_id, "save path must not be empty"));
    }
    Ok(SaveDescriptor {
        provider: save.provider.unwrap_or(defaults.default_provider),
        format: save.format,
        path: save.path,
        params: save.params,
    })
}

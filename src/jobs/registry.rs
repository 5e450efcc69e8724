use super::{ConfigurationError, JobConfiguration, JobDefaults, JobDefinition};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Immutable registry of job configurations, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: BTreeMap<String, Arc<JobConfiguration>>,
}

impl JobRegistry {
    /// Compile definitions, keeping the valid ones.
    ///
    /// Invalid definitions are excluded and reported alongside the registry.
    pub fn build(
        definitions: impl IntoIterator<Item = (String, JobDefinition)>,
        defaults: &JobDefaults,
    ) -> (Self, Vec<ConfigurationError>) {
        let mut jobs = BTreeMap::new();
        let mut errors = Vec::new();

        for (job_id, definition) in definitions {
            if jobs.contains_key(&job_id) {
                errors.push(ConfigurationError::Duplicate(job_id));
                continue;
            }
            match JobConfiguration::compile(&job_id, definition, defaults) {
                Ok(config) => {
                    jobs.insert(job_id, Arc::new(config));
                }
                Err(e) => errors.push(e),
            }
        }

        (Self { jobs }, errors)
    }

    /// Load every `*.json` file in `dir`; the file stem is the job id.
    pub fn load_dir(
        dir: &Path,
        defaults: &JobDefaults,
    ) -> Result<(Self, Vec<ConfigurationError>), ConfigurationError> {
        let io_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source| ConfigurationError::Io { path, source }
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_error(dir))? {
            let path = entry.map_err(io_error(dir))?.path();
            if path.extension().is_some_and(|ext| ext == "json") && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut definitions = Vec::with_capacity(paths.len());
        let mut errors = Vec::new();
        for path in paths {
            let Some(job_id) = path.file_stem().and_then(|s| s.to_str()).map(String::from)
            else {
                continue;
            };
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    errors.push(io_error(&path)(e));
                    continue;
                }
            };
            match JobDefinition::from_json(&text) {
                Ok(definition) => definitions.push((job_id, definition)),
                Err(e) => errors.push(ConfigurationError::Parse {
                    job_id,
                    message: e.to_string(),
                }),
            }
        }

        let (registry, build_errors) = Self::build(definitions, defaults);
        errors.extend(build_errors);

        for error in &errors {
            tracing::warn!(error = %error, "Excluded job definition");
        }
        tracing::info!(jobs = registry.len(), dir = %dir.display(), "Loaded job registry");

        Ok((registry, errors))
    }

    /// Registry from already compiled configurations.
    pub fn from_configurations(
        configurations: impl IntoIterator<Item = (String, JobConfiguration)>,
    ) -> Self {
        Self {
            jobs: configurations
                .into_iter()
                .map(|(id, config)| (id, Arc::new(config)))
                .collect(),
        }
    }

    pub fn get(&self, job_id: &str) -> Option<Arc<JobConfiguration>> {
        self.jobs.get(job_id).cloned()
    }

    /// Job ids in sorted order.
    pub fn job_ids(&self) -> impl Iterator<Item = &str> {
        self.jobs.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

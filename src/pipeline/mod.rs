//! Job coordination: decode, validate, persist, and record every transition.
//!
//! Each accepted upload runs as its own tokio task. The ledger receives
//! `IN_PROGRESS` on submission, `SAVING` before each write, and exactly one
//! terminal record when the task ends. Sheets of a multi-sheet job are handled
//! in order and the first failing sheet stops the run.

mod uploads;

pub use uploads::{TempUpload, UploadStore};

use crate::decode::DecoderRegistry;
use crate::id::generate_run_id;
use crate::jobs::{JobConfiguration, JobRegistry, MultiSheetJob, SingleSheetJob};
use crate::ledger::{StatusKind, StatusLedger, StatusRecord};
use crate::persist::PersistenceDispatcher;
use crate::validation::{validate, ValidationResult};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Errors returned to the caller of [`Pipeline::submit`].
///
/// Failures after submission never surface here; they end in a `FAILED` record.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Job '{0}' not found")]
    JobNotFound(String),

    #[error("Failed to store upload: {0}")]
    Upload(#[source] std::io::Error),

    #[error("Failed to record job status: {0}")]
    Ledger(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Terminal status of a multi-sheet run.
pub fn terminal_status(persisted: usize, causes: &[String]) -> StatusKind {
    match (persisted, causes.is_empty()) {
        (_, true) => StatusKind::Success,
        (0, false) => StatusKind::Failed,
        (_, false) => StatusKind::PartialSuccess,
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: Arc<JobRegistry>,
    decoders: Arc<DecoderRegistry>,
    persistence: PersistenceDispatcher,
    ledger: Arc<dyn StatusLedger>,
    uploads: UploadStore,
}

impl Pipeline {
    pub fn new(
        registry: JobRegistry,
        decoders: DecoderRegistry,
        persistence: PersistenceDispatcher,
        ledger: Arc<dyn StatusLedger>,
        uploads: UploadStore,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            decoders: Arc::new(decoders),
            persistence,
            ledger,
            uploads,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn uploads(&self) -> &UploadStore {
        &self.uploads
    }

    pub async fn latest_status(&self, job_id: &str) -> anyhow::Result<Option<StatusRecord>> {
        self.ledger.latest(job_id).await
    }

    pub async fn history(&self, job_id: &str) -> anyhow::Result<Vec<StatusRecord>> {
        self.ledger.history(job_id).await
    }

    /// Accept an upload for `job_id` and start processing it.
    ///
    /// Returns once `IN_PROGRESS` is recorded. The handle resolves to the
    /// terminal status.
    pub async fn submit(
        &self,
        job_id: &str,
        bytes: &[u8],
    ) -> Result<JoinHandle<StatusKind>, PipelineError> {
        let job = self
            .registry
            .get(job_id)
            .ok_or_else(|| PipelineError::JobNotFound(job_id.to_string()))?;

        let upload = self
            .uploads
            .store(job_id, bytes)
            .await
            .map_err(PipelineError::Upload)?;

        self.ledger
            .append(job_id, StatusKind::InProgress, &[])
            .await
            .map_err(|e| PipelineError::Ledger(e.into()))?;

        let pipeline = self.clone();
        let job_id = job_id.to_string();
        Ok(tokio::spawn(async move {
            pipeline.process(job_id, job, upload).await
        }))
    }

    #[tracing::instrument(
        name = "pipeline_job",
        skip(self, job, upload),
        fields(
            sheetdrop.job_id = %job_id,
            sheetdrop.run_id = %generate_run_id(),
            sheetdrop.multi_sheet = job.is_multi_sheet(),
        )
    )]
    async fn process(
        self,
        job_id: String,
        job: Arc<JobConfiguration>,
        upload: TempUpload,
    ) -> StatusKind {
        let (status, details) = match upload.read().await {
            Err(e) => (
                StatusKind::Failed,
                vec![format!("Failed to read upload: {}", e)],
            ),
            Ok(bytes) => match job.as_ref() {
                JobConfiguration::Single(single) => self.run_single(&job_id, single, bytes).await,
                JobConfiguration::MultiSheet(multi) => {
                    self.run_multi(&job_id, multi, bytes).await
                }
            },
        };
        drop(upload);

        self.record(&job_id, status, &details).await;
        tracing::info!(status = %status, causes = details.len(), "Job finished");
        status
    }

    async fn run_single(
        &self,
        job_id: &str,
        job: &SingleSheetJob,
        bytes: Vec<u8>,
    ) -> (StatusKind, Vec<String>) {
        let decoders = Arc::clone(&self.decoders);
        let load = job.load.clone();
        let schema = job.schema.clone();
        let checked = tokio::task::spawn_blocking(move || {
            decoders
                .decode(&bytes, &load)
                .map(|dataset| validate(dataset, &schema))
        })
        .await;

        let dataset = match checked {
            Err(e) => return failed(format!("Decode task failed: {}", e)),
            Ok(Err(e)) => return failed(e.to_string()),
            Ok(Ok(ValidationResult::Invalid(causes))) => {
                return (
                    StatusKind::Failed,
                    causes.iter().map(ToString::to_string).collect(),
                )
            }
            Ok(Ok(ValidationResult::Valid(dataset))) => dataset,
        };

        self.record(job_id, StatusKind::Saving, &[]).await;
        match self.persistence.persist(&dataset, &job.save).await {
            Ok(_) => (StatusKind::Success, Vec::new()),
            Err(e) => failed(e.to_string()),
        }
    }

    async fn run_multi(
        &self,
        job_id: &str,
        job: &MultiSheetJob,
        bytes: Vec<u8>,
    ) -> (StatusKind, Vec<String>) {
        let decoders = Arc::clone(&self.decoders);
        let load = job.load.clone();
        let keys = job.sheet_keys();
        let decoded =
            tokio::task::spawn_blocking(move || decoders.decode_sheets(&bytes, &load, &keys))
                .await;

        let mut datasets = match decoded {
            Err(e) => return failed(format!("Decode task failed: {}", e)),
            Ok(Err(e)) => return failed(e.to_string()),
            Ok(Ok(datasets)) => datasets,
        };

        let mut persisted = 0;
        let mut causes = Vec::new();
        for sheet in &job.sheets {
            let Some(dataset) = datasets.remove(&sheet.sheet) else {
                causes.push(format!("{}: sheet was not decoded", sheet.sheet));
                break;
            };

            let schema = sheet.schema.clone();
            let result = match tokio::task::spawn_blocking(move || validate(dataset, &schema)).await
            {
                Ok(result) => result,
                Err(e) => {
                    causes.push(format!("{}: validation task failed: {}", sheet.sheet, e));
                    break;
                }
            };

            match result {
                ValidationResult::Invalid(sheet_causes) => {
                    causes.extend(
                        sheet_causes
                            .iter()
                            .map(|cause| format!("{}: {}", sheet.sheet, cause)),
                    );
                    break;
                }
                ValidationResult::Valid(dataset) => {
                    self.record(
                        job_id,
                        StatusKind::Saving,
                        &[format!("sheet {}", sheet.sheet)],
                    )
                    .await;
                    match self.persistence.persist(&dataset, &sheet.save).await {
                        Ok(_) => persisted += 1,
                        Err(e) => {
                            causes.push(format!("{}: {}", sheet.sheet, e));
                            break;
                        }
                    }
                }
            }
        }

        tracing::debug!(
            persisted,
            sheets = job.sheets.len(),
            "Multi-sheet run stopped"
        );
        (terminal_status(persisted, &causes), causes)
    }

    async fn record(&self, job_id: &str, status: StatusKind, details: &[String]) {
        if let Err(e) = self.ledger.append(job_id, status, details).await {
            tracing::error!(status = %status, error = %e, "Failed to record job status");
        }
    }
}

fn failed(message: String) -> (StatusKind, Vec<String>) {
    (StatusKind::Failed, vec![message])
}

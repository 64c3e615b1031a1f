//! Bounded-concurrency fan-out of per-file validation

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::models::ValidationResult;
use super::validator::{panic_message, FileOutcome, PolicyFileValidator};
use super::{CancellationSignal, ValidationContext};

/// Progress snapshot delivered after completed files
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Files finished so far
    pub completed: usize,
    /// Files in the batch
    pub total: usize,
    /// File that just finished
    pub current_file: PathBuf,
}

impl ProgressUpdate {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 * 100.0 / self.total as f64
        }
    }
}

/// Progress observer. Calls are made one at a time from the collecting task.
pub type ProgressCallback = Arc<dyn Fn(&ProgressUpdate) + Send + Sync>;

/// Outcome of one item in a batch
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome<T> {
    Completed(T),
    /// Not started, or stopped after observing cancellation
    Cancelled,
    /// The operation panicked
    Failed(String),
}

/// Per-item outcomes in input order
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome<T> {
    pub items: Vec<(PathBuf, ItemOutcome<T>)>,
    pub cancelled: bool,
}

/// Outcome of validating a batch of files
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingOutcome {
    /// Completed results in input order
    pub results: Vec<ValidationResult>,
    /// Whether cancellation stopped any file
    pub cancelled: bool,
    /// Files that never produced a result because of cancellation
    pub skipped: usize,
}

/// Every `max(1, total / 20)` completed files
pub fn progress_stride(total: usize) -> usize {
    (total / 20).max(1)
}

/// Runs a per-file operation over many files with at most
/// `max_concurrency` in flight
#[derive(Clone)]
pub struct ParallelFileProcessor {
    max_concurrency: usize,
    progress: Option<ProgressCallback>,
}

impl ParallelFileProcessor {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
            progress: None,
        }
    }

    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Validate every file, continuing past individual failures.
    ///
    /// A file whose validation panics outside of rule code is recorded as an
    /// invalid result with an `UnexpectedError`. Files stopped by
    /// cancellation produce no result.
    pub async fn process(
        &self,
        files: &[PathBuf],
        validator: Arc<PolicyFileValidator>,
        context: Arc<ValidationContext>,
    ) -> ProcessingOutcome {
        context.logger().log_info(&format!(
            "Validating {} policy files with up to {} concurrent workers",
            files.len(),
            self.max_concurrency
        ));

        let cancellation = context.cancellation().clone();
        let batch = self
            .map_files(files, &cancellation, move |path| {
                let validator = validator.clone();
                let context = context.clone();
                async move {
                    match validator.validate_file(&path, &context).await {
                        FileOutcome::Completed(result) => Some(result),
                        FileOutcome::Cancelled => None,
                    }
                }
            })
            .await;

        let mut results = Vec::with_capacity(batch.items.len());
        let mut skipped = 0;
        for (path, outcome) in batch.items {
            match outcome {
                ItemOutcome::Completed(result) => results.push(result),
                ItemOutcome::Failed(message) => results.push(ValidationResult::unreadable(
                    path,
                    None,
                    format!("Validation aborted unexpectedly: {}", message),
                )),
                ItemOutcome::Cancelled => skipped += 1,
            }
        }

        ProcessingOutcome {
            results,
            cancelled: batch.cancelled,
            skipped,
        }
    }

    /// Generic bounded parallel map over files.
    ///
    /// `operation` returns `None` when it stopped because of cancellation.
    /// Once `cancellation` is raised no further item starts; items already
    /// finished keep their outcome.
    pub async fn map_files<T, F, Fut>(
        &self,
        files: &[PathBuf],
        cancellation: &CancellationSignal,
        operation: F,
    ) -> BatchOutcome<T>
    where
        T: Send + 'static,
        F: Fn(PathBuf) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<T>> + Send + 'static,
    {
        let total = files.len();
        let stride = progress_stride(total);
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let operation = Arc::new(operation);
        let mut tasks = JoinSet::new();

        for (index, path) in files.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let operation = operation.clone();
            let cancellation = cancellation.clone();
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, ItemOutcome::Cancelled);
                };
                if cancellation.is_cancelled() {
                    return (index, ItemOutcome::Cancelled);
                }
                let outcome = match AssertUnwindSafe((operation.as_ref())(path)).catch_unwind().await {
                    Ok(Some(value)) => ItemOutcome::Completed(value),
                    Ok(None) => ItemOutcome::Cancelled,
                    Err(panic) => ItemOutcome::Failed(panic_message(panic.as_ref())),
                };
                (index, outcome)
            });
        }

        let mut outcomes: Vec<ItemOutcome<T>> = (0..total).map(|_| ItemOutcome::Cancelled).collect();
        let mut completed = 0;
        while let Some(joined) = tasks.join_next().await {
            // Tasks catch their own panics and are never aborted
            let Ok((index, outcome)) = joined else { continue };
            if !matches!(outcome, ItemOutcome::Cancelled) {
                completed += 1;
                if let Some(progress) = &self.progress {
                    if completed % stride == 0 || completed == total {
                        progress(&ProgressUpdate {
                            completed,
                            total,
                            current_file: files[index].clone(),
                        });
                    }
                }
            }
            outcomes[index] = outcome;
        }

        let cancelled = cancellation.is_cancelled()
            || outcomes.iter().any(|o| matches!(o, ItemOutcome::Cancelled));

        BatchOutcome {
            items: files.iter().cloned().zip(outcomes).collect(),
            cancelled,
        }
    }
}

impl std::fmt::Debug for ParallelFileProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelFileProcessor")
            .field("max_concurrency", &self.max_concurrency)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

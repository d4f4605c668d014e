//! Bounded batch extraction.
//!
//! Fans a set of documents out over a small worker pool. Concurrency is
//! bounded (extraction is regex-heavy and the documents are large), each task
//! runs under a timeout, and a shared cancellation flag lets a caller stop a
//! long batch between documents. A failed document is reported in the
//! outcome, never silently dropped, and never takes the batch down with it.

use crate::engine::{ExtractionEngine, ExtractionOutcome};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

pub const MIN_CONCURRENCY: usize = 2;
pub const MAX_CONCURRENCY: usize = 4;

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Worker pool width, clamped to `[MIN_CONCURRENCY, MAX_CONCURRENCY]`.
    pub max_concurrency: usize,
    pub task_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            task_timeout: Duration::from_secs(120),
        }
    }
}

/// One input document, named so failures are attributable.
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub name: String,
    pub text: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchTaskError {
    #[error("extraction timed out after {0:?}")]
    Timeout(Duration),
    #[error("batch cancelled before this document started")]
    Cancelled,
    #[error("extraction task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug)]
pub struct BatchFailure {
    pub name: String,
    pub error: BatchTaskError,
}

/// Batch result: per-document outcomes plus attributed failures, both sorted
/// by document name so reruns diff cleanly.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub succeeded: Vec<(String, ExtractionOutcome)>,
    pub failed: Vec<BatchFailure>,
}

/// Run extraction over `items` with bounded concurrency.
///
/// Setting `cancel` stops new documents from starting; documents already in
/// flight finish (or hit their timeout) and are reported normally.
pub async fn run_batch(
    engine: Arc<ExtractionEngine>,
    items: Vec<BatchItem>,
    options: BatchOptions,
    cancel: Arc<AtomicBool>,
) -> BatchOutcome {
    let width = options
        .max_concurrency
        .clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
    let semaphore = Arc::new(Semaphore::new(width));
    let total = items.len();
    info!(total, width, "starting extraction batch");

    let mut tasks: JoinSet<(String, Result<ExtractionOutcome, BatchTaskError>)> = JoinSet::new();
    let mut outcome = BatchOutcome::default();

    for item in items {
        if cancel.load(Ordering::SeqCst) {
            outcome.failed.push(BatchFailure {
                name: item.name,
                error: BatchTaskError::Cancelled,
            });
            continue;
        }
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            // The semaphore is never closed while the batch runs.
            Err(_) => break,
        };
        let engine = engine.clone();
        let cancel = cancel.clone();
        let timeout = options.task_timeout;
        tasks.spawn(async move {
            let _permit = permit;
            let BatchItem { name, text } = item;
            if cancel.load(Ordering::SeqCst) {
                return (name, Err(BatchTaskError::Cancelled));
            }
            let work = tokio::task::spawn_blocking(move || engine.extract(&text));
            let result = match tokio::time::timeout(timeout, work).await {
                Ok(Ok(extracted)) => Ok(extracted),
                Ok(Err(join_err)) => Err(BatchTaskError::Aborted(join_err.to_string())),
                Err(_) => Err(BatchTaskError::Timeout(timeout)),
            };
            (name, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((name, Ok(extracted))) => outcome.succeeded.push((name, extracted)),
            Ok((name, Err(error))) => {
                warn!(document = %name, error = %error, "document extraction failed");
                outcome.failed.push(BatchFailure { name, error });
            }
            Err(join_err) => {
                warn!(error = %join_err, "extraction task aborted");
                outcome.failed.push(BatchFailure {
                    name: "<unknown>".to_string(),
                    error: BatchTaskError::Aborted(join_err.to_string()),
                });
            }
        }
    }

    outcome.succeeded.sort_by(|a, b| a.0.cmp(&b.0));
    outcome.failed.sort_by(|a, b| a.name.cmp(&b.name));
    info!(
        succeeded = outcome.succeeded.len(),
        failed = outcome.failed.len(),
        "extraction batch finished"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use obligo_registry::ClauseRegistry;

    fn engine() -> Arc<ExtractionEngine> {
        Arc::new(ExtractionEngine::new(Arc::new(ClauseRegistry::new())))
    }

    fn item(name: &str) -> BatchItem {
        BatchItem {
            name: name.to_string(),
            text: "Section 3. Quantity\n\nTotal quantity of 60,000 MT per year.\n\n\
                   Section 4. Price\n\nThe contract price shall be USD 400 per metric ton."
                .to_string(),
        }
    }

    #[tokio::test]
    async fn batch_extracts_all_documents() {
        let items = vec![item("a.txt"), item("b.txt"), item("c.txt")];
        let outcome = run_batch(
            engine(),
            items,
            BatchOptions::default(),
            Arc::new(AtomicBool::new(false)),
        )
        .await;
        assert_eq!(outcome.succeeded.len(), 3);
        assert!(outcome.failed.is_empty());
        // Sorted by name for stable reruns.
        let names: Vec<&str> = outcome.succeeded.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
        assert!(!outcome.succeeded[0].1.clauses.is_empty());
    }

    #[tokio::test]
    async fn cancelled_batch_reports_every_document() {
        let cancel = Arc::new(AtomicBool::new(true));
        let outcome = run_batch(
            engine(),
            vec![item("a.txt"), item("b.txt")],
            BatchOptions::default(),
            cancel,
        )
        .await;
        assert!(outcome.succeeded.is_empty());
        assert_eq!(outcome.failed.len(), 2);
        assert!(outcome
            .failed
            .iter()
            .all(|f| f.error == BatchTaskError::Cancelled));
    }

    #[tokio::test]
    async fn concurrency_is_clamped() {
        // Width 100 must still behave; the clamp keeps the pool at 4.
        let options = BatchOptions {
            max_concurrency: 100,
            ..BatchOptions::default()
        };
        let items: Vec<BatchItem> = (0..8).map(|i| item(&format!("{i}.txt"))).collect();
        let outcome = run_batch(engine(), items, options, Arc::new(AtomicBool::new(false))).await;
        assert_eq!(outcome.succeeded.len(), 8);
    }
}

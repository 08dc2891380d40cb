//! # Batch Processor
//!
//! Bounded-concurrency chunked execution for per-item remote work.
//!
//! ## Chunking Model
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │          items: [a b c d e f g]   max_concurrent = 3                    │
//! │                                                                         │
//! │          chunk 1: a b c   ── run concurrently, await all                 │
//! │          chunk 2: d e f   ── starts only after chunk 1 settles           │
//! │          chunk 3: g                                                      │
//! │                                                                         │
//! │   Per-item failures are recorded, never abort the batch.                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use futures_util::future::join_all;
use std::future::Future;
use tracing::debug;

use crate::error::SyncError;

/// Result of one batch run.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// Successful results, in input order.
    pub succeeded: Vec<T>,
    /// Failures with their input position.
    pub failed: Vec<BatchFailure>,
}

/// One failed item of a batch.
#[derive(Debug)]
pub struct BatchFailure {
    pub index: usize,
    pub error: SyncError,
}

impl<T> BatchOutcome<T> {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Runs homogeneous work in chunks of bounded concurrency.
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    max_concurrent: usize,
}

impl BatchProcessor {
    /// Creates a processor running at most `max_concurrent` items at once.
    pub fn new(max_concurrent: usize) -> Self {
        BatchProcessor {
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Processes `items`, invoking `handler` per item. Chunks run
    /// sequentially; items within a chunk run concurrently. Every item is
    /// attempted regardless of earlier failures.
    pub async fn process<I, T, F, Fut>(&self, items: Vec<I>, mut handler: F) -> BatchOutcome<T>
    where
        F: FnMut(I) -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let mut outcome = BatchOutcome {
            succeeded: Vec::new(),
            failed: Vec::new(),
        };

        let mut index = 0usize;
        let mut items = items.into_iter().peekable();
        while items.peek().is_some() {
            let chunk: Vec<_> = items.by_ref().take(self.max_concurrent).collect();
            let chunk_len = chunk.len();
            let futures: Vec<_> = chunk.into_iter().map(&mut handler).collect();

            for result in join_all(futures).await {
                match result {
                    Ok(value) => outcome.succeeded.push(value),
                    Err(error) => outcome.failed.push(BatchFailure { index, error }),
                }
                index += 1;
            }
            debug!(chunk_len, processed = index, "Batch chunk settled");
        }

        outcome
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

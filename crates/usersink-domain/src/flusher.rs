//! Chunked, in-order writes with a prefix guarantee.
//!
//! [`Flusher::flush`] writes a batch of users chunk by chunk and stops at the
//! first chunk the store rejects. The returned [`FlushOutcome`] says how many
//! users, counted from the start of the batch, were stored. Everything after
//! that prefix was not stored and is the caller's to keep.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use usersink_storage::{StorageResult, User, UserId, UserStore};

use crate::bounded_call;
use crate::chunk::{split_to_chunks, validate_chunk_size};
use crate::error::DomainResult;

/// Result of a flush: the first `persisted` of `attempted` users are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    pub attempted: usize,
    pub persisted: usize,
}

impl FlushOutcome {
    /// Whether every attempted user was stored.
    pub fn is_complete(&self) -> bool {
        self.persisted == self.attempted
    }

    /// Number of users at the end of the batch that were not stored.
    pub fn unpersisted(&self) -> usize {
        self.attempted - self.persisted
    }
}

/// Writes batches of users to a [`UserStore`] in fixed-size chunks.
#[derive(Debug)]
pub struct Flusher<S> {
    store: Arc<S>,
    chunk_size: usize,
    chunk_timeout: Option<Duration>,
}

impl<S: UserStore> Flusher<S> {
    /// Creates a flusher. The chunk size is validated here, not per call.
    pub fn new(store: Arc<S>, chunk_size: usize) -> DomainResult<Self> {
        validate_chunk_size(chunk_size)?;
        Ok(Self {
            store,
            chunk_size,
            chunk_timeout: None,
        })
    }

    /// Cancels any single chunk write that takes longer than `timeout`.
    /// A cancelled chunk counts as failed.
    pub fn with_chunk_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.chunk_timeout = timeout;
        self
    }

    /// Writes `users` in order, stopping at the first failed chunk.
    ///
    /// A failed chunk is not retried; neither it nor any later chunk is
    /// counted as persisted.
    pub async fn flush(&self, users: &[User]) -> FlushOutcome {
        self.flush_tracked(users, &AtomicUsize::new(0)).await
    }

    /// Like [`Flusher::flush`], publishing the persisted count to `progress`
    /// after every stored chunk so it survives cancellation of the future.
    pub(crate) async fn flush_tracked(
        &self,
        users: &[User],
        progress: &AtomicUsize,
    ) -> FlushOutcome {
        let mut outcome = FlushOutcome {
            attempted: users.len(),
            persisted: 0,
        };

        let chunks = match split_to_chunks(Some(users), self.chunk_size) {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "cannot split users into chunks, nothing flushed");
                return outcome;
            }
        };
        let chunk_count = chunks.len();

        for (index, chunk) in chunks.into_iter().enumerate() {
            match self.write_chunk(chunk).await {
                Ok(_) => {
                    outcome.persisted += chunk.len();
                    progress.store(outcome.persisted, Ordering::Release);
                }
                Err(e) => {
                    warn!(
                        chunk = index,
                        chunk_count,
                        persisted = outcome.persisted,
                        attempted = outcome.attempted,
                        retryable = e.is_backend_failure(),
                        error = %e,
                        "chunk write failed, stopping flush"
                    );
                    break;
                }
            }
        }

        debug!(
            persisted = outcome.persisted,
            attempted = outcome.attempted,
            "flush finished"
        );
        outcome
    }

    async fn write_chunk(&self, chunk: &[User]) -> StorageResult<Vec<UserId>> {
        bounded_call(self.chunk_timeout, self.store.create_users(chunk)).await
    }
}

//! usersink-domain: Write-buffering pipeline and batch resolver
//!
//! This crate contains the core of usersink:
//! - Bounded user buffer flushed periodically to storage
//! - Chunked writer with a persisted-prefix guarantee
//! - Chunked batch lookup with found/missing/failed reconciliation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              usersink-domain                │
//! ├─────────────────────────────────────────────┤
//! │  ticker.rs   - Periodic flush signal        │
//! │  chunk.rs    - Chunk splitting              │
//! │  flusher.rs  - Chunked in-order writes      │
//! │  saver.rs    - Bounded buffer + background  │
//! │  resolver.rs - Chunked batch lookup         │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! The storage collaborator is [`usersink_storage::UserStore`].

use std::future::Future;
use std::time::Duration;

use usersink_storage::{StorageError, StorageResult};

pub mod chunk;
pub mod config;
pub mod error;
pub mod flusher;
pub mod resolver;
pub mod saver;
pub mod ticker;

#[cfg(test)]
mod tests;

// Re-export commonly used types at the crate root
pub use chunk::{split_to_chunks, MAX_CHUNK_SIZE};
pub use config::{ResolverConfig, SaverConfig};
pub use error::{DomainError, DomainResult};
pub use flusher::{FlushOutcome, Flusher};
pub use resolver::{ResolveError, ResolveResult, Resolver};
pub use saver::Saver;
pub use ticker::{Ticker, TickerSignal};

/// Runs a storage call, cancelling it after `limit` if one is set.
///
/// A cancelled call is reported as [`StorageError::Timeout`].
pub(crate) async fn bounded_call<T>(
    limit: Option<Duration>,
    call: impl Future<Output = StorageResult<T>>,
) -> StorageResult<T> {
    let Some(limit) = limit else {
        return call.await;
    };
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout {
            duration_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }),
    }
}

//! Configuration for the saver and the resolver.

use std::time::Duration;

use crate::chunk::validate_chunk_size;
use crate::error::{DomainError, DomainResult};

/// Configuration for the buffering [`Saver`](crate::saver::Saver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaverConfig {
    /// Maximum number of buffered users. When full, the oldest is evicted.
    pub capacity: usize,
    /// Number of users per `create_users` call.
    pub chunk_size: usize,
    /// Period of the background flush.
    pub flush_interval: Duration,
    /// Upper bound on a single storage call. `None` waits indefinitely.
    pub chunk_timeout: Option<Duration>,
}

impl Default for SaverConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            chunk_size: 100,
            flush_interval: Duration::from_secs(1),
            chunk_timeout: None,
        }
    }
}

impl SaverConfig {
    /// Sets the buffer capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the write chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets the flush interval.
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Bounds every storage call made while flushing.
    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = Some(timeout);
        self
    }

    /// Rejects non-positive capacity, chunk size, interval or timeout.
    pub fn validate(&self) -> DomainResult<()> {
        if self.capacity == 0 {
            return Err(DomainError::invalid_configuration(
                "capacity must be greater than 0",
            ));
        }
        validate_chunk_size(self.chunk_size)?;
        if self.flush_interval.is_zero() {
            return Err(DomainError::invalid_configuration(
                "flush interval must be greater than 0",
            ));
        }
        validate_timeout(self.chunk_timeout)
    }
}

/// Configuration for the batch [`Resolver`](crate::resolver::Resolver).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Number of ids per `get_users` call.
    pub chunk_size: usize,
    /// Maximum number of chunk fetches in flight. 1 fetches strictly in order.
    pub concurrency: usize,
    /// Upper bound on a single storage call. `None` waits indefinitely.
    pub chunk_timeout: Option<Duration>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            concurrency: 1,
            chunk_timeout: None,
        }
    }
}

impl ResolverConfig {
    /// Sets the read chunk size.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Sets how many chunks may be fetched concurrently.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Bounds every storage call made while resolving.
    pub fn with_chunk_timeout(mut self, timeout: Duration) -> Self {
        self.chunk_timeout = Some(timeout);
        self
    }

    /// Rejects a non-positive chunk size, concurrency or timeout.
    pub fn validate(&self) -> DomainResult<()> {
        validate_chunk_size(self.chunk_size)?;
        if self.concurrency == 0 {
            return Err(DomainError::invalid_configuration(
                "concurrency must be greater than 0",
            ));
        }
        validate_timeout(self.chunk_timeout)
    }
}

fn validate_timeout(timeout: Option<Duration>) -> DomainResult<()> {
    match timeout {
        Some(t) if t.is_zero() => Err(DomainError::invalid_configuration(
            "chunk timeout must be greater than 0",
        )),
        _ => Ok(()),
    }
}

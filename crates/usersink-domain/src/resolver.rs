//! Batch lookup of users by id.
//!
//! [`Resolver::resolve`] splits the requested ids into chunks, fetches each
//! chunk with one `get_users` call and reconciles what came back against what
//! was asked for. Every requested id ends up either in
//! [`ResolveResult::found`] or in [`ResolveResult::errors`], never both.
//!
//! Read chunks are independent: a failed chunk marks only its own ids as
//! failed and the remaining chunks are still fetched.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tracing::{debug, warn};
use usersink_storage::{StorageError, StorageResult, User, UserId, UserStore};

use crate::bounded_call;
use crate::chunk::split_to_chunks;
use crate::config::ResolverConfig;
use crate::error::{DomainError, DomainResult};

/// Why a requested id is missing from [`ResolveResult::found`].
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The store returned the chunk but not this user.
    #[error("user not found")]
    NotFound,

    /// The chunk containing this id failed. Shared by every id of the chunk.
    #[error("storage failure: {0}")]
    Storage(#[source] Arc<StorageError>),
}

impl ResolveError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ResolveError::NotFound)
    }

    pub fn is_storage_failure(&self) -> bool {
        matches!(self, ResolveError::Storage(_))
    }
}

/// Reconciled outcome of a batch lookup.
#[derive(Debug, Clone, Default)]
pub struct ResolveResult {
    /// Users that were found, each once, in no guaranteed order.
    pub found: Vec<User>,
    /// Requested ids that were not found, with the reason.
    pub errors: HashMap<UserId, ResolveError>,
}

impl ResolveResult {
    /// Whether every requested id was found.
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Ids of the found users.
    pub fn found_ids(&self) -> HashSet<UserId> {
        self.found.iter().map(|u| u.id).collect()
    }

    /// Found user with the given id.
    pub fn get(&self, id: UserId) -> Option<&User> {
        self.found.iter().find(|u| u.id == id)
    }

    fn record_found(&mut self, user: User, seen: &mut HashSet<UserId>) {
        // A duplicate id that already failed in an earlier chunk now counts as found.
        self.errors.remove(&user.id);
        if seen.insert(user.id) {
            self.found.push(user);
        }
    }

    fn record_error(&mut self, id: UserId, error: ResolveError, seen: &HashSet<UserId>) {
        if !seen.contains(&id) {
            self.errors.entry(id).or_insert(error);
        }
    }
}

/// Resolves batches of user ids against a [`UserStore`].
#[derive(Debug)]
pub struct Resolver<S> {
    store: Arc<S>,
    config: ResolverConfig,
}

impl<S: UserStore> Resolver<S> {
    /// Creates a resolver. Invalid configuration is rejected here.
    pub fn new(store: Arc<S>, config: ResolverConfig) -> DomainResult<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// The active configuration.
    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Looks up `ids` chunk by chunk and reconciles the results.
    ///
    /// Up to `concurrency` chunks are fetched at once; results are applied in
    /// request chunk order. Duplicate ids are not removed before chunking.
    pub async fn resolve(&self, ids: &[UserId]) -> DomainResult<ResolveResult> {
        let chunks = split_to_chunks(Some(ids), self.config.chunk_size)?;
        let chunk_count = chunks.len();

        let mut result = ResolveResult {
            found: Vec::with_capacity(ids.len()),
            errors: HashMap::new(),
        };
        let mut seen = HashSet::with_capacity(ids.len());

        let mut fetches = stream::iter(chunks)
            .map(|chunk| async move { (chunk, self.fetch_chunk(chunk).await) })
            .buffered(self.config.concurrency);

        let mut index = 0;
        while let Some((chunk, fetched)) = fetches.next().await {
            match fetched {
                Ok(users) => reconcile(&mut result, &mut seen, chunk, users),
                Err(e) => {
                    warn!(
                        chunk = index,
                        chunk_count,
                        ids = chunk.len(),
                        error = %e,
                        "chunk fetch failed, marking its ids as failed"
                    );
                    let cause = Arc::new(e);
                    for id in chunk {
                        result.record_error(*id, ResolveError::Storage(Arc::clone(&cause)), &seen);
                    }
                }
            }
            index += 1;
        }

        debug!(
            requested = ids.len(),
            found = result.found.len(),
            errors = result.errors.len(),
            "resolve finished"
        );
        Ok(result)
    }

    /// Resolves a single id.
    pub async fn resolve_one(&self, id: UserId) -> DomainResult<User> {
        let mut result = self.resolve(&[id]).await?;
        if let Some(user) = result.found.pop() {
            return Ok(user);
        }
        match result.errors.remove(&id) {
            Some(ResolveError::Storage(cause)) => Err(DomainError::Storage(
                Arc::try_unwrap(cause).unwrap_or_else(|shared| StorageError::InternalError {
                    message: shared.to_string(),
                }),
            )),
            _ => Err(DomainError::NotFound { id }),
        }
    }

    async fn fetch_chunk(&self, chunk: &[UserId]) -> StorageResult<Vec<User>> {
        bounded_call(self.config.chunk_timeout, self.store.get_users(chunk)).await
    }
}

fn reconcile(
    result: &mut ResolveResult,
    seen: &mut HashSet<UserId>,
    requested: &[UserId],
    returned: Vec<User>,
) {
    let requested_set: HashSet<UserId> = requested.iter().copied().collect();
    let mut returned_ids = HashSet::with_capacity(returned.len());

    for user in returned {
        if !requested_set.contains(&user.id) {
            debug!(user_id = user.id, "store returned an id that was not requested, ignoring");
            continue;
        }
        returned_ids.insert(user.id);
        result.record_found(user, seen);
    }

    for id in requested {
        if !returned_ids.contains(id) {
            result.record_error(*id, ResolveError::NotFound, seen);
        }
    }
}

//! Assembles the saver and resolver over one shared store.

use std::sync::Arc;

use tracing::info;
use usersink_domain::{DomainResult, FlushOutcome, Resolver, Saver};
use usersink_storage::{MemoryUserStore, UserStore};

use crate::config::ServiceConfig;

/// A configured write buffer and batch resolver sharing one store.
pub struct Pipeline<S> {
    store: Arc<S>,
    saver: Arc<Saver<S>>,
    resolver: Resolver<S>,
}

impl Pipeline<MemoryUserStore> {
    /// Builds a pipeline over a fresh in-memory store.
    pub fn in_memory(config: &ServiceConfig) -> DomainResult<Self> {
        Self::new(MemoryUserStore::new_shared(), config)
    }
}

impl<S: UserStore> Pipeline<S> {
    /// Builds the saver and resolver from `config` over `store`.
    pub fn new(store: Arc<S>, config: &ServiceConfig) -> DomainResult<Self> {
        let saver = Saver::new(Arc::clone(&store), config.saver.to_saver_config())?;
        let resolver = Resolver::new(Arc::clone(&store), config.resolver.to_resolver_config())?;

        Ok(Self {
            store,
            saver: Arc::new(saver),
            resolver,
        })
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Shared handle to the saver, for producers.
    pub fn saver(&self) -> Arc<Saver<S>> {
        Arc::clone(&self.saver)
    }

    pub fn resolver(&self) -> &Resolver<S> {
        &self.resolver
    }

    /// Starts background flushing.
    pub fn start(&self) -> DomainResult<()> {
        self.saver.start()?;
        info!(
            capacity = self.saver.capacity(),
            "user pipeline started"
        );
        Ok(())
    }

    /// Stops background flushing after a final flush.
    pub async fn shutdown(&self) -> FlushOutcome {
        let outcome = self.saver.stop().await;
        info!(
            persisted = outcome.persisted,
            buffered = self.saver.len(),
            evicted = self.saver.evicted_count(),
            "user pipeline stopped"
        );
        outcome
    }
}

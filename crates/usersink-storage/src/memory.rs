//! In-memory storage implementation for testing and single-process use.
//!
//! Users live in a `DashMap` keyed by id. Ids come from a monotonically
//! increasing counter starting at 1, so a store never hands out `0`, which is
//! reserved for "not yet persisted".

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, instrument};

use crate::error::{StorageError, StorageResult};
use crate::traits::{validate_user, User, UserId, UserSearchParams, UserSearchResult, UserStore};

/// In-memory implementation of UserStore.
///
/// # Performance Characteristics
///
/// - **Create / get / update / remove**: O(1) average (DashMap)
/// - **Batch get**: O(K) for K requested ids
/// - **Search**: O(N log N) where N is the number of stored users
#[derive(Debug)]
pub struct MemoryUserStore {
    users: DashMap<UserId, User>,
    next_id: AtomicU64,
}

impl Default for MemoryUserStore {
    fn default() -> Self {
        Self {
            users: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl MemoryUserStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of stored users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether the store holds no users.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// All stored users ordered by id.
    pub fn all_users(&self) -> Vec<User> {
        let mut users: Vec<User> = self.users.iter().map(|u| u.value().clone()).collect();
        users.sort_by_key(|u| u.id);
        users
    }

    fn allocate_ids(&self, count: usize) -> UserId {
        self.next_id.fetch_add(count as u64, Ordering::Relaxed)
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    #[instrument(skip(self, user))]
    async fn create_user(&self, user: &User) -> StorageResult<UserId> {
        validate_user(user)?;

        let id = self.allocate_ids(1);
        self.users.insert(
            id,
            User {
                id,
                ..user.clone()
            },
        );
        Ok(id)
    }

    async fn get_user(&self, id: UserId) -> StorageResult<Option<User>> {
        Ok(self.users.get(&id).map(|u| u.value().clone()))
    }

    #[instrument(skip(self, user), fields(user_id = user.id))]
    async fn update_user(&self, user: &User) -> StorageResult<bool> {
        validate_user(user)?;

        match self.users.get_mut(&user.id) {
            Some(mut entry) => {
                *entry = user.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_user(&self, id: UserId) -> StorageResult<bool> {
        Ok(self.users.remove(&id).is_some())
    }

    #[instrument(skip(self, users), fields(count = users.len()))]
    async fn create_users(&self, users: &[User]) -> StorageResult<Vec<UserId>> {
        // Validate the whole batch before inserting anything so a bad record
        // leaves the store untouched.
        for (index, user) in users.iter().enumerate() {
            validate_user(user).map_err(|e| match e {
                StorageError::InvalidInput { message } => StorageError::InvalidInput {
                    message: format!("user at index {index}: {message}"),
                },
                other => other,
            })?;
        }

        if users.is_empty() {
            return Ok(Vec::new());
        }

        let first = self.allocate_ids(users.len());
        let ids: Vec<UserId> = (first..first + users.len() as u64).collect();
        for (id, user) in ids.iter().zip(users) {
            self.users.insert(
                *id,
                User {
                    id: *id,
                    ..user.clone()
                },
            );
        }

        debug!(first_id = first, count = ids.len(), "stored user batch");
        Ok(ids)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn get_users(&self, ids: &[UserId]) -> StorageResult<Vec<User>> {
        // Like `WHERE id IN (...)`: each existing user is returned once even
        // if requested several times.
        let mut seen = HashSet::with_capacity(ids.len());
        Ok(ids
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| self.users.get(id).map(|u| u.value().clone()))
            .collect())
    }

    async fn search_users(&self, params: UserSearchParams) -> StorageResult<UserSearchResult> {
        let mut items: Vec<User> = self
            .users
            .iter()
            .filter(|u| *u.key() > params.offset)
            .map(|u| u.value().clone())
            .collect();
        items.sort_by_key(|u| u.id);
        items.truncate(usize::try_from(params.limit).unwrap_or(usize::MAX));

        let next_offset = items.last().map_or(params.offset, |u| u.id);
        Ok(UserSearchResult { items, next_offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> User {
        User::new(name, format!("{name}@example.com"))
    }

    // Test: MemoryUserStore can be created
    #[tokio::test]
    async fn test_memory_store_can_be_created() {
        let store = MemoryUserStore::new();
        assert!(store.is_empty());
        let page = store
            .search_users(UserSearchParams {
                limit: 10,
                offset: 0,
            })
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.next_offset, 0);
    }

    // Test: MemoryUserStore can be shared through an Arc
    #[tokio::test]
    async fn test_memory_store_shared() {
        let store = MemoryUserStore::new_shared();
        let id = store.create_user(&user("alice")).await.unwrap();

        let store2 = Arc::clone(&store);
        let retrieved = store2.get_user(id).await.unwrap().unwrap();
        assert_eq!(retrieved.name, "alice");
    }

    #[tokio::test]
    async fn test_create_assigns_nonzero_increasing_ids() {
        let store = MemoryUserStore::new();
        let a = store.create_user(&user("alice")).await.unwrap();
        let b = store.create_user(&user("bob")).await.unwrap();

        assert_eq!(a, 1);
        assert!(b > a);
        assert_eq!(store.get_user(b).await.unwrap().unwrap().id, b);
    }

    #[tokio::test]
    async fn test_create_users_returns_ids_in_input_order() {
        let store = MemoryUserStore::new();
        let ids = store
            .create_users(&[user("a"), user("b"), user("c")])
            .await
            .unwrap();

        assert_eq!(ids.len(), 3);
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        let stored = store.all_users();
        let names: Vec<_> = stored.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_create_users_is_all_or_nothing() {
        let store = MemoryUserStore::new();
        let batch = vec![user("a"), User::new("", "nobody@example.com"), user("c")];

        let err = store.create_users(&batch).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidInput { .. }));
        assert!(err.to_string().contains("index 1"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_create_users_with_empty_batch() {
        let store = MemoryUserStore::new();
        assert!(store.create_users(&[]).await.unwrap().is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_get_users_returns_existing_subset() {
        let store = MemoryUserStore::new();
        let ids = store.create_users(&[user("a"), user("b")]).await.unwrap();

        let found = store.get_users(&[ids[1], 999, ids[0]]).await.unwrap();
        let found_ids: Vec<_> = found.iter().map(|u| u.id).collect();
        assert_eq!(found_ids, vec![ids[1], ids[0]]);
    }

    #[tokio::test]
    async fn test_get_users_collapses_duplicate_ids() {
        let store = MemoryUserStore::new();
        let id = store.create_user(&user("a")).await.unwrap();

        let found = store.get_users(&[id, id]).await.unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_remove_report_existence() {
        let store = MemoryUserStore::new();
        let id = store.create_user(&user("alice")).await.unwrap();

        let renamed = user("alicia").with_id(id);
        assert!(store.update_user(&renamed).await.unwrap());
        assert_eq!(store.get_user(id).await.unwrap().unwrap().name, "alicia");
        assert!(!store.update_user(&user("ghost").with_id(999)).await.unwrap());

        assert!(store.remove_user(id).await.unwrap());
        assert!(!store.remove_user(id).await.unwrap());
        assert!(store.get_user(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_search_users_paginates_by_id() {
        let store = MemoryUserStore::new();
        let batch: Vec<User> = (0..5).map(|i| user(&format!("u{i}"))).collect();
        let ids = store.create_users(&batch).await.unwrap();

        let first = store
            .search_users(UserSearchParams {
                limit: 2,
                offset: 0,
            })
            .await
            .unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_offset, ids[1]);

        let rest = store
            .search_users(UserSearchParams {
                limit: 10,
                offset: first.next_offset,
            })
            .await
            .unwrap();
        let rest_ids: Vec<_> = rest.items.iter().map(|u| u.id).collect();
        assert_eq!(rest_ids, ids[2..].to_vec());
        assert_eq!(rest.next_offset, ids[4]);
    }

    #[tokio::test]
    async fn test_concurrent_batch_creates_get_distinct_ids() {
        let store = MemoryUserStore::new_shared();
        let mut handles = Vec::new();

        for task in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let batch: Vec<User> = (0..10).map(|i| user(&format!("t{task}-{i}"))).collect();
                store.create_users(&batch).await.unwrap()
            }));
        }

        let mut all_ids = HashSet::new();
        for handle in handles {
            for id in handle.await.unwrap() {
                assert!(all_ids.insert(id), "id {id} handed out twice");
            }
        }
        assert_eq!(store.len(), 80);
    }
}

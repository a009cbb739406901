//! Pipeline Integration Tests.
//!
//! These tests run the saver and the resolver together against the
//! in-memory store: users go in through the buffer, come out through a
//! batch lookup.

use std::sync::Arc;
use std::time::Duration;

use usersink_domain::{ResolverConfig, Resolver, Saver, SaverConfig};
use usersink_storage::{MemoryUserStore, User, UserId, UserSearchParams, UserStore};

fn user(i: usize) -> User {
    User::new(format!("user-{i}"), format!("user-{i}@example.com")).with_refs(i as u64, 0)
}

async fn all_ids(store: &MemoryUserStore) -> Vec<UserId> {
    store
        .search_users(UserSearchParams {
            limit: u64::MAX,
            offset: 0,
        })
        .await
        .unwrap()
        .items
        .into_iter()
        .map(|u| u.id)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_saved_users_are_flushed_and_resolvable() {
    let store = MemoryUserStore::new_shared();
    let saver = Arc::new(
        Saver::new(
            Arc::clone(&store),
            SaverConfig::default()
                .with_capacity(100)
                .with_chunk_size(7)
                .with_flush_interval(Duration::from_millis(50)),
        )
        .unwrap(),
    );
    saver.start().unwrap();

    let mut producers = Vec::new();
    for task in 0..4 {
        let saver = Arc::clone(&saver);
        producers.push(tokio::spawn(async move {
            for i in 0..10 {
                saver.save(user(task * 10 + i));
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }));
    }
    for producer in producers {
        producer.await.unwrap();
    }

    let outcome = saver.stop().await;
    assert!(outcome.is_complete());
    assert!(saver.is_empty());
    assert_eq!(store.len(), 40);
    assert_eq!(saver.evicted_count(), 0);

    let resolver = Resolver::new(
        Arc::clone(&store),
        ResolverConfig::default().with_chunk_size(6),
    )
    .unwrap();
    let mut ids = all_ids(&store).await;
    ids.push(10_000);

    let result = resolver.resolve(&ids).await.unwrap();
    assert_eq!(result.found.len(), 40);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[&10_000].is_not_found());
}

#[tokio::test]
async fn test_overflow_keeps_newest_users() {
    let store = MemoryUserStore::new_shared();
    let saver = Saver::new(
        Arc::clone(&store),
        SaverConfig::default().with_capacity(3).with_chunk_size(2),
    )
    .unwrap();

    for i in 0..5 {
        saver.save(user(i));
    }
    assert_eq!(saver.evicted_count(), 2);

    saver.stop().await;
    let names: Vec<String> = store.all_users().into_iter().map(|u| u.name).collect();
    assert_eq!(names, vec!["user-2", "user-3", "user-4"]);
}

#[tokio::test]
async fn test_invalid_users_stay_buffered_after_stop() {
    let store = MemoryUserStore::new_shared();
    let saver = Saver::new(
        Arc::clone(&store),
        SaverConfig::default().with_capacity(10).with_chunk_size(2),
    )
    .unwrap();

    saver.save(user(0));
    saver.save(user(1));
    // The store rejects the chunk holding this record.
    saver.save(User::new("", "broken@example.com"));
    saver.save(user(3));

    let outcome = saver.stop().await;

    assert_eq!(outcome.persisted, 2);
    assert_eq!(saver.len(), 2);
    assert_eq!(store.len(), 2);
    assert_eq!(saver.snapshot()[1].name, "user-3");
}

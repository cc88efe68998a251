//! Behavioural checks shared by every backend's test module

use crate::state::Namespace;
use crate::storage::Storage;
use std::collections::HashSet;

const U1: &str = "http://x.test/u1";
const U2: &str = "http://x.test/u2";
const U3: &str = "http://x.test/u3";

/// Runs every check against `store`, flushing it first
pub(crate) async fn run_all(store: &dyn Storage) {
    store.ping().await.unwrap();

    store.flush_all().await.unwrap();
    insertion_is_idempotent(store).await;

    store.flush_all().await.unwrap();
    forced_insert_moves_url(store).await;

    store.flush_all().await.unwrap();
    transitions_keep_namespaces_disjoint(store).await;

    store.flush_all().await.unwrap();
    concurrent_claims_never_overlap(store).await;

    store.flush_all().await.unwrap();
    redo_recovers_doing_and_trash(store).await;

    store.flush_all().await.unwrap();
    done_map_and_flush(store).await;

    settings_round_trip(store).await;
    store.flush_all().await.unwrap();
}

async fn insertion_is_idempotent(store: &dyn Storage) {
    assert!(store.insert_todo(U1, false).await.unwrap());
    assert!(!store.insert_todo(U1, false).await.unwrap());
    assert_eq!(store.size(Namespace::Todo).await.unwrap(), 1);

    store.claim_batch(1).await.unwrap();
    store.mark_done(U1, "{}").await.unwrap();
    assert!(!store.insert_todo(U1, false).await.unwrap());
    assert_eq!(store.namespace_of(U1).await.unwrap(), Some(Namespace::Done));
    assert!(store.exists_anywhere(U1).await.unwrap());
    assert!(!store.exists_anywhere(U2).await.unwrap());
}

async fn forced_insert_moves_url(store: &dyn Storage) {
    store.insert_todo(U1, false).await.unwrap();
    store.claim_batch(1).await.unwrap();
    store.mark_trash(U1).await.unwrap();

    assert!(store.insert_todo(U1, true).await.unwrap());
    assert_eq!(store.namespace_of(U1).await.unwrap(), Some(Namespace::Todo));
    assert_eq!(store.size(Namespace::Trash).await.unwrap(), 0);
}

async fn transitions_keep_namespaces_disjoint(store: &dyn Storage) {
    for url in [U1, U2, U3] {
        store.insert_todo(url, false).await.unwrap();
    }
    let claimed = store.claim_batch(10).await.unwrap();
    assert_eq!(claimed.len(), 3);
    assert_eq!(store.size(Namespace::Todo).await.unwrap(), 0);
    assert_eq!(store.size(Namespace::Doing).await.unwrap(), 3);

    store.mark_done(U1, "result").await.unwrap();
    store.mark_trash(U2).await.unwrap();
    store.requeue(U3).await.unwrap();

    assert_eq!(store.namespace_of(U1).await.unwrap(), Some(Namespace::Done));
    assert_eq!(store.namespace_of(U2).await.unwrap(), Some(Namespace::Trash));
    assert_eq!(store.namespace_of(U3).await.unwrap(), Some(Namespace::Todo));

    let mut total = 0;
    for ns in Namespace::ALL {
        total += store.size(ns).await.unwrap();
    }
    assert_eq!(total, 3);
}

async fn concurrent_claims_never_overlap(store: &dyn Storage) {
    for i in 0..40 {
        store
            .insert_todo(&format!("http://x.test/p{}", i), false)
            .await
            .unwrap();
    }

    let (a, b) = tokio::join!(store.claim_batch(25), store.claim_batch(25));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.len() + b.len(), 40);

    let seen: HashSet<&String> = a.iter().chain(b.iter()).collect();
    assert_eq!(seen.len(), 40);
    assert!(store.claim_batch(5).await.unwrap().is_empty());
}

async fn redo_recovers_doing_and_trash(store: &dyn Storage) {
    store.insert_todo(U1, false).await.unwrap();
    store.insert_todo(U2, false).await.unwrap();
    store.claim_batch(2).await.unwrap();
    store.mark_trash(U2).await.unwrap();

    assert_eq!(store.recover_all().await.unwrap(), 2);

    let mut todo = store.enumerate(Namespace::Todo).await.unwrap();
    todo.sort();
    assert_eq!(todo, vec![U1.to_string(), U2.to_string()]);
    assert_eq!(store.size(Namespace::Doing).await.unwrap(), 0);
    assert_eq!(store.size(Namespace::Trash).await.unwrap(), 0);
}

async fn done_map_and_flush(store: &dyn Storage) {
    store.insert_todo(U1, false).await.unwrap();
    store.insert_todo(U2, false).await.unwrap();
    store.claim_batch(2).await.unwrap();
    store.mark_done(U1, r#"{"title":"one"}"#).await.unwrap();
    store.mark_done(U2, "").await.unwrap();

    let done = store.enumerate_done_as_map().await.unwrap();
    assert_eq!(done.len(), 2);
    assert_eq!(done[U1], r#"{"title":"one"}"#);
    assert_eq!(done[U2], "");

    store.flush_all().await.unwrap();
    for ns in Namespace::ALL {
        assert_eq!(store.size(ns).await.unwrap(), 0);
    }
}

async fn settings_round_trip(store: &dyn Storage) {
    store.put_settings("first").await.unwrap();
    store.put_settings("second").await.unwrap();
    assert_eq!(store.get_settings().await.unwrap().as_deref(), Some("second"));
}

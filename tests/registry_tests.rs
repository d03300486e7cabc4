//! Integration tests for the registry coordinator
//!
//! Exercises create/update/delete end to end against the SQLite store, with
//! injected failures on the display surface, the store and the allocator.

use async_trait::async_trait;
use character_registry::display::SurfaceOp;
use character_registry::storage::Result as StorageResult;
use character_registry::{
    AccessGuard, AdminCommand, CatalogRecord, CharacterId, Dispatcher, FieldUpdate,
    LocalStorage, MemoryDisplay, MemorySequence, MemoryStore, MirrorStatus, NewCharacter, Rarity,
    RecordField, RecordStore, RegistryCoordinator, RegistryError, SequenceAllocator, StaticProbe,
    StorageError, CHARACTER_SEQUENCE,
};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;

// ============================================================================
// TEST HELPERS
// ============================================================================

/// Store wrapper whose writes can be switched off
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_insert: AtomicBool,
    fail_link: AtomicBool,
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn insert(&self, record: &CatalogRecord) -> StorageResult<()> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(StorageError::Database("connection reset".to_string()));
        }
        self.inner.insert(record).await
    }

    async fn get(&self, id: &CharacterId) -> StorageResult<Option<CatalogRecord>> {
        self.inner.get(id).await
    }

    async fn update_field(
        &self,
        id: &CharacterId,
        field: &RecordField,
    ) -> StorageResult<Option<CatalogRecord>> {
        if matches!(field, RecordField::ExternalRef(_)) && self.fail_link.load(Ordering::SeqCst) {
            return Err(StorageError::Database("connection reset".to_string()));
        }
        self.inner.update_field(id, field).await
    }

    async fn delete_by_id(&self, id: &CharacterId) -> StorageResult<Option<CatalogRecord>> {
        self.inner.delete_by_id(id).await
    }
}

/// Allocator that counts calls and can be made unreachable
#[derive(Default)]
struct CountingSequence {
    inner: MemorySequence,
    calls: AtomicUsize,
    down: AtomicBool,
}

#[async_trait]
impl SequenceAllocator for CountingSequence {
    async fn allocate(&self, name: &str) -> StorageResult<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.down.load(Ordering::SeqCst) {
            return Err(StorageError::Database("counter store unreachable".to_string()));
        }
        self.inner.allocate(name).await
    }
}

fn muzan() -> NewCharacter {
    NewCharacter::parse("https://x/a.png", "muzan-kibutsuji", "demon-slayer", "3").unwrap()
}

fn sqlite_coordinator(storage: &LocalStorage, display: Arc<MemoryDisplay>) -> RegistryCoordinator {
    RegistryCoordinator::new(
        Arc::new(storage.clone()),
        Arc::new(storage.clone()),
        display,
        Arc::new(StaticProbe(true)),
    )
}

// ============================================================================
// CREATE
// ============================================================================

#[tokio::test]
async fn test_create_example_end_to_end() {
    let dir = tempdir().expect("Failed to create temp dir");
    let storage = LocalStorage::open(dir.path().join("registry.db")).unwrap();
    let display = Arc::new(MemoryDisplay::new());
    let coordinator = sqlite_coordinator(&storage, display.clone());

    let first = coordinator.create(muzan()).await.unwrap();
    assert_eq!(first.mirror, MirrorStatus::Synced);

    let stored = coordinator.get(&CharacterId::new("00")).await.unwrap();
    assert_eq!(stored.id.as_str(), "00");
    assert_eq!(stored.image_url, "https://x/a.png");
    assert_eq!(stored.display_name, "Muzan Kibutsuji");
    assert_eq!(stored.group_name, "Demon Slayer");
    assert_eq!(stored.rarity, Rarity::Legendary);
    assert_eq!(stored.rarity.label(), "Legendary");
    assert!(stored.external_ref.is_some());

    let post = display.post(stored.external_ref.as_ref().unwrap()).unwrap();
    assert_eq!(post.image_url, "https://x/a.png");
    assert!(post.caption.contains("Muzan Kibutsuji"));

    let second = coordinator.create(muzan()).await.unwrap();
    assert_eq!(second.record.id.as_str(), "01");
}

#[tokio::test]
async fn test_create_publish_failure_keeps_record() {
    let storage = LocalStorage::in_memory().unwrap();
    let display = Arc::new(MemoryDisplay::new());
    display.set_failing(SurfaceOp::Publish, true);
    let coordinator = sqlite_coordinator(&storage, display.clone());

    let outcome = coordinator.create(muzan()).await.unwrap();
    assert!(outcome.is_partial());
    match &outcome.mirror {
        MirrorStatus::Failed { reason } => assert!(reason.starts_with("saved, not shown")),
        other => panic!("Expected failed mirror, got {:?}", other),
    }

    let stored = coordinator.get(&outcome.record.id).await.unwrap();
    assert!(stored.external_ref.is_none());
    assert_eq!(display.post_count(), 0);
}

#[tokio::test]
async fn test_insert_failure_burns_id() {
    let store = Arc::new(FlakyStore::default());
    let coordinator = RegistryCoordinator::new(
        Arc::new(MemorySequence::new()),
        store.clone(),
        Arc::new(MemoryDisplay::new()),
        Arc::new(StaticProbe(true)),
    );

    store.fail_insert.store(true, Ordering::SeqCst);
    let err = coordinator.create(muzan()).await.unwrap_err();
    assert!(matches!(err, RegistryError::StoreUnavailable(_)), "{:?}", err);

    store.fail_insert.store(false, Ordering::SeqCst);
    let outcome = coordinator.create(muzan()).await.unwrap();
    assert_eq!(outcome.record.id.as_str(), "01");
    assert!(coordinator.get(&CharacterId::new("00")).await.is_err());
}

#[tokio::test]
async fn test_unsaved_reference_retracts_orphan_post() {
    let store = Arc::new(FlakyStore::default());
    let display = Arc::new(MemoryDisplay::new());
    let coordinator = RegistryCoordinator::new(
        Arc::new(MemorySequence::new()),
        store.clone(),
        display.clone(),
        Arc::new(StaticProbe(true)),
    );

    store.fail_link.store(true, Ordering::SeqCst);
    let outcome = coordinator.create(muzan()).await.unwrap();

    assert!(outcome.is_partial());
    assert!(outcome.record.external_ref.is_none());
    assert_eq!(display.post_count(), 0);
    assert!(coordinator.get(&outcome.record.id).await.is_ok());
}

#[tokio::test]
async fn test_allocator_down_is_store_unavailable() {
    let sequences = Arc::new(CountingSequence::default());
    sequences.down.store(true, Ordering::SeqCst);
    let store = Arc::new(MemoryStore::new());
    let coordinator = RegistryCoordinator::new(
        sequences.clone(),
        store.clone(),
        Arc::new(MemoryDisplay::new()),
        Arc::new(StaticProbe(true)),
    );

    let err = coordinator.create(muzan()).await.unwrap_err();
    assert!(matches!(err, RegistryError::StoreUnavailable(_)));
    assert!(store.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_creates_get_distinct_ids() {
    let storage = LocalStorage::in_memory().unwrap();
    let coordinator = Arc::new(sqlite_coordinator(&storage, Arc::new(MemoryDisplay::new())));

    let mut handles = Vec::new();
    for _ in 0..40 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move {
            coordinator.create(muzan()).await.unwrap().record.id
        }));
    }

    let mut ids = HashSet::new();
    for handle in handles {
        assert!(ids.insert(handle.await.unwrap()), "duplicate id issued");
    }
    assert_eq!(ids.len(), 40);
    assert!(ids.contains(&CharacterId::new("00")));
    assert!(ids.contains(&CharacterId::new("39")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sqlite_allocations_distinct_across_handles() {
    let dir = tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("registry.db");
    let storage = LocalStorage::open(&path).unwrap();

    let handles = (0..100).map(|_| {
        let storage = storage.clone();
        tokio::spawn(async move { storage.allocate(CHARACTER_SEQUENCE).await.unwrap() })
    });
    let values = join_all(handles).await;

    let mut seen = HashSet::new();
    for value in values {
        assert!(seen.insert(value.unwrap()));
    }
    assert_eq!(seen.len(), 100);
    assert_eq!(storage.sequence_value(CHARACTER_SEQUENCE).unwrap(), Some(99));

    // counters survive a reopen
    drop(storage);
    let reopened = LocalStorage::open(&path).unwrap();
    assert_eq!(reopened.allocate(CHARACTER_SEQUENCE).await.unwrap(), 100);
}

// ============================================================================
// UPDATE
// ============================================================================

#[tokio::test]
async fn test_update_rarity_changes_only_rarity() {
    let storage = LocalStorage::in_memory().unwrap();
    let coordinator = sqlite_coordinator(&storage, Arc::new(MemoryDisplay::new()));
    let created = coordinator.create(muzan()).await.unwrap().record;

    let update = FieldUpdate::parse("rarity", "1").unwrap();
    let outcome = coordinator.update(&created.id, update).await.unwrap();
    assert_eq!(outcome.mirror, MirrorStatus::Synced);

    let stored = coordinator.get(&created.id).await.unwrap();
    assert_eq!(stored.rarity, Rarity::Common);
    assert_eq!(stored.id, created.id);
    assert_eq!(stored.image_url, created.image_url);
    assert_eq!(stored.display_name, created.display_name);
    assert_eq!(stored.group_name, created.group_name);
    assert_eq!(stored.external_ref, created.external_ref);
}

#[tokio::test]
async fn test_invalid_rarity_rejected_without_mutation() {
    let storage = LocalStorage::in_memory().unwrap();
    let coordinator = Arc::new(sqlite_coordinator(&storage, Arc::new(MemoryDisplay::new())));
    let dispatcher = Dispatcher::new(AccessGuard::with_sudo_users(["1"]), coordinator.clone());
    let created = coordinator.create(muzan()).await.unwrap().record;

    for bad in ["0", "6", "x"] {
        let err = FieldUpdate::parse("rarity", bad).unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));

        let reply = dispatcher
            .handle_text("1", &format!("/update {} rarity {}", created.id, bad))
            .await;
        assert!(reply.starts_with("Invalid input"), "{}", reply);
    }

    assert_eq!(coordinator.get(&created.id).await.unwrap(), created);
}

#[tokio::test]
async fn test_update_caption_failure_is_partial_store_authoritative() {
    let storage = LocalStorage::in_memory().unwrap();
    let display = Arc::new(MemoryDisplay::new());
    let coordinator = sqlite_coordinator(&storage, display.clone());
    let created = coordinator.create(muzan()).await.unwrap().record;

    display.set_failing(SurfaceOp::EditCaption, true);
    let outcome = coordinator
        .update(&created.id, FieldUpdate::Name("Kokushibo".to_string()))
        .await
        .unwrap();
    assert!(outcome.is_partial());

    let stored = coordinator.get(&created.id).await.unwrap();
    assert_eq!(stored.display_name, "Kokushibo");
    assert_eq!(stored.external_ref, created.external_ref);

    // a later update re-attempts the mirror
    display.set_failing(SurfaceOp::EditCaption, false);
    let outcome = coordinator
        .update(&created.id, FieldUpdate::Anime("Kimetsu No Yaiba".to_string()))
        .await
        .unwrap();
    assert_eq!(outcome.mirror, MirrorStatus::Synced);
    let caption = display
        .post(created.external_ref.as_ref().unwrap())
        .unwrap()
        .caption;
    assert!(caption.contains("Kokushibo"));
    assert!(caption.contains("Kimetsu No Yaiba"));
}

#[tokio::test]
async fn test_image_replace_failure_clears_stale_reference() {
    let storage = LocalStorage::in_memory().unwrap();
    let display = Arc::new(MemoryDisplay::new());
    let coordinator = sqlite_coordinator(&storage, display.clone());
    let created = coordinator.create(muzan()).await.unwrap().record;

    display.set_failing(SurfaceOp::Publish, true);
    let outcome = coordinator
        .update(&created.id, FieldUpdate::ImageUrl("https://x/b.png".to_string()))
        .await
        .unwrap();
    assert!(outcome.is_partial());
    assert!(outcome.record.external_ref.is_none());

    // the old post is gone, so the store must not point at it
    let stored = coordinator.get(&created.id).await.unwrap();
    assert_eq!(stored.image_url, "https://x/b.png");
    assert!(stored.external_ref.is_none());
    assert!(display.post(created.external_ref.as_ref().unwrap()).is_none());
    assert_eq!(display.post_count(), 0);
}

#[tokio::test]
async fn test_update_unreachable_image_rejected() {
    let storage = LocalStorage::in_memory().unwrap();
    let display = Arc::new(MemoryDisplay::new());
    let created = sqlite_coordinator(&storage, display.clone())
        .create(muzan())
        .await
        .unwrap()
        .record;

    let offline = RegistryCoordinator::new(
        Arc::new(storage.clone()),
        Arc::new(storage.clone()),
        display,
        Arc::new(StaticProbe(false)),
    );
    let err = offline
        .update(&created.id, FieldUpdate::ImageUrl("https://x/dead.png".to_string()))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Validation(_)));
    assert_eq!(offline.get(&created.id).await.unwrap().image_url, "https://x/a.png");
}

// ============================================================================
// DELETE
// ============================================================================

#[tokio::test]
async fn test_delete_then_get_absent_and_second_delete_not_found() {
    let storage = LocalStorage::in_memory().unwrap();
    let display = Arc::new(MemoryDisplay::new());
    let coordinator = sqlite_coordinator(&storage, display.clone());
    let created = coordinator.create(muzan()).await.unwrap().record;

    let outcome = coordinator.delete(&created.id).await.unwrap();
    assert_eq!(outcome.record.id, created.id);
    assert_eq!(display.post_count(), 0);

    assert!(matches!(
        coordinator.get(&created.id).await,
        Err(RegistryError::NotFound(_))
    ));
    assert!(matches!(
        coordinator.delete(&created.id).await,
        Err(RegistryError::NotFound(_))
    ));

    // tombstoned ids are never reissued
    let next = coordinator.create(muzan()).await.unwrap();
    assert_eq!(next.record.id.as_str(), "01");
}

#[tokio::test]
async fn test_delete_unmirrored_skips_retract() {
    let storage = LocalStorage::in_memory().unwrap();
    let display = Arc::new(MemoryDisplay::new());
    display.set_failing(SurfaceOp::Publish, true);
    let coordinator = sqlite_coordinator(&storage, display.clone());
    let created = coordinator.create(muzan()).await.unwrap().record;

    display.set_failing(SurfaceOp::Retract, true);
    let outcome = coordinator.delete(&created.id).await.unwrap();
    assert_eq!(outcome.mirror, MirrorStatus::Skipped);
}

// ============================================================================
// ACCESS
// ============================================================================

#[tokio::test]
async fn test_unauthorized_touches_nothing() {
    let sequences = Arc::new(CountingSequence::default());
    let store = Arc::new(MemoryStore::new());
    let display = Arc::new(MemoryDisplay::new());
    let coordinator = Arc::new(RegistryCoordinator::new(
        sequences.clone(),
        store.clone(),
        display.clone(),
        Arc::new(StaticProbe(true)),
    ));
    let dispatcher = Dispatcher::new(AccessGuard::with_sudo_users(["admin"]), coordinator);

    let err = dispatcher
        .execute("intruder", AdminCommand::Upload(muzan()))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Unauthorized(_)));
    assert_eq!(sequences.calls.load(Ordering::SeqCst), 0);
    assert!(store.is_empty());
    assert_eq!(display.post_count(), 0);

    let err = dispatcher
        .execute("intruder", AdminCommand::Delete(CharacterId::new("00")))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Unauthorized(_)));
}

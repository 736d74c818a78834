use serde_json::{json, Value};

use stash_core::storage::{Fields, MemoryBackend, MemoryMirror};
use stash_core::{
    BootSource, DataChanged, EntityStore, FastBootMirror, MirrorPolicy, Schema, StashError,
};

type Store = EntityStore<MemoryBackend, MemoryMirror>;

fn fields(value: Value) -> Fields {
    value.as_object().cloned().expect("fields should be an object")
}

fn open(backend: &MemoryBackend, mirror: &MemoryMirror) -> Store {
    EntityStore::open(
        Schema::default(),
        backend.clone(),
        mirror.clone(),
        MirrorPolicy::default(),
    )
    .expect("open should succeed")
}

#[tokio::test]
async fn test_create_then_list_contains_record() {
    let store = open(&MemoryBackend::new(), &MemoryMirror::new());

    let record = store
        .create("accounts", fields(json!({"name": "Checking", "balance": 120.5})))
        .expect("create should succeed");

    let listed = store.list("accounts").expect("list should succeed");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0], record);
    assert!(!record.id.is_empty());
    assert_eq!(record.created_date, record.updated_date);
    assert_eq!(record.get("name"), Some(&json!("Checking")));
}

#[tokio::test]
async fn test_reserved_fields_ignored() {
    let store = open(&MemoryBackend::new(), &MemoryMirror::new());

    let record = store
        .create(
            "goals",
            fields(json!({"id": "mine", "created_date": "1999-01-01T00:00:00Z", "title": "Trip"})),
        )
        .expect("create should succeed");

    assert_ne!(record.id, "mine");
    assert!(record.get("created_date").is_none());
}

#[tokio::test]
async fn test_update_bumps_updated_date() {
    let store = open(&MemoryBackend::new(), &MemoryMirror::new());
    let record = store
        .create("budgets", fields(json!({"limit": 100})))
        .expect("create should succeed");

    let first = store
        .update("budgets", &record.id, fields(json!({"limit": 150})))
        .expect("update should succeed");
    let second = store
        .update("budgets", &record.id, fields(json!({"note": "tight"})))
        .expect("update should succeed");

    assert!(first.updated_date > record.updated_date);
    assert!(second.updated_date > first.updated_date);
    assert_eq!(second.created_date, record.created_date);
    assert_eq!(second.get("limit"), Some(&json!(150)));
    assert_eq!(second.get("note"), Some(&json!("tight")));
}

#[tokio::test]
async fn test_update_unknown_is_not_found_delete_unknown_is_noop() {
    let store = open(&MemoryBackend::new(), &MemoryMirror::new());

    let result = store.update("accounts", "missing", Fields::new());
    assert!(matches!(result, Err(StashError::NotFound(_))));

    store
        .delete("accounts", "missing")
        .expect("delete of unknown id should succeed");

    let record = store
        .create("accounts", Fields::new())
        .expect("create should succeed");
    store
        .delete("accounts", &record.id)
        .expect("delete should succeed");
    assert!(store.get("accounts", &record.id).unwrap().is_none());
}

#[tokio::test]
async fn test_mirror_matches_canonical_json_after_mutation() {
    let mirror = MemoryMirror::new();
    let store = open(&MemoryBackend::new(), &mirror);

    store
        .create("transactions", fields(json!({"amount": -4.2})))
        .expect("create should succeed");
    store
        .set_item("recap_date", json!("2024-06-01"))
        .expect("set_item should succeed");

    let payload = mirror.read().unwrap().expect("mirror should be written");
    assert_eq!(payload, store.canonical_json().unwrap());
}

#[tokio::test]
async fn test_oversized_snapshot_drops_mirror_and_boots_from_durable() {
    let backend = MemoryBackend::new();
    let mirror = MemoryMirror::new();
    let store = open(&backend, &mirror);

    store
        .create("documents", fields(json!({"title": "small"})))
        .expect("create should succeed");
    assert!(mirror.read().unwrap().is_some());

    let body = "x".repeat(6_000_000);
    store
        .create("documents", fields(json!({"title": "scan", "body": body})))
        .expect("create should succeed");
    assert!(mirror.read().unwrap().is_none());
    store.flush().await;

    let fresh = open(&backend, &mirror);
    assert_eq!(fresh.boot_source().unwrap(), BootSource::Defaults);
    assert!(fresh.list("documents").unwrap().is_empty());

    let source = fresh.reconcile().await.expect("reconcile should succeed");
    assert_eq!(source, BootSource::Durable);
    let documents = fresh.list("documents").unwrap();
    assert_eq!(documents.len(), 2);
    assert_eq!(
        documents[1].get("body").and_then(Value::as_str).map(str::len),
        Some(6_000_000)
    );
    assert!(mirror.read().unwrap().is_none());
}

#[tokio::test]
async fn test_boot_from_mirror_then_durable_wins() {
    let backend = MemoryBackend::with_value(json!({
        "accounts": [{"id": "durable", "name": "From disk"}]
    }));
    let mirror = MemoryMirror::with_payload(r#"{"accounts":[{"id":"cached","name":"Stale"}]}"#);

    let store = open(&backend, &mirror);
    assert_eq!(store.boot_source().unwrap(), BootSource::Mirror);
    assert!(store.get("accounts", "cached").unwrap().is_some());
    // Seeded defaults fill collections the mirror lacked.
    assert_eq!(store.list("settings").unwrap().len(), 1);

    store.reconcile().await.expect("reconcile should succeed");
    assert!(store.get("accounts", "cached").unwrap().is_none());
    assert!(store.get("accounts", "durable").unwrap().is_some());
    assert_eq!(mirror.read().unwrap(), Some(store.canonical_json().unwrap()));
}

#[tokio::test]
async fn test_corrupt_mirror_falls_back_to_defaults() {
    let mirror = MemoryMirror::with_payload("{not json");
    let store = open(&MemoryBackend::new(), &mirror);

    assert_eq!(store.boot_source().unwrap(), BootSource::Defaults);
    assert!(mirror.read().unwrap().is_none());
    assert_eq!(store.list("settings").unwrap().len(), 1);
}

#[tokio::test]
async fn test_corrupt_durable_keeps_snapshot() {
    let backend = MemoryBackend::with_value(json!(["not", "an", "object"]));
    let store = EntityStore::boot(
        Schema::default(),
        backend,
        MemoryMirror::new(),
        MirrorPolicy::default(),
    )
    .await
    .expect("boot should succeed");

    assert_eq!(store.boot_source().unwrap(), BootSource::Defaults);
}

#[tokio::test]
async fn test_failed_pushes_are_not_surfaced() {
    let backend = MemoryBackend::new();
    backend.set_fail_saves(true);
    let store = open(&backend, &MemoryMirror::new());

    let record = store
        .create("credentials", fields(json!({"site": "example.org"})))
        .expect("create should succeed despite failing backend");
    store.flush().await;

    assert!(backend.stored().await.is_none());
    assert!(store.get("credentials", &record.id).unwrap().is_some());

    backend.set_fail_saves(false);
    store
        .update("credentials", &record.id, fields(json!({"user": "me"})))
        .expect("update should succeed");
    store.flush().await;
    let stored = backend.stored().await.expect("next push should land");
    assert_eq!(stored["credentials"][0]["user"], json!("me"));
}

#[tokio::test]
async fn test_bulk_create_is_one_push() {
    let backend = MemoryBackend::new();
    let store = open(&backend, &MemoryMirror::new());

    let created = store
        .bulk_create(
            "subscriptions",
            vec![fields(json!({"name": "Music"})), fields(json!({"name": "Video"}))],
        )
        .expect("bulk_create should succeed");
    store.flush().await;

    assert_eq!(created.len(), 2);
    assert_eq!(backend.save_count(), 1);
    assert_eq!(store.list("subscriptions").unwrap().len(), 2);
}

#[tokio::test]
async fn test_export_clear_import_round_trip() {
    let store = open(&MemoryBackend::new(), &MemoryMirror::new());
    store
        .create("accounts", fields(json!({"name": "Savings"})))
        .expect("create should succeed");
    store
        .create("transactions", fields(json!({"amount": 12})))
        .expect("create should succeed");
    store
        .set_item("active_theme", json!("dark"))
        .expect("set_item should succeed");

    let backup = store.export_all().expect("export should succeed");
    assert!(backup["backup_timestamp"].is_string());
    let accounts_before = store.list("accounts").unwrap();

    store.clear_all().expect("clear should succeed");
    assert!(store.list("accounts").unwrap().is_empty());
    assert_eq!(store.list("settings").unwrap().len(), 1);

    store.import_all(&backup).expect("import should succeed");
    assert_eq!(*store.list("accounts").unwrap(), *accounts_before);
    assert_eq!(store.list("transactions").unwrap().len(), 1);
    assert_eq!(store.get_item("active_theme").unwrap(), Some(json!("dark")));
}

#[tokio::test]
async fn test_import_all_semantics() {
    let store = open(&MemoryBackend::new(), &MemoryMirror::new());
    let mut changes = store.subscribe();
    store
        .create("goals", fields(json!({"title": "Old"})))
        .expect("create should succeed");
    store
        .set_item("recap_date", json!("2024-01-01"))
        .expect("set_item should succeed");

    store
        .import_all(&json!({
            "accounts": [{"id": "a1", "name": "Imported"}],
            "active_theme": "light",
            "unknown_key": 42
        }))
        .expect("import should succeed");

    assert_eq!(changes.recv().await.unwrap(), DataChanged::Imported);
    assert!(store.get("accounts", "a1").unwrap().is_some());
    assert!(store.list("goals").unwrap().is_empty());
    assert_eq!(store.list("settings").unwrap().len(), 1);
    assert_eq!(store.get_item("active_theme").unwrap(), Some(json!("light")));
    assert_eq!(store.get_item("recap_date").unwrap(), Some(json!("2024-01-01")));
    assert!(store.get_item("unknown_key").unwrap().is_none());
}

#[tokio::test]
async fn test_import_all_rejects_bad_collection_without_changes() {
    let store = open(&MemoryBackend::new(), &MemoryMirror::new());
    store
        .create("accounts", Fields::new())
        .expect("create should succeed");

    let result = store.import_all(&json!({"accounts": "nope"}));
    assert!(matches!(result, Err(StashError::Validation(_))));
    assert_eq!(store.list("accounts").unwrap().len(), 1);

    let result = store.import_all(&json!([1, 2]));
    assert!(matches!(result, Err(StashError::InvalidInput(_))));
}

#[tokio::test]
async fn test_import_rejects_repeated_record_ids() {
    let store = open(&MemoryBackend::new(), &MemoryMirror::new());
    let kept = store
        .create("accounts", fields(json!({"n": 0})))
        .expect("create should succeed");

    let duplicated = json!({"accounts": [{"id": "a", "n": 1}, {"id": "a", "n": 2}]});
    assert!(matches!(
        store.import_all(&duplicated),
        Err(StashError::Validation(_))
    ));
    assert!(matches!(
        store.import_subset(&duplicated, &["accounts"]),
        Err(StashError::Validation(_))
    ));

    let listed = store.list("accounts").expect("list should succeed");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, kept.id);

    let numeric_and_text = json!({"accounts": [{"id": 7}, {"id": "7"}]});
    assert!(store.import_all(&numeric_and_text).is_err());

    store
        .import_all(&json!({"accounts": [{"id": "a", "n": 1}, {"id": "b", "n": 2}]}))
        .expect("distinct ids should import");
    store.delete("accounts", "a").expect("delete should succeed");
    let listed = store.list("accounts").expect("list should succeed");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, "b");
}

#[tokio::test]
async fn test_subset_import_export() {
    let store = open(&MemoryBackend::new(), &MemoryMirror::new());
    store
        .create("credentials", fields(json!({"site": "a"})))
        .expect("create should succeed");
    store
        .create("accounts", fields(json!({"name": "b"})))
        .expect("create should succeed");

    let subset = store
        .export_subset(&["credentials", "missing_key"])
        .expect("export_subset should succeed");
    let object = subset.as_object().unwrap();
    assert_eq!(object.len(), 1);
    assert!(object.contains_key("credentials"));

    let other = open(&MemoryBackend::new(), &MemoryMirror::new());
    other
        .import_subset(
            &json!({"credentials": subset["credentials"], "accounts": []}),
            &["credentials"],
        )
        .expect("import_subset should succeed");
    assert_eq!(other.list("credentials").unwrap().len(), 1);
    assert!(other.list("accounts").unwrap().is_empty());
}

#[tokio::test]
async fn test_disabling_mirror_removes_it() {
    let mirror = MemoryMirror::new();
    let store = open(&MemoryBackend::new(), &mirror);
    store
        .create("accounts", Fields::new())
        .expect("create should succeed");
    assert!(mirror.read().unwrap().is_some());

    store
        .set_mirror_policy(MirrorPolicy::disabled())
        .expect("policy change should succeed");
    assert!(mirror.read().unwrap().is_none());

    store
        .create("accounts", Fields::new())
        .expect("create should succeed");
    assert!(mirror.read().unwrap().is_none());
}

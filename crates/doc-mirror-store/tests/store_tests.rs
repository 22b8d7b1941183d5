use doc_mirror::{
    CacheRecord, ContentStore, EntryId, MetadataStore, StoreEntry, SyncWatermark, digest,
};
use doc_mirror_store::{MirrorStore, SyncStatus};

fn create_store() -> MirrorStore {
    MirrorStore::open_in_memory().unwrap()
}

fn entry(id: &str, body: &str) -> StoreEntry {
    let mut data = serde_json::Map::new();
    data.insert("title".into(), serde_json::json!(id));
    data.insert("tags".into(), serde_json::json!(["a", "b"]));

    StoreEntry {
        id: EntryId::new(id),
        data,
        body: body.into(),
        digest: digest(body),
        file_path: format!("content/{id}.md"),
        rendered: Some(format!("<p>{body}</p>")),
    }
}

#[test]
fn open_creates_schema_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mirror.db");

    {
        let store = MirrorStore::open(&path).unwrap();
        store.set(entry("features/accounts", "Accounts")).unwrap();
    }

    let reopened = MirrorStore::open(&path).unwrap();
    assert_eq!(reopened.entry_count().unwrap(), 1);
}

#[test]
fn set_and_get_round_trip_data() {
    let store = create_store();
    store.set(entry("features/tasks", "Tasks")).unwrap();

    let loaded = store.get(&EntryId::new("features/tasks")).unwrap().unwrap();
    assert_eq!(loaded, entry("features/tasks", "Tasks"));
    assert!(store.get(&EntryId::new("missing")).unwrap().is_none());
}

#[test]
fn set_merges_by_id() {
    let store = create_store();
    store.set(entry("features/tasks", "Tasks")).unwrap();
    store.set(entry("features/tasks", "Tasks v2")).unwrap();

    assert_eq!(store.entry_count().unwrap(), 1);
    let loaded = store.get(&EntryId::new("features/tasks")).unwrap().unwrap();
    assert_eq!(loaded.body, "Tasks v2");
}

#[test]
fn replace_swaps_entry() {
    let store = create_store();
    store.set(entry("index", "Old")).unwrap();

    let mut updated = entry("index", "New");
    updated.rendered = None;
    store.replace(updated.clone()).unwrap();

    assert_eq!(store.get(&EntryId::new("index")).unwrap(), Some(updated));
}

#[test]
fn delete_reports_whether_anything_was_removed() {
    let store = create_store();
    store.set(entry("guides/intro", "Intro")).unwrap();

    assert!(store.delete(&EntryId::new("guides/intro")).unwrap());
    assert!(!store.delete(&EntryId::new("guides/intro")).unwrap());
}

#[test]
fn keys_entries_and_clear() {
    let store = create_store();
    store.set(entry("b", "B")).unwrap();
    store.set(entry("a", "A")).unwrap();

    let keys = store.keys().unwrap();
    assert_eq!(keys, vec![EntryId::new("a"), EntryId::new("b")]);
    assert_eq!(store.entries().unwrap().len(), 2);

    store.clear().unwrap();
    assert!(store.keys().unwrap().is_empty());
}

#[test]
fn cache_records_are_stored_and_removed() {
    let store = create_store();
    let id = EntryId::new("features/accounts");
    assert!(store.cache_record(&id).unwrap().is_none());

    let record = CacheRecord {
        etag: Some("\"abc\"".into()),
        last_modified: Some("Tue, 01 Oct 2024 10:00:00 GMT".into()),
    };
    store.put_cache_record(&id, &record).unwrap();
    assert_eq!(store.cache_record(&id).unwrap(), Some(record));

    store.remove_cache_record(&id).unwrap();
    assert!(store.cache_record(&id).unwrap().is_none());
}

#[test]
fn watermarks_are_keyed_by_source() {
    let store = create_store();
    let watermark = SyncWatermark {
        last_synced_sha: "abc123".into(),
        synced_at: "1727776800".into(),
        config_digest: Some("sha256:cfg".into()),
    };
    store.put_watermark("acme/docs@main:docs", &watermark).unwrap();

    assert_eq!(
        store.watermark("acme/docs@main:docs").unwrap(),
        Some(watermark.clone())
    );
    assert!(store.watermark("acme/docs@main:other").unwrap().is_none());
    assert_eq!(
        store.watermarks().unwrap(),
        vec![("acme/docs@main:docs".to_string(), watermark)]
    );
}

#[test]
fn sync_status_never_synced() {
    let store = create_store();
    assert_eq!(store.sync_status("nope").unwrap(), SyncStatus::NeverSynced);
}

#[test]
fn sync_status_fresh_after_recent_sync() {
    let store = create_store();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    store
        .put_watermark(
            "k",
            &SyncWatermark {
                last_synced_sha: "abc".into(),
                synced_at: now.to_string(),
                config_digest: None,
            },
        )
        .unwrap();

    assert_eq!(
        store.sync_status("k").unwrap(),
        SyncStatus::Fresh { days_old: 0 }
    );
}

#[test]
fn sync_status_stale_after_threshold() {
    let store = create_store();
    let ten_days_ago = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs()
        - 10 * 86400;
    store
        .put_watermark(
            "k",
            &SyncWatermark {
                last_synced_sha: "abc".into(),
                synced_at: ten_days_ago.to_string(),
                config_digest: None,
            },
        )
        .unwrap();

    assert_eq!(
        store.sync_status("k").unwrap(),
        SyncStatus::Stale { days_old: 10 }
    );
}

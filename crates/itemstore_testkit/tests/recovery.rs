//! Crash recovery and file locking.

use itemstore_core::{
    CollectionConfig, CoreError, GameItem, ItemCollection, ItemId, LockMode, StoreConfig,
    StoreHandle,
};
use itemstore_storage::{FileBackend, StorageError};
use itemstore_testkit::prelude::*;
use std::fs;

#[test]
fn torn_tail_is_dropped_on_reopen() {
    init_test_logging();
    let mut games = TestCollection::file();
    let items = sample_items(3);
    for item in &items {
        games.upsert(item.clone()).unwrap();
    }
    games.dispose().unwrap();

    tear_tail(&games.store_path(), 5).unwrap();
    games.reopen();

    assert_eq!(games.count().unwrap(), 2);
    assert!(games.get(items[2].id).unwrap().is_none());
    assert_eq!(games.get(items[0].id).unwrap().as_ref(), Some(&items[0]));

    // The store keeps working after the truncation.
    games.upsert(items[2].clone()).unwrap();
    games.reopen();
    assert_eq!(games.count().unwrap(), 3);
}

#[test]
fn zero_filled_tail_is_dropped() {
    let mut games = TestCollection::file();
    games.upsert(GameItem::new(ItemId::new(), "only")).unwrap();
    games.dispose().unwrap();

    append_garbage(&games.store_path(), &[0u8; 64]).unwrap();
    games.reopen();
    assert_eq!(games.count().unwrap(), 1);
}

#[test]
fn damage_before_the_tail_refuses_to_open() {
    let games = TestCollection::file();
    for item in sample_items(3) {
        games.upsert(item).unwrap();
    }
    games.dispose().unwrap();

    // Inside the first frame's payload, just past the header.
    flip_byte(&games.store_path(), 60).unwrap();

    let result: Result<ItemCollection<GameItem>, _> = ItemCollection::open(&games.store_path());
    assert!(matches!(result, Err(CoreError::StoreCorruption { .. })));
}

#[test]
fn foreign_file_is_not_a_store() {
    let games = TestCollection::memory();
    let path = games.dir().join("notes.db");
    fs::write(&path, b"just some text that is long enough").unwrap();

    let result: Result<ItemCollection<GameItem>, _> = ItemCollection::open(&path);
    assert!(matches!(result, Err(CoreError::InvalidFormat { .. })));
}

#[test]
fn crash_mid_batch_keeps_earlier_items() {
    let fixture = TestCollection::memory();
    let path = fixture.dir().join("crashy.db");

    let file = FileBackend::open(&path, LockMode::None).unwrap();
    let (backend, switch) = CrashableBackend::new(Box::new(file));
    let store = StoreHandle::with_backend(Box::new(backend)).unwrap();
    let games: ItemCollection<GameItem> =
        ItemCollection::from_store(store, CollectionConfig::default());

    let stats = games.stats().unwrap();
    let before = stats.snapshot().bytes_written;
    games.upsert(GameItem::new(ItemId::new(), "game X")).unwrap();
    let frame = (stats.snapshot().bytes_written - before) as usize;

    switch.crash_after(frame + frame / 2);
    let report = games.upsert_batch(sample_items(3)).unwrap();
    assert!(switch.has_crashed());
    assert_eq!((report.inserted, report.failed), (1, 2));
    assert_eq!(games.count().unwrap(), 2);
    drop(games);

    let reopened: ItemCollection<GameItem> = ItemCollection::open(&path).unwrap();
    assert_eq!(reopened.count().unwrap(), 2);
    assert_eq!(reopened.find_all().unwrap().len(), 2);
}

#[test]
fn failed_upsert_leaves_cache_and_count_alone() {
    let (backend, switch) =
        CrashableBackend::new(Box::new(itemstore_storage::InMemoryBackend::new()));
    let store = StoreHandle::with_backend(Box::new(backend)).unwrap();
    let games: ItemCollection<GameItem> =
        ItemCollection::from_store(store, CollectionConfig::default());

    switch.fail_writes(true);
    let id = ItemId::new();
    assert!(games.upsert(GameItem::new(id, "lost")).is_err());
    assert_eq!(games.count().unwrap(), 0);
    assert!(!games.exists(id).unwrap());
}

#[test]
fn shared_lock_admits_read_only_tools() {
    let games = TestCollection::file();
    let item = GameItem::new(ItemId::new(), "visible");
    games.upsert(item.clone()).unwrap();

    let reader = StoreHandle::open_read_only(&games.store_path()).unwrap();
    assert_eq!(reader.find_all::<GameItem>().unwrap(), vec![item]);
}

#[test]
fn exclusive_lock_refuses_second_open() {
    let config = CollectionConfig::new().store(StoreConfig::new().lock_mode(LockMode::Exclusive));
    let games = TestCollection::with_config(config);

    let second = StoreHandle::open_read_only(&games.store_path());
    assert!(matches!(
        second,
        Err(CoreError::Storage(StorageError::Locked { .. }))
    ));

    games.dispose().unwrap();
    assert!(StoreHandle::open_read_only(&games.store_path()).is_ok());
}

#[test]
fn second_writer_is_refused_under_default_lock() {
    let games = TestCollection::file();
    let kept = GameItem::new(ItemId::new(), "first writer");
    games.upsert(kept.clone()).unwrap();

    let second: Result<ItemCollection<GameItem>, _> = ItemCollection::open(&games.store_path());
    assert!(matches!(
        second,
        Err(CoreError::Storage(StorageError::Locked { .. }))
    ));

    let reader = StoreHandle::open_read_only(&games.store_path()).unwrap();
    assert_eq!(reader.count(), 1);
    drop(reader);

    games.dispose().unwrap();
    let reopened: ItemCollection<GameItem> = ItemCollection::open(&games.store_path()).unwrap();
    reopened.upsert(GameItem::new(ItemId::new(), "second writer")).unwrap();
    assert_eq!(reopened.get(kept.id).unwrap(), Some(kept));
    assert_eq!(reopened.count().unwrap(), 2);
}

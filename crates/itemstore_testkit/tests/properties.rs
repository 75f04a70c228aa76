//! Property tests for the item collection.

use itemstore_core::{GameItem, ItemCollection, ItemId};
use itemstore_testkit::prelude::*;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

fn apply(games: &ItemCollection<GameItem>, ops: &[ItemOperation]) {
    for op in ops {
        match op {
            ItemOperation::Upsert(item) => games.upsert(item.clone()).unwrap(),
            ItemOperation::Remove(id) => {
                games.remove(*id).unwrap();
            }
        }
    }
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn count_matches_last_operation_per_id(ops in operation_sequence_strategy(6, 0, 60)) {
        let games: ItemCollection<GameItem> = ItemCollection::open_in_memory().unwrap();
        apply(&games, &ops);

        let expected = expected_live_ids(&ops);
        prop_assert_eq!(games.count().unwrap(), expected.len());

        let stored: HashSet<ItemId> = games.find_all().unwrap().into_iter().map(|g| g.id).collect();
        prop_assert_eq!(stored, expected);
    }

    #[test]
    fn count_survives_reopen(ops in operation_sequence_strategy(5, 1, 40)) {
        let mut fixture = TestCollection::file();
        apply(&fixture, &ops);
        fixture.reopen();

        prop_assert_eq!(fixture.count().unwrap(), expected_live_ids(&ops).len());
    }

    #[test]
    fn upsert_then_get_roundtrips(items in prop::collection::vec(game_item_strategy(), 1..20)) {
        let games: ItemCollection<GameItem> = ItemCollection::open_in_memory().unwrap();
        let mut latest = HashMap::new();
        for item in items {
            games.upsert(item.clone()).unwrap();
            latest.insert(item.id, item);
        }

        games.invalidate_session_cache();
        for (id, item) in &latest {
            let restored = games.get(*id).unwrap();
            prop_assert_eq!(restored.as_ref(), Some(item));
        }
    }

    #[test]
    fn get_after_upsert_never_reads_the_store(
        items in prop::collection::vec(game_item_strategy(), 1..20)
    ) {
        let games: ItemCollection<GameItem> = ItemCollection::open_in_memory().unwrap();
        let stats = games.stats().unwrap();
        for item in items {
            games.upsert(item.clone()).unwrap();
            let before = stats.reads();
            prop_assert_eq!(games.get(item.id).unwrap(), Some(item));
            prop_assert_eq!(stats.reads(), before);
        }
    }
}

#[test]
fn invalidation_costs_exactly_one_read_per_id() {
    let games: ItemCollection<GameItem> = ItemCollection::open_in_memory().unwrap();
    let items = sample_items(8);
    for item in &items {
        games.upsert(item.clone()).unwrap();
    }
    games.invalidate_session_cache();

    let stats = games.stats().unwrap();
    for item in &items {
        let before = stats.reads();
        games.get(item.id).unwrap();
        assert_eq!(stats.reads(), before + 1);
        games.get(item.id).unwrap();
        assert_eq!(stats.reads(), before + 1);
    }
}

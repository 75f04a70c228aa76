//! Property-based test generators using proptest.
//!
//! Provides strategies for generating items and operation sequences.
//! Operation sequences draw ids from a small pool so that updates and
//! removes of existing items are common.

use itemstore_core::{GameItem, ItemId, Lifecycle};
use proptest::prelude::*;
use std::collections::HashSet;

/// Strategy for generating item ids.
pub fn item_id_strategy() -> impl Strategy<Value = ItemId> {
    prop::array::uniform16(any::<u8>()).prop_map(ItemId::from_bytes)
}

/// Strategy for generating display names, including non-ASCII ones.
pub fn name_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        3 => "[A-Za-z0-9 :'-]{0,40}",
        1 => "\\PC{0,20}",
    ]
}

/// Strategy for generating lifecycle states.
pub fn lifecycle_strategy() -> impl Strategy<Value = Lifecycle> {
    prop_oneof![
        Just(Lifecycle::Unconfirmed),
        Just(Lifecycle::Saved),
        Just(Lifecycle::Deleted),
    ]
}

/// Strategy for generating a complete item.
pub fn game_item_strategy() -> impl Strategy<Value = GameItem> {
    (item_id_strategy(), name_strategy(), lifecycle_strategy()).prop_map(|(id, name, lifecycle)| {
        let mut item = GameItem::new(id, name);
        item.lifecycle = lifecycle;
        item
    })
}

/// One mutation applied to a collection.
#[derive(Debug, Clone)]
pub enum ItemOperation {
    /// Insert or replace an item.
    Upsert(GameItem),
    /// Remove an item by id.
    Remove(ItemId),
}

impl ItemOperation {
    /// Returns the id the operation touches.
    pub fn id(&self) -> ItemId {
        match self {
            Self::Upsert(item) => item.id,
            Self::Remove(id) => *id,
        }
    }
}

/// Strategy for an operation on one of `pool`'s ids.
fn operation_strategy(pool: Vec<ItemId>) -> impl Strategy<Value = ItemOperation> {
    let upserts = pool.clone();
    prop_oneof![
        3 => (prop::sample::select(upserts), name_strategy(), lifecycle_strategy())
            .prop_map(|(id, name, lifecycle)| {
                let mut item = GameItem::new(id, name);
                item.lifecycle = lifecycle;
                ItemOperation::Upsert(item)
            }),
        2 => prop::sample::select(pool).prop_map(ItemOperation::Remove),
    ]
}

/// Strategy for a sequence of operations over at most `pool_size` ids.
pub fn operation_sequence_strategy(
    pool_size: usize,
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<ItemOperation>> {
    prop::collection::vec(item_id_strategy(), 1..=pool_size.max(1)).prop_flat_map(move |pool| {
        prop::collection::vec(operation_strategy(pool), min_ops..max_ops)
    })
}

/// Ids whose last operation in `ops` was an upsert.
pub fn expected_live_ids(ops: &[ItemOperation]) -> HashSet<ItemId> {
    let mut live = HashSet::new();
    for op in ops {
        match op {
            ItemOperation::Upsert(item) => {
                live.insert(item.id);
            }
            ItemOperation::Remove(id) => {
                live.remove(id);
            }
        }
    }
    live
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn sequences_stay_within_pool(ops in operation_sequence_strategy(4, 1, 30)) {
            let ids: HashSet<ItemId> = ops.iter().map(ItemOperation::id).collect();
            prop_assert!(ids.len() <= 4);
        }

        #[test]
        fn generated_items_roundtrip_through_json(item in game_item_strategy()) {
            let json = serde_json::to_string(&item).unwrap();
            let back: GameItem = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back, item);
        }
    }

    #[test]
    fn expected_live_ids_follows_last_operation() {
        let a = ItemId::new();
        let b = ItemId::new();
        let ops = vec![
            ItemOperation::Upsert(GameItem::new(a, "a")),
            ItemOperation::Upsert(GameItem::new(b, "b")),
            ItemOperation::Remove(a),
            ItemOperation::Remove(b),
            ItemOperation::Upsert(GameItem::new(b, "b again")),
        ];
        assert_eq!(expected_live_ids(&ops), HashSet::from([b]));
    }
}

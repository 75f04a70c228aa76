//! The catalogued game record.

use super::{Item, ItemId, TrackedItem};
use crate::authority::ExternalRecord;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Where an item stands relative to the external authority.
///
/// The three states are exclusive, so an item can never be both saved and
/// deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// Not yet matched against the authority.
    #[default]
    Unconfirmed,
    /// The authority holds a matching live record.
    Saved,
    /// The authority reported the record gone.
    Deleted,
}

/// Empty payload for items that carry nothing beyond the common fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoPayload {}

/// A stored record mirroring one entry of the host's game catalog.
///
/// `payload` is plugin-defined data; its fields are flattened next to the
/// common ones when serialized. On the wire the lifecycle is written as the
/// two legacy flags `IsSaved` / `IsDeleted`, so files written by older
/// versions read back unchanged. A legacy record with both flags set is
/// read as [`Lifecycle::Deleted`].
#[derive(Debug, Clone, PartialEq)]
pub struct GameItem<P = NoPayload> {
    /// Identifier shared with the host's catalog entry.
    pub id: ItemId,
    /// Display name, synchronized from the authority.
    pub name: String,
    /// Confirmation state.
    pub lifecycle: Lifecycle,
    /// Plugin-defined data.
    pub payload: P,
}

impl<P: Default> GameItem<P> {
    /// Creates an unconfirmed item with a default payload.
    pub fn new(id: ItemId, name: impl Into<String>) -> Self {
        Self::with_payload(id, name, P::default())
    }
}

impl<P> GameItem<P> {
    /// Creates an unconfirmed item carrying `payload`.
    pub fn with_payload(id: ItemId, name: impl Into<String>, payload: P) -> Self {
        Self {
            id,
            name: name.into(),
            lifecycle: Lifecycle::Unconfirmed,
            payload,
        }
    }

    /// True once the authority confirmed the record.
    #[must_use]
    pub fn is_saved(&self) -> bool {
        self.lifecycle == Lifecycle::Saved
    }

    /// True once the authority reported the record gone.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.lifecycle == Lifecycle::Deleted
    }
}

impl<P> Item for GameItem<P>
where
    P: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn id(&self) -> ItemId {
        self.id
    }
}

impl<P> TrackedItem for GameItem<P>
where
    P: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn apply_external(&mut self, record: &ExternalRecord) {
        self.name.clone_from(&record.display_name);
        self.lifecycle = Lifecycle::Saved;
    }

    fn mark_deleted(&mut self) {
        self.lifecycle = Lifecycle::Deleted;
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireRef<'a, P> {
    id: ItemId,
    name: &'a str,
    is_saved: bool,
    is_deleted: bool,
    #[serde(flatten)]
    payload: &'a P,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Wire<P> {
    id: ItemId,
    #[serde(default)]
    name: String,
    #[serde(default)]
    is_saved: bool,
    #[serde(default)]
    is_deleted: bool,
    #[serde(flatten)]
    payload: P,
}

impl<P: Serialize> Serialize for GameItem<P> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        WireRef {
            id: self.id,
            name: &self.name,
            is_saved: self.is_saved(),
            is_deleted: self.is_deleted(),
            payload: &self.payload,
        }
        .serialize(serializer)
    }
}

impl<'de, P: Deserialize<'de>> Deserialize<'de> for GameItem<P> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = Wire::<P>::deserialize(deserializer)?;
        let lifecycle = match (wire.is_saved, wire.is_deleted) {
            (_, true) => Lifecycle::Deleted,
            (true, false) => Lifecycle::Saved,
            (false, false) => Lifecycle::Unconfirmed,
        };
        Ok(Self {
            id: wire.id,
            name: wire.name,
            lifecycle,
            payload: wire.payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    struct Playtime {
        minutes: u64,
    }

    #[test]
    fn new_items_are_unconfirmed() {
        let item: GameItem = GameItem::new(ItemId::new(), "Hades");
        assert_eq!(item.lifecycle, Lifecycle::Unconfirmed);
        assert!(!item.is_saved());
        assert!(!item.is_deleted());
    }

    #[test]
    fn apply_external_confirms_and_renames() {
        let id = ItemId::new();
        let mut item: GameItem = GameItem::new(id, "old");
        item.mark_deleted();

        item.apply_external(&ExternalRecord::new(id, "Hades II"));
        assert_eq!(item.name, "Hades II");
        assert!(item.is_saved());
        assert!(!item.is_deleted());
    }

    #[test]
    fn legacy_json_with_flattened_payload() {
        let json = r#"{
            "Id": "0b0e7e6c-5d2a-4b43-9f0e-2a8d43c0a111",
            "Name": "Outer Wilds",
            "IsSaved": true,
            "IsDeleted": false,
            "Minutes": 620
        }"#;

        let item: GameItem<Playtime> = serde_json::from_str(json).unwrap();
        assert_eq!(item.name, "Outer Wilds");
        assert!(item.is_saved());
        assert_eq!(item.payload.minutes, 620);
    }

    #[test]
    fn both_legacy_flags_read_as_deleted() {
        let json = r#"{"Id":"0b0e7e6c-5d2a-4b43-9f0e-2a8d43c0a111","IsSaved":true,"IsDeleted":true}"#;
        let item: GameItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.lifecycle, Lifecycle::Deleted);
        assert!(item.name.is_empty());
    }

    #[test]
    fn serializes_two_flags() {
        let mut item: GameItem = GameItem::new(ItemId::from_bytes([1; 16]), "Tunic");
        item.mark_deleted();

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["IsSaved"], false);
        assert_eq!(value["IsDeleted"], true);
        assert_eq!(value["Name"], "Tunic");
    }
}

//! Item model.
//!
//! The store is generic over the record type. It only needs an identifier
//! and serde support; everything else about an item is opaque payload.

mod game;
mod id;

pub use game::{GameItem, Lifecycle, NoPayload};
pub use id::ItemId;

use crate::authority::ExternalRecord;
use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A record that can live in an [`crate::ItemCollection`].
///
/// Items are stored as CBOR through serde. `id()` must be stable for the
/// item's whole lifetime.
pub trait Item: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Returns the item's immutable identifier.
    fn id(&self) -> ItemId;
}

/// An item whose display attributes are owned by an external authority.
pub trait TrackedItem: Item {
    /// Copies display attributes from the authority's record and marks the
    /// item as confirmed.
    fn apply_external(&mut self, record: &ExternalRecord);

    /// Marks the item as no longer present in the authority.
    fn mark_deleted(&mut self);
}

/// Encodes an item into the CBOR payload stored in a frame.
pub(crate) fn encode_item<T: Serialize>(item: &T) -> CoreResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(item, &mut buf).map_err(|e| CoreError::encode(e.to_string()))?;
    Ok(buf)
}

/// Decodes a frame payload back into an item.
pub(crate) fn decode_item<T: DeserializeOwned>(payload: &[u8]) -> CoreResult<T> {
    ciborium::from_reader(payload).map_err(|e| CoreError::decode(e.to_string()))
}

//! Store header and record frames.

use crate::error::{CoreError, CoreResult};
use crate::item::ItemId;

/// Magic bytes opening every store file.
pub const STORE_MAGIC: [u8; 4] = *b"ITMS";
/// Current file format version.
pub const FORMAT_VERSION: u16 = 1;
/// The single collection every store holds.
pub const COLLECTION_NAME: &str = "items";

/// Fixed part of the header: magic (4) + version (2) + name_len (2).
pub(crate) const HEADER_PREFIX: usize = 8;
const CRC_SIZE: usize = 4;

/// File header naming the collection held by the store.
///
/// ```text
/// | magic (4) | version (2) | name_len (2) | name (N) | crc32 (4) |
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHeader {
    /// Format version.
    pub version: u16,
    /// Collection name.
    pub collection: String,
}

impl StoreHeader {
    /// Creates the header for a fresh store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: FORMAT_VERSION,
            collection: COLLECTION_NAME.to_string(),
        }
    }

    /// Encodes the header.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let name = self.collection.as_bytes();
        let mut buf = Vec::with_capacity(HEADER_PREFIX + name.len() + CRC_SIZE);
        buf.extend_from_slice(&STORE_MAGIC);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
        buf.extend_from_slice(name);
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }

    /// Reads the variable part length out of the fixed prefix.
    ///
    /// Returns the total encoded header length.
    pub(crate) fn total_len(prefix: &[u8]) -> CoreResult<usize> {
        if prefix.len() < HEADER_PREFIX {
            return Err(CoreError::invalid_format("header too short"));
        }
        if prefix[0..4] != STORE_MAGIC {
            return Err(CoreError::invalid_format("not an item store (bad magic)"));
        }
        let name_len = u16::from_le_bytes([prefix[6], prefix[7]]) as usize;
        Ok(HEADER_PREFIX + name_len + CRC_SIZE)
    }

    /// Decodes and validates a complete header.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        let total = Self::total_len(data)?;
        if data.len() < total {
            return Err(CoreError::invalid_format("header truncated"));
        }

        let stored = read_u32(&data[total - CRC_SIZE..total]);
        let computed = compute_crc32(&data[..total - CRC_SIZE]);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != FORMAT_VERSION {
            return Err(CoreError::invalid_format(format!(
                "unsupported store version: {version}"
            )));
        }

        let collection = std::str::from_utf8(&data[HEADER_PREFIX..total - CRC_SIZE])
            .map_err(|_| CoreError::invalid_format("collection name is not UTF-8"))?
            .to_string();
        if collection != COLLECTION_NAME {
            return Err(CoreError::invalid_format(format!(
                "unexpected collection '{collection}'"
            )));
        }

        Ok(Self {
            version,
            collection,
        })
    }
}

impl Default for StoreHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Flags carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// A live item.
    pub const NONE: Self = Self(0);
    /// The item was removed.
    pub const TOMBSTONE: Self = Self(0x01);

    /// Returns the raw byte value.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self.0
    }

    /// Checks if the tombstone flag is set.
    #[must_use]
    pub const fn is_tombstone(self) -> bool {
        self.0 & 0x01 != 0
    }
}

/// One append-only record in the store file.
///
/// ```text
/// | record_len (4) | flags (1) | item_id (16) | payload (N) | crc32 (4) |
/// ```
///
/// `record_len` covers the whole frame. The latest frame for an id wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFrame {
    /// Item identifier.
    pub item_id: ItemId,
    /// Frame flags.
    pub flags: FrameFlags,
    /// CBOR-encoded item, empty for tombstones.
    pub payload: Vec<u8>,
}

impl ItemFrame {
    /// record_len (4) + flags (1) + item_id (16).
    pub(crate) const HEADER_SIZE: usize = 21;
    /// Smallest possible frame.
    pub(crate) const MIN_SIZE: usize = Self::HEADER_SIZE + CRC_SIZE;

    /// Creates a put frame.
    #[must_use]
    pub fn put(item_id: ItemId, payload: Vec<u8>) -> Self {
        Self {
            item_id,
            flags: FrameFlags::NONE,
            payload,
        }
    }

    /// Creates a tombstone frame.
    #[must_use]
    pub fn tombstone(item_id: ItemId) -> Self {
        Self {
            item_id,
            flags: FrameFlags::TOMBSTONE,
            payload: Vec::new(),
        }
    }

    /// Returns whether this frame removes its item.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.flags.is_tombstone()
    }

    /// Returns the encoded size of this frame.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        Self::HEADER_SIZE + self.payload.len() + CRC_SIZE
    }

    /// Appends the encoded frame to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        let start = buf.len();
        buf.extend_from_slice(&(self.encoded_size() as u32).to_le_bytes());
        buf.push(self.flags.as_byte());
        buf.extend_from_slice(self.item_id.as_bytes());
        buf.extend_from_slice(&self.payload);
        let crc = compute_crc32(&buf[start..]);
        buf.extend_from_slice(&crc.to_le_bytes());
    }

    /// Encodes the frame to bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_size());
        self.encode_into(&mut buf);
        buf
    }

    /// Reads the declared frame length from its first four bytes.
    pub(crate) fn declared_len(len_bytes: &[u8]) -> usize {
        read_u32(len_bytes) as usize
    }

    /// Decodes a complete frame.
    pub fn decode(data: &[u8]) -> CoreResult<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(CoreError::invalid_format("frame too short"));
        }

        let record_len = Self::declared_len(&data[0..4]);
        if record_len < Self::MIN_SIZE || data.len() < record_len {
            return Err(CoreError::invalid_format("incomplete frame"));
        }

        let stored = read_u32(&data[record_len - CRC_SIZE..record_len]);
        let computed = compute_crc32(&data[..record_len - CRC_SIZE]);
        if stored != computed {
            return Err(CoreError::ChecksumMismatch {
                expected: stored,
                actual: computed,
            });
        }

        let mut id = [0u8; 16];
        id.copy_from_slice(&data[5..Self::HEADER_SIZE]);

        Ok(Self {
            item_id: ItemId::from_bytes(id),
            flags: FrameFlags(data[4]),
            payload: data[Self::HEADER_SIZE..record_len - CRC_SIZE].to_vec(),
        })
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// CRC32 (IEEE polynomial) over `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

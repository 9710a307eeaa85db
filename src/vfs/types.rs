//! Records persisted in the two vault collections.
//! Keep this module about types, serde and framing; behavior lives in `ops`/`directory`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{VaultError, VaultResult};

/// Element type of a typed numeric array. Values are stored little-endian.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ElementType { I8, U8, I16, U16, I32, U32, I64, U64, F32, F64 }

impl ElementType {
    pub fn byte_width(&self) -> usize {
        match self {
            ElementType::I8 | ElementType::U8 => 1,
            ElementType::I16 | ElementType::U16 => 2,
            ElementType::I32 | ElementType::U32 | ElementType::F32 => 4,
            ElementType::I64 | ElementType::U64 | ElementType::F64 => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind { Text, Binary, Typed }

/// How to decode the concatenated payload of a file. Authoritative on chunk 0 only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValueMeta {
    pub kind: ValueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<ElementType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byte_offset: Option<u64>,
}

/// One entry of a directory record: a chunk of a file, or a marker for a child folder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DirEntry {
    Folder,
    Chunk(ValueMeta),
}

impl DirEntry {
    pub fn is_folder(&self) -> bool { matches!(self, DirEntry::Folder) }
}

/// Directory record keyed by absolute directory path in the `directories` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DirectoryRecord {
    pub name: String,
    #[serde(default)]
    pub files: BTreeMap<String, DirEntry>,
}

impl DirectoryRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), files: BTreeMap::new() }
    }

    pub fn encode(&self) -> VaultResult<Vec<u8>> { Ok(serde_json::to_vec(self)?) }

    pub fn decode(bytes: &[u8]) -> VaultResult<Self> { Ok(serde_json::from_slice(bytes)?) }
}

#[derive(Serialize, Deserialize)]
struct ChunkHeader {
    key: String,
    meta: ValueMeta,
}

/// File chunk record in the `files` collection.
///
/// Framed as `[u32 LE header length][JSON {key, meta}][raw payload]` so the payload
/// never passes through a text encoding and its length is known without parsing JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub key: String,
    pub meta: ValueMeta,
    pub payload: Vec<u8>,
}

impl ChunkRecord {
    pub fn encode(&self) -> VaultResult<Vec<u8>> {
        let header = serde_json::to_vec(&ChunkHeader { key: self.key.clone(), meta: self.meta.clone() })?;
        let hlen = u32::try_from(header.len())
            .map_err(|_| VaultError::unsupported("chunk header too large"))?;
        let mut out = Vec::with_capacity(4 + header.len() + self.payload.len());
        out.extend_from_slice(&hlen.to_le_bytes());
        out.extend_from_slice(&header);
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> VaultResult<Self> {
        let (header, payload) = split_frame(bytes)?;
        let h: ChunkHeader = serde_json::from_slice(header)?;
        Ok(Self { key: h.key, meta: h.meta, payload: payload.to_vec() })
    }

    /// Borrow the payload of an encoded record without decoding its header.
    pub fn payload_of(bytes: &[u8]) -> VaultResult<&[u8]> {
        split_frame(bytes).map(|(_, p)| p)
    }
}

fn split_frame(bytes: &[u8]) -> VaultResult<(&[u8], &[u8])> {
    if bytes.len() < 4 {
        return Err(VaultError::corrupt(format!("chunk record too short: {} bytes", bytes.len())));
    }
    let hlen = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let rest = &bytes[4..];
    if rest.len() < hlen {
        return Err(VaultError::corrupt(format!("chunk header length {hlen} exceeds record size {}", rest.len())));
    }
    Ok(rest.split_at(hlen))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind { File, Folder }

/// One immediate entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirListing {
    pub path: String,
    pub kind: EntryKind,
}

//! Merkle Search Tree read traversal.
//!
//! MST nodes are DAG-CBOR maps `{l: CID?, e: [{p, k, v, t?}]}`. Keys are
//! prefix-compressed: each entry's full key is the previous key's first
//! `p` bytes followed by the entry's suffix. An in-order walk (left
//! subtree, then each entry and its right subtree) yields records in
//! lexicographic key order.

use ciborium::Value as CborValue;

use nimbus_common::cbor;
use nimbus_common::cid::CidLink;
use nimbus_common::{Error, Result};

use crate::storage::BlockStorage;

/// An entry within an MST node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MstEntry {
    /// Number of bytes shared with the previous key.
    pub prefix_len: usize,
    /// Key suffix bytes.
    pub key_suffix: Vec<u8>,
    /// CID of the record value.
    pub value: CidLink,
    /// CID of the subtree to the right of this entry, if any.
    pub right: Option<CidLink>,
}

/// A decoded MST node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MstNode {
    /// CID of the subtree left of all entries, if any.
    pub left: Option<CidLink>,
    /// Entries in key order.
    pub entries: Vec<MstEntry>,
}

impl MstNode {
    /// Decodes a node from DAG-CBOR bytes.
    ///
    /// # Errors
    /// Returns [`Error::Mst`] when the bytes are not a well-formed node.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value = cbor::decode_value(bytes).map_err(|e| Error::Mst(format!("node: {e}")))?;
        let CborValue::Map(map) = value else {
            return Err(Error::Mst("node must be a map".into()));
        };

        let left = cbor::map_get(&map, "l")
            .filter(|v| !matches!(v, CborValue::Null))
            .map(|v| link_from(v, "l"))
            .transpose()?;

        let entries = match cbor::map_get(&map, "e") {
            Some(CborValue::Array(items)) => items
                .iter()
                .map(decode_entry)
                .collect::<Result<Vec<MstEntry>>>()?,
            Some(_) => return Err(Error::Mst("entry list must be an array".into())),
            None => Vec::new(),
        };

        Ok(Self { left, entries })
    }
}

fn decode_entry(value: &CborValue) -> Result<MstEntry> {
    let CborValue::Map(map) = value else {
        return Err(Error::Mst("entry must be a map".into()));
    };

    let prefix_len = cbor::map_get(map, "p")
        .and_then(cbor::as_i64)
        .and_then(|p| usize::try_from(p).ok())
        .ok_or_else(|| Error::Mst("entry is missing prefix length".into()))?;

    let key_suffix = cbor::map_get(map, "k")
        .and_then(cbor::as_bytes)
        .ok_or_else(|| Error::Mst("entry is missing key suffix".into()))?
        .to_vec();

    let value = cbor::map_get(map, "v")
        .ok_or_else(|| Error::Mst("entry is missing value".into()))
        .and_then(|v| link_from(v, "v"))?;

    let right = cbor::map_get(map, "t")
        .filter(|v| !matches!(v, CborValue::Null))
        .map(|v| link_from(v, "t"))
        .transpose()?;

    Ok(MstEntry {
        prefix_len,
        key_suffix,
        value,
        right,
    })
}

fn link_from(value: &CborValue, field: &str) -> Result<CidLink> {
    let s = cbor::as_cid_string(value)
        .ok_or_else(|| Error::Mst(format!("field '{field}' is not a CID link")))?;
    CidLink::new(s).map_err(|e| Error::Mst(format!("field '{field}': {e}")))
}

/// A record yielded by a tree walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MstRecord {
    /// Full reconstructed key (collection/rkey path).
    pub key: String,
    /// CID of the record value.
    pub value: CidLink,
}

/// Walks the tree rooted at `root` in order, yielding all records.
///
/// # Errors
/// Returns [`Error::Mst`] on missing blocks or malformed nodes.
pub fn walk(storage: &dyn BlockStorage, root: &CidLink) -> Result<Vec<MstRecord>> {
    let mut records = Vec::new();
    let mut last_key = String::new();
    walk_node(storage, root, &mut last_key, &mut records)?;
    Ok(records)
}

/// Looks up a single key, short-circuiting the walk at the first match.
///
/// # Errors
/// Returns [`Error::Mst`] on missing blocks or malformed nodes.
pub fn lookup(storage: &dyn BlockStorage, root: &CidLink, key: &str) -> Result<Option<CidLink>> {
    let mut last_key = String::new();
    lookup_node(storage, root, key, &mut last_key)
}

fn fetch_node(storage: &dyn BlockStorage, cid: &CidLink) -> Result<MstNode> {
    let bytes = storage
        .get(cid)
        .map_err(|e| Error::Mst(format!("storage: {e}")))?
        .ok_or_else(|| Error::Mst(format!("block not found: {cid}")))?;
    MstNode::decode(&bytes)
}

fn reconstruct_key(last_key: &str, entry: &MstEntry) -> Result<String> {
    if entry.prefix_len > last_key.len() {
        return Err(Error::Mst(format!(
            "prefix length {} exceeds previous key length {}",
            entry.prefix_len,
            last_key.len()
        )));
    }
    let mut key_bytes = last_key.as_bytes()[..entry.prefix_len].to_vec();
    key_bytes.extend_from_slice(&entry.key_suffix);
    String::from_utf8(key_bytes).map_err(|_| Error::Mst("key is not valid UTF-8".into()))
}

fn walk_node(
    storage: &dyn BlockStorage,
    cid: &CidLink,
    last_key: &mut String,
    records: &mut Vec<MstRecord>,
) -> Result<()> {
    let node = fetch_node(storage, cid)?;

    if let Some(left) = &node.left {
        walk_node(storage, left, last_key, records)?;
    }

    for entry in &node.entries {
        let key = reconstruct_key(last_key, entry)?;
        records.push(MstRecord {
            key: key.clone(),
            value: entry.value.clone(),
        });
        *last_key = key;

        if let Some(right) = &entry.right {
            walk_node(storage, right, last_key, records)?;
        }
    }

    Ok(())
}

fn lookup_node(
    storage: &dyn BlockStorage,
    cid: &CidLink,
    target: &str,
    last_key: &mut String,
) -> Result<Option<CidLink>> {
    let node = fetch_node(storage, cid)?;

    if let Some(left) = &node.left {
        if let Some(found) = lookup_node(storage, left, target, last_key)? {
            return Ok(Some(found));
        }
    }

    for entry in &node.entries {
        let key = reconstruct_key(last_key, entry)?;
        *last_key = key.clone();

        if key == target {
            return Ok(Some(entry.value.clone()));
        }

        if let Some(right) = &entry.right {
            if let Some(found) = lookup_node(storage, right, target, last_key)? {
                return Ok(Some(found));
            }
        }
    }

    Ok(None)
}

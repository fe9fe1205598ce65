//! Block storage capability.
//!
//! Repositories address blocks by content. The in-memory implementation
//! derives real CIDv1 addresses (DAG-CBOR codec, SHA-256 multihash) so
//! distinct content always maps to distinct keys.

use std::collections::HashMap;

use parking_lot::Mutex;

use nimbus_common::cid::{Cid, CidLink};
use nimbus_common::Result;

/// The capability to store and retrieve content-addressed blocks.
pub trait BlockStorage: Send + Sync {
    /// Stores a block, returning its content address.
    fn put(&self, data: Vec<u8>) -> Result<CidLink>;

    /// Retrieves a block's bytes, if present.
    fn get(&self, cid: &CidLink) -> Result<Option<Vec<u8>>>;

    /// Returns whether a block is present.
    fn has(&self, cid: &CidLink) -> bool;

    /// Removes a block. Removing an unknown CID is a no-op.
    fn delete(&self, cid: &CidLink) -> Result<()>;

    /// Returns the number of stored blocks.
    fn count(&self) -> usize;
}

/// In-memory block storage.
#[derive(Debug, Default)]
pub struct MemoryBlockStorage {
    blocks: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlockStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlockStorage for MemoryBlockStorage {
    fn put(&self, data: Vec<u8>) -> Result<CidLink> {
        let link = CidLink::from(Cid::for_cbor(&data));
        self.blocks.lock().insert(link.as_str().to_string(), data);
        Ok(link)
    }

    fn get(&self, cid: &CidLink) -> Result<Option<Vec<u8>>> {
        Ok(self.blocks.lock().get(cid.as_str()).cloned())
    }

    fn has(&self, cid: &CidLink) -> bool {
        self.blocks.lock().contains_key(cid.as_str())
    }

    fn delete(&self, cid: &CidLink) -> Result<()> {
        self.blocks.lock().remove(cid.as_str());
        Ok(())
    }

    fn count(&self) -> usize {
        self.blocks.lock().len()
    }
}

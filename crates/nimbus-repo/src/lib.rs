//! Repository formats for the nimbus client SDK.
//!
//! This crate covers the content-addressed side of the protocol:
//! - CAR v1 reading and writing (varint framing)
//! - The block storage capability with an in-memory implementation
//! - Merkle Search Tree node decoding, in-order walks, and key lookup

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod car;
pub mod mst;
pub mod storage;

pub use car::{CarBlock, CarFile};
pub use mst::{MstEntry, MstNode, MstRecord};
pub use storage::{BlockStorage, MemoryBlockStorage};

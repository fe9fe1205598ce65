//! AT Protocol identifier primitives.

pub mod at_uri;
pub mod did;
pub mod handle;
pub mod nsid;
pub mod tid;

pub use at_uri::{AtUri, Authority};
pub use did::{Did, DidMethod};
pub use handle::Handle;
pub use nsid::Nsid;
pub use tid::Tid;

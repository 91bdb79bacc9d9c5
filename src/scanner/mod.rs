//! Cache-side machinery: path codec, version ordering, cache walker,
//! protection policy, purge executor.

pub mod codec;
pub mod protection;
pub mod purge;
pub mod version;
pub mod walker;

//! Hash index mapping key hashes to hybrid log chain heads.

mod hash_index;

pub use hash_index::HashIndex;

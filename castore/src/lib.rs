//! Content-addressed blob storage primitives shared by every topic: BLAKE3
//! hashing, the `.dat` entry codec, and management of the numbered `.dat`
//! files that back a topic's blobs on disk.

pub mod codec;
pub mod datfile;
mod digests;
pub mod hasher;

pub use digests::{B3Digest, Error as DigestError, B3_HEX_LEN, B3_LEN};

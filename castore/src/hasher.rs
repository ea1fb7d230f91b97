//! BLAKE3 hashing utilities: plain digests, a teeing reader that hashes
//! while copying to a sink, and the running-hash chain used by the DAT
//! ledger (see [running_hash]).

use std::io::{self, Read, Write};

use tracing::instrument;

use crate::digests::B3Digest;

/// Hashes an entire byte slice.
pub fn hash_bytes(data: &[u8]) -> B3Digest {
    blake3::hash(data).into()
}

/// Wraps a [Read], hashing every byte as it passes through.
///
/// Used on the ingestion path to hash the incoming stream while it is
/// simultaneously written to a temp file, so payloads are never buffered
/// fully in memory.
pub struct HashingReader<R> {
    inner: R,
    hasher: blake3::Hasher,
    bytes_read: u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: blake3::Hasher::new(),
            bytes_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Consumes the reader, returning the digest of everything read so far.
    pub fn finalize(self) -> B3Digest {
        self.hasher.finalize().into()
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes_read += n as u64;
        Ok(n)
    }
}

/// Tees a [Read] into a [Write] sink while hashing everything that passes
/// through, copying in fixed-size chunks so payloads are never buffered
/// fully in memory. Returns the total bytes copied and their digest.
#[instrument(skip_all, err)]
pub fn hash_and_copy<R: Read, W: Write>(mut src: R, mut sink: W) -> io::Result<(u64, B3Digest)> {
    let mut hasher = blake3::Hasher::new();
    let mut buf = [0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = src.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        sink.write_all(&buf[..n])?;
        total += n as u64;
    }
    Ok((total, hasher.finalize().into()))
}

/// Computes the genesis seed for a fresh DAT file: `H("dat-genesis:" || dat_file_name)`.
///
/// This seeds the running-hash chain of an empty `.dat` file so the ledger
/// value is a commitment to both the file's name and its ordered contents.
pub fn genesis_seed(dat_file_name: &str) -> B3Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"dat-genesis:");
    hasher.update(dat_file_name.as_bytes());
    hasher.finalize().into()
}

/// Folds one more entry into a DAT file's running hash.
///
/// `prev_hash` is either the genesis seed (first entry) or the running hash
/// after the prior entry. The result is
/// `H(prev_hash || entry_hash || byte_offset_LE64 || payload_size_LE64)`,
/// a succinct commitment to the ordered contents of the file: any
/// reordering, insertion, deletion, or mutation changes it.
pub fn fold_running_hash(
    prev_hash: &B3Digest,
    entry_hash: &B3Digest,
    byte_offset: u64,
    payload_size: u64,
) -> B3Digest {
    let mut hasher = blake3::Hasher::new();
    hasher.update(prev_hash.as_bytes());
    hasher.update(entry_hash.as_bytes());
    hasher.update(&byte_offset.to_le_bytes());
    hasher.update(&payload_size.to_le_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn hashing_reader_matches_direct_hash() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let mut hr = HashingReader::new(Cursor::new(data));
        let mut out = Vec::new();
        io::copy(&mut hr, &mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(hr.bytes_read(), data.len() as u64);
        assert_eq!(hr.finalize(), hash_bytes(data));
    }

    #[test]
    fn hash_and_copy_produces_same_digest_as_source() {
        let data = vec![7u8; 10_000];
        let mut sink = Vec::new();
        let (n, digest) = hash_and_copy(Cursor::new(&data), &mut sink).unwrap();
        assert_eq!(n, data.len() as u64);
        assert_eq!(sink, data);
        assert_eq!(digest, hash_bytes(&data));
    }

    #[test]
    fn genesis_seed_is_stable_and_name_dependent() {
        let a = genesis_seed("001.dat");
        let b = genesis_seed("001.dat");
        let c = genesis_seed("002.dat");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn running_hash_changes_on_any_field() {
        let seed = genesis_seed("001.dat");
        let e1 = hash_bytes(b"payload-one");
        let base = fold_running_hash(&seed, &e1, 0, 11);

        assert_ne!(base, fold_running_hash(&seed, &e1, 1, 11), "offset must matter");
        assert_ne!(base, fold_running_hash(&seed, &e1, 0, 12), "size must matter");

        let e2 = hash_bytes(b"payload-two");
        assert_ne!(base, fold_running_hash(&seed, &e2, 0, 11), "entry hash must matter");
    }
}

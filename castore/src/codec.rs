//! The `.dat` entry wire format: a fixed 110-byte header followed by raw
//! payload bytes. See the module-level docs on [HEADER_SIZE] for the exact
//! layout.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::ControlFlow;
use std::path::Path;

use tracing::instrument;

use crate::digests::{B3Digest, B3_HEX_LEN};

/// Magic bytes every entry header starts with.
pub const MAGIC: &[u8; 4] = b"MSHB";

/// The only format version this codec understands.
pub const VERSION: u16 = 1;

/// Total size in bytes of one entry header.
///
/// ```text
/// offset  size  field
/// 0       4     magic "MSHB"
/// 4       2     format version (LE u16)
/// 6       8     payload length (LE u64)
/// 14      64    payload hash, lowercase hex ASCII
/// 78      32    reserved, zero-filled
/// ```
pub const HEADER_SIZE: usize = 110;

const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 4;
const OFF_LENGTH: usize = 6;
const OFF_HASH: usize = 14;
const OFF_RESERVED: usize = 78;
const RESERVED_LEN: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid magic bytes")]
    InvalidMagic,
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u16),
    #[error("invalid payload hash: {0}")]
    InvalidHash(String),
    #[error("header buffer too short: got {0} bytes, need {HEADER_SIZE}")]
    BufferTooShort(usize),
}

/// A parsed entry header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub payload_len: u64,
    pub payload_hash: B3Digest,
}

/// Serializes a header for a payload of the given hash and length.
///
/// `hash` must be exactly [B3_HEX_LEN] lowercase hex characters.
pub fn serialize_header(hash: &B3Digest, length: u64) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[OFF_MAGIC..OFF_MAGIC + 4].copy_from_slice(MAGIC);
    buf[OFF_VERSION..OFF_VERSION + 2].copy_from_slice(&VERSION.to_le_bytes());
    buf[OFF_LENGTH..OFF_LENGTH + 8].copy_from_slice(&length.to_le_bytes());
    let hex = hash.to_hex();
    debug_assert_eq!(hex.len(), B3_HEX_LEN);
    buf[OFF_HASH..OFF_HASH + B3_HEX_LEN].copy_from_slice(hex.as_bytes());
    // buf[OFF_RESERVED..OFF_RESERVED + RESERVED_LEN] is already zero.
    let _ = RESERVED_LEN;
    buf
}

/// Parses a header from a buffer of at least [HEADER_SIZE] bytes.
pub fn parse_header(buf: &[u8]) -> Result<EntryHeader, CodecError> {
    if buf.len() < HEADER_SIZE {
        return Err(CodecError::BufferTooShort(buf.len()));
    }
    if &buf[OFF_MAGIC..OFF_MAGIC + 4] != MAGIC {
        return Err(CodecError::InvalidMagic);
    }
    let version = u16::from_le_bytes(buf[OFF_VERSION..OFF_VERSION + 2].try_into().unwrap());
    if version != VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let payload_len = u64::from_le_bytes(buf[OFF_LENGTH..OFF_LENGTH + 8].try_into().unwrap());
    let hash_str = std::str::from_utf8(&buf[OFF_HASH..OFF_HASH + B3_HEX_LEN])
        .map_err(|_| CodecError::InvalidHash("non-utf8 hash bytes".to_string()))?;
    let payload_hash =
        B3Digest::from_hex(hash_str).map_err(|e| CodecError::InvalidHash(e.to_string()))?;
    Ok(EntryHeader {
        payload_len,
        payload_hash,
    })
}

/// One entry as yielded by [scan]: its header and the byte offset of the
/// header itself within the file (the payload begins at `offset + HEADER_SIZE`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedEntry {
    pub offset: u64,
    pub header: EntryHeader,
}

/// Sequentially scans a `.dat` file, invoking `cb` for each well-formed
/// entry found. `cb` returns [ControlFlow::Break] to stop the scan before
/// reading the next header (§5 "abort at safe points... between entries"),
/// or [ControlFlow::Continue] to keep going.
///
/// On any parse failure or a truncated tail, scanning stops cleanly:
/// orphan trailing bytes (including all zeros, e.g. a reordering of
/// appends interrupted by a crash) are not treated as an error.
#[instrument(skip(cb), fields(path = %path.display()), err)]
pub fn scan<F>(path: &Path, mut cb: F) -> io::Result<()>
where
    F: FnMut(ScannedEntry) -> ControlFlow<()>,
{
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut offset = 0u64;
    let mut header_buf = [0u8; HEADER_SIZE];

    loop {
        if offset + HEADER_SIZE as u64 > len {
            break;
        }
        file.seek(SeekFrom::Start(offset))?;
        if file.read_exact(&mut header_buf).is_err() {
            break;
        }
        let header = match parse_header(&header_buf) {
            Ok(h) => h,
            Err(_) => break,
        };
        let payload_end = match offset
            .checked_add(HEADER_SIZE as u64)
            .and_then(|v| v.checked_add(header.payload_len))
        {
            Some(v) if v <= len => v,
            _ => break,
        };
        let flow = cb(ScannedEntry {
            offset,
            header: header.clone(),
        });
        offset = payload_end;
        if flow.is_break() {
            break;
        }
    }
    Ok(())
}

/// Random-access read of `length` payload bytes starting at
/// `offset + HEADER_SIZE` within `path`. O(1) in file size.
#[instrument(skip_all, fields(path = %path.display(), offset, length), err)]
pub fn read_data(path: &Path, offset: u64, length: u64) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset + HEADER_SIZE as u64))?;
    let mut buf = vec![0u8; length as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::hash_bytes;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn header_round_trip() {
        let hash = hash_bytes(b"hello\n");
        let buf = serialize_header(&hash, 6);
        assert_eq!(buf.len(), HEADER_SIZE);
        let parsed = parse_header(&buf).expect("valid header");
        assert_eq!(parsed.payload_len, 6);
        assert_eq!(parsed.payload_hash, hash);
        assert_eq!(&buf[OFF_RESERVED..OFF_RESERVED + RESERVED_LEN], &[0u8; RESERVED_LEN]);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(b"XXXX");
        assert_eq!(parse_header(&buf), Err(CodecError::InvalidMagic));
    }

    #[test]
    fn rejects_unsupported_version() {
        let hash = hash_bytes(b"x");
        let mut buf = serialize_header(&hash, 1);
        buf[4..6].copy_from_slice(&2u16.to_le_bytes());
        assert_eq!(parse_header(&buf), Err(CodecError::UnsupportedVersion(2)));
    }

    #[test]
    fn scan_stops_cleanly_on_trailing_junk() {
        let mut f = NamedTempFile::new().unwrap();
        let h1 = hash_bytes(b"abc");
        f.write_all(&serialize_header(&h1, 3)).unwrap();
        f.write_all(b"abc").unwrap();
        // orphan trailing junk, shorter than a header
        f.write_all(&[0u8; 20]).unwrap();
        f.flush().unwrap();

        let mut entries = Vec::new();
        scan(f.path(), |e| {
            entries.push(e);
            ControlFlow::Continue(())
        })
        .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].offset, 0);
        assert_eq!(entries[0].header.payload_len, 3);
    }

    #[test]
    fn scan_enumerates_multiple_entries_in_order() {
        let mut f = NamedTempFile::new().unwrap();
        let mut offset = 0u64;
        let mut expected = Vec::new();
        for payload in [&b"one"[..], &b"two-bytes"[..], &b"three!!"[..]] {
            let hash = hash_bytes(payload);
            f.write_all(&serialize_header(&hash, payload.len() as u64))
                .unwrap();
            f.write_all(payload).unwrap();
            expected.push(offset);
            offset += HEADER_SIZE as u64 + payload.len() as u64;
        }
        f.flush().unwrap();

        let mut offsets = Vec::new();
        scan(f.path(), |e| {
            offsets.push(e.offset);
            ControlFlow::Continue(())
        })
        .unwrap();
        assert_eq!(offsets, expected);
    }

    #[test]
    fn scan_stops_mid_file_when_callback_breaks() {
        let mut f = NamedTempFile::new().unwrap();
        for payload in [&b"one"[..], &b"two-bytes"[..], &b"three!!"[..]] {
            let hash = hash_bytes(payload);
            f.write_all(&serialize_header(&hash, payload.len() as u64))
                .unwrap();
            f.write_all(payload).unwrap();
        }
        f.flush().unwrap();

        let mut seen = 0;
        scan(f.path(), |_| {
            seen += 1;
            ControlFlow::Break(())
        })
        .unwrap();
        assert_eq!(seen, 1, "callback must not be invoked again after breaking");
    }

    #[test]
    fn read_data_is_random_access() {
        let mut f = NamedTempFile::new().unwrap();
        let payload = b"the payload bytes";
        f.write_all(&serialize_header(&hash_bytes(payload), payload.len() as u64))
            .unwrap();
        f.write_all(payload).unwrap();
        f.flush().unwrap();

        let read = read_data(f.path(), 0, payload.len() as u64).unwrap();
        assert_eq!(read, payload);
    }
}

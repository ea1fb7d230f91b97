//! Management of the numbered `NNN.dat` files that make up a topic: listing
//! and sorting, picking an append target, and appending entries with
//! `fsync`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::codec::{serialize_header, HEADER_SIZE};
use crate::digests::B3Digest;

/// Default rollover ceiling: a `.dat` file is never grown past this size.
pub const DEFAULT_MAX_DAT_SIZE: u64 = 1024 * 1024 * 1024;

/// Minimum width of the zero-padded numeric portion of a `.dat` filename.
const MIN_DIGITS: usize = 3;

/// Parses `NNN.dat` into its numeric sequence, ignoring anything that
/// doesn't match: at least [MIN_DIGITS] decimal digits followed by `.dat`.
fn parse_dat_name(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(".dat")?;
    if stem.len() < MIN_DIGITS || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}

/// Formats a sequence number as a `NNN.dat` filename, zero-padded to at
/// least [MIN_DIGITS] digits.
pub fn format_dat_name(seq: u64) -> String {
    format!("{seq:0width$}.dat", width = MIN_DIGITS)
}

/// Lists the `.dat` files directly inside `topic_dir`, sorted strictly by
/// their numeric sequence. Filenames not matching the `NNN.dat` pattern are
/// ignored.
#[instrument(skip_all, fields(topic_dir = %topic_dir.display()), err)]
pub fn list_dat_files(topic_dir: &Path) -> io::Result<Vec<(u64, PathBuf)>> {
    let mut out = Vec::new();
    let entries = match fs::read_dir(topic_dir) {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(seq) = parse_dat_name(name) {
            out.push((seq, entry.path()));
        }
    }
    out.sort_by_key(|(seq, _)| *seq);
    Ok(out)
}

/// Returns the name of the next `.dat` file to create: `max_existing + 1`,
/// or `001.dat` if none exist yet.
#[instrument(skip_all, fields(topic_dir = %topic_dir.display()), ret, err)]
pub fn next_name(topic_dir: &Path) -> io::Result<String> {
    let existing = list_dat_files(topic_dir)?;
    let max_seq = existing.last().map(|(seq, _)| *seq).unwrap_or(0);
    Ok(format_dat_name(max_seq + 1))
}

/// Decides which `.dat` file an entry of `entry_size` total bytes (header +
/// payload) should be appended to: the current file if it has room, or the
/// next sequential name otherwise. An entry is never split across files.
#[instrument(skip_all, fields(topic_dir = %topic_dir.display(), entry_size, max_dat_size), ret, err)]
pub fn determine_target(
    topic_dir: &Path,
    entry_size: u64,
    max_dat_size: u64,
) -> io::Result<String> {
    let existing = list_dat_files(topic_dir)?;
    match existing.last() {
        None => Ok(format_dat_name(1)),
        Some((seq, path)) => {
            let current_size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            if current_size + entry_size <= max_dat_size {
                Ok(format_dat_name(*seq))
            } else {
                Ok(format_dat_name(seq + 1))
            }
        }
    }
}

/// Appends one entry (header + payload) to `dat_file` inside `topic_dir`,
/// creating the file if needed, and `fsync`s it before returning.
///
/// Returns the byte offset the entry's header was written at, which equals
/// the file's prior length.
#[instrument(skip(payload), fields(topic_dir = %topic_dir.display(), dat_file, hash = %hash, payload_len), err)]
pub fn append_entry(
    topic_dir: &Path,
    dat_file: &str,
    hash: &B3Digest,
    payload: &mut impl io::Read,
    payload_len: u64,
) -> io::Result<u64> {
    fs::create_dir_all(topic_dir)?;
    let path = topic_dir.join(dat_file);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    let offset = file.metadata()?.len();

    let header = serialize_header(hash, payload_len);
    file.write_all(&header)?;
    let copied = io::copy(payload, &mut file)?;
    if copied != payload_len {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("expected to copy {payload_len} bytes, copied {copied}"),
        ));
    }
    file.sync_all()?;

    debug_assert_eq!(offset + HEADER_SIZE as u64 + payload_len, file.metadata()?.len());
    Ok(offset)
}

/// Total size on disk of every `.dat` file in `topic_dir`.
#[instrument(skip_all, fields(topic_dir = %topic_dir.display()), ret, err)]
pub fn total_dat_bytes(topic_dir: &Path) -> io::Result<u64> {
    let mut total = 0u64;
    for (_, path) in list_dat_files(topic_dir)? {
        total += fs::metadata(path)?.len();
    }
    Ok(total)
}

/// Opens a `.dat` file read-only, for use with [crate::codec::scan] callers
/// that already hold a path and want an existence check up front.
#[instrument(skip_all, fields(topic_dir = %topic_dir.display(), dat_file), err)]
pub fn open_for_read(topic_dir: &Path, dat_file: &str) -> io::Result<File> {
    File::open(topic_dir.join(dat_file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::hash_bytes;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn parses_and_formats_names() {
        assert_eq!(parse_dat_name("001.dat"), Some(1));
        assert_eq!(parse_dat_name("123.dat"), Some(123));
        assert_eq!(parse_dat_name("1.dat"), None, "fewer than 3 digits");
        assert_eq!(parse_dat_name("1234.dat"), Some(1234), "more than 3 digits ok");
        assert_eq!(parse_dat_name("abc.dat"), None);
        assert_eq!(parse_dat_name("001.txt"), None);
        assert_eq!(format_dat_name(1), "001.dat");
        assert_eq!(format_dat_name(1234), "1234.dat");
    }

    #[test]
    fn lists_sorted_numerically_not_lexically() {
        let dir = tempdir().unwrap();
        for name in ["010.dat", "002.dat", "9999.dat", "not-a-dat.dat", "readme.txt"] {
            File::create(dir.path().join(name)).unwrap();
        }
        let listed: Vec<_> = list_dat_files(dir.path())
            .unwrap()
            .into_iter()
            .map(|(seq, _)| seq)
            .collect();
        assert_eq!(listed, vec![2, 10, 9999]);
    }

    #[test]
    fn next_name_starts_at_001() {
        let dir = tempdir().unwrap();
        assert_eq!(next_name(dir.path()).unwrap(), "001.dat");
        File::create(dir.path().join("001.dat")).unwrap();
        File::create(dir.path().join("002.dat")).unwrap();
        assert_eq!(next_name(dir.path()).unwrap(), "003.dat");
    }

    #[test]
    fn determine_target_rolls_over_at_ceiling() {
        let dir = tempdir().unwrap();
        assert_eq!(determine_target(dir.path(), 100, 1000).unwrap(), "001.dat");

        let payload = vec![0u8; 3];
        let hash = hash_bytes(&payload);
        append_entry(dir.path(), "001.dat", &hash, &mut Cursor::new(&payload), 3).unwrap();
        let entry_size = HEADER_SIZE as u64 + 3;

        // fits in the 1000-byte ceiling alongside the existing entry.
        assert_eq!(
            determine_target(dir.path(), 500, 1000).unwrap(),
            "001.dat"
        );
        // would overflow the ceiling, rolls to the next file.
        assert_eq!(
            determine_target(dir.path(), 1000 - entry_size + 1, 1000).unwrap(),
            "002.dat"
        );
    }

    #[test]
    fn append_returns_prior_length_as_offset() {
        let dir = tempdir().unwrap();
        let payload = b"hello\n".to_vec();
        let hash = hash_bytes(&payload);

        let off1 = append_entry(dir.path(), "001.dat", &hash, &mut Cursor::new(&payload), 6).unwrap();
        assert_eq!(off1, 0);

        let off2 = append_entry(dir.path(), "001.dat", &hash, &mut Cursor::new(&payload), 6).unwrap();
        assert_eq!(off2, HEADER_SIZE as u64 + 6);

        let size = fs::metadata(dir.path().join("001.dat")).unwrap().len();
        assert_eq!(size, 2 * (HEADER_SIZE as u64 + 6));
    }
}

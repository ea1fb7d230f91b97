//! The atomic ingestion pipeline (§4.4): stream → hash → dedup → append →
//! two-database commit, serialized per topic.

use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};

use meshhub_castore::hasher::hash_and_copy;
use rusqlite::OptionalExtension;

use crate::errors::ServiceError;
use crate::orchestrator::OrchestratorDb;
use crate::sanitize::sanitize_filename;
use crate::topics::TopicRegistry;

#[derive(Debug, Clone, serde::Serialize)]
pub struct UploadOutcome {
    pub hash: String,
    pub size: u64,
    pub dat_file: String,
    pub skipped: bool,
    pub existing_topic: Option<String>,
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Runs the full ingestion algorithm from §4.4 for one upload.
///
/// `max_payload_size` is `max_dat_size - HEADER_SIZE`, the largest payload
/// that could ever fit in a fresh `.dat` file.
pub fn ingest(
    registry: &TopicRegistry,
    orchestrator: &OrchestratorDb,
    topic: &str,
    mut reader: impl Read,
    declared_filename: &str,
    parent_hash: Option<&str>,
    max_dat_size: u64,
    disk_quota_bytes: Option<u64>,
) -> Result<UploadOutcome, ServiceError> {
    if !registry.is_healthy(topic) {
        return if registry.health(topic).is_some() {
            Err(ServiceError::TopicUnhealthy)
        } else {
            Err(ServiceError::TopicNotFound(topic.to_string()))
        };
    }

    let sanitized = sanitize_filename(declared_filename);

    if let Some(parent) = parent_hash {
        if !orchestrator.exists(parent)? {
            return Err(ServiceError::ParentNotFound);
        }
    }

    let header_size = meshhub_castore::codec::HEADER_SIZE as u64;
    let max_payload_size = max_dat_size.saturating_sub(header_size);

    let mut temp = tempfile::NamedTempFile::new()?;
    let copy_result = {
        let mut limited = (&mut reader).take(max_payload_size + 1);
        hash_and_copy(&mut limited, temp.as_file_mut())
    };
    let (size, hash) = match copy_result {
        Ok(v) => v,
        Err(e) => {
            drop(temp);
            return Err(ServiceError::from(e));
        }
    };
    if size > max_payload_size {
        drop(temp);
        return Err(ServiceError::AssetTooLarge);
    }
    let hash_hex = hash.to_hex();

    // §5 "Per-topic write mutex": held across duplicate check, append, and
    // both DB commits.
    let lock = registry.write_lock(topic);
    let _guard = lock.lock();

    if let Some(existing) = orchestrator.lookup(&hash_hex)? {
        return Ok(UploadOutcome {
            hash: hash_hex,
            size,
            dat_file: existing.dat_file,
            skipped: true,
            existing_topic: Some(existing.topic),
        });
    }

    if let Some(quota) = disk_quota_bytes {
        let current = dir_size(registry.working_dir())?;
        if current + size > quota {
            return Err(ServiceError::DiskLimitExceeded);
        }
    }

    let topic_dir = registry.topic_dir(topic);
    let dat_file = meshhub_castore::datfile::determine_target(&topic_dir, header_size + size, max_dat_size)?;

    temp.as_file_mut().sync_all().ok();
    let mut payload_src = std::fs::File::open(temp.path())?;
    use std::io::Seek;
    payload_src.seek(std::io::SeekFrom::Start(0))?;
    let byte_offset = meshhub_castore::datfile::append_entry(&topic_dir, &dat_file, &hash, &mut payload_src, size)?;

    let db = registry.db(topic)?;
    let created_at = now();

    let commit_result: Result<(), ServiceError> = db.transaction(|tx| {
        tx.execute(
            "INSERT INTO assets (hash, size, origin_name, extension, parent_hash, blob_file, byte_offset, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                hash_hex,
                size as i64,
                sanitized.origin_name,
                sanitized.extension,
                parent_hash,
                dat_file,
                byte_offset as i64,
                created_at
            ],
        )?;

        let (prev_hash, prev_count) = tx
            .query_row(
                "SELECT running_hash, entry_count FROM dat_ledger WHERE dat_file = ?1",
                [&dat_file],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)),
            )
            .optional()?
            .map(|(h, c)| (h, c))
            .unwrap_or_else(|| (meshhub_castore::hasher::genesis_seed(&dat_file).to_hex(), 0));
        let prev_digest = meshhub_castore::B3Digest::from_hex(&prev_hash)
            .map_err(|_| rusqlite::Error::InvalidQuery)?;
        let new_running = meshhub_castore::hasher::fold_running_hash(&prev_digest, &hash, byte_offset, size);
        let new_count = prev_count + 1;

        tx.execute(
            "INSERT INTO dat_ledger (dat_file, running_hash, entry_count, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(dat_file) DO UPDATE SET running_hash = excluded.running_hash, entry_count = excluded.entry_count, updated_at = excluded.updated_at",
            rusqlite::params![dat_file, new_running.to_hex(), new_count as i64, created_at],
        )?;
        Ok(())
    });
    commit_result?;

    // Orchestrator commit is best-effort: failure here is logged and
    // recovered by the next reconciliation pass (§4.4 step 10, §9).
    if let Err(e) = orchestrator.insert(&hash_hex, topic, &dat_file) {
        tracing::warn!(hash = %hash_hex, topic, error = %e, "orchestrator commit failed after topic commit; will reconcile later");
    }

    Ok(UploadOutcome {
        hash: hash_hex,
        size,
        dat_file,
        skipped: false,
        existing_topic: None,
    })
}

fn dir_size(dir: &std::path::Path) -> std::io::Result<u64> {
    let mut total = 0u64;
    if !dir.is_dir() {
        return Ok(0);
    }
    for entry in walkdir::WalkDir::new(dir) {
        let entry = entry.map_err(|e| std::io::Error::other(e.to_string()))?;
        if entry.file_type().is_file() {
            total += entry.metadata().map_err(|e| std::io::Error::other(e.to_string()))?.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn setup() -> (TopicRegistry, OrchestratorDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let registry = TopicRegistry::new(dir.path());
        registry.create_topic("t1").unwrap();
        registry.create_topic("t2").unwrap();
        let orchestrator = OrchestratorDb::open(dir.path().join(".internal/orchestrator.db")).unwrap();
        (registry, orchestrator, dir)
    }

    #[test]
    fn basic_upload_lands_in_001_dat() {
        let (registry, orchestrator, dir) = setup();
        let outcome = ingest(
            &registry,
            &orchestrator,
            "t1",
            Cursor::new(b"hello\n".to_vec()),
            "greeting.txt",
            None,
            meshhub_castore::datfile::DEFAULT_MAX_DAT_SIZE,
            None,
        )
        .unwrap();
        assert_eq!(outcome.size, 6);
        assert_eq!(outcome.dat_file, "001.dat");
        assert!(!outcome.skipped);

        let dat_path = dir.path().join("t1").join("001.dat");
        assert_eq!(std::fs::metadata(dat_path).unwrap().len(), 116);
    }

    #[test]
    fn duplicate_across_topics_is_skipped() {
        let (registry, orchestrator, _dir) = setup();
        let first = ingest(
            &registry,
            &orchestrator,
            "t1",
            Cursor::new(b"hello\n".to_vec()),
            "a.txt",
            None,
            meshhub_castore::datfile::DEFAULT_MAX_DAT_SIZE,
            None,
        )
        .unwrap();

        let second = ingest(
            &registry,
            &orchestrator,
            "t2",
            Cursor::new(b"hello\n".to_vec()),
            "b.txt",
            None,
            meshhub_castore::datfile::DEFAULT_MAX_DAT_SIZE,
            None,
        )
        .unwrap();

        assert!(second.skipped);
        assert_eq!(second.existing_topic, Some("t1".to_string()));
        assert_eq!(second.hash, first.hash);
    }

    #[test]
    fn unhealthy_topic_rejects_upload() {
        let (registry, orchestrator, _dir) = setup();
        registry.mark_unhealthy("t1", "corrupted");
        let err = ingest(
            &registry,
            &orchestrator,
            "t1",
            Cursor::new(b"x".to_vec()),
            "x.bin",
            None,
            meshhub_castore::datfile::DEFAULT_MAX_DAT_SIZE,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::TopicUnhealthy));
    }

    #[test]
    fn missing_parent_is_rejected() {
        let (registry, orchestrator, _dir) = setup();
        let err = ingest(
            &registry,
            &orchestrator,
            "t1",
            Cursor::new(b"x".to_vec()),
            "x.bin",
            Some("nonexistent"),
            meshhub_castore::datfile::DEFAULT_MAX_DAT_SIZE,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::ParentNotFound));
    }

    #[test]
    fn rollover_splits_across_dat_files() {
        let (registry, orchestrator, _dir) = setup();
        let max_dat_size = 1_048_576u64;
        let payload = vec![7u8; 500 * 1024];

        let o1 = ingest(&registry, &orchestrator, "t1", Cursor::new(payload.clone()), "a.bin", None, max_dat_size, None).unwrap();
        let o2 = ingest(&registry, &orchestrator, "t1", Cursor::new(vec![8u8; 500 * 1024]), "b.bin", None, max_dat_size, None).unwrap();
        let o3 = ingest(&registry, &orchestrator, "t1", Cursor::new(vec![9u8; 500 * 1024]), "c.bin", None, max_dat_size, None).unwrap();

        assert_eq!(o1.dat_file, "001.dat");
        assert_eq!(o2.dat_file, "001.dat");
        assert_eq!(o3.dat_file, "002.dat");
    }
}

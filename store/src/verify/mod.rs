//! Read-only auditor: per-entry hash check, chain check, and index
//! consistency audit (§4.8). Never mutates; reconciliation handles
//! remediation of anything it finds.

use std::collections::HashSet;
use std::ops::ControlFlow;

use tracing::instrument;

use crate::orchestrator::OrchestratorDb;
use crate::topics::TopicRegistry;

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind")]
pub enum VerifyEvent {
    Progress { topic: String, dat_file: String },
    EntryMismatch { topic: String, dat_file: String, byte_offset: u64 },
    ChainMismatch { topic: String, dat_file: String },
    IndexIssue { class: IssueClass, hash: String, detail: String },
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueClass {
    Orphan,
    Missing,
    Mismatch,
}

/// A cooperative cancellation flag checked between files and between
/// entries (§5 "Cancellation").
pub trait CancelSignal {
    fn is_cancelled(&self) -> bool;
}

impl CancelSignal for std::sync::atomic::AtomicBool {
    fn is_cancelled(&self) -> bool {
        self.load(std::sync::atomic::Ordering::Relaxed)
    }
}

/// Per-entry check: recomputes `BLAKE3(payload)` for every entry in every
/// `.dat` file of `topic` and compares it to the header's declared hash.
/// `cancel` is polled between files and, via `scan`'s `ControlFlow`,
/// between entries too, so a cancellation request takes effect without
/// waiting for the current file to finish (§5 "abort at safe points").
#[instrument(skip(registry, cancel), fields(topic))]
pub fn verify_entries(
    registry: &TopicRegistry,
    topic: &str,
    cancel: &dyn CancelSignal,
) -> std::io::Result<Vec<VerifyEvent>> {
    let mut events = Vec::new();
    let dir = registry.topic_dir(topic);
    for (_, path) in meshhub_castore::datfile::list_dat_files(&dir)? {
        if cancel.is_cancelled() {
            break;
        }
        let dat_file = path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
        events.push(VerifyEvent::Progress {
            topic: topic.to_string(),
            dat_file: dat_file.clone(),
        });
        let mut mismatches = Vec::new();
        meshhub_castore::codec::scan(&path, |entry| {
            if cancel.is_cancelled() {
                return ControlFlow::Break(());
            }
            if let Ok(payload) = meshhub_castore::codec::read_data(&path, entry.offset, entry.header.payload_len) {
                let actual = meshhub_castore::hasher::hash_bytes(&payload);
                if actual != entry.header.payload_hash {
                    mismatches.push(entry.offset);
                }
            }
            ControlFlow::Continue(())
        })?;
        for byte_offset in mismatches {
            events.push(VerifyEvent::EntryMismatch {
                topic: topic.to_string(),
                dat_file: dat_file.clone(),
                byte_offset,
            });
        }
    }
    Ok(events)
}

/// Chain check: recomputes the running hash of every `.dat` file and
/// compares it to the topic DB's ledger.
#[instrument(skip(registry), fields(topic), err)]
pub fn verify_chain(registry: &TopicRegistry, topic: &str) -> Result<Vec<VerifyEvent>, crate::errors::ServiceError> {
    let mut events = Vec::new();
    let db = registry.db(topic)?;
    let dir = registry.topic_dir(topic);
    for (_, path) in meshhub_castore::datfile::list_dat_files(&dir)? {
        let dat_file = path.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
        let mut running = meshhub_castore::hasher::genesis_seed(&dat_file);
        let mut count = 0u64;
        meshhub_castore::codec::scan(&path, |entry| {
            running = meshhub_castore::hasher::fold_running_hash(
                &running,
                &entry.header.payload_hash,
                entry.offset,
                entry.header.payload_len,
            );
            count += 1;
            ControlFlow::Continue(())
        })?;
        let matches = db
            .ledger_get(&dat_file)?
            .map(|l| l.running_hash == running.to_hex() && l.entry_count == count)
            .unwrap_or(count == 0);
        if !matches {
            events.push(VerifyEvent::ChainMismatch {
                topic: topic.to_string(),
                dat_file,
            });
        }
    }
    Ok(events)
}

/// Index consistency audit: walks the orchestrator index and the union of
/// every known topic's asset table, classifying disagreements (§4.8 "index").
#[instrument(skip_all, err)]
pub fn verify_index(
    registry: &TopicRegistry,
    orchestrator: &OrchestratorDb,
) -> Result<Vec<VerifyEvent>, crate::errors::ServiceError> {
    let mut events = Vec::new();
    let topics = registry.list_names();

    let mut all_topic_hashes: HashSet<(String, String)> = HashSet::new();
    for topic in &topics {
        let db = registry.db(topic)?;
        for hash in db.list_asset_hashes()? {
            all_topic_hashes.insert((hash, topic.clone()));
        }
    }

    for topic in &topics {
        for entry in orchestrator.list_by_topic(topic)? {
            let present = all_topic_hashes.contains(&(entry.hash.clone(), topic.clone()));
            if !present {
                let owned_elsewhere = all_topic_hashes.iter().any(|(h, _)| h == &entry.hash);
                events.push(VerifyEvent::IndexIssue {
                    class: if owned_elsewhere {
                        IssueClass::Mismatch
                    } else {
                        IssueClass::Orphan
                    },
                    hash: entry.hash,
                    detail: format!("indexed under {topic}, not found there"),
                });
            }
        }
    }

    for (hash, topic) in &all_topic_hashes {
        if orchestrator.lookup(hash)?.is_none() {
            events.push(VerifyEvent::IndexIssue {
                class: IssueClass::Missing,
                hash: hash.clone(),
                detail: format!("present in topic {topic}, absent from orchestrator"),
            });
        }
    }

    Ok(events)
}

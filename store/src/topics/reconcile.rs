//! Periodic reconciliation sweep between the topic registry and the
//! orchestrator index (§4.7 "Reconciliation").

use crate::orchestrator::OrchestratorDb;
use crate::topics::TopicRegistry;

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ReconcileReport {
    pub indexed: u64,
    pub removed: u64,
    pub unhealthy_detected: u64,
}

/// Runs one reconciliation pass:
/// - topics whose directory vanished externally are unregistered and their
///   orchestrator entries purged;
/// - assets present in a topic DB but missing from the orchestrator are
///   re-indexed (first-topic-wins);
/// - orchestrator entries pointing at a topic that no longer exists, or no
///   longer holds that hash, are removed.
pub fn reconcile(registry: &TopicRegistry, orchestrator: &OrchestratorDb) -> std::io::Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for name in registry.list_names() {
        if !registry.topic_dir(&name).is_dir() {
            registry.unregister(&name);
            report.removed += orchestrator.remove_by_topic(&name).unwrap_or(0) as u64;
            continue;
        }

        if registry.verify_integrity(&name).is_err() {
            report.unhealthy_detected += 1;
            continue;
        }

        let Ok(db) = registry.db(&name) else {
            report.unhealthy_detected += 1;
            continue;
        };

        if let Ok(hashes) = db.list_asset_hashes() {
            for hash in hashes {
                if let Ok(asset) = db.get_asset(&hash) {
                    if let Some(asset) = asset {
                        if orchestrator
                            .insert_or_ignore(&hash, &name, &asset.blob_file)
                            .unwrap_or(false)
                        {
                            report.indexed += 1;
                        }
                    }
                }
            }
        }
    }

    let known_topics: std::collections::HashSet<String> = registry.list_names().into_iter().collect();
    for topic in orchestrator.list_topics_present().unwrap_or_default() {
        if !known_topics.contains(&topic) {
            report.removed += orchestrator.remove_by_topic(&topic).unwrap_or(0) as u64;
            continue;
        }
        if let Ok(db) = registry.db(&topic) {
            for entry in orchestrator.list_by_topic(&topic).unwrap_or_default() {
                if !db.asset_exists(&entry.hash).unwrap_or(false) {
                    orchestrator.remove(&entry.hash).ok();
                    report.removed += 1;
                }
            }
        }
    }

    Ok(report)
}

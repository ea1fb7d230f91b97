//! Topic lifecycle: discovery, health tracking, per-topic locks, creation,
//! and reconciliation (§4.7, §9 "Shared registries").

pub mod reconcile;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::errors::ServiceError;
use crate::topicdb::TopicDb;

/// Checks a topic name against `^[a-z0-9_-]{1,64}$` (§4.7 "Topic creation").
pub fn validate_topic_name(name: &str) -> Result<(), ServiceError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(ServiceError::InvalidTopicName(name.to_string()))
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TopicHealth {
    pub healthy: bool,
    pub error: Option<String>,
}

impl TopicHealth {
    fn healthy() -> Self {
        Self {
            healthy: true,
            error: None,
        }
    }

    fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            healthy: false,
            error: Some(error.into()),
        }
    }
}

/// The process-wide registry of known topics: health flags, lazily-opened
/// DB handles, and the per-topic write mutexes that serialize ingest
/// (§5 "Per-topic write mutex", §9). One instance is owned by the service
/// facade and threaded through by reference — never a free-standing
/// global.
pub struct TopicRegistry {
    working_dir: PathBuf,
    health: RwLock<HashMap<String, TopicHealth>>,
    dbs: RwLock<HashMap<String, Arc<TopicDb>>>,
    write_locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
    create_lock: Mutex<()>,
}

impl TopicRegistry {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            health: RwLock::new(HashMap::new()),
            dbs: RwLock::new(HashMap::new()),
            write_locks: RwLock::new(HashMap::new()),
            create_lock: Mutex::new(()),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn topic_dir(&self, name: &str) -> PathBuf {
        self.working_dir.join(name)
    }

    fn topic_db_path(&self, name: &str) -> PathBuf {
        self.topic_dir(name).join(".internal").join(format!("{name}.db"))
    }

    /// Scans `working_dir` for subdirectories holding `.internal/<name>.db`
    /// and registers each as a discovered topic, verifying integrity
    /// immediately (§4.7 "Discovery").
    #[tracing::instrument(skip(self), fields(working_dir = %self.working_dir.display()), err)]
    pub fn discover(&self) -> std::io::Result<Vec<String>> {
        let mut found = Vec::new();
        if !self.working_dir.exists() {
            return Ok(found);
        }
        for entry in std::fs::read_dir(&self.working_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == ".internal" {
                continue;
            }
            let db_path = self.topic_db_path(&name);
            if db_path.is_file() {
                found.push(name.clone());
                self.register_healthy(&name);
            }
        }
        Ok(found)
    }

    fn register_healthy(&self, name: &str) {
        self.health
            .write()
            .insert(name.to_string(), TopicHealth::healthy());
    }

    pub fn mark_unhealthy(&self, name: &str, error: impl Into<String>) {
        self.health
            .write()
            .insert(name.to_string(), TopicHealth::unhealthy(error));
    }

    pub fn health(&self, name: &str) -> Option<TopicHealth> {
        self.health.read().get(name).cloned()
    }

    pub fn is_healthy(&self, name: &str) -> bool {
        self.health.read().get(name).map(|h| h.healthy).unwrap_or(false)
    }

    pub fn list_names(&self) -> Vec<String> {
        self.health.read().keys().cloned().collect()
    }

    pub fn list_healthy_names(&self) -> Vec<String> {
        self.health
            .read()
            .iter()
            .filter(|(_, h)| h.healthy)
            .map(|(n, _)| n.clone())
            .collect()
    }

    pub fn unregister(&self, name: &str) {
        self.health.write().remove(name);
        self.dbs.write().remove(name);
        self.write_locks.write().remove(name);
    }

    /// Returns this topic's open DB handle, opening (double-checked) on
    /// first use (§5 "Topic-DB map mutex").
    pub fn db(&self, name: &str) -> Result<Arc<TopicDb>, ServiceError> {
        if let Some(db) = self.dbs.read().get(name) {
            return Ok(db.clone());
        }
        let mut dbs = self.dbs.write();
        if let Some(db) = dbs.get(name) {
            return Ok(db.clone());
        }
        let db = Arc::new(TopicDb::open(self.topic_db_path(name))?);
        dbs.insert(name.to_string(), db.clone());
        Ok(db)
    }

    /// Returns the write mutex for `name`, creating it on first use.
    pub fn write_lock(&self, name: &str) -> Arc<Mutex<()>> {
        if let Some(lock) = self.write_locks.read().get(name) {
            return lock.clone();
        }
        let mut locks = self.write_locks.write();
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Materializes a new topic directory and schema-initialized DB under
    /// the global creation lock (§4.7 "Topic creation").
    #[tracing::instrument(skip(self), fields(topic = name), err)]
    pub fn create_topic(&self, name: &str) -> Result<(), ServiceError> {
        validate_topic_name(name)?;
        let _guard = self.create_lock.lock();
        if self.health.read().contains_key(name) {
            return Err(ServiceError::TopicAlreadyExists(name.to_string()));
        }
        let db_path = self.topic_db_path(name);
        if db_path.exists() {
            return Err(ServiceError::TopicAlreadyExists(name.to_string()));
        }
        let db = Arc::new(TopicDb::open(&db_path)?);
        self.dbs.write().insert(name.to_string(), db);
        self.register_healthy(name);
        Ok(())
    }

    /// Recomputes and checks the running hash of every `.dat` file against
    /// the ledger (§4.7 "Integrity verification"). Marks the topic
    /// unhealthy on the first mismatch found.
    #[tracing::instrument(skip(self), fields(topic = name), err)]
    pub fn verify_integrity(&self, name: &str) -> Result<(), ServiceError> {
        let db = self.db(name)?;
        let dir = self.topic_dir(name);
        for (_, path) in meshhub_castore::datfile::list_dat_files(&dir)? {
            let dat_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let mut running = meshhub_castore::hasher::genesis_seed(&dat_file);
            let mut count: u64 = 0;
            let scan_result = meshhub_castore::codec::scan(&path, |entry| {
                running = meshhub_castore::hasher::fold_running_hash(
                    &running,
                    &entry.header.payload_hash,
                    entry.offset,
                    entry.header.payload_len,
                );
                count += 1;
                std::ops::ControlFlow::Continue(())
            });
            if let Err(e) = scan_result {
                self.mark_unhealthy(name, format!("{dat_file}: {e}"));
                return Err(ServiceError::TopicUnhealthy);
            }
            if let Some(ledger) = db.ledger_get(&dat_file)? {
                if ledger.running_hash != running.to_hex() || ledger.entry_count != count {
                    self.mark_unhealthy(name, format!("{dat_file}: running hash mismatch"));
                    return Err(ServiceError::TopicUnhealthy);
                }
            }
        }
        self.register_healthy(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(validate_topic_name("my-topic_1").is_ok());
        assert!(validate_topic_name("Has Spaces").is_err());
        assert!(validate_topic_name("").is_err());
        assert!(validate_topic_name(&"a".repeat(65)).is_err());
    }

    #[test]
    fn create_then_discover() {
        let dir = tempfile::tempdir().unwrap();
        let reg = TopicRegistry::new(dir.path());
        reg.create_topic("t1").unwrap();
        assert!(reg.is_healthy("t1"));

        let reg2 = TopicRegistry::new(dir.path());
        let found = reg2.discover().unwrap();
        assert_eq!(found, vec!["t1".to_string()]);
        assert!(reg2.is_healthy("t1"));
    }

    #[test]
    fn create_twice_errors() {
        let dir = tempfile::tempdir().unwrap();
        let reg = TopicRegistry::new(dir.path());
        reg.create_topic("t1").unwrap();
        let err = reg.create_topic("t1").unwrap_err();
        assert!(matches!(err, ServiceError::TopicAlreadyExists(_)));
    }

    #[test]
    fn write_lock_is_shared_per_name() {
        let dir = tempfile::tempdir().unwrap();
        let reg = TopicRegistry::new(dir.path());
        let a = reg.write_lock("t1");
        let b = reg.write_lock("t1");
        assert!(Arc::ptr_eq(&a, &b));
    }
}

//! Global hash→(topic, dat_file) index (§3 "Orchestrator index entry",
//! §6.4). Lives at `<working_dir>/.internal/orchestrator.db`, one writer
//! guarded by a single mutex — every topic's ingest commits against it
//! last, so it is the one shared-write bottleneck in the system (§5).

mod schema;

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};

pub struct OrchestratorDb {
    conn: Mutex<Connection>,
    #[allow(dead_code)]
    path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct IndexEntry {
    pub hash: String,
    pub topic: String,
    pub dat_file: String,
}

impl OrchestratorDb {
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Looks up the owning topic for `hash`, if any (§4.4 step 5).
    pub fn lookup(&self, hash: &str) -> rusqlite::Result<Option<IndexEntry>> {
        self.conn
            .lock()
            .query_row(
                "SELECT hash, topic, dat_file FROM asset_index WHERE hash = ?1",
                [hash],
                |row| {
                    Ok(IndexEntry {
                        hash: row.get(0)?,
                        topic: row.get(1)?,
                        dat_file: row.get(2)?,
                    })
                },
            )
            .optional()
    }

    pub fn exists(&self, hash: &str) -> rusqlite::Result<bool> {
        Ok(self.lookup(hash)?.is_some())
    }

    /// Inserts a fresh mapping. Callers serialize via the per-topic write
    /// lock, so a conflicting row here means a logic error upstream, not a
    /// race to paper over.
    pub fn insert(&self, hash: &str, topic: &str, dat_file: &str) -> rusqlite::Result<()> {
        self.conn.lock().execute(
            "INSERT INTO asset_index (hash, topic, dat_file) VALUES (?1, ?2, ?3)",
            rusqlite::params![hash, topic, dat_file],
        )?;
        Ok(())
    }

    /// First-topic-wins re-index used by reconciliation (§4.7): a no-op if
    /// the hash is already indexed anywhere.
    pub fn insert_or_ignore(&self, hash: &str, topic: &str, dat_file: &str) -> rusqlite::Result<bool> {
        let changed = self.conn.lock().execute(
            "INSERT OR IGNORE INTO asset_index (hash, topic, dat_file) VALUES (?1, ?2, ?3)",
            rusqlite::params![hash, topic, dat_file],
        )?;
        Ok(changed > 0)
    }

    pub fn remove(&self, hash: &str) -> rusqlite::Result<()> {
        self.conn
            .lock()
            .execute("DELETE FROM asset_index WHERE hash = ?1", [hash])?;
        Ok(())
    }

    pub fn remove_by_topic(&self, topic: &str) -> rusqlite::Result<usize> {
        Ok(self
            .conn
            .lock()
            .execute("DELETE FROM asset_index WHERE topic = ?1", [topic])?)
    }

    pub fn list_by_topic(&self, topic: &str) -> rusqlite::Result<Vec<IndexEntry>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT hash, topic, dat_file FROM asset_index WHERE topic = ?1")?;
        let rows = stmt.query_map([topic], |row| {
            Ok(IndexEntry {
                hash: row.get(0)?,
                topic: row.get(1)?,
                dat_file: row.get(2)?,
            })
        })?;
        rows.collect()
    }

    pub fn list_topics_present(&self) -> rusqlite::Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT topic FROM asset_index")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let db = OrchestratorDb::open(dir.path().join("orchestrator.db")).unwrap();
        assert!(db.lookup("h1").unwrap().is_none());
        db.insert("h1", "t1", "001.dat").unwrap();
        let e = db.lookup("h1").unwrap().unwrap();
        assert_eq!(e.topic, "t1");
        assert!(db.exists("h1").unwrap());
    }

    #[test]
    fn insert_or_ignore_is_first_wins() {
        let dir = tempfile::tempdir().unwrap();
        let db = OrchestratorDb::open(dir.path().join("orchestrator.db")).unwrap();
        assert!(db.insert_or_ignore("h1", "t1", "001.dat").unwrap());
        assert!(!db.insert_or_ignore("h1", "t2", "001.dat").unwrap());
        assert_eq!(db.lookup("h1").unwrap().unwrap().topic, "t1");
    }

    #[test]
    fn remove_by_topic() {
        let dir = tempfile::tempdir().unwrap();
        let db = OrchestratorDb::open(dir.path().join("orchestrator.db")).unwrap();
        db.insert("h1", "t1", "001.dat").unwrap();
        db.insert("h2", "t1", "001.dat").unwrap();
        db.insert("h3", "t2", "001.dat").unwrap();
        assert_eq!(db.remove_by_topic("t1").unwrap(), 2);
        assert!(db.lookup("h3").unwrap().is_some());
    }
}

//! Per-topic relational store (§3 "Topic DB", §6.3).
//!
//! Each topic owns exactly one SQLite file at
//! `<working_dir>/.internal/<topic>.db`, opened in WAL mode and guarded by
//! a `Mutex` so concurrent writers from the same process serialize cleanly
//! (cross-process concurrency is out of scope, per the Non-goals).

mod schema;
pub mod types;

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};

use crate::value::SqlValue;
use types::{Asset, LedgerEntry, MetadataLogEntry, MetadataOp};

pub struct TopicDb {
    conn: Mutex<Connection>,
    path: PathBuf,
}

/// The column names and row values of a raw query, in the shape the query
/// engine hands back to callers (§4.6).
#[derive(Debug, Clone, Default)]
pub struct RawRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl TopicDb {
    /// Opens (creating if absent) the topic DB at `path`, initializing its
    /// schema on first use.
    pub fn open(path: impl AsRef<Path>) -> rusqlite::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(&path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "OFF")?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // --- assets ---------------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn insert_asset(
        &self,
        hash: &str,
        size: u64,
        origin_name: &str,
        extension: &str,
        parent_hash: Option<&str>,
        blob_file: &str,
        byte_offset: u64,
        created_at: i64,
    ) -> rusqlite::Result<()> {
        self.conn.lock().execute(
            "INSERT INTO assets (hash, size, origin_name, extension, parent_hash, blob_file, byte_offset, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                hash,
                size as i64,
                origin_name,
                extension,
                parent_hash,
                blob_file,
                byte_offset as i64,
                created_at
            ],
        )?;
        Ok(())
    }

    pub fn get_asset(&self, hash: &str) -> rusqlite::Result<Option<Asset>> {
        self.conn
            .lock()
            .query_row(
                "SELECT hash, size, origin_name, extension, parent_hash, blob_file, byte_offset, created_at
                 FROM assets WHERE hash = ?1",
                [hash],
                row_to_asset,
            )
            .optional()
    }

    pub fn asset_exists(&self, hash: &str) -> rusqlite::Result<bool> {
        self.conn
            .lock()
            .query_row("SELECT 1 FROM assets WHERE hash = ?1", [hash], |_| Ok(()))
            .optional()
            .map(|r| r.is_some())
    }

    pub fn list_asset_hashes(&self) -> rusqlite::Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT hash FROM assets")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect()
    }

    pub fn list_children(&self, parent_hash: &str) -> rusqlite::Result<Vec<Asset>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT hash, size, origin_name, extension, parent_hash, blob_file, byte_offset, created_at
             FROM assets WHERE parent_hash = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([parent_hash], row_to_asset)?;
        rows.collect()
    }

    // --- dat ledger -------------------------------------------------------

    pub fn ledger_get(&self, dat_file: &str) -> rusqlite::Result<Option<LedgerEntry>> {
        self.conn
            .lock()
            .query_row(
                "SELECT dat_file, running_hash, entry_count, updated_at FROM dat_ledger WHERE dat_file = ?1",
                [dat_file],
                |row| {
                    Ok(LedgerEntry {
                        dat_file: row.get(0)?,
                        running_hash: row.get(1)?,
                        entry_count: row.get::<_, i64>(2)? as u64,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()
    }

    pub fn ledger_upsert(
        &self,
        dat_file: &str,
        running_hash: &str,
        entry_count: u64,
        updated_at: i64,
    ) -> rusqlite::Result<()> {
        self.conn.lock().execute(
            "INSERT INTO dat_ledger (dat_file, running_hash, entry_count, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(dat_file) DO UPDATE SET
               running_hash = excluded.running_hash,
               entry_count = excluded.entry_count,
               updated_at = excluded.updated_at",
            rusqlite::params![dat_file, running_hash, entry_count as i64, updated_at],
        )?;
        Ok(())
    }

    pub fn ledger_all(&self) -> rusqlite::Result<Vec<LedgerEntry>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare("SELECT dat_file, running_hash, entry_count, updated_at FROM dat_ledger")?;
        let rows = stmt.query_map([], |row| {
            Ok(LedgerEntry {
                dat_file: row.get(0)?,
                running_hash: row.get(1)?,
                entry_count: row.get::<_, i64>(2)? as u64,
                updated_at: row.get(3)?,
            })
        })?;
        rows.collect()
    }

    // --- metadata log + projection ---------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn metadata_log_append(
        &self,
        asset_hash: &str,
        op: MetadataOp,
        key: &str,
        value_text: Option<&str>,
        value_num: Option<f64>,
        processor: &str,
        processor_version: &str,
        timestamp: i64,
    ) -> rusqlite::Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO metadata_log (asset_hash, op, key, value_text, value_num, processor, processor_version, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                asset_hash,
                op.as_str(),
                key,
                value_text,
                value_num,
                processor,
                processor_version,
                timestamp
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn metadata_log_list(&self, asset_hash: &str) -> rusqlite::Result<Vec<MetadataLogEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, asset_hash, op, key, value_text, value_num, processor, processor_version, timestamp
             FROM metadata_log WHERE asset_hash = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([asset_hash], row_to_log_entry)?;
        rows.collect()
    }

    pub fn projection_get(&self, asset_hash: &str) -> rusqlite::Result<Option<String>> {
        self.conn
            .lock()
            .query_row(
                "SELECT json FROM metadata_projection WHERE asset_hash = ?1",
                [asset_hash],
                |row| row.get(0),
            )
            .optional()
    }

    pub fn projection_put(&self, asset_hash: &str, json: &str, updated_at: i64) -> rusqlite::Result<()> {
        self.conn.lock().execute(
            "INSERT INTO metadata_projection (asset_hash, json, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(asset_hash) DO UPDATE SET json = excluded.json, updated_at = excluded.updated_at",
            rusqlite::params![asset_hash, json, updated_at],
        )?;
        Ok(())
    }

    // --- transactions + raw queries ---------------------------------------

    /// Runs `f` inside a single SQLite transaction, committing on `Ok` and
    /// rolling back on `Err`.
    pub fn transaction<T, E>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<rusqlite::Error>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(E::from)?;
        let out = f(&tx)?;
        tx.commit().map_err(E::from)?;
        Ok(out)
    }

    /// Executes an already-rewritten, positionally-parameterized `SELECT`
    /// against this topic's connection (§4.6 query engine). Never accepts
    /// caller-built SQL text with interpolated values; `params` are always
    /// bound, never concatenated.
    pub fn run_query(&self, sql: &str, params: &[SqlValue]) -> rusqlite::Result<RawRows> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let bind: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();
        let mut rows_iter = stmt.query(bind.as_slice())?;
        let mut rows = Vec::new();
        while let Some(row) = rows_iter.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(SqlValue::from(row.get_ref(i)?));
            }
            rows.push(values);
        }
        Ok(RawRows { columns, rows })
    }
}

fn row_to_asset(row: &rusqlite::Row<'_>) -> rusqlite::Result<Asset> {
    Ok(Asset {
        hash: row.get(0)?,
        size: row.get::<_, i64>(1)? as u64,
        origin_name: row.get(2)?,
        extension: row.get(3)?,
        parent_hash: row.get(4)?,
        blob_file: row.get(5)?,
        byte_offset: row.get::<_, i64>(6)? as u64,
        created_at: row.get(7)?,
    })
}

fn row_to_log_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<MetadataLogEntry> {
    let op_str: String = row.get(2)?;
    let op = op_str.parse::<MetadataOp>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(
            std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        ))
    })?;
    Ok(MetadataLogEntry {
        id: row.get(0)?,
        asset_hash: row.get(1)?,
        op,
        key: row.get(3)?,
        value_text: row.get(4)?,
        value_num: row.get(5)?,
        processor: row.get(6)?,
        processor_version: row.get(7)?,
        timestamp: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_tmp() -> (TopicDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = TopicDb::open(dir.path().join("t.db")).unwrap();
        (db, dir)
    }

    #[test]
    fn insert_and_get_asset() {
        let (db, _dir) = open_tmp();
        db.insert_asset("abc123", 42, "file", "bin", None, "001.dat", 0, 1000)
            .unwrap();
        let a = db.get_asset("abc123").unwrap().unwrap();
        assert_eq!(a.size, 42);
        assert_eq!(a.blob_file, "001.dat");
        assert!(db.asset_exists("abc123").unwrap());
        assert!(!db.asset_exists("nope").unwrap());
    }

    #[test]
    fn ledger_roundtrip() {
        let (db, _dir) = open_tmp();
        assert!(db.ledger_get("001.dat").unwrap().is_none());
        db.ledger_upsert("001.dat", "deadbeef", 1, 100).unwrap();
        db.ledger_upsert("001.dat", "feedface", 2, 200).unwrap();
        let e = db.ledger_get("001.dat").unwrap().unwrap();
        assert_eq!(e.running_hash, "feedface");
        assert_eq!(e.entry_count, 2);
    }

    #[test]
    fn metadata_log_and_query() {
        let (db, _dir) = open_tmp();
        db.insert_asset("h1", 1, "f", "", None, "001.dat", 0, 0)
            .unwrap();
        db.metadata_log_append("h1", MetadataOp::Set, "width", None, Some(512.0), "p", "1", 10)
            .unwrap();
        let entries = db.metadata_log_list("h1").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].value_num, Some(512.0));

        let rows = db
            .run_query("SELECT hash FROM assets WHERE size = ?1", &[SqlValue::Integer(1)])
            .unwrap();
        assert_eq!(rows.columns, vec!["hash".to_string()]);
        assert_eq!(rows.rows.len(), 1);
    }

    #[test]
    fn children_lookup() {
        let (db, _dir) = open_tmp();
        db.insert_asset("parent", 1, "p", "", None, "001.dat", 0, 0)
            .unwrap();
        db.insert_asset("child", 1, "c", "", Some("parent"), "001.dat", 10, 1)
            .unwrap();
        let kids = db.list_children("parent").unwrap();
        assert_eq!(kids.len(), 1);
        assert_eq!(kids[0].hash, "child");
    }
}

//! Typed metadata values, log append, projection rebuild, and batch
//! application (§4.5).

mod typing;

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{Map, Value};

use crate::errors::ServiceError;
use crate::topicdb::types::MetadataOp;
use crate::topicdb::TopicDb;

pub use typing::TypedValue;

/// One requested mutation, as accepted by `batch_metadata` and produced by
/// `apply_by_query` (§4.5 "Batch application").
#[derive(Debug, Clone)]
pub struct MetadataOperation {
    pub hash: String,
    pub op: MetadataOp,
    pub key: String,
    pub value: Option<String>,
    pub processor: String,
    pub processor_version: String,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct OperationResult {
    pub hash: String,
    pub key: String,
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<OperationResult>,
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Applies one `set`/`delete`, appending to the log and rebuilding the
/// projection for the affected hash. Returns the new log id and the
/// rebuilt projection JSON.
pub fn apply_one(
    db: &TopicDb,
    hash: &str,
    op: MetadataOp,
    key: &str,
    value: Option<&str>,
    processor: &str,
    processor_version: &str,
    max_value_bytes: usize,
    key_max: usize,
) -> Result<(i64, Value), ServiceError> {
    if key.len() > key_max {
        return Err(ServiceError::MetadataKeyTooLong);
    }

    let (value_text, value_num) = match op {
        MetadataOp::Delete => (None, None),
        MetadataOp::Set => {
            let raw = value.ok_or_else(|| {
                ServiceError::MetadataError("set requires a value".to_string())
            })?;
            if raw.is_empty() {
                return Err(ServiceError::MetadataError("empty value".to_string()));
            }
            if raw.len() > max_value_bytes {
                return Err(ServiceError::MetadataValueTooLong);
            }
            match typing::detect(raw) {
                TypedValue::Numeric { text, num } => (Some(text), Some(num)),
                TypedValue::Text(text) => (Some(text), None),
            }
        }
    };

    let ts = now();
    let id = db.metadata_log_append(
        hash,
        op,
        key,
        value_text.as_deref(),
        value_num,
        processor,
        processor_version,
        ts,
    )?;

    let projection = rebuild_projection(db, hash, ts)?;
    Ok((id, projection))
}

/// Folds every `metadata_log` row for `hash`, in `id` order, into the
/// current `{key: typed_value}` object, persists it, and returns it
/// (§3 "Metadata projection" invariant).
pub fn rebuild_projection(db: &TopicDb, hash: &str, updated_at: i64) -> Result<Value, ServiceError> {
    let entries = db.metadata_log_list(hash)?;
    let mut map: BTreeMap<String, Value> = BTreeMap::new();
    for entry in &entries {
        match entry.op {
            MetadataOp::Set => {
                let value = match entry.value_num {
                    Some(n) => Value::from(n),
                    None => Value::String(entry.value_text.clone().unwrap_or_default()),
                };
                map.insert(entry.key.clone(), value);
            }
            MetadataOp::Delete => {
                map.remove(&entry.key);
            }
        }
    }
    let mut obj = Map::new();
    for (k, v) in map {
        obj.insert(k, v);
    }
    let projection = Value::Object(obj);
    db.projection_put(hash, &projection.to_string(), updated_at)?;
    Ok(projection)
}

/// Groups `ops` by owning topic, applies each topic's slice in one
/// transaction, and returns a result per operation plus the aggregate
/// (§4.5 "Batch application").
pub fn batch_apply(
    ops: Vec<MetadataOperation>,
    resolve_topic: impl Fn(&str) -> Option<String>,
    open_topic: impl Fn(&str) -> Option<std::sync::Arc<TopicDb>>,
    max_value_bytes: usize,
    key_max: usize,
) -> BatchResult {
    let mut by_topic: BTreeMap<String, Vec<MetadataOperation>> = BTreeMap::new();
    let mut unresolved: Vec<OperationResult> = Vec::new();

    for op in ops {
        match resolve_topic(&op.hash) {
            Some(topic) => by_topic.entry(topic).or_default().push(op),
            None => unresolved.push(OperationResult {
                hash: op.hash,
                key: op.key,
                ok: false,
                error: Some("asset not found in any topic".to_string()),
            }),
        }
    }

    let mut results = unresolved;
    for (topic, topic_ops) in by_topic {
        let Some(db) = open_topic(&topic) else {
            for op in topic_ops {
                results.push(OperationResult {
                    hash: op.hash,
                    key: op.key,
                    ok: false,
                    error: Some("topic unavailable".to_string()),
                });
            }
            continue;
        };
        for op in topic_ops {
            let outcome = apply_one(
                &db,
                &op.hash,
                op.op,
                &op.key,
                op.value.as_deref(),
                &op.processor,
                &op.processor_version,
                max_value_bytes,
                key_max,
            );
            results.push(OperationResult {
                hash: op.hash,
                key: op.key,
                ok: outcome.is_ok(),
                error: outcome.err().map(|e| e.to_string()),
            });
        }
    }

    let succeeded = results.iter().filter(|r| r.ok).count();
    let failed = results.len() - succeeded;
    BatchResult {
        total: results.len(),
        succeeded,
        failed,
        results,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn open_tmp() -> (Arc<TopicDb>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(TopicDb::open(dir.path().join("t.db")).unwrap());
        db.insert_asset("h1", 1, "f", "", None, "001.dat", 0, 0)
            .unwrap();
        (db, dir)
    }

    #[test]
    fn set_then_delete_rebuilds_projection() {
        let (db, _dir) = open_tmp();
        apply_one(&db, "h1", MetadataOp::Set, "count", Some("123"), "p", "1", 1024, 64)
            .unwrap();
        let (_, proj) = apply_one(&db, "h1", MetadataOp::Delete, "count", None, "p", "1", 1024, 64)
            .unwrap();
        assert_eq!(proj, serde_json::json!({}));
    }

    #[test]
    fn numeric_detection_in_projection() {
        let (db, _dir) = open_tmp();
        let (_, proj) = apply_one(&db, "h1", MetadataOp::Set, "count", Some("123"), "p", "1", 1024, 64)
            .unwrap();
        assert_eq!(proj["count"], serde_json::json!(123.0));
    }

    #[test]
    fn rejects_oversized_key() {
        let (db, _dir) = open_tmp();
        let err = apply_one(&db, "h1", MetadataOp::Set, &"k".repeat(100), Some("v"), "p", "1", 1024, 10)
            .unwrap_err();
        assert!(matches!(err, ServiceError::MetadataKeyTooLong));
    }

    #[test]
    fn batch_flags_unresolved_hash_without_aborting() {
        let result = batch_apply(
            vec![MetadataOperation {
                hash: "nope".to_string(),
                op: MetadataOp::Set,
                key: "k".to_string(),
                value: Some("v".to_string()),
                processor: "p".to_string(),
                processor_version: "1".to_string(),
            }],
            |_| None,
            |_| None,
            1024,
            64,
        );
        assert_eq!(result.total, 1);
        assert_eq!(result.failed, 1);
    }
}

//! Preset registry, parameter binding, and cross-topic fan-out (§4.6).

pub mod presets;

use std::collections::BTreeMap;

use crate::errors::ServiceError;
use crate::topicdb::TopicDb;
use crate::value::SqlValue;
use presets::{ParamSpec, Preset, StatKind};

/// Rewrites a `:name`-style SQL template into positional `?` placeholders,
/// recording the first-seen order of each named parameter so the caller
/// can build a matching argument vector (§4.6 "Parameter binding").
pub fn rewrite_named_params(template: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(template.len());
    let mut order = Vec::new();
    let bytes = template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c == ':' && i + 1 < bytes.len() && (bytes[i + 1] as char).is_ascii_alphabetic() {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                end += 1;
            }
            let name = template[start..end].to_string();
            order.push(name);
            out.push('?');
            i = end;
        } else {
            out.push(c);
            i += 1;
        }
    }
    (out, order)
}

/// Validates `params` against `spec`'s parameter list (filling defaults,
/// erroring on missing required values) and returns the bound argument
/// vector in `order`.
pub fn bind_params(
    specs: &[ParamSpec],
    order: &[String],
    params: &BTreeMap<String, String>,
) -> Result<Vec<SqlValue>, ServiceError> {
    let by_name: BTreeMap<&str, &ParamSpec> = specs.iter().map(|s| (s.name.as_str(), s)).collect();
    let mut bound = Vec::with_capacity(order.len());
    for name in order {
        let spec = by_name
            .get(name.as_str())
            .ok_or_else(|| ServiceError::QueryError(format!("unknown parameter: {name}")))?;
        let raw = match params.get(name.as_str()) {
            Some(v) => v.clone(),
            None => match &spec.default {
                Some(d) => d.clone(),
                None if spec.required => {
                    return Err(ServiceError::MissingParam(name.clone()));
                }
                None => String::new(),
            },
        };
        bound.push(SqlValue::Text(raw));
    }
    Ok(bound)
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
    pub row_count: usize,
    pub preset: String,
}

/// Runs `preset` against every topic in `topics` (empty = caller should
/// pass all healthy topics), concatenating rows and tagging each with a
/// trailing `_topic` column (§4.6 "Cross-topic fan-out"). Topics whose
/// query fails are logged and skipped, not propagated.
pub fn run_query(
    preset: &Preset,
    params: &BTreeMap<String, String>,
    topics: &[(String, &TopicDb)],
) -> Result<QueryResult, ServiceError> {
    let (sql, order) = rewrite_named_params(&preset.sql);
    let bound = bind_params(&preset.params, &order, params)?;

    let mut columns: Option<Vec<String>> = None;
    let mut rows = Vec::new();
    for (topic_name, db) in topics {
        match db.run_query(&sql, &bound) {
            Ok(result) => {
                if columns.is_none() {
                    columns = Some(result.columns.clone());
                }
                for mut row in result.rows {
                    row.push(SqlValue::Text(topic_name.clone()));
                    rows.push(row);
                }
            }
            Err(e) => {
                tracing::warn!(topic = %topic_name, preset = %preset.name, error = %e, "preset query failed on topic, skipping");
            }
        }
    }

    let mut columns = columns.unwrap_or_default();
    columns.push("_topic".to_string());
    let row_count = rows.len();
    Ok(QueryResult {
        columns,
        rows,
        row_count,
        preset: preset.name.clone(),
    })
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TopicStat {
    pub name: String,
    pub value: serde_json::Value,
}

/// Evaluates a named stat for one topic. `file_size` and `dat_total` are
/// built-in non-SQL computations; everything else runs as a scalar SQL
/// query against the topic DB (§4.6 "Stat queries").
pub fn evaluate_stat(
    kind: &StatKind,
    db_path: &std::path::Path,
    dat_dir: &std::path::Path,
    db: &TopicDb,
) -> Result<serde_json::Value, ServiceError> {
    match kind {
        StatKind::FileSize => {
            let meta = std::fs::metadata(db_path)?;
            Ok(serde_json::json!(meta.len()))
        }
        StatKind::DatTotal => {
            let total = meshhub_castore::datfile::total_dat_bytes(dat_dir)?;
            Ok(serde_json::json!(total))
        }
        StatKind::Sql(sql) => {
            let result = db.run_query(sql, &[])?;
            let value = result
                .rows
                .first()
                .and_then(|row| row.first())
                .cloned()
                .unwrap_or(SqlValue::Null);
            Ok(serde_json::to_value(value).unwrap_or(serde_json::Value::Null))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_extracts_params_in_order() {
        let (sql, order) = rewrite_named_params("SELECT * FROM assets WHERE extension = :ext AND size > :min_size");
        assert_eq!(sql, "SELECT * FROM assets WHERE extension = ? AND size > ?");
        assert_eq!(order, vec!["ext".to_string(), "min_size".to_string()]);
    }

    #[test]
    fn bind_fills_default_and_errors_on_missing_required() {
        let specs = vec![
            ParamSpec {
                name: "ext".to_string(),
                required: false,
                default: Some("obj".to_string()),
            },
            ParamSpec {
                name: "limit".to_string(),
                required: true,
                default: None,
            },
        ];
        let order = vec!["ext".to_string(), "limit".to_string()];
        let err = bind_params(&specs, &order, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ServiceError::MissingParam(_)));

        let mut params = BTreeMap::new();
        params.insert("limit".to_string(), "10".to_string());
        let bound = bind_params(&specs, &order, &params).unwrap();
        assert_eq!(bound[0], SqlValue::Text("obj".to_string()));
        assert_eq!(bound[1], SqlValue::Text("10".to_string()));
    }

    #[test]
    fn sql_metacharacters_bind_as_literal_values() {
        let dir = tempfile::tempdir().unwrap();
        let db = TopicDb::open(dir.path().join("t.db")).unwrap();
        db.insert_asset("h1", 1, "a'; DROP TABLE assets; --", "", None, "001.dat", 0, 0)
            .unwrap();
        let rows = db
            .run_query(
                "SELECT hash FROM assets WHERE origin_name = ?1",
                &[SqlValue::Text("a'; DROP TABLE assets; --".to_string())],
            )
            .unwrap();
        assert_eq!(rows.rows.len(), 1);
        assert!(db.asset_exists("h1").unwrap());
    }
}

//! The static preset registry, loaded once at startup (§4.6, §9 "Query
//! presets: keep them declarative").

#[derive(Debug, Clone, serde::Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub required: bool,
    pub default: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Preset {
    pub name: String,
    pub description: String,
    pub sql: String,
    pub params: Vec<ParamSpec>,
}

/// A named per-topic stat (§4.6 "Stat queries"). `file_size` and
/// `dat_total` are non-SQL built-ins; everything else is a scalar query.
#[derive(Debug, Clone)]
pub enum StatKind {
    FileSize,
    DatTotal,
    Sql(String),
}

#[derive(Debug, Clone)]
pub struct StatDef {
    pub name: String,
    pub kind: StatKind,
}

fn param(name: &str, required: bool, default: Option<&str>) -> ParamSpec {
    ParamSpec {
        name: name.to_string(),
        required,
        default: default.map(str::to_string),
    }
}

/// Built-in presets. `apply_metadata` requires the target preset to
/// project an `asset_id` column (§4.5 "Apply-by-query").
pub fn builtin_presets() -> Vec<Preset> {
    vec![
        Preset {
            name: "list_assets".to_string(),
            description: "List assets, optionally filtered by extension".to_string(),
            sql: "SELECT hash AS asset_id, size, origin_name, extension, created_at \
                  FROM assets WHERE extension = :extension OR :extension = '' \
                  ORDER BY created_at DESC LIMIT :limit"
                .to_string(),
            params: vec![
                param("extension", false, Some("")),
                param("limit", false, Some("100")),
            ],
        },
        Preset {
            name: "recent".to_string(),
            description: "Most recently created assets".to_string(),
            sql: "SELECT hash AS asset_id, size, origin_name, created_at \
                  FROM assets ORDER BY created_at DESC LIMIT :limit"
                .to_string(),
            params: vec![param("limit", false, Some("20"))],
        },
        Preset {
            name: "by_hash".to_string(),
            description: "Look up one asset by hash".to_string(),
            sql: "SELECT hash AS asset_id, size, origin_name, extension, parent_hash, blob_file, byte_offset, created_at \
                  FROM assets WHERE hash = :hash"
                .to_string(),
            params: vec![param("hash", true, None)],
        },
        Preset {
            name: "lineage".to_string(),
            description: "Ancestor chain of an asset, nearest first".to_string(),
            sql: "WITH RECURSIVE ancestors(hash, parent_hash, depth) AS ( \
                      SELECT hash, parent_hash, 0 FROM assets WHERE hash = :hash \
                      UNION ALL \
                      SELECT a.hash, a.parent_hash, ancestors.depth + 1 \
                      FROM assets a JOIN ancestors ON a.hash = ancestors.parent_hash \
                  ) \
                  SELECT hash AS asset_id, parent_hash, depth FROM ancestors WHERE depth > 0 ORDER BY depth"
                .to_string(),
            params: vec![param("hash", true, None)],
        },
        Preset {
            name: "metadata_by_key".to_string(),
            description: "Current projection value of one key across assets".to_string(),
            sql: "SELECT asset_hash AS asset_id, value_text, value_num \
                  FROM metadata_log WHERE key = :key \
                  AND id = (SELECT MAX(id) FROM metadata_log m2 WHERE m2.asset_hash = metadata_log.asset_hash AND m2.key = :key)"
                .to_string(),
            params: vec![param("key", true, None)],
        },
    ]
}

pub fn builtin_stats() -> Vec<StatDef> {
    vec![
        StatDef {
            name: "file_size".to_string(),
            kind: StatKind::FileSize,
        },
        StatDef {
            name: "dat_total".to_string(),
            kind: StatKind::DatTotal,
        },
        StatDef {
            name: "asset_count".to_string(),
            kind: StatKind::Sql("SELECT COUNT(*) FROM assets".to_string()),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_presets_have_unique_names() {
        let presets = builtin_presets();
        let mut names: Vec<&str> = presets.iter().map(|p| p.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), presets.len());
    }

    #[test]
    fn lineage_and_list_assets_project_asset_id() {
        for name in ["list_assets", "recent", "by_hash", "lineage", "metadata_by_key"] {
            let preset = builtin_presets().into_iter().find(|p| p.name == name).unwrap();
            assert!(preset.sql.contains("AS asset_id") || preset.sql.contains("asset_id,"));
        }
    }
}

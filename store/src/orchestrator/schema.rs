//! Logical schema from §6.4, as DDL.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS asset_index (
    hash      TEXT PRIMARY KEY,
    topic     TEXT NOT NULL,
    dat_file  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_asset_index_topic ON asset_index(topic);
"#;

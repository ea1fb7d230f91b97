//! Logical schema from §6.3, as DDL.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS assets (
    hash         TEXT PRIMARY KEY,
    size         INTEGER NOT NULL,
    origin_name  TEXT NOT NULL DEFAULT '',
    extension    TEXT NOT NULL DEFAULT '',
    parent_hash  TEXT,
    blob_file    TEXT NOT NULL,
    byte_offset  INTEGER NOT NULL,
    created_at   INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_assets_parent_hash ON assets(parent_hash);
CREATE INDEX IF NOT EXISTS idx_assets_created_at ON assets(created_at);
CREATE INDEX IF NOT EXISTS idx_assets_extension ON assets(extension);
CREATE INDEX IF NOT EXISTS idx_assets_origin_name ON assets(origin_name);

CREATE TABLE IF NOT EXISTS metadata_log (
    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
    asset_hash         TEXT NOT NULL,
    op                 TEXT NOT NULL CHECK (op IN ('set', 'delete')),
    key                TEXT NOT NULL,
    value_text         TEXT,
    value_num          REAL,
    processor          TEXT NOT NULL,
    processor_version  TEXT NOT NULL,
    timestamp          INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_metadata_log_asset_hash ON metadata_log(asset_hash);
CREATE INDEX IF NOT EXISTS idx_metadata_log_key ON metadata_log(key);
CREATE INDEX IF NOT EXISTS idx_metadata_log_processor ON metadata_log(processor);

CREATE TABLE IF NOT EXISTS metadata_projection (
    asset_hash  TEXT PRIMARY KEY,
    json        TEXT NOT NULL,
    updated_at  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS dat_ledger (
    dat_file      TEXT PRIMARY KEY,
    running_hash  TEXT NOT NULL,
    entry_count   INTEGER NOT NULL,
    updated_at    INTEGER NOT NULL
);
"#;

use serde::Serialize;

/// A row of the `assets` table (§3 "Asset", §6.3).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Asset {
    pub hash: String,
    pub size: u64,
    pub origin_name: String,
    pub extension: String,
    pub parent_hash: Option<String>,
    pub blob_file: String,
    pub byte_offset: u64,
    pub created_at: i64,
}

/// A row of the `metadata_log` table (§3 "Metadata log entry").
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataLogEntry {
    pub id: i64,
    pub asset_hash: String,
    pub op: MetadataOp,
    pub key: String,
    pub value_text: Option<String>,
    pub value_num: Option<f64>,
    pub processor: String,
    pub processor_version: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataOp {
    Set,
    Delete,
}

impl MetadataOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataOp::Set => "set",
            MetadataOp::Delete => "delete",
        }
    }
}

impl std::str::FromStr for MetadataOp {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "set" => Ok(MetadataOp::Set),
            "delete" => Ok(MetadataOp::Delete),
            other => Err(format!("unknown metadata op: {other}")),
        }
    }
}

/// A row of the `dat_ledger` table (§3 "DAT ledger entry").
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub dat_file: String,
    pub running_hash: String,
    pub entry_count: u64,
    pub updated_at: i64,
}

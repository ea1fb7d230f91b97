use std::path::PathBuf;
use std::time::Duration;

use meshhub_castore::datfile::DEFAULT_MAX_DAT_SIZE;

/// Every tunable the core needs. An embedding binary is responsible for
/// populating this from whatever configuration surface it chooses (file,
/// env, flags); this crate only defines the shape and its defaults.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory under which topics and the orchestrator DB live.
    pub working_dir: PathBuf,
    /// Rollover ceiling for `.dat` files (§4.3).
    pub max_dat_size: u64,
    /// Cap on a single metadata value's byte length (§4.5).
    pub max_value_bytes: usize,
    /// Cap on a metadata key's byte length (§4.5).
    pub key_max: usize,
    /// Optional cap on the total size of `working_dir`; `None` disables the
    /// check (§4.4 step 6).
    pub disk_quota_bytes: Option<u64>,
    /// Default interval between reconciliation sweeps (§4.7).
    pub reconcile_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            max_dat_size: DEFAULT_MAX_DAT_SIZE,
            max_value_bytes: 64 * 1024,
            key_max: 256,
            disk_quota_bytes: None,
            reconcile_interval: Duration::from_secs(300),
        }
    }
}

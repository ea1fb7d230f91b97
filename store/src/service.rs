//! The narrow facade consumed by everything outside the core (§6.5).
//! Non-core layers — HTTP, auth, audit, the web UI — build on this and
//! this alone; it exposes no transport- or language-specific types.

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use meshhub_castore::B3Digest;

use crate::config::StoreConfig;
use crate::errors::ServiceError;
use crate::ingest::{self, UploadOutcome};
use crate::metadata::{self, BatchResult, MetadataOperation};
use crate::orchestrator::OrchestratorDb;
use crate::query::{self, presets, QueryResult, TopicStat};
use crate::topicdb::types::{Asset, MetadataOp};
use crate::topics::{reconcile, TopicRegistry};
use crate::verify::{self, VerifyEvent};

/// Rejects anything that isn't a well-formed 64-character lowercase hex
/// digest before it reaches a DB lookup (§7 "InvalidHash").
fn validate_hash(hash: &str) -> Result<(), ServiceError> {
    B3Digest::from_hex(hash).map(|_| ()).map_err(ServiceError::from)
}

/// Owns the process-wide topic registry and orchestrator handle; this is
/// the "single owning context passed by reference" from §9, never
/// free-standing globals.
pub struct Service {
    config: StoreConfig,
    registry: TopicRegistry,
    orchestrator: OrchestratorDb,
    presets: Vec<presets::Preset>,
    stats: Vec<presets::StatDef>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct TopicSummary {
    pub name: String,
    pub healthy: bool,
    pub error: Option<String>,
    pub stats: Vec<TopicStat>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AssetInfo {
    pub asset: Asset,
    pub projection: serde_json::Value,
    pub log: Vec<crate::topicdb::types::MetadataLogEntry>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SetMetadataResult {
    pub log_id: i64,
    pub projection: serde_json::Value,
}

impl Service {
    #[tracing::instrument(skip(config), fields(working_dir = %config.working_dir.display()), err)]
    pub fn new(config: StoreConfig) -> Result<Self, ServiceError> {
        let registry = TopicRegistry::new(config.working_dir.clone());
        let orchestrator_path = config.working_dir.join(".internal").join("orchestrator.db");
        let orchestrator = OrchestratorDb::open(orchestrator_path)?;
        registry.discover()?;
        for name in registry.list_names() {
            if registry.verify_integrity(&name).is_err() {
                tracing::warn!(topic = %name, "topic failed integrity verification on discovery");
            }
        }
        Ok(Self {
            config,
            registry,
            orchestrator,
            presets: presets::builtin_presets(),
            stats: presets::builtin_stats(),
        })
    }

    #[tracing::instrument(skip(self), fields(topic = name), err)]
    pub fn create_topic(&self, name: &str) -> Result<(), ServiceError> {
        self.registry.create_topic(name)
    }

    #[tracing::instrument(skip(self), err)]
    pub fn list_topics(&self) -> Result<Vec<TopicSummary>, ServiceError> {
        let mut out = Vec::new();
        for name in self.registry.list_names() {
            let health = self.registry.health(&name).unwrap_or(crate::topics::TopicHealth {
                healthy: false,
                error: Some("unregistered".to_string()),
            });
            let db_path = self
                .registry
                .topic_dir(&name)
                .join(".internal")
                .join(format!("{name}.db"));
            let dir = self.registry.topic_dir(&name);
            let mut stats = Vec::new();
            if let Ok(db) = self.registry.db(&name) {
                for stat in &self.stats {
                    if let Ok(value) = query::evaluate_stat(&stat.kind, &db_path, &dir, &db) {
                        stats.push(TopicStat {
                            name: stat.name.clone(),
                            value,
                        });
                    }
                }
            }
            out.push(TopicSummary {
                name,
                healthy: health.healthy,
                error: health.error,
                stats,
            });
        }
        Ok(out)
    }

    #[tracing::instrument(skip(self, reader), fields(topic, filename, parent_hash), err)]
    pub fn upload(
        &self,
        topic: &str,
        reader: impl Read,
        filename: &str,
        parent_hash: Option<&str>,
    ) -> Result<UploadOutcome, ServiceError> {
        ingest::ingest(
            &self.registry,
            &self.orchestrator,
            topic,
            reader,
            filename,
            parent_hash,
            self.config.max_dat_size,
            self.config.disk_quota_bytes,
        )
    }

    #[tracing::instrument(skip(self), fields(hash), err)]
    pub fn download(&self, hash: &str) -> Result<(Asset, Vec<u8>), ServiceError> {
        validate_hash(hash)?;
        let entry = self
            .orchestrator
            .lookup(hash)?
            .ok_or(ServiceError::AssetNotFound)?;
        let db = self.registry.db(&entry.topic)?;
        let asset = db.get_asset(hash)?.ok_or(ServiceError::AssetNotFound)?;
        let dir = self.registry.topic_dir(&entry.topic);
        let path = dir.join(&asset.blob_file);
        let data = meshhub_castore::codec::read_data(&path, asset.byte_offset, asset.size)?;
        Ok((asset, data))
    }

    #[tracing::instrument(skip(self), fields(hash), err)]
    pub fn get_metadata(&self, hash: &str) -> Result<AssetInfo, ServiceError> {
        validate_hash(hash)?;
        let entry = self
            .orchestrator
            .lookup(hash)?
            .ok_or(ServiceError::AssetNotFound)?;
        let db = self.registry.db(&entry.topic)?;
        let asset = db.get_asset(hash)?.ok_or(ServiceError::AssetNotFound)?;
        let projection = db
            .projection_get(hash)?
            .map(|s| serde_json::from_str(&s).unwrap_or(serde_json::Value::Null))
            .unwrap_or(serde_json::json!({}));
        let log = db.metadata_log_list(hash)?;
        Ok(AssetInfo { asset, projection, log })
    }

    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip(self, value), fields(hash, key, processor), err)]
    pub fn set_metadata(
        &self,
        hash: &str,
        op: MetadataOp,
        key: &str,
        value: Option<&str>,
        processor: &str,
        processor_version: &str,
    ) -> Result<SetMetadataResult, ServiceError> {
        validate_hash(hash)?;
        let entry = self
            .orchestrator
            .lookup(hash)?
            .ok_or(ServiceError::AssetNotFound)?;
        let db = self.registry.db(&entry.topic)?;
        let (log_id, projection) = metadata::apply_one(
            &db,
            hash,
            op,
            key,
            value,
            processor,
            processor_version,
            self.config.max_value_bytes,
            self.config.key_max,
        )?;
        Ok(SetMetadataResult { log_id, projection })
    }

    #[tracing::instrument(skip(self, ops), fields(op_count = ops.len()))]
    pub fn batch_metadata(&self, ops: Vec<MetadataOperation>) -> BatchResult {
        let orchestrator = &self.orchestrator;
        let registry = &self.registry;
        metadata::batch_apply(
            ops,
            |hash| orchestrator.lookup(hash).ok().flatten().map(|e| e.topic),
            |topic| registry.db(topic).ok(),
            self.config.max_value_bytes,
            self.config.key_max,
        )
    }

    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(skip(self, params, value), fields(preset_name, key, processor), err)]
    pub fn apply_metadata(
        &self,
        preset_name: &str,
        params: &BTreeMap<String, String>,
        op: MetadataOp,
        key: &str,
        value: Option<&str>,
        processor: &str,
        processor_version: &str,
    ) -> Result<BatchResult, ServiceError> {
        let result = self.run_query(preset_name, params, None)?;
        let id_col = result
            .columns
            .iter()
            .position(|c| c == "asset_id")
            .ok_or_else(|| ServiceError::QueryError("preset does not project asset_id".to_string()))?;

        let ops: Vec<MetadataOperation> = result
            .rows
            .iter()
            .filter_map(|row| row.get(id_col))
            .filter_map(|v| v.as_str().map(str::to_string))
            .map(|hash| MetadataOperation {
                hash,
                op,
                key: key.to_string(),
                value: value.map(str::to_string),
                processor: processor.to_string(),
                processor_version: processor_version.to_string(),
            })
            .collect();

        Ok(self.batch_metadata(ops))
    }

    pub fn list_presets(&self) -> &[presets::Preset] {
        &self.presets
    }

    #[tracing::instrument(skip(self, params), fields(preset_name), err)]
    pub fn run_query(
        &self,
        preset_name: &str,
        params: &BTreeMap<String, String>,
        topics: Option<&[String]>,
    ) -> Result<QueryResult, ServiceError> {
        let preset = self
            .presets
            .iter()
            .find(|p| p.name == preset_name)
            .ok_or_else(|| ServiceError::PresetNotFound(preset_name.to_string()))?;

        let topic_names: Vec<String> = match topics {
            Some(names) if !names.is_empty() => names.to_vec(),
            _ => self.registry.list_healthy_names(),
        };

        let dbs: Vec<(String, Arc<crate::topicdb::TopicDb>)> = topic_names
            .iter()
            .filter_map(|t| self.registry.db(t).ok().map(|db| (t.clone(), db)))
            .collect();
        let refs: Vec<(String, &crate::topicdb::TopicDb)> =
            dbs.iter().map(|(name, db)| (name.clone(), db.as_ref())).collect();

        query::run_query(preset, params, &refs)
    }

    /// Runs verification across `topics` (empty = all), returning the
    /// stream of events at once (streamed progress belongs to the
    /// non-core transport layer).
    #[tracing::instrument(skip(self, topics), fields(check_index), err)]
    pub fn verify(&self, topics: Option<&[String]>, check_index: bool) -> Result<Vec<VerifyEvent>, ServiceError> {
        let cancel = AtomicBool::new(false);
        let topic_names: Vec<String> = match topics {
            Some(names) if !names.is_empty() => names.to_vec(),
            _ => self.registry.list_names(),
        };

        let mut events = Vec::new();
        for topic in &topic_names {
            events.extend(verify::verify_entries(&self.registry, topic, &cancel)?);
            events.extend(verify::verify_chain(&self.registry, topic)?);
        }
        if check_index {
            events.extend(verify::verify_index(&self.registry, &self.orchestrator)?);
        }
        Ok(events)
    }

    #[tracing::instrument(skip(self), err)]
    pub fn reconcile(&self) -> Result<reconcile::ReconcileReport, ServiceError> {
        Ok(reconcile::reconcile(&self.registry, &self.orchestrator)?)
    }
}

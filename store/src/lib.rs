//! The content-addressed asset store core: blob storage, ingestion,
//! metadata, the query engine, topic lifecycle, and verification.
//!
//! Non-core concerns (HTTP, auth, audit logging, the web UI, bulk-ZIP
//! sessions, user/grant management, config-file parsing, CLI wiring) are
//! explicitly out of scope; embedding code builds on [service::Service]
//! alone.
//!
//! Every I/O-crossing operation here is annotated with
//! `#[tracing::instrument]` and emits through the ordinary `tracing`
//! facade; this crate never installs a global subscriber itself. A binary
//! embedding [Service] wires up the actual stderr/progress-bar output by
//! calling [`tracing_setup::TracingBuilder`] once at startup, the same way
//! `nar-bridge` does for the teacher's own CLI binaries — re-exported here
//! so embedders don't need a separate dependency on `meshhub-tracing`.

pub mod config;
pub mod errors;
pub mod ingest;
pub mod metadata;
pub mod orchestrator;
pub mod query;
pub mod sanitize;
pub mod service;
pub mod topicdb;
pub mod topics;
mod value;
pub mod verify;

pub use meshhub_tracing as tracing_setup;

pub use config::StoreConfig;
pub use errors::ServiceError;
pub use service::Service;
pub use value::SqlValue;

//! 📥 dix: a schema-driven import and upsert engine for state data feeds.
//!
//! 🎬 *[files go in. a report comes out. the database only changes when every row that
//! made it through validation can be written at once.]*
//!
//! ```text
//! UploadedFile → sources → validate → planner → executor → stores
//!                        ╰──────── orchestrator ─────────╯
//!                                      ↓
//!                                ImportReport
//! ```
//!
//! Two front doors: [`run`] for the CLI (files on disk), [`serve`] for HTTP (multipart uploads).
//! Both end up in [`Importer::run_import`]. 🦆

pub mod app_config;
pub mod common;
pub mod errors;
pub mod executor;
pub mod http;
pub mod locks;
pub mod orchestrator;
pub mod planner;
pub mod report;
pub mod schema;
pub mod sources;
pub mod stores;
pub mod validate;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

pub use crate::app_config::{AppConfig, RuntimeConfig, load_config};
pub use crate::common::StateCode;
pub use crate::orchestrator::{ImportRequest, Importer};
pub use crate::report::{EntityStatus, ImportReport, OverallStatus};
pub use crate::schema::{EntityKind, SchemaRegistry};
pub use crate::sources::UploadedFile;
pub use crate::stores::{InMemoryStore, RecordStore, SqliteStore, StoreBackend, StoreConfig};

/// 🏗️ Store + registry + runtime knobs, assembled from config.
pub async fn build_importer(app_config: &AppConfig) -> Result<Importer<StoreBackend>> {
    let registry = SchemaRegistry::builtin().context("💀 the built-in schemas do not form a valid registry")?;
    let store = StoreBackend::from_config(&app_config.store)
        .await
        .context("💀 could not build the record store from config")?;
    Ok(Importer::new(registry, store, app_config.runtime.clone()))
}

/// 🚀 Import files from disk into one partition.
pub async fn run(app_config: AppConfig, partition: StateCode, paths: &[PathBuf]) -> Result<ImportReport> {
    let importer = build_importer(&app_config).await?;
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        files.push(UploadedFile::from_path(path).await?);
    }
    info!(%partition, files = files.len(), "📂 files loaded from disk");
    Ok(importer.run_import(ImportRequest { partition, files }).await)
}

/// 🌐 Serve the HTTP API on `addr` until the process stops.
pub async fn serve(app_config: AppConfig, addr: &str) -> Result<()> {
    let importer = Arc::new(build_importer(&app_config).await?);
    http::serve(importer, addr).await
}

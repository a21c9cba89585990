//! Runtime bootstrap
//!
//! Wires config, logging, the database pool and the schema into a ready store.

use std::sync::Arc;

use configs::{AppConfig, LogFormat};
use migration::MigratorTrait;
use tracing::info;

use crate::service_request::{SeaOrmRecordStore, ServiceRequestStore};

pub type PgServiceRequestStore = ServiceRequestStore<SeaOrmRecordStore>;

/// Load `config.toml`/environment and build the Postgres-backed store.
pub async fn bootstrap() -> anyhow::Result<PgServiceRequestStore> {
    let cfg = AppConfig::load_and_validate()?;
    bootstrap_with(&cfg).await
}

pub async fn bootstrap_with(cfg: &AppConfig) -> anyhow::Result<PgServiceRequestStore> {
    common::utils::logging::init_logging(cfg.logging.format == LogFormat::Json);
    let db = models::db::connect_with_config(&cfg.database).await?;
    models::db::test_connection(&db).await?;
    migration::Migrator::up(&db, None).await?;
    info!(event = "store_ready", max_connections = cfg.database.max_connections, "service request store ready");
    Ok(ServiceRequestStore::new(Arc::new(SeaOrmRecordStore::new(db))))
}

//! Pulse REST API server: feedback/event ingestion, triage, and reporting.

use pulse_api::server::{self, AppState};
use pulse_ingest::{Ingestor, Triage};
use pulse_notify::{spawn_notifier, LogNotifier};
use pulse_store::{InMemoryRecordStore, SqliteRecordStore};
use pulse_types::{PulseConfig, RecordStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let store: Arc<dyn RecordStore> = match std::env::var("PULSE_DB") {
        Ok(path) => {
            tracing::info!(path, "using sqlite record store");
            Arc::new(SqliteRecordStore::new(&path)?)
        }
        Err(_) => {
            tracing::info!("PULSE_DB not set, using in-memory record store");
            Arc::new(InMemoryRecordStore::new())
        }
    };

    let mut config = PulseConfig::default();
    config.admin_token = std::env::var("PULSE_ADMIN_TOKEN").unwrap_or_default();
    if config.admin_token.is_empty() {
        tracing::warn!("PULSE_ADMIN_TOKEN not set, admin endpoints are disabled");
    }

    let notify = spawn_notifier(Arc::new(LogNotifier));
    let ingestor = Ingestor::new(store.clone(), notify, config.ingest.clone());
    let triage = Triage::new(store.clone());
    let state = Arc::new(AppState {
        store,
        ingestor,
        triage,
        config,
    });

    let app = server::router(state);
    let addr: SocketAddr = std::env::var("PULSE_LISTEN")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;
    tracing::info!("pulse API listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(addr).await?,
        app.into_make_service(),
    )
    .await?;
    Ok(())
}

pub mod clock;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod events;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod repository;
pub mod services;

use anyhow::Context;
use axum::{routing::get, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::{Config, StorageBackend};
use crate::events::{BroadcastPublisher, EventPublisher, FanoutPublisher, RedisPublisher};
use crate::repository::{MemoryStore, PgStore, Store};
use crate::services::{ExpirySweeper, InventoryGuard, PurchaseOrchestrator, SeatLedger};

// Shared state for the whole application
pub struct AppState {
    pub config: Config,
    pub ledger: Arc<SeatLedger>,
    pub inventory: Arc<InventoryGuard>,
    pub purchases: Arc<PurchaseOrchestrator>,
    /// In-process seat change channels, read by WebSocket subscribers.
    pub realtime: Arc<BroadcastPublisher>,
}

impl AppState {
    /// Connects the configured store and publishers.
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let store: Arc<dyn Store> = match config.storage.backend {
            StorageBackend::Postgres => {
                let db = database::Database::connect(&config.storage)
                    .await
                    .context("database setup failed")?;
                Arc::new(PgStore::new(db))
            }
            StorageBackend::Memory => {
                info!("Using in-memory storage; state is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let redis: Option<Arc<dyn EventPublisher>> = match &config.redis.url {
            Some(url) => {
                let client = redis_client::RedisClient::new(url)
                    .await
                    .context("failed to connect to Redis")?;
                info!("Redis connected, seat changes are published there too");
                Some(Arc::new(RedisPublisher::new(client)))
            }
            None => None,
        };

        Ok(Self::assemble(config, store, Arc::new(SystemClock), redis))
    }

    /// Wires the services over an existing store and clock. `extra` receives
    /// every seat change in addition to the in-process channels.
    pub fn assemble(
        config: Config,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        extra: Option<Arc<dyn EventPublisher>>,
    ) -> Arc<Self> {
        let realtime = Arc::new(BroadcastPublisher::new());
        let publisher: Arc<dyn EventPublisher> = match extra {
            Some(extra) => Arc::new(FanoutPublisher::new(vec![realtime.clone() as Arc<dyn EventPublisher>, extra])),
            None => realtime.clone(),
        };

        let ledger = Arc::new(SeatLedger::new(store.clone(), publisher, clock.clone(), &config.ledger));
        let inventory = Arc::new(InventoryGuard::new(store.clone()));
        let purchases = Arc::new(PurchaseOrchestrator::new(store, ledger.clone(), inventory.clone(), clock));

        Arc::new(Self {
            config,
            ledger,
            inventory,
            purchases,
            realtime,
        })
    }

    pub fn sweeper(&self) -> ExpirySweeper {
        ExpirySweeper::new(
            self.ledger.clone(),
            Duration::from_secs(self.config.ledger.sweep_interval_seconds),
        )
    }
}

/// Full HTTP surface: health probes plus every controller under `/api`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Cinema ticketing API v0.1" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

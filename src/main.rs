use std::sync::Arc;

use axum::{middleware, Extension};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use caixa::api::{self, AppState};
use caixa::atm::DenominationSet;
use caixa::auth;
use caixa::config::{CliArgs, Config, LoggingConfig, StorageKind};
use caixa::service::{AccountService, TransactionService, UserService};
use caixa_core::{SharedCache, SharedStorage};
use caixa_memory::{MemoryCache, MemoryStorage};
use caixa_sqlite::SqliteStorage;

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();
    let config = Config::load(&cli);
    init_tracing(&config.logging);

    let storage: SharedStorage = match config.storage.backend {
        StorageKind::Memory => Arc::new(MemoryStorage::new()),
        StorageKind::Sqlite => Arc::new(
            SqliteStorage::new(&config.storage.database).expect("Failed to open database"),
        ),
    };
    let cache: SharedCache = Arc::new(MemoryCache::new());
    let denominations = DenominationSet::new(config.atm.denominations.clone())
        .expect("Invalid denomination set in config");

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "Metrics recorder unavailable");
            None
        }
    };

    let state = Arc::new(AppState {
        users: UserService::new(storage.clone()),
        accounts: AccountService::new(storage.clone()),
        transactions: TransactionService::new(
            storage,
            cache,
            denominations,
            config.atm.minimum_deposit,
        ),
        metrics,
    });

    let app = api::router(state)
        .layer(middleware::from_fn(auth::require_api_key))
        .layer(Extension(Arc::new(config.auth.clone())));

    let addr = config.listen_addr();
    tracing::info!(%addr, "API listening");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

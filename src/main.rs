// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc};

use identity_server::{
    api::router,
    config::AppConfig,
    state::AppState,
    storage::{AuthDatabase, ExpiryPurger},
    telemetry,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // A missing .env file is fine; the environment may be set directly.
    dotenvy::dotenv().ok();
    telemetry::init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    let db = Arc::new(AuthDatabase::open(&config.database_path).expect("Failed to open database"));
    info!(path = %config.database_path.display(), "Database opened");

    let admin = config.admin.clone();
    let purge_interval = config.purge_interval;
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .expect("Failed to parse bind address");

    let state = AppState::new(config, db);
    state
        .identity
        .seed(admin.as_ref())
        .expect("Failed to seed roles");

    let shutdown = CancellationToken::new();
    let purger = ExpiryPurger::new(state.kv.clone(), purge_interval);
    let purger_handle = tokio::spawn(purger.run(shutdown.clone()));

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    info!(%addr, "Identity server listening (docs at /docs)");

    let signal = shutdown.clone();
    let served = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await;

    shutdown.cancel();
    let _ = purger_handle.await;
    if let Err(e) = served {
        error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

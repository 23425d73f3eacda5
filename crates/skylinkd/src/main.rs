//! skylinkd — Skylink registry daemon.

use std::time::Duration;

use anyhow::{Context, Result};

use skylink_core::config::SkylinkConfig;
use skylink_registry::{RegistryOptions, RegistryServer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = SkylinkConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = SkylinkConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        SkylinkConfig::default()
    });

    // A listen address on the command line wins over the config file.
    if let Some(listen) = std::env::args().nth(1) {
        config.registry.listen_addr = listen;
    }
    tracing::info!(listen = %config.registry.listen_addr, "skylinkd starting");

    let server = RegistryServer::bind(RegistryOptions::from(&config.registry))
        .await
        .context("failed to start registry")?;
    let table = server.table();
    let stats = server.stats();

    // ── Shutdown channel ─────────────────────────────────────────────────────
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);

    {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutdown signal received");
            let _ = shutdown.send(());
        });
    }

    // ── Spawn tasks ──────────────────────────────────────────────────────────

    let registry_task = tokio::spawn(server.run(shutdown_tx.subscribe()));

    let stats_printer = {
        let table = table.clone();
        let stats = stats.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(10));
            loop {
                interval.tick().await;
                stats.log_stats(table.len());
            }
        })
    };

    // Status HTTP endpoint
    let api_port = config.registry.api_port;
    if api_port == 0 {
        tracing::info!("status API disabled");
    } else {
        let state = skylink_api::ApiState { table, stats };
        tokio::spawn(async move {
            if let Err(e) = skylink_api::serve(state, api_port).await {
                tracing::error!(error = %e, "status server failed");
            }
        });
    }

    // ── Wait for exit ────────────────────────────────────────────────────────

    let mut shutdown_rx = shutdown_tx.subscribe();

    tokio::select! {
        _ = shutdown_rx.recv() => tracing::info!("shutting down"),
        r = registry_task      => tracing::error!("registry exited: {:?}", r),
        r = stats_printer      => tracing::error!("stats printer exited: {:?}", r),
    }

    Ok(())
}

// ABOUTME: CLI run command - create the fleet and keep it alive
//
// Builds the transport, context and pool from the effective config,
// creates every batch, then reports metrics periodically until Ctrl-C or
// SIGTERM triggers an orderly shutdown.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::AppConfig;
use crate::fleet::{ConnectionPool, FleetContext, WebSocketTransport};

/// Execute the run command
pub async fn execute(config: AppConfig) -> Result<()> {
    let fleet = &config.fleet;
    fleet.validate().context("Invalid fleet configuration")?;

    let target = fleet.target()?;
    let routes = fleet.route_provider()?;

    let transport = Arc::new(WebSocketTransport::new(fleet.connection.send_queue_capacity));
    let ctx = FleetContext::current(transport);

    let mut pool = ConnectionPool::new(ctx.clone(), target, fleet.connection.clone(), routes);
    pool.run(fleet.batch_count, fleet.batch_size);

    spawn_status_reporter(&ctx, config.logging.status_interval_secs);

    wait_for_shutdown_signal().await?;

    ctx.shutdown().await;
    let summary = ctx.metrics().snapshot();
    info!(
        created = summary.connections_created,
        dormant = summary.connections_dormant,
        open_attempts = summary.open_attempts,
        keepalives_sent = summary.keepalives_sent,
        send_failures = summary.send_failures,
        "Fleet stopped"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&summary).context("Failed to serialize metrics")?
    );

    Ok(())
}

/// Log a metrics summary every `interval_secs` until shutdown
fn spawn_status_reporter(ctx: &FleetContext, interval_secs: u64) {
    if interval_secs == 0 {
        return;
    }

    let metrics = Arc::clone(ctx.metrics());
    let shutdown = ctx.shutdown_token().clone();
    let period = Duration::from_secs(interval_secs);

    ctx.spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = metrics.snapshot();
                    info!(
                        open = snapshot.connections_open,
                        dormant = snapshot.connections_dormant,
                        created = snapshot.connections_created,
                        reconnects = snapshot.reconnects_scheduled,
                        keepalives_sent = snapshot.keepalives_sent,
                        send_failures = snapshot.send_failures,
                        "Fleet status"
                    );
                }
            }
        }
    });
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for Ctrl-C")?;
                info!("Received Ctrl-C");
            }
            _ = terminate.recv() => info!("Received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        info!("Received Ctrl-C");
    }

    Ok(())
}

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pulsar_battery::config::{self, SettingsProvider, SharedSettings};
use pulsar_battery::monitor::session::platform_session_lock;
use pulsar_battery::monitor::StatusSnapshot;
use pulsar_battery::notify::LogNotifier;
use pulsar_battery::{BatteryReader, Monitor};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("pulsar-battery - Pulsar X2 battery monitor");

    let settings = SharedSettings::new(config::load_config()?);
    let reader = BatteryReader::new()?;

    let monitor = Arc::new(Monitor::new(
        Arc::new(reader),
        Arc::new(settings.clone()),
        Arc::from(platform_session_lock()),
        Arc::new(LogNotifier),
    ));

    let history = tokio::spawn(log_history(monitor.subscribe(), settings));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(Arc::clone(&monitor).run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    worker.await?;

    // Dropping the monitor closes the snapshot channel
    drop(monitor);
    history.await?;
    Ok(())
}

/// Records readings on the history cadence, independent of the poll cadence.
async fn log_history(mut snapshots: broadcast::Receiver<StatusSnapshot>, settings: SharedSettings) {
    let mut last_logged: Option<Instant> = None;

    loop {
        let snapshot = match snapshots.recv().await {
            Ok(snapshot) => snapshot,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "history consumer lagging");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let interval = settings.snapshot().policy().log_interval;
        if last_logged.is_some_and(|at| at.elapsed() < interval) {
            continue;
        }
        last_logged = Some(Instant::now());

        info!(
            target: "history",
            model = %snapshot.status.model,
            percentage = snapshot.status.percentage,
            charging = snapshot.status.is_charging,
            cached = snapshot.from_cache,
            "reading"
        );
    }
}

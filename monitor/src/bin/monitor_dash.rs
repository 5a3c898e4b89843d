//! Terminal dashboard for a traffic camera.
//!
//! Follows the selected camera's vehicle counts live and logs a summary line
//! every time the dashboard view changes.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use monitor::{
    CameraRefresher, LocalClock, MonitorArgs, MonitorSession, SelectionState, SelectionStore,
    WallClock,
};
use monitor_shared::MonitoringClient;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Live vehicle counts for a traffic camera")]
struct Args {
    #[command(flatten)]
    monitor: MonitorArgs,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = args
        .monitor
        .resolve()
        .context("Failed to resolve configuration")?;

    let client = Arc::new(
        MonitoringClient::new(&config.base_url).context("Failed to create backend client")?,
    );
    let clock = Arc::new(LocalClock);

    let mut initial = SelectionState::new(args.monitor.date.unwrap_or_else(|| clock.today()));
    initial.camera = config.camera.clone();
    initial.interval = config.interval_minutes;
    initial.auto_follow = config.auto_follow;
    let store = SelectionStore::new(initial);

    let _refresher = CameraRefresher::spawn(
        client.clone(),
        clock.clone(),
        store.clone(),
        config.camera_refresh(),
    );

    let mut session = MonitorSession::new(client, clock, store);
    let mut view = session.view();
    let printer = tokio::spawn(async move {
        while view.changed().await.is_ok() {
            info!("{}", *view.borrow_and_update());
        }
    });

    info!(
        "Watching {} every {} (Ctrl+C to stop)",
        config.base_url, config.interval_minutes
    );
    session.start();
    session
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl+C: {e}");
            }
        })
        .await;

    drop(session);
    let _ = printer.await;
    info!("Shutdown complete");
    Ok(())
}

//! Wake-on-LAN scheduler daemon
//!
//! Opens the database, re-arms every enabled schedule (the start-up pass doubles as the
//! boot signal) and keeps firing until SIGINT or SIGTERM.

use anyhow::Context;
use wol_scheduler::{set_and_init_console_logging, set_and_init_file_logging, SchedulerConfig, WolScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = SchedulerConfig::from_env();

    match std::env::var("WOL_LOG_FILE") {
        Ok(path) if !path.trim().is_empty() => {
            set_and_init_file_logging(&config.log_level, "wol_scheduler", &path)
                .map_err(|e| anyhow::anyhow!("Failed to initialize file logging: {}", e))?
        }
        _ => set_and_init_console_logging(&config.log_level, "wol_scheduler"),
    }

    let mut scheduler = WolScheduler::new(&config)
        .await
        .context("Failed to start scheduler")?;

    let report = scheduler
        .reconcile_after_boot()
        .await
        .context("Boot reconciliation failed")?;
    wol_scheduler::info!(
        "Scheduler {} running: {} schedules armed, {} orphaned, {} failed",
        wol_scheduler::VERSION,
        report.armed,
        report.skipped_orphans,
        report.failed
    );

    wait_for_shutdown().await?;

    scheduler.shutdown().await;
    wol_scheduler::info!("Shutting down");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => wol_scheduler::info!("Received SIGTERM"),
        _ = sigint.recv() => wol_scheduler::info!("Received SIGINT"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    wol_scheduler::info!("Received Ctrl-C");
    Ok(())
}

//! Restart behaviour against a file-backed SQLite database and the tokio wake platform

use serial_test::serial;
use tempfile::TempDir;
use wol_scheduler::{SchedulerConfig, WolScheduler};

mod common;
use common::*;

fn sqlite_url(dir: &TempDir) -> String {
    format!("sqlite://{}?mode=rwc", dir.path().join("wol.db").display())
}

#[tokio::test]
#[serial]
async fn test_schedules_survive_restart_and_are_rearmed() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = SchedulerConfig {
        database_url: sqlite_url(&dir),
        ..SchedulerConfig::default()
    };

    let mut first = WolScheduler::new(&config).await.unwrap();
    let device = first.create_device(&device_input("NAS")).await.unwrap();
    let on = first.create_schedule(&device.id, 6, 0, 0x7F).await.unwrap();
    let off = first.create_schedule(&device.id, 7, 0, 0x7F).await.unwrap();
    first.toggle_schedule(&off.id).await.unwrap();
    assert_eq!(first.timers().armed_count(), 1);
    first.shutdown().await;
    drop(first);

    let mut second = WolScheduler::new(&config).await.unwrap();
    assert_eq!(second.timers().armed_count(), 0);

    let report = second.reconcile_after_boot().await.unwrap();

    assert_eq!(report.armed, 1);
    assert_eq!(second.timers().armed_ids(), vec![on.id.clone()]);
    assert_eq!(second.list_schedules_for_device(&device.id).await.unwrap().len(), 2);
    second.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_config_from_env_opens_configured_database() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let url = sqlite_url(&dir);
    std::env::set_var("WOL_DATABASE_URL", &url);
    std::env::set_var("WOL_EXACT_TIMERS", "false");

    let config = SchedulerConfig::from_env();

    std::env::remove_var("WOL_DATABASE_URL");
    std::env::remove_var("WOL_EXACT_TIMERS");
    assert_eq!(config.database_url, url);
    assert!(!config.exact_timers);

    let mut scheduler = WolScheduler::new(&config).await.unwrap();
    let device = scheduler.create_device(&device_input("NAS")).await.unwrap();
    scheduler.create_schedule(&device.id, 6, 0, 0x01).await.unwrap();
    assert_eq!(scheduler.timers().armed_count(), 1);
    scheduler.shutdown().await;

    assert!(dir.path().join("wol.db").exists());
}

//! Fire handling: dispatch, bookkeeping and exactly one re-arm per fire

use std::time::Duration;

use chrono::{TimeZone, Utc, Weekday};
use wol_scheduler::magic_packet::GLOBAL_BROADCAST;
use wol_scheduler::{DayMask, FirePayload, RearmStatus, RequestId, WakePlatform};

mod common;
use common::*;

fn payload(device_id: &str, schedule_id: Option<&str>, hour: u32, minute: u32, days: DayMask) -> FirePayload {
    FirePayload {
        device_id: device_id.to_string(),
        schedule_id: schedule_id.map(str::to_string),
        hour,
        minute,
        days,
    }
}

#[tokio::test]
async fn test_fire_dispatches_and_rearms_once() {
    let h = harness("test_fire_dispatches_and_rearms_once").await;
    let device = h.scheduler.create_device(&device_input("NAS")).await.unwrap();
    let schedule = h.scheduler.create_schedule(&device.id, 10, 0, 0x7F).await.unwrap();
    h.platform.reset_calls();
    h.clock.set(Utc.with_ymd_and_hms(2025, 6, 4, 10, 0, 0).unwrap());

    let outcome = h
        .scheduler
        .handle_fire(payload(&device.id, Some(&schedule.id), 10, 0, DayMask::ALL))
        .await;

    assert!(outcome.dispatched);
    assert_eq!(outcome.schedule_id.as_deref(), Some(schedule.id.as_str()));
    match outcome.rearm {
        RearmStatus::Rearmed(armed) => {
            assert_eq!(armed.fire_at, Utc.with_ymd_and_hms(2025, 6, 5, 10, 0, 0).unwrap());
        }
        other => panic!("unexpected re-arm status {other:?}"),
    }
    assert_eq!(h.platform.arm_calls(), 1);
    assert_eq!(h.platform.live_count(), 1);

    let stored = h.scheduler.get_device(&device.id).await.unwrap();
    assert_eq!(
        stored.last_seen_at.map(|t| t.with_timezone(&Utc)),
        Some(Utc.with_ymd_and_hms(2025, 6, 4, 10, 0, 0).unwrap())
    );
    assert_eq!(h.notifier.sent(), vec!["NAS".to_string()]);
    assert_eq!(h.wake_lock.held(), 0);
}

#[tokio::test]
async fn test_legacy_payload_is_resolved_by_time_and_days() {
    let h = harness("test_legacy_payload_resolved").await;
    let device = h.scheduler.create_device(&device_input("NAS")).await.unwrap();
    h.scheduler.create_schedule(&device.id, 6, 30, 0x1F).await.unwrap();
    let target = h.scheduler.create_schedule(&device.id, 7, 0, 0x1F).await.unwrap();

    let outcome = h
        .scheduler
        .handle_fire(payload(&device.id, None, 7, 0, DayMask::WEEKDAYS))
        .await;

    assert_eq!(outcome.schedule_id.as_deref(), Some(target.id.as_str()));
    assert!(matches!(outcome.rearm, RearmStatus::Rearmed(_)));
}

#[tokio::test]
async fn test_unresolved_legacy_payload_is_not_rearmed() {
    let h = harness("test_unresolved_legacy_payload").await;
    let device = h.scheduler.create_device(&device_input("NAS")).await.unwrap();
    h.scheduler.create_schedule(&device.id, 7, 0, 0x1F).await.unwrap();
    h.platform.reset_calls();

    let outcome = h
        .scheduler
        .handle_fire(payload(&device.id, None, 7, 0, DayMask::ALL))
        .await;

    assert!(outcome.dispatched);
    assert_eq!(outcome.schedule_id, None);
    assert_eq!(outcome.rearm, RearmStatus::SkippedUnresolved);
    assert_eq!(h.platform.arm_calls(), 0);
}

#[tokio::test]
async fn test_disabled_schedule_is_not_rearmed() {
    let h = harness("test_disabled_schedule_not_rearmed").await;
    let device = h.scheduler.create_device(&device_input("NAS")).await.unwrap();
    let schedule = h.scheduler.create_schedule(&device.id, 7, 0, 0x7F).await.unwrap();
    h.scheduler.toggle_schedule(&schedule.id).await.unwrap();
    h.platform.reset_calls();

    let outcome = h
        .scheduler
        .handle_fire(payload(&device.id, Some(&schedule.id), 7, 0, DayMask::ALL))
        .await;

    assert!(outcome.dispatched);
    assert_eq!(outcome.rearm, RearmStatus::SkippedInactive);
    assert_eq!(h.platform.arm_calls(), 0);
    assert_eq!(h.platform.live_count(), 0);
}

#[tokio::test]
async fn test_failed_dispatch_still_rearms() {
    let h = harness("test_failed_dispatch_still_rearms").await;
    let device = h.scheduler.create_device(&device_input("NAS")).await.unwrap();
    let schedule = h.scheduler.create_schedule(&device.id, 7, 0, 0x7F).await.unwrap();
    h.sender.fail_host("192.168.1.20");
    h.sender.fail_host(GLOBAL_BROADCAST);

    let outcome = h
        .scheduler
        .handle_fire(payload(&device.id, Some(&schedule.id), 7, 0, DayMask::ALL))
        .await;

    assert!(!outcome.dispatched);
    assert!(matches!(outcome.rearm, RearmStatus::Rearmed(_)));
    assert!(h.scheduler.get_device(&device.id).await.unwrap().last_seen_at.is_none());
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_rearm_uses_payload_time_not_stored_row() {
    let h = harness("test_rearm_uses_payload_time").await;
    let device = h.scheduler.create_device(&device_input("NAS")).await.unwrap();
    let schedule = h.scheduler.create_schedule(&device.id, 8, 0, 0x7F).await.unwrap();

    let outcome = h
        .scheduler
        .handle_fire(payload(
            &device.id,
            Some(&schedule.id),
            9,
            0,
            DayMask::from_days(&[Weekday::Mon]),
        ))
        .await;

    let RearmStatus::Rearmed(armed) = &outcome.rearm else {
        panic!("expected a re-arm, got {:?}", outcome.rearm);
    };
    assert_eq!(armed.fire_at, Utc.with_ymd_and_hms(2025, 6, 9, 9, 0, 0).unwrap());
    let live = h.platform.live_for_schedule(&schedule.id).unwrap();
    assert_eq!((live.payload.hour, live.payload.minute), (9, 0));
}

#[tokio::test]
async fn test_fire_for_deleted_device_stops_the_chain() {
    let h = harness("test_fire_for_deleted_device").await;
    let device = h.scheduler.create_device(&device_input("NAS")).await.unwrap();
    let schedule = h.scheduler.create_schedule(&device.id, 7, 0, 0x7F).await.unwrap();
    h.scheduler.delete_device(&device.id).await.unwrap();
    h.platform.reset_calls();

    let outcome = h
        .scheduler
        .handle_fire(payload(&device.id, Some(&schedule.id), 7, 0, DayMask::ALL))
        .await;

    assert!(!outcome.dispatched);
    assert_eq!(outcome.rearm, RearmStatus::SkippedInactive);
    assert_eq!(h.platform.arm_calls(), 0);
    assert_eq!(h.sender.send_count(), 0);
}

#[tokio::test]
async fn test_dispatch_past_deadline_still_rearms_and_releases_lock() {
    let h = harness_with_deadline("test_dispatch_past_deadline", Duration::from_millis(50)).await;
    let device = h.scheduler.create_device(&device_input("NAS")).await.unwrap();
    let schedule = h.scheduler.create_schedule(&device.id, 7, 0, 0x7F).await.unwrap();
    h.sender.set_delay(Duration::from_millis(500));
    // The platform has already dropped the registration it just delivered
    h.platform.cancel(RequestId::for_schedule(&schedule.id)).unwrap();
    h.platform.reset_calls();

    let outcome = h
        .scheduler
        .handle_fire(payload(&device.id, Some(&schedule.id), 7, 0, DayMask::ALL))
        .await;

    assert!(!outcome.dispatched);
    assert!(outcome.dispatch_timed_out);
    let RearmStatus::Rearmed(armed) = &outcome.rearm else {
        panic!("expected a re-arm, got {:?}", outcome.rearm);
    };
    assert_eq!(armed.fire_at, Utc.with_ymd_and_hms(2025, 6, 4, 7, 0, 0).unwrap());
    assert_eq!(h.platform.arm_calls(), 1);
    assert!(h.platform.live_for_schedule(&schedule.id).is_some());
    assert!(h.scheduler.get_schedule(&schedule.id).await.unwrap().enabled);
    assert!(h.scheduler.get_device(&device.id).await.unwrap().last_seen_at.is_none());
    assert_eq!(h.wake_lock.held(), 0);
}

#[tokio::test]
async fn test_notification_skipped_without_permission() {
    let h = harness("test_notification_without_permission").await;
    let device = h.scheduler.create_device(&device_input("NAS")).await.unwrap();
    let schedule = h.scheduler.create_schedule(&device.id, 7, 0, 0x7F).await.unwrap();
    h.notifier.set_permitted(false);

    let outcome = h
        .scheduler
        .handle_fire(payload(&device.id, Some(&schedule.id), 7, 0, DayMask::ALL))
        .await;

    assert!(outcome.dispatched);
    assert!(h.notifier.sent().is_empty());
    assert!(h.scheduler.get_device(&device.id).await.unwrap().last_seen_at.is_some());
}

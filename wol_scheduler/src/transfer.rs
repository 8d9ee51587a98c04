//! JSON export and import of devices and schedules

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::db::entities::ScheduleModel;
use crate::recurrence::{validate_time, DayMask};
use crate::storage::{DeviceInput, Storage};
use crate::WolError;

pub const EXPORT_VERSION: u32 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedDevice {
    pub id: String,
    #[serde(flatten)]
    pub device: DeviceInput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedSchedule {
    pub id: String,
    pub device_id: String,
    pub days_bitmap: i64,
    pub hour: i64,
    pub minute: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportBundle {
    #[serde(default)]
    pub version: u32,
    pub devices: Vec<ExportedDevice>,
    #[serde(default)]
    pub schedules: Vec<ExportedSchedule>,
}

/// Accepted import shapes; the first version exported a bare device array
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImportShape {
    Bundle(ExportBundle),
    Devices(Vec<ExportedDevice>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub devices: usize,
    pub schedules: usize,
    pub skipped_schedules: usize,
}

pub async fn export_bundle(storage: &Storage) -> Result<ExportBundle, WolError> {
    let devices = storage
        .list_devices()
        .await?
        .iter()
        .map(|d| ExportedDevice {
            id: d.id.clone(),
            device: DeviceInput::from(d),
        })
        .collect();
    let schedules = storage
        .list_schedules()
        .await?
        .into_iter()
        .map(|s| ExportedSchedule {
            id: s.id,
            device_id: s.device_id,
            days_bitmap: s.days_bitmap as i64,
            hour: s.hour as i64,
            minute: s.minute as i64,
            enabled: s.enabled,
        })
        .collect();

    Ok(ExportBundle {
        version: EXPORT_VERSION,
        devices,
        schedules,
    })
}

pub fn parse_import(json: &str) -> Result<ExportBundle, WolError> {
    let shape: ImportShape = serde_json::from_str(json)
        .map_err(|e| WolError::Validation(format!("Unrecognised import data: {}", e)))?;
    Ok(match shape {
        ImportShape::Bundle(bundle) => bundle,
        ImportShape::Devices(devices) => ExportBundle {
            version: 1,
            devices,
            schedules: Vec::new(),
        },
    })
}

/// Validate every device up front, then upsert devices and schedules.
///
/// An invalid device rejects the whole import before anything is written. Schedules with a
/// bad time, a bad bitmap or an unknown device are skipped.
pub async fn apply_import(storage: &Storage, bundle: &ExportBundle) -> Result<ImportSummary, WolError> {
    let mut devices = Vec::with_capacity(bundle.devices.len());
    for exported in &bundle.devices {
        if exported.id.trim().is_empty() {
            return Err(WolError::Validation("Imported device without id".to_string()));
        }
        let valid = exported.device.validate().map_err(|e| {
            WolError::Validation(format!("Imported device {}: {}", exported.id, e))
        })?;
        devices.push((exported.id.as_str(), valid));
    }

    let mut summary = ImportSummary::default();
    for (id, device) in &devices {
        storage.upsert_device(id, device).await?;
        summary.devices += 1;
    }

    for exported in &bundle.schedules {
        match schedule_row(exported) {
            Ok(row) if storage.get_device(&row.device_id).await?.is_some() => {
                storage.upsert_schedule(&row).await?;
                summary.schedules += 1;
            }
            Ok(row) => {
                crate::warn!(
                    "[TRANSFER] Skipping schedule {}: device {} unknown",
                    row.id,
                    row.device_id
                );
                summary.skipped_schedules += 1;
            }
            Err(e) => {
                crate::warn!("[TRANSFER] Skipping schedule {}: {}", exported.id, e);
                summary.skipped_schedules += 1;
            }
        }
    }

    crate::info!(
        "[TRANSFER] Imported {} devices, {} schedules ({} skipped)",
        summary.devices,
        summary.schedules,
        summary.skipped_schedules
    );
    Ok(summary)
}

fn schedule_row(exported: &ExportedSchedule) -> Result<ScheduleModel, WolError> {
    let (hour, minute) = validate_time(exported.hour, exported.minute)?;
    let days = DayMask::from_bits(exported.days_bitmap)?.normalized();
    let now: DateTime<FixedOffset> = Utc::now().into();
    Ok(ScheduleModel {
        id: exported.id.clone(),
        device_id: exported.device_id.clone(),
        days_bitmap: days.bits() as i32,
        hour: hour as i32,
        minute: minute as i32,
        enabled: exported.enabled,
        created_at: now,
        updated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bundle() {
        let json = r#"{
            "version": 2,
            "devices": [{"id": "d1", "name": "NAS", "mac": "AABBCCDDEEFF", "internal_port": 9}],
            "schedules": [{"id": "s1", "device_id": "d1", "days_bitmap": 31, "hour": 7, "minute": 0, "enabled": false}]
        }"#;
        let bundle = parse_import(json).unwrap();
        assert_eq!(bundle.devices.len(), 1);
        assert_eq!(bundle.devices[0].device.internal_port, Some(9));
        assert!(!bundle.schedules[0].enabled);
    }

    #[test]
    fn test_parse_legacy_device_array() {
        let json = r#"[{"id": "d1", "name": "NAS", "mac": "aa:bb:cc:dd:ee:ff"}]"#;
        let bundle = parse_import(json).unwrap();
        assert_eq!(bundle.version, 1);
        assert_eq!(bundle.devices[0].id, "d1");
        assert!(bundle.schedules.is_empty());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_import("{\"pcs\": 3}").unwrap_err().is_validation());
        assert!(parse_import("not json").is_err());
    }

    #[test]
    fn test_schedule_row_normalizes_empty_mask() {
        let row = schedule_row(&ExportedSchedule {
            id: "s".to_string(),
            device_id: "d".to_string(),
            days_bitmap: 0,
            hour: 6,
            minute: 30,
            enabled: true,
        })
        .unwrap();
        assert_eq!(row.days_bitmap, 1);
    }
}

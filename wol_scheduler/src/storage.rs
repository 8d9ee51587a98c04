//! Device registry and schedule store on top of SeaORM
//!
//! Every write is a single statement scoped to one row, so a concurrent edit and a fire
//! never interleave into a half-updated record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::entities::{
    DeviceActiveModel, DeviceColumn, DeviceModel, Devices, ScheduleActiveModel, ScheduleColumn,
    ScheduleModel, Schedules,
};
use crate::db::Database;
use crate::mac::normalize_mac;
use crate::magic_packet::DEFAULT_WOL_PORT;
use crate::recurrence::DayMask;
use crate::WolError;

pub(crate) fn db_err(e: DbErr) -> WolError {
    WolError::Database(e.to_string())
}

/// Device fields as supplied by a caller, before validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInput {
    pub name: String,
    pub mac: String,
    #[serde(default)]
    pub internal_host: Option<String>,
    #[serde(default)]
    pub internal_port: Option<u32>,
    #[serde(default)]
    pub external_host: Option<String>,
    #[serde(default)]
    pub external_port: Option<u32>,
    #[serde(default)]
    pub status_probe_port: Option<u32>,
}

/// Device fields that passed validation and are ready to persist
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidDevice {
    pub name: String,
    pub mac: String,
    pub internal_host: Option<String>,
    pub internal_port: u16,
    pub external_host: Option<String>,
    pub external_port: u16,
    pub status_probe_port: Option<u16>,
}

fn validate_port(field: &str, port: Option<u32>) -> Result<Option<u16>, WolError> {
    match port {
        None => Ok(None),
        Some(p) => u16::try_from(p)
            .ok()
            .filter(|p| *p != 0)
            .map(Some)
            .ok_or_else(|| {
                WolError::Validation(format!("{} {} is outside 1..=65535", field, p))
            }),
    }
}

fn clean_host(host: &Option<String>) -> Option<String> {
    host.as_deref()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
}

impl DeviceInput {
    pub fn validate(&self) -> Result<ValidDevice, WolError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(WolError::Validation("Device name must not be empty".to_string()));
        }
        Ok(ValidDevice {
            name: name.to_string(),
            mac: normalize_mac(&self.mac)?,
            internal_host: clean_host(&self.internal_host),
            internal_port: validate_port("internal_port", self.internal_port)?
                .unwrap_or(DEFAULT_WOL_PORT),
            external_host: clean_host(&self.external_host),
            external_port: validate_port("external_port", self.external_port)?
                .unwrap_or(DEFAULT_WOL_PORT),
            status_probe_port: validate_port("status_probe_port", self.status_probe_port)?,
        })
    }
}

impl From<&DeviceModel> for DeviceInput {
    fn from(model: &DeviceModel) -> Self {
        let port = |p: i32| u32::try_from(p).ok();
        Self {
            name: model.name.clone(),
            mac: model.mac.clone(),
            internal_host: model.internal_host.clone(),
            internal_port: port(model.internal_port),
            external_host: model.external_host.clone(),
            external_port: port(model.external_port),
            status_probe_port: model.status_probe_port.and_then(port),
        }
    }
}

#[derive(Debug)]
pub struct StorageInner {
    pub db: Database,
}

#[derive(Debug, Clone)]
pub struct Storage(Arc<StorageInner>);

impl Storage {
    pub fn new(db: Database) -> Self {
        Storage(Arc::new(StorageInner { db }))
    }

    pub fn db(&self) -> &Database {
        &self.0.db
    }

    // ---- devices ----

    pub async fn get_device(&self, id: &str) -> Result<Option<DeviceModel>, WolError> {
        Devices::find_by_id(id.to_string())
            .one(self.db().orm())
            .await
            .map_err(db_err)
    }

    pub async fn list_devices(&self) -> Result<Vec<DeviceModel>, WolError> {
        Devices::find()
            .order_by_asc(DeviceColumn::Name)
            .order_by_asc(DeviceColumn::Id)
            .all(self.db().orm())
            .await
            .map_err(db_err)
    }

    pub async fn insert_device(&self, device: &ValidDevice) -> Result<DeviceModel, WolError> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let model = DeviceActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            name: Set(device.name.clone()),
            mac: Set(device.mac.clone()),
            internal_host: Set(device.internal_host.clone()),
            internal_port: Set(device.internal_port as i32),
            external_host: Set(device.external_host.clone()),
            external_port: Set(device.external_port as i32),
            status_probe_port: Set(device.status_probe_port.map(i32::from)),
            last_seen_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = model.insert(self.db().orm()).await.map_err(db_err)?;
        crate::debug!("[STORAGE] Inserted device {} ({})", model.id, model.name);
        Ok(model)
    }

    /// Replace the editable fields of an existing device; `id` and `last_seen_at` are kept.
    pub async fn update_device(
        &self,
        id: &str,
        device: &ValidDevice,
    ) -> Result<DeviceModel, WolError> {
        let result = Devices::update_many()
            .col_expr(DeviceColumn::Name, Expr::value(device.name.clone()))
            .col_expr(DeviceColumn::Mac, Expr::value(device.mac.clone()))
            .col_expr(
                DeviceColumn::InternalHost,
                Expr::value(device.internal_host.clone()),
            )
            .col_expr(DeviceColumn::InternalPort, Expr::value(device.internal_port as i32))
            .col_expr(
                DeviceColumn::ExternalHost,
                Expr::value(device.external_host.clone()),
            )
            .col_expr(DeviceColumn::ExternalPort, Expr::value(device.external_port as i32))
            .col_expr(
                DeviceColumn::StatusProbePort,
                Expr::value(device.status_probe_port.map(i32::from)),
            )
            .col_expr(
                DeviceColumn::UpdatedAt,
                Expr::value(DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(DeviceColumn::Id.eq(id))
            .exec(self.db().orm())
            .await
            .map_err(db_err)?;

        if result.rows_affected == 0 {
            return Err(WolError::NotFound(format!("Device {} not found", id)));
        }
        self.get_device(id)
            .await?
            .ok_or_else(|| WolError::NotFound(format!("Device {} not found", id)))
    }

    /// Insert or overwrite a device under a caller-chosen id
    pub async fn upsert_device(&self, id: &str, device: &ValidDevice) -> Result<(), WolError> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let model = DeviceActiveModel {
            id: Set(id.to_string()),
            name: Set(device.name.clone()),
            mac: Set(device.mac.clone()),
            internal_host: Set(device.internal_host.clone()),
            internal_port: Set(device.internal_port as i32),
            external_host: Set(device.external_host.clone()),
            external_port: Set(device.external_port as i32),
            status_probe_port: Set(device.status_probe_port.map(i32::from)),
            last_seen_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Devices::insert(model)
            .on_conflict(
                OnConflict::column(DeviceColumn::Id)
                    .update_columns([
                        DeviceColumn::Name,
                        DeviceColumn::Mac,
                        DeviceColumn::InternalHost,
                        DeviceColumn::InternalPort,
                        DeviceColumn::ExternalHost,
                        DeviceColumn::ExternalPort,
                        DeviceColumn::StatusProbePort,
                        DeviceColumn::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db().orm())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    pub async fn update_last_seen(&self, id: &str, at: DateTime<Utc>) -> Result<(), WolError> {
        let result = Devices::update_many()
            .col_expr(
                DeviceColumn::LastSeenAt,
                Expr::value(Some(DateTimeWithTimeZone::from(at))),
            )
            .col_expr(
                DeviceColumn::UpdatedAt,
                Expr::value(DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(DeviceColumn::Id.eq(id))
            .exec(self.db().orm())
            .await
            .map_err(db_err)?;

        if result.rows_affected == 0 {
            return Err(WolError::NotFound(format!("Device {} not found", id)));
        }
        Ok(())
    }

    /// Returns whether a row was deleted
    pub async fn delete_device(&self, id: &str) -> Result<bool, WolError> {
        let result = Devices::delete_by_id(id.to_string())
            .exec(self.db().orm())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected > 0)
    }

    // ---- schedules ----

    pub async fn get_schedule(&self, id: &str) -> Result<Option<ScheduleModel>, WolError> {
        Schedules::find_by_id(id.to_string())
            .one(self.db().orm())
            .await
            .map_err(db_err)
    }

    pub async fn list_schedules_for_device(
        &self,
        device_id: &str,
    ) -> Result<Vec<ScheduleModel>, WolError> {
        Schedules::find()
            .filter(ScheduleColumn::DeviceId.eq(device_id))
            .order_by_asc(ScheduleColumn::Hour)
            .order_by_asc(ScheduleColumn::Minute)
            .order_by_asc(ScheduleColumn::Id)
            .all(self.db().orm())
            .await
            .map_err(db_err)
    }

    pub async fn list_enabled_schedules(&self) -> Result<Vec<ScheduleModel>, WolError> {
        Schedules::find()
            .filter(ScheduleColumn::Enabled.eq(true))
            .order_by_asc(ScheduleColumn::Id)
            .all(self.db().orm())
            .await
            .map_err(db_err)
    }

    pub async fn list_schedules(&self) -> Result<Vec<ScheduleModel>, WolError> {
        Schedules::find()
            .order_by_asc(ScheduleColumn::DeviceId)
            .order_by_asc(ScheduleColumn::Id)
            .all(self.db().orm())
            .await
            .map_err(db_err)
    }

    pub async fn insert_schedule(
        &self,
        device_id: &str,
        hour: u32,
        minute: u32,
        days: DayMask,
        enabled: bool,
    ) -> Result<ScheduleModel, WolError> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let model = ScheduleActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            device_id: Set(device_id.to_string()),
            days_bitmap: Set(days.bits() as i32),
            hour: Set(hour as i32),
            minute: Set(minute as i32),
            enabled: Set(enabled),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let model = model.insert(self.db().orm()).await.map_err(db_err)?;
        crate::debug!("[STORAGE] Inserted schedule {} for {}", model.id, device_id);
        Ok(model)
    }

    /// Insert or overwrite a schedule row as-is
    pub async fn upsert_schedule(&self, schedule: &ScheduleModel) -> Result<(), WolError> {
        let model = ScheduleActiveModel {
            id: Set(schedule.id.clone()),
            device_id: Set(schedule.device_id.clone()),
            days_bitmap: Set(schedule.days_bitmap),
            hour: Set(schedule.hour),
            minute: Set(schedule.minute),
            enabled: Set(schedule.enabled),
            created_at: Set(schedule.created_at),
            updated_at: Set(Utc::now().into()),
        };
        Schedules::insert(model)
            .on_conflict(
                OnConflict::column(ScheduleColumn::Id)
                    .update_columns([
                        ScheduleColumn::DeviceId,
                        ScheduleColumn::DaysBitmap,
                        ScheduleColumn::Hour,
                        ScheduleColumn::Minute,
                        ScheduleColumn::Enabled,
                        ScheduleColumn::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db().orm())
            .await
            .map_err(db_err)?;
        Ok(())
    }

    /// Store a new time and day set; an edited schedule is always enabled.
    pub async fn update_schedule_time(
        &self,
        id: &str,
        hour: u32,
        minute: u32,
        days: DayMask,
    ) -> Result<ScheduleModel, WolError> {
        let result = Schedules::update_many()
            .col_expr(ScheduleColumn::Hour, Expr::value(hour as i32))
            .col_expr(ScheduleColumn::Minute, Expr::value(minute as i32))
            .col_expr(ScheduleColumn::DaysBitmap, Expr::value(days.bits() as i32))
            .col_expr(ScheduleColumn::Enabled, Expr::value(true))
            .col_expr(
                ScheduleColumn::UpdatedAt,
                Expr::value(DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(ScheduleColumn::Id.eq(id))
            .exec(self.db().orm())
            .await
            .map_err(db_err)?;
        self.require_schedule(id, result.rows_affected).await
    }

    pub async fn set_schedule_enabled(
        &self,
        id: &str,
        enabled: bool,
    ) -> Result<ScheduleModel, WolError> {
        let result = Schedules::update_many()
            .col_expr(ScheduleColumn::Enabled, Expr::value(enabled))
            .col_expr(
                ScheduleColumn::UpdatedAt,
                Expr::value(DateTimeWithTimeZone::from(Utc::now())),
            )
            .filter(ScheduleColumn::Id.eq(id))
            .exec(self.db().orm())
            .await
            .map_err(db_err)?;
        self.require_schedule(id, result.rows_affected).await
    }

    async fn require_schedule(
        &self,
        id: &str,
        rows_affected: u64,
    ) -> Result<ScheduleModel, WolError> {
        if rows_affected == 0 {
            return Err(WolError::NotFound(format!("Schedule {} not found", id)));
        }
        self.get_schedule(id)
            .await?
            .ok_or_else(|| WolError::NotFound(format!("Schedule {} not found", id)))
    }

    pub async fn delete_schedule(&self, id: &str) -> Result<bool, WolError> {
        let result = Schedules::delete_by_id(id.to_string())
            .exec(self.db().orm())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected > 0)
    }

    pub async fn delete_schedules_for_device(&self, device_id: &str) -> Result<u64, WolError> {
        let result = Schedules::delete_many()
            .filter(ScheduleColumn::DeviceId.eq(device_id))
            .exec(self.db().orm())
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected)
    }
}

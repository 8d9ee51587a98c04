//! Schedule entity: a weekly recurring wake job

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::recurrence::DayMask;
use crate::timer::ScheduleJob;
use crate::WolError;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "schedules")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Char(Some(36))")]
    pub id: String,

    #[sea_orm(column_type = "Char(Some(36))")]
    pub device_id: String,

    /// bit 0 = Monday ... bit 6 = Sunday
    pub days_bitmap: i32,

    pub hour: i32,
    pub minute: i32,
    pub enabled: bool,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::devices::Entity",
        from = "Column::DeviceId",
        to = "super::devices::Column::Id",
        on_update = "Cascade",
        on_delete = "Cascade"
    )]
    Devices,
}

impl Related<super::devices::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Devices.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn days(&self) -> Result<DayMask, WolError> {
        DayMask::from_bits(self.days_bitmap as i64)
    }

    /// Whether this row describes the given (hour, minute, days) occurrence
    pub fn matches(&self, hour: u32, minute: u32, days: DayMask) -> bool {
        self.hour == hour as i32 && self.minute == minute as i32 && self.days_bitmap == days.bits() as i32
    }

    pub fn job(&self) -> Result<ScheduleJob, WolError> {
        let (hour, minute) =
            crate::recurrence::validate_time(self.hour as i64, self.minute as i64)?;
        Ok(ScheduleJob {
            schedule_id: self.id.clone(),
            device_id: self.device_id.clone(),
            hour,
            minute,
            days: self.days()?,
        })
    }
}

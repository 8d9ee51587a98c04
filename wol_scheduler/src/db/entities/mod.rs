//! Database entities for the Wake-on-LAN scheduler

pub mod devices;
pub mod schedules;

// Re-exports for convenience
pub use devices::{
    ActiveModel as DeviceActiveModel, Column as DeviceColumn, Entity as Devices,
    Model as DeviceModel,
};

pub use schedules::{
    ActiveModel as ScheduleActiveModel, Column as ScheduleColumn, Entity as Schedules,
    Model as ScheduleModel,
};

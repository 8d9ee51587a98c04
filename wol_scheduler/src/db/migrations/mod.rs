//! Database migrations for the Wake-on-LAN scheduler

use sea_orm_migration::prelude::*;

pub mod m20250101_000001_create_devices_table;
pub mod m20250101_000002_create_schedules_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_devices_table::Migration),
            Box::new(m20250101_000002_create_schedules_table::Migration),
        ]
    }
}

//! Database module for the Wake-on-LAN scheduler
//!
//! SeaORM storage for devices and schedules. SQLite and MySQL URLs are both accepted.

pub mod connection;
pub mod entities;
pub mod migrations;

use sea_orm::{DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;
use std::sync::Arc;

/// Database connection wrapper
#[derive(Debug, Clone)]
pub struct Database {
    /// SeaORM database connection
    pub orm_conn: Arc<DatabaseConnection>,
}

impl Database {
    /// Create a new database instance
    pub async fn new(database_url: &str) -> Result<Self, DbErr> {
        let orm_conn = connection::establish_connection(database_url).await?;

        Ok(Self {
            orm_conn: Arc::new(orm_conn),
        })
    }

    /// Create a database instance for tests: a single pooled connection so in-memory
    /// SQLite keeps one schema for the lifetime of the handle
    pub async fn new_for_test(database_url: &str) -> Result<Self, DbErr> {
        let orm_conn = connection::establish_test_connection(database_url).await?;

        Ok(Self {
            orm_conn: Arc::new(orm_conn),
        })
    }

    /// Get the SeaORM connection
    pub fn orm(&self) -> &DatabaseConnection {
        &self.orm_conn
    }

    /// Apply all pending migrations
    pub async fn run_migrations(&self) -> Result<(), DbErr> {
        migrations::Migrator::up(self.orm(), None).await
    }
}

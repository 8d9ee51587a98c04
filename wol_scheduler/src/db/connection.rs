//! Database connection management

use std::time::Duration;

use crate::{error, info};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database as SeaOrmDatabase, DatabaseConnection, DbErr,
    Statement,
};

fn backend_name(database_url: &str) -> &'static str {
    if database_url.starts_with("sqlite:") {
        "SQLite"
    } else if database_url.starts_with("mysql:") {
        "MySQL"
    } else {
        "database"
    }
}

/// Establish SeaORM database connection
pub async fn establish_connection(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let backend = backend_name(database_url);
    info!("Connecting to {} with SeaORM...", backend);

    let mut options = ConnectOptions::new(database_url.to_owned());
    options
        .connect_timeout(Duration::from_secs(10))
        .sqlx_logging(false);

    let orm_conn = SeaOrmDatabase::connect(options).await.map_err(|e| {
        error!("Failed to create SeaORM connection: {}", e);
        e
    })?;

    info!("Successfully connected to {}", backend);

    Ok(orm_conn)
}

/// Establish SeaORM database connection optimized for testing
pub async fn establish_test_connection(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(database_url.to_owned());
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    SeaOrmDatabase::connect(options).await.map_err(|e| {
        error!("Failed to create test SeaORM connection: {}", e);
        e
    })
}

/// Test database connection with a trivial query
pub async fn test_connection(database_url: &str) -> Result<(), DbErr> {
    let conn = establish_connection(database_url).await?;

    conn.execute(Statement::from_string(
        conn.get_database_backend(),
        "SELECT 1".to_owned(),
    ))
    .await
    .map_err(|e| {
        error!("Query test failed: {}", e);
        e
    })?;

    conn.close().await.map_err(|e| {
        error!("Failed to close connection: {}", e);
        e
    })?;

    info!("Database connection test successful");
    Ok(())
}

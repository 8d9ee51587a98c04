//! Logging module for the Wake-on-LAN scheduler crates
//!
//! This module provides logging initialization and panic recovery functionality
//! shared by the library and the daemon binary.

use std::fs;
use std::path::Path;
use std::sync::Once;
use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Configuration for logging setup
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub log_level: String,
    pub module_name: String,
}

impl LoggingConfig {
    pub fn new(level: &str, module_name: &str) -> Self {
        Self {
            log_level: level.to_string(),
            module_name: module_name.to_string(),
        }
    }
}

// Static variables for ensuring single initialization
static CONSOLE_INIT: Once = Once::new();
static FILE_INIT: Once = Once::new();
static PANIC_HOOK_INIT: Once = Once::new();

// Guards for non-blocking writers
static FILE_GUARD: once_cell::sync::Lazy<
    std::sync::Mutex<Option<tracing_appender::non_blocking::WorkerGuard>>,
> = once_cell::sync::Lazy::new(|| std::sync::Mutex::new(None));
static CONSOLE_GUARD: once_cell::sync::Lazy<
    std::sync::Mutex<Option<tracing_appender::non_blocking::WorkerGuard>>,
> = once_cell::sync::Lazy::new(|| std::sync::Mutex::new(None));

// Last panic message storage
static LAST_PANIC: once_cell::sync::Lazy<std::sync::Mutex<Option<String>>> =
    once_cell::sync::Lazy::new(|| std::sync::Mutex::new(None));

/// Initialize console logging with environment variable support
pub fn init_console_logging(config: &LoggingConfig) {
    CONSOLE_INIT.call_once(|| {
        let env_filter = create_env_filter(config);

        let result = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init();

        match result {
            Ok(()) => {
                debug!(
                    "Console logging initialized for {} (level: {})",
                    config.module_name, config.log_level
                );
            }
            // Another subscriber (e.g. a test harness) got there first
            Err(e) => eprintln!("[WOL_COMMON] Console logging not installed: {}", e),
        }

        init_panic_recovery();
    });
}

/// Initialize file logging with both file and console output
pub fn init_file_logging(
    config: &LoggingConfig,
    log_path: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut init_result = Ok(());

    FILE_INIT.call_once(|| {
        init_result = install_file_logging(config, log_path);
        init_panic_recovery();
    });

    init_result
}

fn install_file_logging(
    config: &LoggingConfig,
    log_path: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use tracing_appender::non_blocking;

    let path = Path::new(log_path);
    let log_dir = path
        .parent()
        .ok_or("Invalid log path: no parent directory")?;
    let log_filename = path.file_name().ok_or("Invalid log path: no filename")?;

    fs::create_dir_all(log_dir)?;

    let env_filter = create_env_filter(config);

    // No rotation; the daemon is expected to run under an external log rotator
    let file_appender = tracing_appender::rolling::never(log_dir, log_filename);
    let (file_writer, file_guard) = non_blocking(file_appender);
    if let Ok(mut guard) = FILE_GUARD.lock() {
        *guard = Some(file_guard);
    }

    let (console_writer, console_guard) = non_blocking(std::io::stdout());
    if let Ok(mut guard) = CONSOLE_GUARD.lock() {
        *guard = Some(console_guard);
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(false),
        )
        .with(
            fmt::layer()
                .with_writer(console_writer)
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true),
        )
        .try_init()?;

    info!(
        "File logging initialized for module: {} (level: {}) in {}",
        config.module_name,
        config.log_level,
        log_dir.display()
    );

    Ok(())
}

/// Create environment filter for logging
fn create_env_filter(config: &LoggingConfig) -> EnvFilter {
    let submodules = [
        "config",
        "db",
        "dispatch",
        "fire",
        "magic_packet",
        "probe",
        "scheduler",
        "status",
        "storage",
        "timer",
        "transfer",
    ];

    let directive = |target: String| -> tracing_subscriber::filter::Directive {
        format!("{}={}", target, config.log_level)
            .parse()
            .unwrap_or_else(|_| tracing_subscriber::filter::LevelFilter::INFO.into())
    };

    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    filter = filter.add_directive(directive(config.module_name.clone()));
    for submodule in &submodules {
        filter = filter.add_directive(directive(format!("{}::{}", config.module_name, submodule)));
    }
    filter
}

/// Set configuration and initialize console logging
pub fn set_and_init_console_logging(level: &str, module_name: &str) {
    let config = LoggingConfig::new(level, module_name);
    init_console_logging(&config);
}

/// Set configuration and initialize file logging
pub fn set_and_init_file_logging(
    level: &str,
    module_name: &str,
    log_path: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = LoggingConfig::new(level, module_name);
    init_file_logging(&config, log_path)
}

/// Initialize panic recovery hook
pub fn init_panic_recovery() {
    PANIC_HOOK_INIT.call_once(|| {
        std::panic::set_hook(Box::new(|panic_info| {
            let panic_msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            };

            let location = if let Some(location) = panic_info.location() {
                format!(
                    " at {}:{}:{}",
                    location.file(),
                    location.line(),
                    location.column()
                )
            } else {
                " at unknown location".to_string()
            };

            let full_msg = format!("{}{}", panic_msg, location);
            if let Ok(mut last) = LAST_PANIC.lock() {
                *last = Some(full_msg.clone());
            }

            tracing::error!("PANIC RECOVERED: {}", panic_msg);
            eprintln!("[WOL PANIC] {}", full_msg);
        }));

        info!("Panic recovery hook initialized");
    });
}

/// Get the last panic message
pub fn get_last_panic() -> Option<String> {
    LAST_PANIC.lock().ok().and_then(|last| last.clone())
}

/// Clear the stored panic message
pub fn clear_last_panic() {
    if let Ok(mut last) = LAST_PANIC.lock() {
        *last = None;
    }
}

// Logging macros
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        tracing::info!($($arg)*)
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        tracing::warn!($($arg)*)
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        tracing::error!($($arg)*)
    };
}

#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

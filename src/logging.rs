//! Tracing setup for the `arena` binary

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Full logging: console plus a daily-rolling file when the log dir is writable
pub fn init_logging(cfg: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},arena=debug,sqlx=warn", cfg.level))
    });

    let log_dir = std::env::var("ARENA_LOG_DIR")
        .or_else(|_| std::env::var("LOG_DIR"))
        .unwrap_or_else(|_| "logs".to_string());

    // `tracing_appender::rolling::daily` panics if it can't create the initial
    // file, so writability is checked first.
    let file_writer = if std::fs::create_dir_all(&log_dir).is_ok() {
        let test_path = std::path::Path::new(&log_dir).join(".arena_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);
                let file_appender = tracing_appender::rolling::daily(&log_dir, "arena.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
                // Process-lifetime guard
                Box::leak(Box::new(guard));
                Some(non_blocking)
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    } else {
        eprintln!(
            "Warning: Could not create log directory {}, file logging disabled",
            log_dir
        );
        None
    };

    let file_logging_enabled = file_writer.is_some();

    if cfg.json {
        let file_layer = file_writer.map(|w| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(w)
                .with_ansi(false)
        });
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .with(file_layer)
            .try_init();
    } else {
        let file_layer = file_writer.map(|w| {
            tracing_subscriber::fmt::layer()
                .with_writer(w)
                .with_ansi(false)
                .with_target(true)
        });
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false);
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .try_init();
    }

    if file_logging_enabled {
        eprintln!("Logging to: {}/arena.log", log_dir);
    }
}

/// Minimal logging for read-only CLI commands
pub fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

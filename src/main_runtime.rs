use reward_claimer::config::{AppConfig, LoggingConfig};
use reward_claimer::error::{ClaimerError, Result};
use reward_claimer::services::PoolSet;
use tracing_subscriber::EnvFilter;

/// Build the pool set for the selected backend
pub fn create_pool_set(config: &AppConfig, simulate: bool) -> Result<PoolSet> {
    config.validate().map_err(ClaimerError::InvalidConfig)?;
    if simulate {
        PoolSet::simulated(config)
    } else {
        PoolSet::from_config(config)
    }
}

fn default_directives(level: &str) -> String {
    if level.eq_ignore_ascii_case("info") {
        "info,reward_claimer=debug".to_string()
    } else {
        level.to_string()
    }
}

pub fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&logging.level)));

    // File logging only when a directory is configured.
    //
    // Important: `tracing_appender::rolling::daily` will panic if it can't create
    // the initial log file. So we must preflight writability.
    let log_dir = std::env::var("CLAIMER_LOG_DIR").ok();
    let file_layer = log_dir.as_ref().and_then(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            eprintln!(
                "Warning: Could not create log directory {} ({}), file logging disabled",
                log_dir, e
            );
            return None;
        }
        let test_path = std::path::Path::new(log_dir).join(".claimer_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                // Daily rotating file appender
                let file_appender = tracing_appender::rolling::daily(log_dir, "reward-claimer.log");
                let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

                // Keep the guard alive for the life of the process
                Box::leak(Box::new(guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false) // No color codes in file
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    });

    // Console layers (stderr keeps stdout clean for --json)
    let json_layer = logging.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!logging.json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_writer(std::io::stderr)
    });

    // Combine layers
    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(file_layer)
        .init();

    if let (true, Some(dir)) = (file_logging_enabled, log_dir) {
        eprintln!("Logging to: {}/reward-claimer.log", dir);
    }
}

pub fn init_logging_simple() {
    // Minimal logging for one-shot commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_writer(std::io::stderr)
        .try_init();
}

use crate::config::LoggingConfig;
use crate::utils::error::{InventoryError, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_PREFIX: &str = "app";
const LOG_FILE_SUFFIX: &str = "log";

/// 預設過濾等級；production 環境降為 warn
fn default_directive(verbose: bool, config: &LoggingConfig) -> String {
    if verbose {
        return "small_inventory=debug,info".to_string();
    }
    let production = std::env::var("ENVIRONMENT")
        .map(|env| env.eq_ignore_ascii_case("production"))
        .unwrap_or(false);
    let level = if production {
        "warn"
    } else {
        config.level.as_str()
    };
    format!("small_inventory={}", level)
}

pub fn init_cli_logger(verbose: bool, config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, config)));

    let mut layers = Vec::new();

    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);
    if config.json {
        layers.push(console.json().boxed());
    } else {
        layers.push(console.compact().boxed());
    }

    // 檔案日誌（每日輪替）
    let guard = match &config.directory {
        Some(dir) if config.file => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix(LOG_FILE_SUFFIX)
                .max_log_files(config.max_files)
                .build(dir)
                .map_err(|e| InventoryError::config(format!("log appender: {}", e)))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            if config.json {
                layers.push(file_layer.json().boxed());
            } else {
                layers.push(file_layer.boxed());
            }
            Some(guard)
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()
        .map_err(|e| InventoryError::config(format!("logger already initialised: {}", e)))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbose_overrides_configured_level() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            ..LoggingConfig::default()
        };
        assert_eq!(default_directive(true, &config), "small_inventory=debug,info");
    }
}

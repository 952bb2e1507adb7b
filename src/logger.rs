use chrono::Local;
use fern::Dispatch;
use log::LevelFilter;
use std::fs;

use crate::domain::utils::report_writer::ANALYTICS_TARGET;

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "te_flow_engine.log";
const ANALYTICS_FILE: &str = "analytics.log";

/// Initializes the global logger.
///
/// Call once at the start of `main`. The level comes from `level_override` if given, else from
/// `RUST_LOG`, else `info`. Everything is logged to stderr and `logs/te_flow_engine.log`;
/// per-bucket analytics records additionally go to `logs/analytics.log`.
pub fn init(level_override: Option<LevelFilter>) {
    if let Err(e) = fs::create_dir_all(LOG_DIR) {
        eprintln!("Failed to create log directory at '{}': {}", LOG_DIR, e);
    }

    let log_file_path = format!("{}/{}", LOG_DIR, LOG_FILE);
    let analytics_file_path = format!("{}/{}", LOG_DIR, ANALYTICS_FILE);

    let log_level_filter = level_override.unwrap_or_else(|| {
        std::env::var("RUST_LOG").ok().and_then(|level| level.parse::<LevelFilter>().ok()).unwrap_or(LevelFilter::Info)
    });

    let base_config = Dispatch::new().level(log_level_filter).level_for("serde", LevelFilter::Warn).level_for("csv", LevelFilter::Warn);

    let console_config = Dispatch::new()
        .format(|out, message, record| {
            let colors = fern::colors::ColoredLevelConfig::new()
                .error(fern::colors::Color::Red)
                .warn(fern::colors::Color::Yellow)
                .info(fern::colors::Color::Green)
                .debug(fern::colors::Color::Blue)
                .trace(fern::colors::Color::BrightBlack);

            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .chain(std::io::stderr());

    let mut file_config = Dispatch::new().format(|out, message, record| {
        out.finish(format_args!("[{} {} {}] {}", Local::now().format("%Y-%m-%d %H:%M:%S"), record.level(), record.target(), message))
    });

    match fern::log_file(&log_file_path) {
        Ok(file) => file_config = file_config.chain(file),
        Err(e) => eprintln!("Failed to open log file '{}': {}", log_file_path, e),
    }

    let mut analytics_config = Dispatch::new()
        .filter(|metadata| metadata.target() == ANALYTICS_TARGET)
        .format(|out, message, _record| out.finish(format_args!("{} {}", Local::now().format("%Y-%m-%d %H:%M:%S"), message)));

    match fern::log_file(&analytics_file_path) {
        Ok(file) => analytics_config = analytics_config.chain(file),
        Err(e) => eprintln!("Failed to open analytics file '{}': {}", analytics_file_path, e),
    }

    base_config
        .chain(console_config)
        .chain(file_config)
        .chain(analytics_config)
        .apply()
        .unwrap_or_else(|e| {
            eprintln!("Failed to apply logger configuration: {}", e);
        });

    log::info!("Logger initialized. Logging to console and '{}'.", log_file_path);
}

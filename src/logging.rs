//! # Logging
//!
//! `env_logger` set up to write every record to stdout and to an append-only
//! log file at the same time:
//!
//! ```text
//! 2024-05-01 12:00:00 [INFO] topic_lens::evaluate src/evaluate.rs - LDA k=3: coherence 0.4120, Perplexity 812.3311
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use chrono::Local;
use env_logger::{Builder, Target};
use log::{log, Level, LevelFilter};

use crate::settings::AppSettings;

pub struct LogConfig {
    pub log_file: String,
    pub log_level: LevelFilter,
}

impl LogConfig {
    pub fn new(log_file: String, log_level: LevelFilter) -> Self {
        Self { log_file, log_level }
    }

    pub fn from_settings(settings: &AppSettings) -> Self {
        Self::new(settings.log_file.clone(), settings.log_level)
    }
}

pub struct Logger {
    config: LogConfig,
}

impl Logger {
    /// Install the global logger. Fails if the log file cannot be opened or a
    /// logger is already installed.
    pub fn init(config: LogConfig) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(&config.log_file).parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_file)
            .with_context(|| format!("Failed to open log file {}", config.log_file))?;

        let multi_writer = MultiWriter {
            writers: vec![Box::new(std::io::stdout()), Box::new(file)],
        };

        Builder::new()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "{} [{}] {} {} - {}",
                    Local::now().format("%Y-%m-%d %H:%M:%S"),
                    record.level(),
                    record.module_path().unwrap_or("unknown"),
                    record.file().unwrap_or("unknown"),
                    record.args()
                )
            })
            .filter(None, config.log_level)
            .target(Target::Pipe(Box::new(multi_writer)))
            .try_init()
            .context("A logger is already installed")?;

        Ok(Self { config })
    }

    pub fn log_file(&self) -> &str {
        &self.config.log_file
    }

    /// One-line event with optional details and cause.
    pub fn log_event(&self, level: Level, event: &str, details: Option<&str>, error: Option<&dyn std::error::Error>) {
        log!(level, "{}", format_event(event, details, error));
    }
}

fn format_event(event: &str, details: Option<&str>, error: Option<&dyn std::error::Error>) -> String {
    match (details, error) {
        (Some(d), Some(e)) => format!("{}: {} - {}", event, d, e),
        (Some(d), None) => format!("{}: {}", event, d),
        (None, Some(e)) => format!("{} - {}", event, e),
        (None, None) => event.to_string(),
    }
}

/// Fans every write out to all inner writers.
struct MultiWriter {
    writers: Vec<Box<dyn Write + Send + Sync>>,
}

impl Write for MultiWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        for writer in &mut self.writers {
            writer.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        for writer in &mut self.writers {
            writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnalyticsError;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn multi_writer_copies_to_every_sink() {
        let a = Shared::default();
        let b = Shared::default();
        let mut writer = MultiWriter { writers: vec![Box::new(a.clone()), Box::new(b.clone())] };
        writer.write_all(b"hello").unwrap();
        writer.flush().unwrap();
        assert_eq!(&*a.0.lock().unwrap(), b"hello");
        assert_eq!(&*b.0.lock().unwrap(), b"hello");
    }

    #[test]
    fn events_are_formatted_on_one_line() {
        let err = AnalyticsError::Data("No valid rows in dataset.".into());
        assert_eq!(format_event("request", Some("csv"), Some(&err)), "request: csv - No valid rows in dataset.");
        assert_eq!(format_event("request", None, None), "request");
        assert_eq!(format_event("request", None, Some(&err)), "request - No valid rows in dataset.");
    }

    #[test]
    fn config_follows_settings() {
        let config = LogConfig::from_settings(&AppSettings::default());
        assert_eq!(config.log_file, "logs/topic-lens.log");
        assert_eq!(config.log_level, LevelFilter::Info);
    }
}

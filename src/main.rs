use std::env;
use std::fs;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Context};
use dotenv::dotenv;
use log::{info, Level};
use serde_json::json;

use topic_lens::logging::{LogConfig, Logger};
use topic_lens::{AppSettings, TopicService};

/// Time an expression and log how long it took.
macro_rules! time_it {
    ($label:expr, $block:expr) => {{
        let start = Instant::now();
        let result = $block;
        let duration = start.elapsed();
        info!("{} took {:.8?}", $label, duration);
        result
    }};
}

#[tokio::main]
/// Run every request file given on the command line and print one JSON
/// response per file.
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    let settings = AppSettings::from_env();
    let logger = Logger::init(LogConfig::from_settings(&settings))?;
    info!("Logging to {}", logger.log_file());

    let paths: Vec<String> = env::args().skip(1).collect();
    if paths.is_empty() {
        bail!("usage: topic-lens <request.json>...");
    }

    let service = Arc::new(TopicService::new(settings));
    for path in paths {
        let body = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path))?;
        let worker = Arc::clone(&service);
        let label = format!("Request {}", path);

        let (status, value) = time_it!(label, {
            tokio::task::spawn_blocking(move || worker.handle_json(&body))
                .await
                .context("Request worker panicked")?
        });

        let level = if status == 200 { Level::Info } else { Level::Warn };
        logger.log_event(level, "Request finished", Some(&format!("{} -> {}", path, status)), None);
        println!("{}", json!({ "file": path, "status": status, "body": value }));
    }

    info!("Loaded embedding models: {:?}", service.registry().loaded_models());
    Ok(())
}

//! # Settings
//!
//! Process-level configuration read from the environment. A `.env` file in the
//! working directory is loaded first by the binary, so every value can live
//! there instead of the shell.
//!
//! ## Variables
//!
//! - `TOPIC_LENS_LOG_FILE` - Log file path. Default `logs/topic-lens.log`.
//! - `TOPIC_LENS_LOG_LEVEL` - `error`, `warn`, `info`, `debug` or `trace`. Default `info`.
//! - `TOPIC_LENS_DEFAULT_EMBEDDING_MODEL` - Used when a request leaves `embeddingModel` blank.
//!   Default `all-MiniLM-L6-v2` when a local or remote provider can serve it, `hashing` otherwise.
//! - `TOPIC_LENS_MAX_SWEEP_FITS` - Upper bound on refits one coherence sweep may request.
//! - `TOPIC_LENS_LDA_ITERATIONS` - Gibbs sweeps per probabilistic fit. Default 200.
//! - `HUGGINGFACE_API_URL` / `HUGGINGFACE_API_TOKEN` - Remote embedding endpoint.

use std::env;
use std::str::FromStr;

use log::{warn, LevelFilter};

use crate::embedding::HASHING_MODEL;

pub const DEFAULT_LOG_FILE: &str = "logs/topic-lens.log";
pub const DEFAULT_EMBEDDING_MODEL: &str = "all-MiniLM-L6-v2";
pub const DEFAULT_LDA_ITERATIONS: usize = 200;

/// Embedding model for requests that name none.
pub fn fallback_embedding_model(huggingface: Option<&HuggingFaceSettings>) -> &'static str {
    if cfg!(feature = "bert") || huggingface.is_some() {
        DEFAULT_EMBEDDING_MODEL
    } else {
        HASHING_MODEL
    }
}

#[derive(Debug, Clone)]
/// Remote embedding endpoint configuration.
///
/// # Fields
///
/// * `api_url` - Base URL; the model name is appended as a path segment.
/// * `api_token` - Bearer token, optional for self-hosted endpoints.
pub struct HuggingFaceSettings {
    pub api_url: String,
    pub api_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppSettings {
    pub log_file: String,
    pub log_level: LevelFilter,
    pub default_embedding_model: String,
    pub max_sweep_fits: Option<usize>,
    pub lda_iterations: usize,
    pub huggingface: Option<HuggingFaceSettings>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            log_file: DEFAULT_LOG_FILE.to_string(),
            log_level: LevelFilter::Info,
            default_embedding_model: fallback_embedding_model(None).to_string(),
            max_sweep_fits: None,
            lda_iterations: DEFAULT_LDA_ITERATIONS,
            huggingface: None,
        }
    }
}

impl AppSettings {
    /// Read settings from the process environment, falling back to defaults
    /// for anything unset. Unparseable values are logged and ignored.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let huggingface = non_empty_var("HUGGINGFACE_API_URL").map(|api_url| HuggingFaceSettings {
            api_url,
            api_token: non_empty_var("HUGGINGFACE_API_TOKEN"),
        });

        Self {
            log_file: non_empty_var("TOPIC_LENS_LOG_FILE").unwrap_or(defaults.log_file),
            log_level: parsed_var("TOPIC_LENS_LOG_LEVEL").unwrap_or(defaults.log_level),
            default_embedding_model: non_empty_var("TOPIC_LENS_DEFAULT_EMBEDDING_MODEL")
                .unwrap_or_else(|| fallback_embedding_model(huggingface.as_ref()).to_string()),
            max_sweep_fits: parsed_var("TOPIC_LENS_MAX_SWEEP_FITS").filter(|&n: &usize| n > 0),
            lda_iterations: parsed_var("TOPIC_LENS_LDA_ITERATIONS")
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.lda_iterations),
            huggingface,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parsed_var<T: FromStr>(key: &str) -> Option<T> {
    let raw = non_empty_var(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}: cannot parse '{}'", key, raw);
            None
        }
    }
}

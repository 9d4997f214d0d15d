//! # Embedding providers
//!
//! Dense document vectors for the embedding-cluster method, plus the
//! process-wide cache of loaded model handles.
//!
//! ## Providers
//!
//! - `hashing`, `hashing-<dim>` - signed feature hashing of lower-cased tokens.
//!   Needs no download and is deterministic per (model name, text).
//! - MiniLM family (`all-MiniLM-L6-v2`, ...) - local sentence embeddings through
//!   Rust-BERT, only with the `bert` feature. Weights download on first use.
//! - Anything else - the remote feature-extraction endpoint configured with
//!   `HUGGINGFACE_API_URL`, when set.
//!
//! ## Cache
//!
//! [`ModelCache`] maps a model name to a lazily initialised handle. Each key has
//! its own `OnceCell`, so two requests asking for the same model at once load it
//! once while requests for other models are not held up. A failed load leaves
//! the cell empty and the next request retries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use log::info;
use once_cell::sync::OnceCell;
use serde_json::Value;

use crate::error::{AnalyticsError, Result};
use crate::preprocess::tokenize;
use crate::settings::HuggingFaceSettings;

pub const HASHING_MODEL: &str = "hashing";
pub const DEFAULT_HASHING_DIM: usize = 384;

/// Turns text into a fixed-length vector.
pub trait EmbeddingProvider: Send + Sync {
    fn model_name(&self) -> &str;

    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed documents one at a time, in order.
    fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Process-wide map of lazily loaded handles keyed by model name.
pub struct ModelCache<T: ?Sized> {
    entries: Mutex<HashMap<String, Arc<OnceCell<Arc<T>>>>>,
}

impl<T: ?Sized> Default for ModelCache<T> {
    fn default() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }
}

impl<T: ?Sized> ModelCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached handle for `key`, running `load` if there is none yet.
    ///
    /// The map lock is held only long enough to find the key's cell; `load`
    /// runs under that cell alone.
    pub fn get_or_load<F>(&self, key: &str, load: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Result<Arc<T>>,
    {
        let cell = {
            let mut entries = self
                .entries
                .lock()
                .map_err(|_| AnalyticsError::Embedding("model cache lock poisoned".into()))?;
            entries.entry(key.to_string()).or_default().clone()
        };
        cell.get_or_try_init(load).map(Arc::clone)
    }

    /// Names of models that finished loading.
    pub fn loaded(&self) -> Vec<String> {
        let entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut names: Vec<String> = entries
            .iter()
            .filter(|(_, cell)| cell.get().is_some())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}

/// Resolves model names to providers and keeps them for the process lifetime.
pub struct EmbeddingRegistry {
    cache: ModelCache<dyn EmbeddingProvider>,
    huggingface: Option<HuggingFaceSettings>,
}

impl EmbeddingRegistry {
    pub fn new(huggingface: Option<HuggingFaceSettings>) -> Self {
        Self { cache: ModelCache::new(), huggingface }
    }

    pub fn provider(&self, model_name: &str) -> Result<Arc<dyn EmbeddingProvider>> {
        self.cache.get_or_load(model_name, || self.load(model_name))
    }

    pub fn loaded_models(&self) -> Vec<String> {
        self.cache.loaded()
    }

    fn load(&self, model_name: &str) -> Result<Arc<dyn EmbeddingProvider>> {
        if let Some(embedder) = HashingEmbedder::from_model_name(model_name) {
            return Ok(Arc::new(embedder));
        }

        if let Some(local) = load_local(model_name) {
            return local;
        }

        if let Some(settings) = &self.huggingface {
            info!("Using remote embeddings for {} at {}", model_name, settings.api_url);
            return Ok(Arc::new(HfApiEmbedder::new(settings.clone(), model_name)?));
        }

        Err(AnalyticsError::validation(
            "embeddingModel",
            format!("Embedding model '{}' is not available.", model_name),
        ))
    }
}

#[cfg(feature = "bert")]
fn load_local(model_name: &str) -> Option<Result<Arc<dyn EmbeddingProvider>>> {
    let model_type = bert::model_type(model_name)?;
    info!("Loading sentence embedding model {}", model_name);
    Some(bert::BertEmbedder::load(model_name, model_type).map(|m| Arc::new(m) as Arc<dyn EmbeddingProvider>))
}

#[cfg(not(feature = "bert"))]
fn load_local(_model_name: &str) -> Option<Result<Arc<dyn EmbeddingProvider>>> {
    None
}

/// Signed feature hashing over lower-cased tokens.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    name: String,
    dim: usize,
}

impl HashingEmbedder {
    pub fn new(dim: usize) -> Self {
        let name = if dim == DEFAULT_HASHING_DIM {
            HASHING_MODEL.to_string()
        } else {
            format!("{}-{}", HASHING_MODEL, dim)
        };
        Self { name, dim }
    }

    /// `hashing` or `hashing-<dim>`; `None` for any other name.
    pub fn from_model_name(model_name: &str) -> Option<Self> {
        if model_name == HASHING_MODEL {
            return Some(Self::new(DEFAULT_HASHING_DIM));
        }
        let dim: usize = model_name.strip_prefix("hashing-")?.parse().ok()?;
        (dim > 0).then(|| Self::new(dim))
    }

    pub fn dim(&self) -> usize {
        self.dim
    }
}

impl EmbeddingProvider for HashingEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dim];
        let lowered = text.to_lowercase();
        for token in tokenize(&lowered) {
            let hash = fnv1a(token.as_bytes());
            let slot = (hash % self.dim as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Remote feature-extraction endpoint: `POST {api_url}/{model}` with
/// `{"inputs": text}`.
pub struct HfApiEmbedder {
    settings: HuggingFaceSettings,
    model_name: String,
    client: reqwest::blocking::Client,
}

impl HfApiEmbedder {
    pub fn new(settings: HuggingFaceSettings, model_name: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| AnalyticsError::Embedding(e.to_string()))?;
        Ok(Self { settings, model_name: model_name.to_string(), client })
    }

    fn endpoint(&self) -> String {
        format!("{}/{}", self.settings.api_url.trim_end_matches('/'), self.model_name)
    }
}

impl EmbeddingProvider for HfApiEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut request = self.client.post(self.endpoint()).json(&serde_json::json!({ "inputs": text }));
        if let Some(token) = &self.settings.api_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }
        let response = request
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| AnalyticsError::Embedding(format!("{}: {}", self.model_name, e)))?;
        let body: Value = response
            .json()
            .map_err(|e| AnalyticsError::Embedding(format!("{}: {}", self.model_name, e)))?;
        parse_feature_vector(&body)
            .ok_or_else(|| AnalyticsError::Embedding(format!("{}: unexpected response shape", self.model_name)))
    }
}

/// Accept a flat vector, or token vectors that are mean-pooled.
fn parse_feature_vector(body: &Value) -> Option<Vec<f32>> {
    let items = body.as_array()?;
    if items.iter().all(Value::is_number) {
        return items.iter().map(|v| v.as_f64().map(|x| x as f32)).collect();
    }
    let rows: Vec<Vec<f32>> = items.iter().map(parse_feature_vector).collect::<Option<_>>()?;
    let dim = rows.first()?.len();
    if rows.iter().any(|r| r.len() != dim) {
        return None;
    }
    let mut pooled = vec![0.0f32; dim];
    for row in &rows {
        for (acc, v) in pooled.iter_mut().zip(row) {
            *acc += v;
        }
    }
    pooled.iter_mut().for_each(|v| *v /= rows.len() as f32);
    Some(pooled)
}

#[cfg(feature = "bert")]
mod bert {
    use std::sync::Mutex;

    use rust_bert::pipelines::sentence_embeddings::{
        SentenceEmbeddingsBuilder, SentenceEmbeddingsModel, SentenceEmbeddingsModelType,
    };

    use tch::Device;

    use super::EmbeddingProvider;
    use crate::error::{AnalyticsError, Result};

    pub(super) fn model_type(model_name: &str) -> Option<SentenceEmbeddingsModelType> {
        match model_name {
            "all-MiniLM-L6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => {
                Some(SentenceEmbeddingsModelType::AllMiniLmL6V2)
            }
            "all-MiniLM-L12-v2" | "sentence-transformers/all-MiniLM-L12-v2" => {
                Some(SentenceEmbeddingsModelType::AllMiniLmL12V2)
            }
            "all-distilroberta-v1" => Some(SentenceEmbeddingsModelType::AllDistilrobertaV1),
            "paraphrase-albert-small-v2" => Some(SentenceEmbeddingsModelType::ParaphraseAlbertSmallV2),
            _ => None,
        }
    }

    /// Local sentence-transformer model. Inference is serialised per handle.
    pub(super) struct BertEmbedder {
        name: String,
        model: Mutex<SentenceEmbeddingsModel>,
    }

    impl BertEmbedder {
        pub(super) fn load(name: &str, model_type: SentenceEmbeddingsModelType) -> Result<Self> {
            let model = SentenceEmbeddingsBuilder::remote(model_type)
                .with_device(Device::cuda_if_available())
                .create_model()
                .map_err(|e| AnalyticsError::Embedding(format!("{}: {}", name, e)))?;
            Ok(Self { name: name.to_string(), model: Mutex::new(model) })
        }
    }

    impl EmbeddingProvider for BertEmbedder {
        fn model_name(&self) -> &str {
            &self.name
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let model = self
                .model
                .lock()
                .map_err(|_| AnalyticsError::Embedding(format!("{}: model lock poisoned", self.name)))?;
            let mut output = model
                .encode(&[text])
                .map_err(|e| AnalyticsError::Embedding(format!("{}: {}", self.name, e)))?;
            output
                .pop()
                .ok_or_else(|| AnalyticsError::Embedding(format!("{}: empty output", self.name)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn hashing_embedder_is_deterministic_and_normalised() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("Rust compilers check types").unwrap();
        let b = embedder.embed("Rust compilers check types").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(embedder.embed("").unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn hashing_model_names() {
        assert_eq!(HashingEmbedder::from_model_name("hashing").unwrap().dim(), 384);
        assert_eq!(HashingEmbedder::from_model_name("hashing-32").unwrap().dim(), 32);
        assert!(HashingEmbedder::from_model_name("hashing-0").is_none());
        assert!(HashingEmbedder::from_model_name("all-MiniLM-L6-v2").is_none());
    }

    #[test]
    fn registry_reuses_loaded_handles() {
        let registry = EmbeddingRegistry::new(None);
        let first = registry.provider("hashing-16").unwrap();
        let second = registry.provider("hashing-16").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.loaded_models(), vec!["hashing-16".to_string()]);
    }

    #[test]
    fn unknown_model_without_remote_endpoint_is_rejected() {
        let registry = EmbeddingRegistry::new(None);
        let err = match registry.provider("no-such-model") {
            Ok(_) => panic!("expected an error"),
            Err(err) => err,
        };
        assert_eq!(err.status_code(), 400);
        assert!(registry.loaded_models().is_empty());
    }

    #[test]
    fn concurrent_first_use_loads_once() {
        let cache: Arc<ModelCache<str>> = Arc::new(ModelCache::new());
        let loads = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let loads = Arc::clone(&loads);
                thread::spawn(move || {
                    cache
                        .get_or_load("model-a", || {
                            loads.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            Ok(Arc::from("handle-a"))
                        })
                        .unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(&*handle.join().unwrap(), "handle-a");
        }
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_load_is_retried() {
        let cache: ModelCache<str> = ModelCache::new();
        let err = cache.get_or_load("flaky", || Err(AnalyticsError::Embedding("offline".into())));
        assert!(err.is_err());
        let ok = cache.get_or_load("flaky", || Ok(Arc::from("loaded"))).unwrap();
        assert_eq!(&*ok, "loaded");
    }

    #[test]
    fn token_vectors_are_mean_pooled() {
        let flat = serde_json::json!([0.5, 1.0]);
        assert_eq!(parse_feature_vector(&flat), Some(vec![0.5, 1.0]));
        let nested = serde_json::json!([[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(parse_feature_vector(&nested), Some(vec![2.0, 3.0]));
        assert_eq!(parse_feature_vector(&serde_json::json!({"error": "loading"})), None);
    }
}

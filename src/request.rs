//! # Request and response payloads
//!
//! [`TopicRequest`] mirrors the JSON body exactly as clients send it. Nothing
//! downstream reads it directly: [`TopicRequest::validate`] resolves every
//! default, checks every bound and decodes the file payload, producing a
//! [`ValidatedRequest`] before any fitting starts.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};
use crate::evaluate::SweepRange;
use crate::loader::{decode_payload, FileKind};
use crate::settings::AppSettings;
use crate::topic::{FitParams, Method};

pub const DEFAULT_NUM_TOPICS: i64 = 5;
pub const DEFAULT_WORDS_PER_TOPIC: i64 = 5;
pub const DEFAULT_RANDOM_STATE: i64 = 42;
pub const DEFAULT_MIN_TOPICS: i64 = 1;
pub const DEFAULT_MAX_TOPICS: i64 = 10;
pub const DEFAULT_STEP: i64 = 1;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicRequest {
    pub method: Option<String>,
    #[serde(alias = "base64")]
    pub data: Option<String>,
    pub file_type: Option<String>,
    pub column: Option<String>,
    pub num_topics: Option<i64>,
    pub words_per_topic: Option<i64>,
    #[serde(default)]
    pub stopwords: bool,
    #[serde(default)]
    pub exclude_words: Vec<String>,
    pub embedding_model: Option<String>,
    pub random_state: Option<i64>,
    #[serde(default, rename = "coherence_analysis")]
    pub coherence_analysis: bool,
    #[serde(rename = "min_topics")]
    pub min_topics: Option<i64>,
    #[serde(rename = "max_topics")]
    pub max_topics: Option<i64>,
    pub step: Option<i64>,
}

/// A request with every default resolved and every bound checked.
#[derive(Debug, Clone)]
pub struct ValidatedRequest {
    pub method: Method,
    pub file_kind: FileKind,
    pub payload: Vec<u8>,
    pub column: String,
    pub params: FitParams,
    pub remove_stopwords: bool,
    pub exclude_words: Vec<String>,
    pub embedding_model: String,
    pub sweep: Option<SweepRange>,
}

impl TopicRequest {
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body)
            .map_err(|e| AnalyticsError::validation("request", format!("Invalid JSON payload: {}", e)))
    }

    pub fn validate(&self, settings: &AppSettings) -> Result<ValidatedRequest> {
        let method: Method = match non_blank(&self.method) {
            Some(name) => name.parse()?,
            None => Method::Probabilistic,
        };
        let file_kind: FileKind = match non_blank(&self.file_type) {
            Some(kind) => kind.parse()?,
            None => FileKind::Csv,
        };

        let data = non_blank(&self.data);
        let column = non_blank(&self.column);
        let missing: Vec<&str> = [("data", data.is_none()), ("column", column.is_none())]
            .iter()
            .filter(|(_, absent)| *absent)
            .map(|(name, _)| *name)
            .collect();
        let (Some(data), Some(column)) = (data, column) else {
            return Err(AnalyticsError::validation(missing.join(","), format!("Must provide {}.", missing.join(", "))));
        };

        let num_topics = positive("numTopics", self.num_topics.unwrap_or(DEFAULT_NUM_TOPICS))?;
        let words_per_topic = positive("wordsPerTopic", self.words_per_topic.unwrap_or(DEFAULT_WORDS_PER_TOPIC))?;
        let random_state = self.random_state.unwrap_or(DEFAULT_RANDOM_STATE);
        if random_state < 0 {
            return Err(AnalyticsError::validation("randomState", "randomState must be a non-negative integer."));
        }

        let sweep = if !self.coherence_analysis {
            None
        } else if !method.supports_sweep() {
            warn!("Coherence analysis requested for {}; ignoring it", method);
            None
        } else {
            let range = SweepRange::new(
                positive("min_topics", self.min_topics.unwrap_or(DEFAULT_MIN_TOPICS))?,
                positive("max_topics", self.max_topics.unwrap_or(DEFAULT_MAX_TOPICS))?,
                positive("step", self.step.unwrap_or(DEFAULT_STEP))?,
            )?;
            range.check_budget(settings.max_sweep_fits)?;
            Some(range)
        };

        let embedding_model = non_blank(&self.embedding_model)
            .map(str::to_string)
            .unwrap_or_else(|| settings.default_embedding_model.clone());
        let payload = decode_payload(data)?;

        Ok(ValidatedRequest {
            method,
            file_kind,
            payload,
            column: column.to_string(),
            params: FitParams { num_topics, words_per_topic, seed: random_state as u64 },
            remove_stopwords: self.stopwords,
            exclude_words: self.exclude_words.clone(),
            embedding_model,
            sweep,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn positive(field: &str, value: i64) -> Result<usize> {
    if value < 1 {
        return Err(AnalyticsError::validation(field, format!("{} must be a positive integer.", field)));
    }
    usize::try_from(value).map_err(|_| AnalyticsError::validation(field, format!("{} is too large.", field)))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoherenceAnalysis {
    pub coherence_plot: String,
    pub best_topic: usize,
    pub best_coherence: f64,
    pub topics_range: Vec<usize>,
    pub coherence_scores: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerplexityAnalysis {
    pub perplexity_plot: String,
    pub perplexity_scores: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SseAnalysis {
    pub sse_plot: String,
    pub sse_scores: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicResponse {
    pub message: String,
    pub topics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clustering_plot: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coherence_analysis: Option<CoherenceAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub perplexity_analysis: Option<PerplexityAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sse_analysis: Option<SseAnalysis>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    fn request(body: serde_json::Value) -> TopicRequest {
        serde_json::from_value(body).unwrap()
    }

    fn field_of(err: AnalyticsError) -> String {
        match err {
            AnalyticsError::Validation { field, .. } => field,
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn defaults_are_resolved() {
        let data = STANDARD.encode("text\nhello\n");
        let validated = request(serde_json::json!({ "base64": data, "column": "text" }))
            .validate(&AppSettings::default())
            .unwrap();
        assert_eq!(validated.method, Method::Probabilistic);
        assert_eq!(validated.file_kind, FileKind::Csv);
        assert_eq!(validated.params, FitParams { num_topics: 5, words_per_topic: 5, seed: 42 });
        assert!(!validated.remove_stopwords);
        assert_eq!(validated.embedding_model, crate::settings::fallback_embedding_model(None));
        assert!(validated.sweep.is_none());
        assert_eq!(validated.payload, b"text\nhello\n");
    }

    #[test]
    fn sweep_range_defaults_to_one_through_ten() {
        let data = STANDARD.encode("text\nhello\n");
        let validated = request(serde_json::json!({
            "data": data, "column": "text", "method": "nmf", "coherence_analysis": true
        }))
        .validate(&AppSettings::default())
        .unwrap();
        let range = validated.sweep.unwrap();
        assert_eq!((range.min, range.max, range.step), (1, 10, 1));
    }

    #[test]
    fn sweep_flag_is_ignored_for_embedding_cluster() {
        let data = STANDARD.encode("text\nhello\n");
        let validated = request(serde_json::json!({
            "data": data, "column": "text", "method": "embedding-cluster", "coherence_analysis": true,
            "embeddingModel": "hashing"
        }))
        .validate(&AppSettings::default())
        .unwrap();
        assert!(validated.sweep.is_none());
        assert_eq!(validated.embedding_model, "hashing");
    }

    #[test]
    fn missing_data_and_column_are_both_named() {
        let err = request(serde_json::json!({})).validate(&AppSettings::default()).unwrap_err();
        assert_eq!(err.to_string(), "Must provide data, column.");
        assert_eq!(field_of(err), "data,column");
    }

    #[test]
    fn bounds_are_checked_before_any_work() {
        let data = STANDARD.encode("text\nhello\n");
        let cases = [
            (serde_json::json!({ "data": data, "column": "t", "numTopics": 0 }), "numTopics"),
            (serde_json::json!({ "data": data, "column": "t", "wordsPerTopic": -2 }), "wordsPerTopic"),
            (serde_json::json!({ "data": data, "column": "t", "randomState": -1 }), "randomState"),
            (serde_json::json!({ "data": data, "column": "t", "method": "kmeans" }), "method"),
            (serde_json::json!({ "data": data, "column": "t", "fileType": "pdf" }), "fileType"),
            (serde_json::json!({ "data": "%%%", "column": "t" }), "data"),
            (
                serde_json::json!({ "data": data, "column": "t", "coherence_analysis": true,
                    "min_topics": 5, "max_topics": 2 }),
                "max_topics",
            ),
        ];
        for (body, field) in cases {
            let err = request(body).validate(&AppSettings::default()).unwrap_err();
            assert_eq!(err.status_code(), 400);
            assert_eq!(field_of(err), field);
        }
    }

    #[test]
    fn sweep_budget_is_enforced() {
        let data = STANDARD.encode("text\nhello\n");
        let settings = AppSettings { max_sweep_fits: Some(3), ..AppSettings::default() };
        let body = serde_json::json!({
            "data": data, "column": "t", "method": "lsa", "coherence_analysis": true,
            "min_topics": 2, "max_topics": 4
        });
        assert!(request(body).validate(&settings).is_ok());

        let too_many = serde_json::json!({ "data": data, "column": "t", "method": "lsa", "coherence_analysis": true });
        assert_eq!(field_of(request(too_many).validate(&settings).unwrap_err()), "max_topics");
    }

    #[test]
    fn malformed_json_is_a_validation_error() {
        let err = TopicRequest::from_json("{\"numTopics\": \"five\"}").unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn optional_sections_are_omitted() {
        let response = TopicResponse {
            message: "LDA topic modeling completed.".into(),
            topics: vec!["a, b".into()],
            clustering_plot: None,
            coherence_analysis: None,
            perplexity_analysis: None,
            sse_analysis: None,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value, serde_json::json!({ "message": "LDA topic modeling completed.", "topics": ["a, b"] }));
    }
}

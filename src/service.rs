//! # Topic service
//!
//! The request boundary: decode, preprocess, fit, project, optionally sweep,
//! and render. Every request builds its own corpus and models; only the
//! embedding registry outlives a request.

use std::sync::Arc;

use log::{error, info};
use serde_json::{json, Value};

use crate::embedding::EmbeddingRegistry;
use crate::error::Result;
use crate::evaluate::Evaluator;
use crate::loader::{DocumentLoader, TabularLoader};
use crate::preprocess::Preprocessor;
use crate::projection::Projection;
use crate::render::{ChartRenderer, PlottersRenderer, ScoreSeries};
use crate::request::{
    CoherenceAnalysis, PerplexityAnalysis, SseAnalysis, TopicRequest, TopicResponse, ValidatedRequest,
};
use crate::settings::AppSettings;
use crate::topic::{modeler_for, ModelContext, SecondaryMetric};

pub struct TopicService {
    settings: AppSettings,
    registry: Arc<EmbeddingRegistry>,
    loader: Arc<dyn DocumentLoader + Send + Sync>,
    renderer: Arc<dyn ChartRenderer>,
}

impl TopicService {
    pub fn new(settings: AppSettings) -> Self {
        let registry = Arc::new(EmbeddingRegistry::new(settings.huggingface.clone()));
        Self {
            settings,
            registry,
            loader: Arc::new(TabularLoader),
            renderer: Arc::new(PlottersRenderer::default()),
        }
    }

    pub fn with_renderer(mut self, renderer: impl ChartRenderer + 'static) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    pub fn with_loader(mut self, loader: impl DocumentLoader + Send + Sync + 'static) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    pub fn registry(&self) -> &Arc<EmbeddingRegistry> {
        &self.registry
    }

    pub fn handle(&self, request: &TopicRequest) -> Result<TopicResponse> {
        let validated = request.validate(&self.settings)?;
        self.run(&validated)
    }

    /// Handle a raw JSON body, answering with a status code and JSON value.
    /// Failures become `{"error": ...}` with the error's status.
    pub fn handle_json(&self, body: &str) -> (u16, Value) {
        let outcome = TopicRequest::from_json(body).and_then(|request| self.handle(&request));
        match outcome {
            Ok(response) => match serde_json::to_value(&response) {
                Ok(value) => (200, value),
                Err(e) => {
                    error!("Failed to serialize response: {}", e);
                    (500, json!({ "error": format!("Error serializing response: {}", e) }))
                }
            },
            Err(e) => {
                error!("Topic modeling request failed ({}): {}", e.status_code(), e);
                (e.status_code(), e.to_body())
            }
        }
    }

    pub fn run(&self, request: &ValidatedRequest) -> Result<TopicResponse> {
        let method = request.method;
        let table = self.loader.load(&request.payload, request.file_kind)?;
        let texts = table.text_column(&request.column)?;
        info!("{} request: {} documents from column '{}'", method, texts.len(), request.column);

        let corpus = Preprocessor::new(request.remove_stopwords, &request.exclude_words).process(&texts);
        let ctx = ModelContext {
            lda_iterations: self.settings.lda_iterations,
            embeddings: Arc::clone(&self.registry),
            embedding_model: request.embedding_model.clone(),
        };
        let modeler = modeler_for(method, &ctx);
        let model = modeler.fit(&corpus, &request.params)?;

        let (matrix, labels) = model.projection_input();
        let projection = Projection::fit(matrix, labels);
        let clustering_plot = self
            .renderer
            .scatter(&projection, &format!("{} Document Clusters", method.display_name()))?;

        let mut response = TopicResponse {
            message: format!("{} topic modeling completed.", method.display_name()),
            topics: model.topic_labels(),
            clustering_plot: Some(clustering_plot).filter(|plot| !plot.is_empty()),
            coherence_analysis: None,
            perplexity_analysis: None,
            sse_analysis: None,
        };

        if let Some(range) = request.sweep {
            let result = Evaluator::new(modeler.as_ref()).sweep(
                &corpus,
                range,
                request.params.words_per_topic,
                request.params.seed,
            )?;
            let topics_range = result.topics_range();
            let coherence_scores = result.coherence_scores();

            let coherence_plot = self.renderer.line(&ScoreSeries {
                title: "Coherence Score vs. Number of Topics",
                metric: "Coherence Score",
                topic_counts: &topics_range,
                scores: &coherence_scores,
            })?;

            match (result.metric, result.secondary_scores()) {
                (Some(SecondaryMetric::Perplexity), Some(scores)) => {
                    let perplexity_plot = self.renderer.line(&ScoreSeries {
                        title: "Perplexity vs. Number of Topics",
                        metric: SecondaryMetric::Perplexity.label(),
                        topic_counts: &topics_range,
                        scores: &scores,
                    })?;
                    response.perplexity_analysis = Some(PerplexityAnalysis { perplexity_plot, perplexity_scores: scores });
                }
                (Some(SecondaryMetric::Sse), Some(scores)) => {
                    let sse_plot = self.renderer.line(&ScoreSeries {
                        title: "SSE vs. Number of Topics",
                        metric: SecondaryMetric::Sse.label(),
                        topic_counts: &topics_range,
                        scores: &scores,
                    })?;
                    response.sse_analysis = Some(SseAnalysis { sse_plot, sse_scores: scores });
                }
                _ => {}
            }

            response.coherence_analysis = Some(CoherenceAnalysis {
                coherence_plot,
                best_topic: result.best_topic,
                best_coherence: result.best_coherence,
                topics_range,
                coherence_scores,
            });
            response.message = format!("{} topic modeling completed with coherence analysis.", method.display_name());
        }

        info!("{}", response.message);
        Ok(response)
    }
}

//! # Topic Model Dispatcher
//!
//! Fits exactly one model for a method and topic count.
//!
//! Every method is a [`TopicModeler`] implementation selected by [`Method`] at
//! the call boundary; adding a method adds a variant and an implementation.
//!
//! | Method               | Features          | Per-document output | Secondary score |
//! |----------------------|-------------------|---------------------|-----------------|
//! | `probabilistic`      | count matrix      | topic weights       | perplexity      |
//! | `factorization-nmf`  | tf-idf matrix     | factor weights      | SSE             |
//! | `factorization-lsa`  | tf-idf matrix     | signed loadings     | SSE             |
//! | `embedding-cluster`  | document vectors  | cluster id          | none            |

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use ndarray::{Array2, Axis};

use crate::cluster::ClusterModeler;
use crate::embedding::EmbeddingRegistry;
use crate::error::{AnalyticsError, Result};
use crate::lda::LdaModeler;
use crate::lsa::LsaModeler;
use crate::nmf::NmfModeler;
use crate::preprocess::ProcessedCorpus;
use crate::vectorize::{FeatureMatrix, Vectorizer, Vocabulary, Weighting};

/// Cluster id given to documents no cluster claims.
pub const OUTLIER: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Probabilistic,
    FactorizationNmf,
    FactorizationLsa,
    EmbeddingCluster,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Probabilistic => "probabilistic",
            Method::FactorizationNmf => "factorization-nmf",
            Method::FactorizationLsa => "factorization-lsa",
            Method::EmbeddingCluster => "embedding-cluster",
        }
    }

    /// Short name used in messages and chart titles.
    pub fn display_name(&self) -> &'static str {
        match self {
            Method::Probabilistic => "LDA",
            Method::FactorizationNmf => "NMF",
            Method::FactorizationLsa => "LSA",
            Method::EmbeddingCluster => "BERTOPIC",
        }
    }

    /// Matrix weighting for the matrix-based methods.
    pub fn weighting(&self) -> Option<Weighting> {
        match self {
            Method::Probabilistic => Some(Weighting::Count),
            Method::FactorizationNmf | Method::FactorizationLsa => Some(Weighting::TfIdf),
            Method::EmbeddingCluster => None,
        }
    }

    /// Whether the coherence sweep applies to this method.
    pub fn supports_sweep(&self) -> bool {
        self.weighting().is_some()
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "probabilistic" | "lda" => Ok(Method::Probabilistic),
            "factorization-nmf" | "nmf" => Ok(Method::FactorizationNmf),
            "factorization-lsa" | "lsa" => Ok(Method::FactorizationLsa),
            "embedding-cluster" | "bertopic" => Ok(Method::EmbeddingCluster),
            other => Err(AnalyticsError::validation("method", format!("Unsupported method '{}'.", other))),
        }
    }
}

/// Ordered `(term, weight)` list, heaviest first.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    pub terms: Vec<(String, f64)>,
}

impl Topic {
    pub fn words(&self) -> Vec<&str> {
        self.terms.iter().map(|(t, _)| t.as_str()).collect()
    }

    /// Terms joined for display.
    pub fn label(&self) -> String {
        self.words().join(", ")
    }
}

/// Pick the `n` heaviest terms of one weight row.
///
/// Weights are compared by raw signed value. Ties go to the smaller
/// vocabulary index.
pub fn top_terms(weights: &[f64], vocabulary: &Vocabulary, n: usize) -> Topic {
    let mut order: Vec<usize> = (0..weights.len()).collect();
    order.sort_by(|&a, &b| weights[b].total_cmp(&weights[a]).then(a.cmp(&b)));
    let terms = order
        .into_iter()
        .take(n)
        .map(|idx| (vocabulary.term(idx).to_string(), weights[idx]))
        .collect();
    Topic { terms }
}

/// Topics for every row of a `topics x terms` matrix.
pub fn topics_from_components(components: &Array2<f64>, vocabulary: &Vocabulary, n: usize) -> Vec<Topic> {
    components
        .axis_iter(Axis(0))
        .map(|row| top_terms(&row.to_vec(), vocabulary, n))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitParams {
    pub num_topics: usize,
    pub words_per_topic: usize,
    pub seed: u64,
}

/// Which fit diagnostic a method reports next to coherence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecondaryMetric {
    Perplexity,
    Sse,
}

impl SecondaryMetric {
    pub fn label(&self) -> &'static str {
        match self {
            SecondaryMetric::Perplexity => "Perplexity",
            SecondaryMetric::Sse => "SSE",
        }
    }
}

#[derive(Debug, Clone)]
pub enum FittedModel {
    Probabilistic {
        topics: Vec<Topic>,
        doc_topic: Array2<f64>,
        perplexity: f64,
    },
    Factorization {
        topics: Vec<Topic>,
        doc_topic: Array2<f64>,
        residual: f64,
    },
    EmbeddingCluster {
        topics: Vec<Topic>,
        labels: Vec<i64>,
        embeddings: Array2<f64>,
    },
}

impl FittedModel {
    pub fn topics(&self) -> &[Topic] {
        match self {
            FittedModel::Probabilistic { topics, .. }
            | FittedModel::Factorization { topics, .. }
            | FittedModel::EmbeddingCluster { topics, .. } => topics,
        }
    }

    pub fn topic_labels(&self) -> Vec<String> {
        self.topics().iter().map(Topic::label).collect()
    }

    /// The secondary diagnostic, when the method has one.
    pub fn secondary(&self) -> Option<(SecondaryMetric, f64)> {
        match self {
            FittedModel::Probabilistic { perplexity, .. } => Some((SecondaryMetric::Perplexity, *perplexity)),
            FittedModel::Factorization { residual, .. } => Some((SecondaryMetric::Sse, *residual)),
            FittedModel::EmbeddingCluster { .. } => None,
        }
    }

    /// Matrix and per-document label for the scatter projection.
    ///
    /// Matrix methods label each document with its arg-max topic; the
    /// embedding method projects the embeddings and labels by cluster id.
    pub fn projection_input(&self) -> (&Array2<f64>, Vec<i64>) {
        match self {
            FittedModel::Probabilistic { doc_topic, .. } | FittedModel::Factorization { doc_topic, .. } => {
                (doc_topic, argmax_rows(doc_topic))
            }
            FittedModel::EmbeddingCluster { labels, embeddings, .. } => (embeddings, labels.clone()),
        }
    }
}

/// Arg-max column per row; ties go to the lower column.
pub fn argmax_rows(matrix: &Array2<f64>) -> Vec<i64> {
    matrix
        .axis_iter(Axis(0))
        .map(|row| {
            let mut best = 0usize;
            for (idx, &value) in row.iter().enumerate() {
                if value > row[best] {
                    best = idx;
                }
            }
            best as i64
        })
        .collect()
}

/// One fitting algorithm.
pub trait TopicModeler {
    fn method(&self) -> Method;

    /// Build features from the corpus and fit a fresh model.
    fn fit(&self, corpus: &ProcessedCorpus, params: &FitParams) -> Result<FittedModel>;
}

/// Vectorize the corpus with the method's weighting and reject degenerate fits.
pub(crate) fn prepare_matrix(method: Method, corpus: &ProcessedCorpus, num_topics: usize) -> Result<FeatureMatrix> {
    let weighting = method.weighting().ok_or_else(|| {
        AnalyticsError::ModelFit(format!("{} does not use a feature matrix", method))
    })?;
    let features = Vectorizer::new(weighting).fit_transform(&corpus.joined)?;
    check_degenerate(&features, num_topics)?;
    Ok(features)
}

pub(crate) fn check_degenerate(features: &FeatureMatrix, num_topics: usize) -> Result<()> {
    let n_docs = features.matrix.n_rows();
    let n_terms = features.matrix.n_cols();
    if num_topics == 0 {
        return Err(AnalyticsError::ModelFit("the number of topics must be positive".into()));
    }
    if num_topics >= n_docs {
        return Err(AnalyticsError::ModelFit(format!(
            "numTopics ({}) must be smaller than the number of documents ({})",
            num_topics, n_docs
        )));
    }
    if num_topics > n_terms {
        return Err(AnalyticsError::ModelFit(format!(
            "numTopics ({}) exceeds the vocabulary size ({})",
            num_topics, n_terms
        )));
    }
    if features.matrix.is_all_zero() {
        return Err(AnalyticsError::ModelFit("the feature matrix is all zeros".into()));
    }
    Ok(())
}

/// Shared collaborators a modeler may need.
#[derive(Clone)]
pub struct ModelContext {
    pub lda_iterations: usize,
    pub embeddings: Arc<EmbeddingRegistry>,
    pub embedding_model: String,
}

/// Select the implementation for a method.
pub fn modeler_for(method: Method, ctx: &ModelContext) -> Box<dyn TopicModeler> {
    match method {
        Method::Probabilistic => Box::new(LdaModeler::new(ctx.lda_iterations)),
        Method::FactorizationNmf => Box::new(NmfModeler::default()),
        Method::FactorizationLsa => Box::new(LsaModeler::default()),
        Method::EmbeddingCluster => Box::new(ClusterModeler::new(ctx.embeddings.clone(), ctx.embedding_model.clone())),
    }
}

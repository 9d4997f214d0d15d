//! # Embedding cluster
//!
//! Topics discovered by grouping document embeddings:
//!
//! 1. Embed the token view of every document through the configured provider.
//! 2. Reduce the embeddings to at most five principal axes.
//! 3. Density-cluster the reduced vectors with DBSCAN. Rows are scaled to
//!    unit length first, so Euclidean neighbourhoods match cosine ones.
//!    Clusters smaller than the minimum size become outliers.
//! 4. While more than K clusters remain, merge the pair whose class-based
//!    tf-idf vectors are most alike.
//! 5. Renumber clusters by size, largest first, and describe each one by its
//!    heaviest class-based tf-idf terms. A cluster whose documents have no
//!    terms left is dropped and its documents become outliers.
//!
//! The requested topic count is an upper bound: density clustering may find
//! fewer groups than asked for.

use std::collections::BTreeMap;
use std::sync::Arc;

use linfa::traits::Transformer;
use linfa::ParamGuard;
use linfa_clustering::Dbscan;
use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;

use crate::embedding::EmbeddingRegistry;
use crate::error::{AnalyticsError, Result};
use crate::preprocess::ProcessedCorpus;
use crate::projection::Pca;
use crate::topic::{top_terms, FitParams, FittedModel, Method, Topic, TopicModeler, OUTLIER};
use crate::vectorize::Vocabulary;

pub const MIN_CLUSTER_SIZE: usize = 5;
const REDUCED_DIM: usize = 5;
const MIN_EPS: f64 = 1e-9;

pub struct ClusterModeler {
    registry: Arc<EmbeddingRegistry>,
    model_name: String,
    min_cluster_size: usize,
}

impl ClusterModeler {
    pub fn new(registry: Arc<EmbeddingRegistry>, model_name: String) -> Self {
        Self { registry, model_name, min_cluster_size: MIN_CLUSTER_SIZE }
    }

    fn embed(&self, corpus: &ProcessedCorpus) -> Result<Array2<f64>> {
        let provider = self.registry.provider(&self.model_name)?;
        let texts: Vec<String> = corpus.tokens.iter().map(|tokens| tokens.join(" ")).collect();
        let vectors = provider.embed_all(&texts)?;

        let dim = vectors.first().map(Vec::len).unwrap_or(0);
        if dim == 0 || vectors.iter().any(|v| v.len() != dim) {
            return Err(AnalyticsError::Embedding(format!(
                "{} returned vectors of inconsistent length",
                provider.model_name()
            )));
        }
        let flat: Vec<f64> = vectors.into_iter().flatten().map(f64::from).collect();
        Array2::from_shape_vec((texts.len(), dim), flat).map_err(|e| AnalyticsError::Embedding(e.to_string()))
    }
}

impl TopicModeler for ClusterModeler {
    fn method(&self) -> Method {
        Method::EmbeddingCluster
    }

    fn fit(&self, corpus: &ProcessedCorpus, params: &FitParams) -> Result<FittedModel> {
        if params.num_topics == 0 {
            return Err(AnalyticsError::ModelFit("the number of topics must be positive".into()));
        }
        if corpus.len() < self.min_cluster_size {
            return Err(AnalyticsError::ModelFit(format!(
                "clustering needs at least {} documents, got {}",
                self.min_cluster_size,
                corpus.len()
            )));
        }

        let embeddings = self.embed(corpus)?;
        let reduced = Pca::fit_transform(&embeddings, REDUCED_DIM.min(embeddings.ncols()));

        let mut labels = dbscan(&reduced, self.min_cluster_size)?;
        discard_small_clusters(&mut labels, self.min_cluster_size);
        if labels.iter().all(|&l| l == OUTLIER) {
            warn!("Density clustering found no cluster; treating all documents as one topic");
            labels.iter_mut().for_each(|l| *l = 0);
        }

        debug!("Density clustering found {} clusters", cluster_ids(&labels).len());
        let lowered = lowercase_tokens(corpus);
        let vocabulary = Vocabulary::from_tokens(lowered.iter().flatten().map(String::as_str));

        reduce_to(&mut labels, &lowered, &vocabulary, params.num_topics);
        renumber_by_size(&mut labels);

        let weights = class_tfidf(&labels, &lowered, &vocabulary);
        let topics: Vec<Topic> = weights
            .iter()
            .map(|row| {
                let mut topic = top_terms(row, &vocabulary, params.words_per_topic);
                topic.terms.retain(|(_, w)| *w > 0.0);
                topic
            })
            .collect();
        let topics = drop_empty_topics(&mut labels, topics);
        if topics.is_empty() {
            return Err(AnalyticsError::Data(
                "Empty vocabulary; perhaps the documents only contain stop words.".into(),
            ));
        }

        info!(
            "Embedding cluster: {} topics, {} outliers",
            topics.len(),
            labels.iter().filter(|&&l| l == OUTLIER).count()
        );
        Ok(FittedModel::EmbeddingCluster { topics, labels, embeddings })
    }
}

fn lowercase_tokens(corpus: &ProcessedCorpus) -> Vec<Vec<String>> {
    corpus
        .tokens
        .iter()
        .map(|doc| doc.iter().map(|t| t.to_lowercase()).collect())
        .collect()
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

/// Scale every row to unit length; zero rows stay zero.
fn unit_rows(points: &Array2<f64>) -> Array2<f64> {
    let mut unit = points.clone();
    for mut row in unit.axis_iter_mut(Axis(0)) {
        let norm = row.dot(&row).sqrt();
        if norm > 0.0 {
            row.mapv_inplace(|v| v / norm);
        }
    }
    unit
}

fn euclidean(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum::<f64>().sqrt()
}

/// Neighbourhood radius: median distance from each point to its
/// `min_points`-th nearest other point.
fn estimate_eps(points: &Array2<f64>, min_points: usize) -> f64 {
    let mut kth: Vec<f64> = (0..points.nrows())
        .into_par_iter()
        .map(|i| {
            let mut others: Vec<f64> = points
                .outer_iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, row)| euclidean(points.row(i), row))
                .collect();
            others.sort_by(|a, b| a.total_cmp(b));
            let idx = min_points.min(others.len()).saturating_sub(1);
            others.get(idx).copied().unwrap_or(0.0)
        })
        .collect();
    kth.sort_by(|a, b| a.total_cmp(b));
    kth.get(kth.len() / 2).copied().unwrap_or(0.0)
}

/// Density clustering of the rows of `points` by direction. Points reachable
/// from a core point share its cluster; the rest are outliers.
fn dbscan(points: &Array2<f64>, min_points: usize) -> Result<Vec<i64>> {
    let unit = unit_rows(points);
    let eps = estimate_eps(&unit, min_points).max(MIN_EPS);
    debug!("DBSCAN eps = {:.6}", eps);

    let params = Dbscan::params(min_points)
        .tolerance(eps)
        .check()
        .map_err(|e| AnalyticsError::ModelFit(format!("DBSCAN failed: {}", e)))?;
    let memberships: Array1<Option<usize>> = params.transform(&unit);
    Ok(memberships.iter().map(|m| m.map_or(OUTLIER, |id| id as i64)).collect())
}

fn cluster_ids(labels: &[i64]) -> Vec<i64> {
    let mut ids: Vec<i64> = labels.iter().copied().filter(|&l| l != OUTLIER).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

fn discard_small_clusters(labels: &mut [i64], min_size: usize) {
    let mut sizes: BTreeMap<i64, usize> = BTreeMap::new();
    for &l in labels.iter().filter(|&&l| l != OUTLIER) {
        *sizes.entry(l).or_default() += 1;
    }
    for l in labels.iter_mut() {
        if *l != OUTLIER && sizes.get(&*l).copied().unwrap_or(0) < min_size {
            *l = OUTLIER;
        }
    }
}

/// Class-based tf-idf: one row per cluster id in ascending order.
///
/// Term frequencies are L1-normalised within each cluster and weighted by
/// ln(1 + A / f_t), where A is the average token count per cluster and f_t the
/// term's frequency over all clusters.
fn class_tfidf(labels: &[i64], docs: &[Vec<String>], vocabulary: &Vocabulary) -> Vec<Vec<f64>> {
    let ids = cluster_ids(labels);
    let slot: BTreeMap<i64, usize> = ids.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    let mut counts = vec![vec![0.0f64; vocabulary.len()]; ids.len()];

    for (doc, &label) in docs.iter().zip(labels) {
        let Some(&row) = slot.get(&label) else { continue };
        for token in doc {
            if let Some(col) = vocabulary.get(token) {
                counts[row][col] += 1.0;
            }
        }
    }

    let total: f64 = counts.iter().flatten().sum();
    if ids.is_empty() || total == 0.0 {
        return counts;
    }
    let average = total / ids.len() as f64;
    let frequency: Vec<f64> = (0..vocabulary.len()).map(|t| counts.iter().map(|row| row[t]).sum()).collect();

    for row in counts.iter_mut() {
        let size: f64 = row.iter().sum();
        for (t, value) in row.iter_mut().enumerate() {
            if *value == 0.0 {
                continue;
            }
            let tf = *value / size;
            *value = tf * (1.0 + average / frequency[t]).ln();
        }
    }
    counts
}

/// Merge the most similar pair of clusters until at most `target` remain.
fn reduce_to(labels: &mut [i64], docs: &[Vec<String>], vocabulary: &Vocabulary, target: usize) {
    loop {
        let ids = cluster_ids(labels);
        if ids.len() <= target {
            return;
        }
        let weights = class_tfidf(labels, docs, vocabulary);

        let mut best = (0usize, 1usize, f64::NEG_INFINITY);
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let similarity = cosine_similarity(&weights[i], &weights[j]);
                if similarity > best.2 {
                    best = (i, j, similarity);
                }
            }
        }

        let (keep, absorb) = (ids[best.0], ids[best.1]);
        debug!("Merging cluster {} into {} (similarity {:.4})", absorb, keep, best.2);
        labels.iter_mut().filter(|l| **l == absorb).for_each(|l| *l = keep);
    }
}

/// Relabel clusters 0.. by size, largest first; ties keep the earlier id.
fn renumber_by_size(labels: &mut [i64]) {
    let mut sizes: BTreeMap<i64, usize> = BTreeMap::new();
    for &l in labels.iter().filter(|&&l| l != OUTLIER) {
        *sizes.entry(l).or_default() += 1;
    }
    let mut order: Vec<(i64, usize)> = sizes.into_iter().collect();
    order.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    let mapping: BTreeMap<i64, i64> = order.iter().enumerate().map(|(new, &(old, _))| (old, new as i64)).collect();
    for l in labels.iter_mut() {
        if let Some(&new) = mapping.get(l) {
            *l = new;
        }
    }
}

/// Remove topics without terms. Their documents become outliers and the
/// remaining cluster ids are renumbered densely in their current order.
fn drop_empty_topics(labels: &mut [i64], topics: Vec<Topic>) -> Vec<Topic> {
    let mut mapping: BTreeMap<i64, i64> = BTreeMap::new();
    let mut kept = Vec::with_capacity(topics.len());
    for (id, topic) in topics.into_iter().enumerate() {
        if topic.terms.is_empty() {
            debug!("Dropping cluster {}: no terms", id);
            continue;
        }
        mapping.insert(id as i64, kept.len() as i64);
        kept.push(topic);
    }
    for l in labels.iter_mut() {
        *l = mapping.get(l).copied().unwrap_or(OUTLIER);
    }
    kept
}

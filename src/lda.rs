//! # Probabilistic topic model
//!
//! Latent Dirichlet allocation fitted by collapsed Gibbs sampling over the
//! count matrix.
//!
//! - Conditional
//!   * p(z = t | rest) ∝ (n_dt + α) * (n_tw + β) / (n_t + Vβ)
//! - Document-topic weights
//!   * θ[d][t] = (n_dt + α) / (N_d + Kα)
//! - Topic-word weights
//!   * φ[t][w] = (n_tw + β) / (n_t + Vβ)
//! - Perplexity
//!   * exp(-Σ_d Σ_w c_dw * ln(Σ_t θ[d][t] φ[t][w]) / Σ c_dw)
//!
//! The sampler draws from a generator seeded with the request seed, so a
//! fixed seed gives identical topics on every run.

use log::debug;
use ndarray::Array2;

use crate::error::{AnalyticsError, Result};
use crate::preprocess::ProcessedCorpus;
use crate::topic::{prepare_matrix, topics_from_components, FitParams, FittedModel, Method, TopicModeler};
use crate::vectorize::SparseMatrix;

pub const DEFAULT_ALPHA: f64 = 0.1;
pub const DEFAULT_BETA: f64 = 0.01;

#[derive(Debug, Clone, Copy)]
pub struct LdaModeler {
    iterations: usize,
    alpha: f64,
    beta: f64,
}

impl LdaModeler {
    pub fn new(iterations: usize) -> Self {
        Self { iterations, alpha: DEFAULT_ALPHA, beta: DEFAULT_BETA }
    }
}

impl TopicModeler for LdaModeler {
    fn method(&self) -> Method {
        Method::Probabilistic
    }

    fn fit(&self, corpus: &ProcessedCorpus, params: &FitParams) -> Result<FittedModel> {
        let features = prepare_matrix(Method::Probabilistic, corpus, params.num_topics)?;
        let mut sampler = GibbsSampler::new(&features.matrix, params.num_topics, self.alpha, self.beta, params.seed);
        sampler.train(self.iterations);

        let theta = sampler.theta();
        let phi = sampler.phi();
        let perplexity = perplexity(&features.matrix, &theta, &phi);
        if !perplexity.is_finite() {
            return Err(AnalyticsError::ModelFit("perplexity is not finite".into()));
        }

        Ok(FittedModel::Probabilistic {
            topics: topics_from_components(&phi, &features.vocabulary, params.words_per_topic),
            doc_topic: theta,
            perplexity,
        })
    }
}

/// Sampler state: one topic assignment per token plus the count tables.
struct GibbsSampler {
    k: usize,
    alpha: f64,
    beta: f64,
    n_terms: usize,
    docs: Vec<Vec<usize>>,
    z: Vec<Vec<usize>>,
    ndk: Array2<f64>,
    nkw: Array2<f64>,
    nk: Vec<f64>,
    rng: fastrand::Rng,
}

impl GibbsSampler {
    fn new(counts: &SparseMatrix, k: usize, alpha: f64, beta: f64, seed: u64) -> Self {
        let docs: Vec<Vec<usize>> = (0..counts.n_rows())
            .map(|d| {
                counts
                    .row(d)
                    .flat_map(|(w, c)| std::iter::repeat(w).take(c.round() as usize))
                    .collect()
            })
            .collect();

        let mut rng = fastrand::Rng::with_seed(seed);
        let mut ndk = Array2::zeros((docs.len(), k));
        let mut nkw = Array2::zeros((k, counts.n_cols()));
        let mut nk = vec![0.0; k];
        let mut z = Vec::with_capacity(docs.len());

        for (d, doc) in docs.iter().enumerate() {
            let assignments: Vec<usize> = doc
                .iter()
                .map(|&w| {
                    let t = rng.usize(0..k);
                    ndk[[d, t]] += 1.0;
                    nkw[[t, w]] += 1.0;
                    nk[t] += 1.0;
                    t
                })
                .collect();
            z.push(assignments);
        }

        Self { k, alpha, beta, n_terms: counts.n_cols(), docs, z, ndk, nkw, nk, rng }
    }

    fn train(&mut self, iterations: usize) {
        let vb = self.n_terms as f64 * self.beta;
        let mut weights = vec![0.0f64; self.k];

        for it in 0..iterations {
            for d in 0..self.docs.len() {
                for pos in 0..self.docs[d].len() {
                    let w = self.docs[d][pos];
                    let old = self.z[d][pos];
                    self.ndk[[d, old]] -= 1.0;
                    self.nkw[[old, w]] -= 1.0;
                    self.nk[old] -= 1.0;

                    let mut total = 0.0;
                    for t in 0..self.k {
                        let p = (self.ndk[[d, t]] + self.alpha) * (self.nkw[[t, w]] + self.beta) / (self.nk[t] + vb);
                        total += p;
                        weights[t] = total;
                    }
                    let target = self.rng.f64() * total;
                    let new = weights.iter().position(|&c| target < c).unwrap_or(self.k - 1);

                    self.z[d][pos] = new;
                    self.ndk[[d, new]] += 1.0;
                    self.nkw[[new, w]] += 1.0;
                    self.nk[new] += 1.0;
                }
            }

            if (it + 1) % 50 == 0 {
                debug!("Training LDA: iteration {}/{}", it + 1, iterations);
            }
        }
    }

    fn theta(&self) -> Array2<f64> {
        let k_alpha = self.k as f64 * self.alpha;
        let mut theta = self.ndk.mapv(|c| c + self.alpha);
        for (d, mut row) in theta.outer_iter_mut().enumerate() {
            let denom = self.docs[d].len() as f64 + k_alpha;
            row.mapv_inplace(|v| v / denom);
        }
        theta
    }

    fn phi(&self) -> Array2<f64> {
        let vb = self.n_terms as f64 * self.beta;
        let mut phi = self.nkw.mapv(|c| c + self.beta);
        for (t, mut row) in phi.outer_iter_mut().enumerate() {
            let denom = self.nk[t] + vb;
            row.mapv_inplace(|v| v / denom);
        }
        phi
    }
}

fn perplexity(counts: &SparseMatrix, theta: &Array2<f64>, phi: &Array2<f64>) -> f64 {
    let mut log_likelihood = 0.0;
    let mut n_tokens = 0.0;
    for d in 0..counts.n_rows() {
        for (w, c) in counts.row(d) {
            let p: f64 = theta.row(d).iter().zip(phi.column(w).iter()).map(|(a, b)| a * b).sum();
            log_likelihood += c * p.ln();
            n_tokens += c;
        }
    }
    if n_tokens == 0.0 {
        return f64::NAN;
    }
    (-log_likelihood / n_tokens).exp()
}

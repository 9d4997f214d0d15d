//! # Non-negative factorization
//!
//! Factors the tf-idf matrix V (documents x terms) into W (documents x K) and
//! H (K x terms) with multiplicative updates on the Frobenius loss:
//!
//! - H ← H ∘ (Wᵀ V) / (Wᵀ W H + ε)
//! - W ← W ∘ (V Hᵀ) / (W H Hᵀ + ε)
//!
//! Both factors start from seeded uniform values scaled by sqrt(mean(V) / K).
//! The loop stops after `max_iter` rounds or once the relative improvement
//! measured every 10 rounds drops below `tol`.

use log::debug;
use ndarray::Array2;

use crate::error::{AnalyticsError, Result};
use crate::preprocess::ProcessedCorpus;
use crate::topic::{
    prepare_matrix, topics_from_components, FitParams, FittedModel, Method, TopicModeler,
};

const EPSILON: f64 = 1e-10;

#[derive(Debug, Clone, Copy)]
pub struct NmfModeler {
    max_iter: usize,
    tol: f64,
}

impl Default for NmfModeler {
    fn default() -> Self {
        Self { max_iter: 200, tol: 1e-4 }
    }
}

/// The two factors of one decomposition.
#[derive(Debug, Clone)]
pub struct Factors {
    pub w: Array2<f64>,
    pub h: Array2<f64>,
}

impl Factors {
    pub fn reconstruct(&self) -> Array2<f64> {
        self.w.dot(&self.h)
    }
}

/// Sum of squared differences between a matrix and its reconstruction.
pub fn squared_error(original: &Array2<f64>, approx: &Array2<f64>) -> f64 {
    (original - approx).mapv(|x| x * x).sum()
}

impl NmfModeler {
    pub fn factorize(&self, v: &Array2<f64>, k: usize, seed: u64) -> Factors {
        let (n_docs, n_terms) = v.dim();
        let mut rng = fastrand::Rng::with_seed(seed);
        let scale = (v.mean().unwrap_or(0.0) / k as f64).sqrt();
        let mut w = Array2::from_shape_simple_fn((n_docs, k), || scale * rng.f64());
        let mut h = Array2::from_shape_simple_fn((k, n_terms), || scale * rng.f64());

        let error_at_init = squared_error(v, &w.dot(&h));
        let mut previous_error = error_at_init;

        for iter in 0..self.max_iter {
            let wt = w.t();
            let numerator = wt.dot(v);
            let denominator = wt.dot(&w).dot(&h) + EPSILON;
            h = h * &(numerator / denominator);

            let ht = h.t();
            let numerator = v.dot(&ht);
            let denominator = w.dot(&h.dot(&ht)) + EPSILON;
            w = w * &(numerator / denominator);

            if (iter + 1) % 10 == 0 {
                let error = squared_error(v, &w.dot(&h));
                if error_at_init > 0.0 && (previous_error - error) / error_at_init < self.tol {
                    debug!("NMF converged after {} iterations (sse {:.6})", iter + 1, error);
                    break;
                }
                previous_error = error;
            }
        }

        Factors { w, h }
    }
}

impl TopicModeler for NmfModeler {
    fn method(&self) -> Method {
        Method::FactorizationNmf
    }

    fn fit(&self, corpus: &ProcessedCorpus, params: &FitParams) -> Result<FittedModel> {
        let features = prepare_matrix(Method::FactorizationNmf, corpus, params.num_topics)?;
        let v = features.matrix.to_dense();
        let factors = self.factorize(&v, params.num_topics, params.seed);

        let residual = squared_error(&v, &factors.reconstruct());
        if !residual.is_finite() {
            return Err(AnalyticsError::ModelFit("NMF diverged".into()));
        }

        Ok(FittedModel::Factorization {
            topics: topics_from_components(&factors.h, &features.vocabulary, params.words_per_topic),
            doc_topic: factors.w,
            residual,
        })
    }
}

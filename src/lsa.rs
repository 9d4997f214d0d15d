//! # Latent semantic analysis
//!
//! Truncated SVD of the tf-idf matrix computed one component at a time by
//! power iteration on XᵀX, with each new right singular vector kept
//! orthogonal to the ones already found.
//!
//! Components may carry negative loadings. Top words are picked by the raw
//! signed loading, not by magnitude, so a component dominated by negative
//! loadings can surface weakly related terms. Each component's sign is fixed
//! so that its largest-magnitude loading is positive, which keeps the output
//! deterministic for a given seed.

use log::debug;
use ndarray::{Array1, Array2, Axis};

use crate::error::{AnalyticsError, Result};
use crate::nmf::squared_error;
use crate::preprocess::ProcessedCorpus;
use crate::topic::{
    prepare_matrix, topics_from_components, FitParams, FittedModel, Method, TopicModeler,
};

const SINGULAR_FLOOR: f64 = 1e-12;
const RELATIVE_FLOOR: f64 = 1e-7;

#[derive(Debug, Clone, Copy)]
pub struct LsaModeler {
    max_iter: usize,
    tol: f64,
}

impl Default for LsaModeler {
    fn default() -> Self {
        Self { max_iter: 500, tol: 1e-10 }
    }
}

/// Right singular vectors (K x terms) and singular values.
#[derive(Debug, Clone)]
pub struct TruncatedSvd {
    pub components: Array2<f64>,
    pub singular_values: Array1<f64>,
}

impl TruncatedSvd {
    /// Project rows of `x` onto the components (documents x K).
    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        x.dot(&self.components.t())
    }

    /// Map projected rows back into term space.
    pub fn inverse_transform(&self, projected: &Array2<f64>) -> Array2<f64> {
        projected.dot(&self.components)
    }
}

impl LsaModeler {
    pub fn decompose(&self, x: &Array2<f64>, k: usize, seed: u64) -> Result<TruncatedSvd> {
        let n_terms = x.ncols();
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut components = Array2::zeros((k, n_terms));
        let mut singular_values = Array1::zeros(k);

        for c in 0..k {
            let mut v = Array1::from_shape_simple_fn(n_terms, || rng.f64() - 0.5);
            orthogonalize(&mut v, &components, c);
            normalize(&mut v);

            let mut sigma = 0.0;
            for iter in 0..self.max_iter {
                let xv = x.dot(&v);
                let mut next = x.t().dot(&xv);
                orthogonalize(&mut next, &components, c);
                let norm = normalize(&mut next);
                let delta = (&next - &v).mapv(|d| d * d).sum();
                v = next;
                sigma = norm.sqrt();
                if delta < self.tol {
                    debug!("SVD component {} converged after {} iterations", c, iter + 1);
                    break;
                }
            }

            let floor = if c == 0 { SINGULAR_FLOOR } else { SINGULAR_FLOOR.max(singular_values[0] * RELATIVE_FLOOR) };
            if sigma < floor {
                return Err(AnalyticsError::ModelFit(format!(
                    "the tf-idf matrix has rank {} which is below numTopics ({})",
                    c, k
                )));
            }

            flip_sign(&mut v);
            components.row_mut(c).assign(&v);
            singular_values[c] = sigma;
        }

        Ok(TruncatedSvd { components, singular_values })
    }
}

impl TopicModeler for LsaModeler {
    fn method(&self) -> Method {
        Method::FactorizationLsa
    }

    fn fit(&self, corpus: &ProcessedCorpus, params: &FitParams) -> Result<FittedModel> {
        let features = prepare_matrix(Method::FactorizationLsa, corpus, params.num_topics)?;
        let x = features.matrix.to_dense();
        let svd = self.decompose(&x, params.num_topics, params.seed)?;

        let doc_topic = svd.transform(&x);
        let residual = squared_error(&x, &svd.inverse_transform(&doc_topic));

        Ok(FittedModel::Factorization {
            topics: topics_from_components(&svd.components, &features.vocabulary, params.words_per_topic),
            doc_topic,
            residual,
        })
    }
}

/// Remove the projections on the first `count` rows of `basis`.
pub(crate) fn orthogonalize(v: &mut Array1<f64>, basis: &Array2<f64>, count: usize) {
    for row in basis.axis_iter(Axis(0)).take(count) {
        let projection = row.dot(&*v);
        v.scaled_add(-projection, &row);
    }
}

/// Scale to unit length in place; returns the original norm.
pub(crate) fn normalize(v: &mut Array1<f64>) -> f64 {
    let norm = v.dot(&*v).sqrt();
    if norm > 0.0 {
        v.mapv_inplace(|x| x / norm);
    }
    norm
}

/// Make the largest-magnitude entry positive.
pub(crate) fn flip_sign(v: &mut Array1<f64>) {
    let mut pivot = 0.0f64;
    for &x in v.iter() {
        if x.abs() > pivot.abs() {
            pivot = x;
        }
    }
    if pivot < 0.0 {
        v.mapv_inplace(|x| -x);
    }
}

//! # Projection
//!
//! Principal component analysis by power iteration on the covariance matrix.
//! Used to flatten doc-topic weights or embeddings onto two axes for the
//! scatter plot, and to shrink embeddings before density clustering.

use log::debug;
use ndarray::{Array1, Array2, Axis};

use crate::lsa::{flip_sign, normalize, orthogonalize};

const MAX_ITER: usize = 1000;
const TOLERANCE: f64 = 1e-12;
const VARIANCE_FLOOR: f64 = 1e-12;
const START_SEED: u64 = 0x5eed;

/// Fitted principal axes.
#[derive(Debug, Clone)]
pub struct Pca {
    mean: Array1<f64>,
    /// One axis per row (components x features). Axes past the data's rank
    /// are zero.
    components: Array2<f64>,
    explained_variance: Array1<f64>,
}

impl Pca {
    /// Fit up to `n_components` axes of `x` (samples x features).
    ///
    /// With fewer samples than features the eigenvectors are found on the
    /// smaller samples x samples Gram matrix and mapped back to feature space.
    pub fn fit(x: &Array2<f64>, n_components: usize) -> Self {
        let (n_samples, n_features) = x.dim();
        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_features));
        let centered = x - &mean;
        let denom = (n_samples.saturating_sub(1)).max(1) as f64;
        let gram_side = n_samples < n_features;
        let scatter = if gram_side {
            centered.dot(&centered.t()) / denom
        } else {
            centered.t().dot(&centered) / denom
        };

        let dim = scatter.nrows();
        let k = n_components.min(dim);
        let mut basis = Array2::zeros((k, dim));
        let mut components = Array2::zeros((n_components, n_features));
        let mut explained_variance = Array1::zeros(n_components);
        let mut rng = fastrand::Rng::with_seed(START_SEED);

        for c in 0..k {
            let mut v = Array1::from_shape_simple_fn(dim, || rng.f64() - 0.5);
            orthogonalize(&mut v, &basis, c);
            normalize(&mut v);

            let mut eigenvalue = 0.0;
            for _ in 0..MAX_ITER {
                let mut next = scatter.dot(&v);
                orthogonalize(&mut next, &basis, c);
                eigenvalue = normalize(&mut next);
                let delta = (&next - &v).mapv(|d| d * d).sum();
                v = next;
                if delta < TOLERANCE {
                    break;
                }
            }

            if eigenvalue < VARIANCE_FLOOR {
                debug!("PCA stopped at {} of {} axes: no variance left", c, n_components);
                break;
            }
            basis.row_mut(c).assign(&v);

            let mut axis = if gram_side { centered.t().dot(&v) } else { v };
            normalize(&mut axis);
            flip_sign(&mut axis);
            components.row_mut(c).assign(&axis);
            explained_variance[c] = eigenvalue;
        }

        Self { mean, components, explained_variance }
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean).dot(&self.components.t())
    }

    pub fn fit_transform(x: &Array2<f64>, n_components: usize) -> Array2<f64> {
        Self::fit(x, n_components).transform(x)
    }

    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }
}

/// Documents placed on the plane, with the label each one is coloured by.
#[derive(Debug, Clone)]
pub struct Projection {
    pub points: Vec<(f64, f64)>,
    pub labels: Vec<i64>,
}

impl Projection {
    /// Project `matrix` (documents x features) onto its first two principal
    /// axes. A one-column input gets a zero second coordinate.
    pub fn fit(matrix: &Array2<f64>, labels: Vec<i64>) -> Self {
        let coords = Pca::fit_transform(matrix, 2);
        let points = coords.outer_iter().map(|row| (row[0], row[1])).collect();
        Self { points, labels }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn first_axis_follows_the_spread() {
        let x = array![[-2.0, 0.1], [-1.0, -0.1], [0.0, 0.0], [1.0, 0.1], [2.0, -0.1]];
        let pca = Pca::fit(&x, 2);
        assert!(pca.components[[0, 0]] > 0.99);
        assert!(pca.explained_variance()[0] > pca.explained_variance()[1]);
    }

    #[test]
    fn projection_is_centered() {
        let x = array![[1.0, 2.0, 3.0], [2.0, 1.0, 0.0], [4.0, 4.0, 1.0], [0.0, 3.0, 2.0]];
        let projection = Projection::fit(&x, vec![0, 1, 0, 1]);
        assert_eq!(projection.len(), 4);
        let mean_x: f64 = projection.points.iter().map(|p| p.0).sum::<f64>() / 4.0;
        let mean_y: f64 = projection.points.iter().map(|p| p.1).sum::<f64>() / 4.0;
        assert!(mean_x.abs() < 1e-9);
        assert!(mean_y.abs() < 1e-9);
    }

    #[test]
    fn single_column_pads_second_coordinate() {
        let x = array![[1.0], [2.0], [4.0]];
        let projection = Projection::fit(&x, vec![0, 0, 0]);
        assert!(projection.points.iter().all(|p| p.1 == 0.0));
        assert!(projection.points[0].0 < projection.points[2].0);
    }

    #[test]
    fn constant_rows_project_to_origin() {
        let x = array![[0.5, 0.5], [0.5, 0.5], [0.5, 0.5]];
        let projection = Projection::fit(&x, vec![0, 0, 0]);
        assert!(projection.points.iter().all(|&(a, b)| a == 0.0 && b == 0.0));
    }

    #[test]
    fn wide_input_uses_sample_space() {
        let x = array![[1.0, 0.0, 2.0, 0.0, 1.0], [0.0, 3.0, 0.0, 1.0, 0.0], [2.0, 1.0, 1.0, 0.0, 2.0]];
        let pca = Pca::fit(&x, 2);
        let coords = pca.transform(&x);
        for c in 0..2 {
            let axis = pca.components.row(c);
            assert!((axis.dot(&axis) - 1.0).abs() < 1e-9);
            let variance = coords.column(c).mapv(|v| v * v).sum() / 2.0;
            assert!((variance - pca.explained_variance()[c]).abs() < 1e-6);
        }
        assert!(pca.components.row(0).dot(&pca.components.row(1)).abs() < 1e-6);
    }

    #[test]
    fn deterministic_across_runs() {
        let x = array![[0.9, 0.1], [0.2, 0.8], [0.5, 0.5], [0.7, 0.3]];
        let a = Projection::fit(&x, vec![0; 4]);
        let b = Projection::fit(&x, vec![0; 4]);
        assert_eq!(a.points, b.points);
    }
}

//! # Vectorizer
//!
//! Turns the vectorizer view of a corpus into a sparse document-term matrix
//! plus its vocabulary.
//!
//! ## Weighting
//!
//! - Count
//!   * Raw term counts. Used by the probabilistic method.
//! - Tf-idf
//!   * Formula: w(t, d) = count(t, d) * (ln((1 + n) / (1 + df(t))) + 1)
//!   * Each row is then L2-normalised; rows without tokens stay zero.
//!   * Used by both factorization methods.
//!
//! The vocabulary is the sorted set of tokens, so the column order (and every
//! tie-break that depends on it) is reproducible.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::Array2;

use crate::error::{AnalyticsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weighting {
    Count,
    TfIdf,
}

/// Ordered token to column mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Vocabulary {
    terms: Vec<String>,
    index: BTreeMap<String, usize>,
}

impl Vocabulary {
    /// Build from any token stream; duplicates collapse, order is lexicographic.
    pub fn from_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Self {
        let terms: Vec<String> = tokens
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();
        let index = terms.iter().enumerate().map(|(i, t)| (t.clone(), i)).collect();
        Self { terms, index }
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn term(&self, idx: usize) -> &str {
        &self.terms[idx]
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    pub fn get(&self, term: &str) -> Option<usize> {
        self.index.get(term).copied()
    }
}

/// Compressed sparse row matrix.
///
/// Row `r` owns `indices[indptr[r]..indptr[r + 1]]` (sorted column ids) and the
/// matching slice of `data`.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    n_rows: usize,
    n_cols: usize,
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl SparseMatrix {
    /// Assemble from per-row `(column, value)` lists. Columns must be sorted.
    pub fn from_rows(rows: Vec<Vec<(usize, f64)>>, n_cols: usize) -> Self {
        let mut indptr = Vec::with_capacity(rows.len() + 1);
        let mut indices = Vec::new();
        let mut data = Vec::new();
        indptr.push(0);
        for row in &rows {
            for &(col, value) in row {
                indices.push(col);
                data.push(value);
            }
            indptr.push(indices.len());
        }
        Self { n_rows: rows.len(), n_cols, indptr, indices, data }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Non-zero `(column, value)` pairs of one row.
    pub fn row(&self, r: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        let span = self.indptr[r]..self.indptr[r + 1];
        self.indices[span.clone()].iter().copied().zip(self.data[span].iter().copied())
    }

    pub fn is_all_zero(&self) -> bool {
        self.data.iter().all(|&v| v == 0.0)
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.n_rows, self.n_cols));
        for r in 0..self.n_rows {
            for (c, v) in self.row(r) {
                dense[[r, c]] = v;
            }
        }
        dense
    }
}

/// Sparse matrix plus the vocabulary naming its columns.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub matrix: SparseMatrix,
    pub vocabulary: Vocabulary,
    pub weighting: Weighting,
}

#[derive(Debug, Clone, Copy)]
pub struct Vectorizer {
    weighting: Weighting,
}

impl Vectorizer {
    pub fn new(weighting: Weighting) -> Self {
        Self { weighting }
    }

    /// Fit the vocabulary and transform the corpus in one pass.
    ///
    /// # Arguments
    /// * `documents`: Whitespace-joined, already filtered tokens, one per document
    ///
    /// # Errors
    /// `AnalyticsError::Data` when no token survives filtering.
    pub fn fit_transform(&self, documents: &[String]) -> Result<FeatureMatrix> {
        let vocabulary = Vocabulary::from_tokens(documents.iter().flat_map(|d| d.split_whitespace()));
        if vocabulary.is_empty() {
            return Err(AnalyticsError::Data(
                "Empty vocabulary; perhaps the documents only contain stop words.".into(),
            ));
        }

        let mut rows: Vec<Vec<(usize, f64)>> = documents
            .iter()
            .map(|doc| {
                let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
                for token in doc.split_whitespace() {
                    if let Some(col) = vocabulary.get(token) {
                        *counts.entry(col).or_insert(0.0) += 1.0;
                    }
                }
                counts.into_iter().collect()
            })
            .collect();

        if self.weighting == Weighting::TfIdf {
            apply_tfidf(&mut rows, vocabulary.len());
        }

        Ok(FeatureMatrix {
            matrix: SparseMatrix::from_rows(rows, vocabulary.len()),
            vocabulary,
            weighting: self.weighting,
        })
    }
}

fn apply_tfidf(rows: &mut [Vec<(usize, f64)>], n_terms: usize) {
    let n_docs = rows.len() as f64;
    let mut df = vec![0.0f64; n_terms];
    for row in rows.iter() {
        for &(col, _) in row {
            df[col] += 1.0;
        }
    }
    let idf: Vec<f64> = df.iter().map(|&d| ((1.0 + n_docs) / (1.0 + d)).ln() + 1.0).collect();

    for row in rows.iter_mut() {
        for (col, value) in row.iter_mut() {
            *value *= idf[*col];
        }
        let norm = row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, value) in row.iter_mut() {
                *value /= norm;
            }
        }
    }
}

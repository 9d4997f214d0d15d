//! # Topic coherence
//!
//! The `c_v` measure over a fixed reference corpus.
//!
//! - Probabilities
//!   * boolean sliding windows of 110 tokens; a document shorter than the
//!     window is a single window
//!   * P(w) = windows containing w / windows, P(wi, wj) likewise
//! - Confirmation
//!   * NPMI(wi, wj) = ln((P(wi, wj) + ε) / (P(wi) P(wj))) / -ln(P(wi, wj) + ε)
//!   * each top word w' is compared with the whole top-word set W* through
//!     context vectors: v(w') = [NPMI(w', wj)]_j, v(W*) = Σ_{w ∈ W*} v(w)
//!   * score(w', W*) = cos(v(w'), v(W*))
//! - Aggregation
//!   * mean over a topic's words, then mean over topics
//!
//! The reference corpus is encoded once and reused for every topic count of a
//! sweep, so scores are comparable across topic counts.

use std::collections::HashMap;

use log::debug;
use rayon::prelude::*;

use crate::preprocess::ProcessedCorpus;
use crate::topic::Topic;

pub const DEFAULT_WINDOW: usize = 110;
const EPSILON: f64 = 1e-12;

/// Dictionary-encoded token streams.
#[derive(Debug, Clone)]
pub struct ReferenceCorpus {
    dictionary: HashMap<String, u32>,
    docs: Vec<Vec<u32>>,
}

impl ReferenceCorpus {
    pub fn new(docs: &[Vec<String>]) -> Self {
        let mut dictionary: HashMap<String, u32> = HashMap::new();
        let docs = docs
            .iter()
            .map(|doc| {
                doc.iter()
                    .map(|token| {
                        let next = dictionary.len() as u32;
                        *dictionary.entry(token.clone()).or_insert(next)
                    })
                    .collect()
            })
            .collect();
        Self { dictionary, docs }
    }

    /// Encode the unfiltered reference view of a corpus.
    pub fn from_corpus(corpus: &ProcessedCorpus) -> Self {
        Self::new(&corpus.reference)
    }

    pub fn id(&self, word: &str) -> Option<u32> {
        self.dictionary.get(word).copied()
    }

    pub fn dictionary_len(&self) -> usize {
        self.dictionary.len()
    }

    pub fn num_docs(&self) -> usize {
        self.docs.len()
    }
}

/// Window occurrence counts for a fixed set of words.
#[derive(Debug, Clone)]
struct WindowCounts {
    size: usize,
    windows: f64,
    single: Vec<f64>,
    joint: Vec<f64>,
}

impl WindowCounts {
    fn new(size: usize) -> Self {
        Self { size, windows: 0.0, single: vec![0.0; size], joint: vec![0.0; size * size] }
    }

    fn record(&mut self, present: &[usize]) {
        self.windows += 1.0;
        for (a, &i) in present.iter().enumerate() {
            self.single[i] += 1.0;
            for &j in &present[a + 1..] {
                self.joint[i * self.size + j] += 1.0;
                self.joint[j * self.size + i] += 1.0;
            }
        }
    }

    fn merge(mut self, other: Self) -> Self {
        self.windows += other.windows;
        self.single.iter_mut().zip(&other.single).for_each(|(a, b)| *a += b);
        self.joint.iter_mut().zip(&other.joint).for_each(|(a, b)| *a += b);
        self
    }

    fn p(&self, i: usize) -> f64 {
        self.single[i] / self.windows
    }

    fn p_joint(&self, i: usize, j: usize) -> f64 {
        if i == j {
            return self.p(i);
        }
        self.joint[i * self.size + j] / self.windows
    }
}

/// Scores topics with `c_v`.
#[derive(Debug, Clone, Copy)]
pub struct CoherenceModel {
    window: usize,
}

impl Default for CoherenceModel {
    fn default() -> Self {
        Self { window: DEFAULT_WINDOW }
    }
}

impl CoherenceModel {
    pub fn with_window(window: usize) -> Self {
        Self { window: window.max(1) }
    }

    /// Mean coherence over all topics; 0 for no topics.
    pub fn score(&self, reference: &ReferenceCorpus, topics: &[Topic]) -> f64 {
        let per_topic = self.topic_scores(reference, topics);
        if per_topic.is_empty() {
            return 0.0;
        }
        per_topic.iter().sum::<f64>() / per_topic.len() as f64
    }

    /// One score per topic. Words missing from the reference dictionary are
    /// skipped; a topic with none of its words in the dictionary scores 0.
    pub fn topic_scores(&self, reference: &ReferenceCorpus, topics: &[Topic]) -> Vec<f64> {
        let mut slots: HashMap<u32, usize> = HashMap::new();
        let topic_slots: Vec<Vec<usize>> = topics
            .iter()
            .map(|topic| {
                let mut ids: Vec<usize> = Vec::new();
                for word in topic.words() {
                    if let Some(id) = reference.id(word) {
                        let next = slots.len();
                        let slot = *slots.entry(id).or_insert(next);
                        if !ids.contains(&slot) {
                            ids.push(slot);
                        }
                    }
                }
                ids
            })
            .collect();

        let counts = self.count_windows(reference, &slots);
        debug!("Coherence: {} relevant words over {} windows", slots.len(), counts.windows);

        topic_slots.iter().map(|ids| confirm(&counts, ids)).collect()
    }

    fn count_windows(&self, reference: &ReferenceCorpus, slots: &HashMap<u32, usize>) -> WindowCounts {
        let size = slots.len();
        let window = self.window;
        reference
            .docs
            .par_iter()
            .fold(
                || WindowCounts::new(size),
                |mut counts, doc| {
                    count_document(doc, slots, window, &mut counts);
                    counts
                },
            )
            .reduce(|| WindowCounts::new(size), WindowCounts::merge)
    }
}

/// Slide a window over one document, recording which relevant words each
/// window contains.
fn count_document(doc: &[u32], slots: &HashMap<u32, usize>, window: usize, counts: &mut WindowCounts) {
    if doc.is_empty() {
        return;
    }
    let mapped: Vec<Option<usize>> = doc.iter().map(|id| slots.get(id).copied()).collect();
    let mut inside = vec![0usize; counts.size];
    let first = window.min(mapped.len());
    for slot in mapped[..first].iter().flatten() {
        inside[*slot] += 1;
    }

    let present = |inside: &[usize]| -> Vec<usize> {
        inside.iter().enumerate().filter(|(_, &n)| n > 0).map(|(i, _)| i).collect()
    };
    counts.record(&present(&inside));

    for end in first..mapped.len() {
        if let Some(slot) = mapped[end - window] {
            inside[slot] -= 1;
        }
        if let Some(slot) = mapped[end] {
            inside[slot] += 1;
        }
        counts.record(&present(&inside));
    }
}

/// One-set segmentation with indirect cosine confirmation.
fn confirm(counts: &WindowCounts, ids: &[usize]) -> f64 {
    if ids.is_empty() || counts.windows == 0.0 {
        return 0.0;
    }
    let vectors: Vec<Vec<f64>> = ids
        .iter()
        .map(|&i| ids.iter().map(|&j| npmi(counts, i, j)).collect())
        .collect();
    let mut whole = vec![0.0; ids.len()];
    for v in &vectors {
        whole.iter_mut().zip(v).for_each(|(a, b)| *a += b);
    }
    let total: f64 = vectors.iter().map(|v| cosine(v, &whole)).sum();
    total / ids.len() as f64
}

fn npmi(counts: &WindowCounts, i: usize, j: usize) -> f64 {
    let p_i = counts.p(i);
    let p_j = counts.p(j);
    if p_i == 0.0 || p_j == 0.0 {
        return 0.0;
    }
    let p_ij = counts.p_joint(i, j) + EPSILON;
    (p_ij / (p_i * p_j)).ln() / -p_ij.ln()
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

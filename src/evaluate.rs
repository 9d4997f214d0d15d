//! # Coherence sweep
//!
//! Refits a method for every candidate topic count in an inclusive range and
//! scores each fit against one shared reference corpus. The best count is the
//! one with the highest coherence; ties go to the smallest count.
//!
//! Fits run one after another. The sweep stops at the first failed fit and
//! reports that error.

use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};

use crate::coherence::{CoherenceModel, ReferenceCorpus};
use crate::error::{AnalyticsError, Result};
use crate::preprocess::ProcessedCorpus;
use crate::topic::{FitParams, SecondaryMetric, TopicModeler};

/// Inclusive `[min, max]` range walked by `step`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepRange {
    pub min: usize,
    pub max: usize,
    pub step: usize,
}

impl SweepRange {
    pub fn new(min: usize, max: usize, step: usize) -> Result<Self> {
        if min == 0 {
            return Err(AnalyticsError::validation("min_topics", "min_topics must be a positive integer."));
        }
        if step == 0 {
            return Err(AnalyticsError::validation("step", "step must be a positive integer."));
        }
        if min > max {
            return Err(AnalyticsError::validation(
                "max_topics",
                format!("max_topics ({}) must not be smaller than min_topics ({}).", max, min),
            ));
        }
        Ok(Self { min, max, step })
    }

    /// Number of candidate topic counts: floor((max - min) / step) + 1.
    pub fn count(&self) -> usize {
        (self.max - self.min) / self.step + 1
    }

    /// Refuse ranges holding more candidates than `max_fits`.
    pub fn check_budget(&self, max_fits: Option<usize>) -> Result<()> {
        match max_fits {
            Some(limit) if self.count() > limit => Err(AnalyticsError::validation(
                "max_topics",
                format!("The sweep would need {} fits; at most {} are allowed.", self.count(), limit),
            )),
            _ => Ok(()),
        }
    }

    pub fn candidates(&self) -> impl Iterator<Item = usize> {
        (self.min..=self.max).step_by(self.step)
    }
}

/// Scores of one candidate fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRecord {
    pub topic_count: usize,
    pub coherence: f64,
    pub secondary: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepResult {
    pub records: Vec<ScoreRecord>,
    pub metric: Option<SecondaryMetric>,
    pub best_topic: usize,
    pub best_coherence: f64,
}

impl SweepResult {
    pub fn topics_range(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.topic_count).collect()
    }

    pub fn coherence_scores(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.coherence).collect()
    }

    /// Secondary scores, present only when every fit reported one.
    pub fn secondary_scores(&self) -> Option<Vec<f64>> {
        self.records.iter().map(|r| r.secondary).collect()
    }
}

/// Index of the highest score; the first one wins ties.
pub fn select_best(scores: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (idx, &score) in scores.iter().enumerate() {
        match best {
            Some(b) if score <= scores[b] => {}
            _ if score.is_nan() => {}
            _ => best = Some(idx),
        }
    }
    best
}

/// Drives one method through a topic-count range.
pub struct Evaluator<'a> {
    modeler: &'a dyn TopicModeler,
    coherence: CoherenceModel,
}

impl<'a> Evaluator<'a> {
    pub fn new(modeler: &'a dyn TopicModeler) -> Self {
        Self { modeler, coherence: CoherenceModel::default() }
    }

    /// Fit and score every candidate topic count.
    ///
    /// The range is not bounded here; callers apply
    /// [`SweepRange::check_budget`] first. Candidates past the corpus size fail
    /// at their first fit.
    ///
    /// # Arguments
    ///
    /// * `corpus` - The preprocessed corpus; its reference view is encoded once
    /// * `range` - Candidate topic counts
    /// * `words_per_topic` - Top words scored per topic
    /// * `seed` - Seed passed to every fit
    pub fn sweep(
        &self,
        corpus: &ProcessedCorpus,
        range: SweepRange,
        words_per_topic: usize,
        seed: u64,
    ) -> Result<SweepResult> {
        let method = self.modeler.method();
        if !method.supports_sweep() {
            return Err(AnalyticsError::validation(
                "coherence_analysis",
                format!("Coherence analysis is not available for {}.", method),
            ));
        }

        let reference = ReferenceCorpus::from_corpus(corpus);
        let progress = ProgressBar::new(range.count() as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
        {
            progress.set_style(style);
        }

        let mut records = Vec::new();
        let mut metric = None;
        for k in range.candidates() {
            progress.set_message(format!("{} topics", k));
            let params = FitParams { num_topics: k, words_per_topic, seed };
            let model = match self.modeler.fit(corpus, &params) {
                Ok(model) => model,
                Err(e) => {
                    progress.abandon_with_message(format!("failed at {} topics", k));
                    return Err(e);
                }
            };

            let coherence = self.coherence.score(&reference, model.topics());
            let secondary = model.secondary();
            if let Some((m, _)) = secondary {
                metric = Some(m);
            }
            match secondary {
                Some((m, value)) => info!("{} k={}: coherence {:.4}, {} {:.4}", method, k, coherence, m.label(), value),
                None => info!("{} k={}: coherence {:.4}", method, k, coherence),
            }
            records.push(ScoreRecord { topic_count: k, coherence, secondary: secondary.map(|(_, v)| v) });
            progress.inc(1);
        }
        progress.finish_with_message("done");

        let scores: Vec<f64> = records.iter().map(|r| r.coherence).collect();
        let best = select_best(&scores).unwrap_or_else(|| {
            warn!("Every coherence score was NaN; falling back to the first topic count");
            0
        });
        let best_topic = records[best].topic_count;
        let best_coherence = records[best].coherence;
        info!("Best topic count for {}: {} (coherence {:.4})", method, best_topic, best_coherence);

        Ok(SweepResult { records, metric, best_topic, best_coherence })
    }
}

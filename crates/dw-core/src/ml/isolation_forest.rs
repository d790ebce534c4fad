//! Isolation forest (Liu, Ting & Zhou 2008).
//!
//! Points that are easy to separate from the rest by random axis-aligned
//! splits sit on short paths. The anomaly score is `2^(-E[h(x)] / c(ψ))`
//! where `c(ψ)` is the average path length of an unsuccessful BST search
//! over `ψ` points.

use dw_config::IsolationSettings;
use dw_math::{percentile_sorted, sorted_finite};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::ModelError;

const EULER_GAMMA: f64 = 0.577_215_664_9;

/// Floor on the decision threshold; below it a score means "normal".
const MIN_THRESHOLD: f64 = 0.5;

/// Average path length of an unsuccessful search in a BST of `n` nodes.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let nf = n as f64;
            2.0 * ((nf - 1.0).ln() + EULER_GAMMA) - 2.0 * (nf - 1.0) / nf
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn build(data: &[&[f64]], depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
        if depth >= max_depth || data.len() <= 1 {
            return Node::Leaf { size: data.len() };
        }
        let n_features = data[0].len();
        let splittable: Vec<(usize, f64, f64)> = (0..n_features)
            .filter_map(|f| {
                let (lo, hi) = data.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), row| {
                    (lo.min(row[f]), hi.max(row[f]))
                });
                (hi > lo).then_some((f, lo, hi))
            })
            .collect();
        if splittable.is_empty() {
            return Node::Leaf { size: data.len() };
        }

        let (feature, lo, hi) = splittable[rng.random_range(0..splittable.len())];
        let threshold = rng.random_range(lo..hi);
        let (left, right): (Vec<&[f64]>, Vec<&[f64]>) =
            data.iter().copied().partition(|row| row[feature] < threshold);

        Node::Split {
            feature,
            threshold,
            left: Box::new(Node::build(&left, depth + 1, max_depth, rng)),
            right: Box::new(Node::build(&right, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(&self, x: &[f64]) -> f64 {
        let mut node = self;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] < *threshold { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    trees: Vec<Node>,
    /// Points per tree (ψ).
    sample_size: usize,
    n_features: usize,
    /// Scores at or above this are anomalous.
    threshold: f64,
    n_training: usize,
}

impl IsolationForest {
    pub fn fit(data: &[Vec<f64>], cfg: &IsolationSettings, seed: u64) -> Result<Self, ModelError> {
        if data.len() < 2 {
            return Err(ModelError::InsufficientSamples {
                have: data.len(),
                need: 2,
            });
        }
        let n_features = data[0].len();
        if let Some(bad) = data.iter().find(|r| r.len() != n_features) {
            return Err(ModelError::DimensionMismatch {
                expected: n_features,
                found: bad.len(),
            });
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let sample_size = cfg.subsample_size.min(data.len()).max(2);
        let max_depth = (sample_size as f64).log2().ceil() as usize;

        let trees = (0..cfg.n_trees)
            .map(|_| {
                let rows: Vec<&[f64]> = rand::seq::index::sample(&mut rng, data.len(), sample_size)
                    .into_iter()
                    .map(|i| data[i].as_slice())
                    .collect();
                Node::build(&rows, 0, max_depth, &mut rng)
            })
            .collect();

        let mut forest = IsolationForest {
            trees,
            sample_size,
            n_features,
            threshold: MIN_THRESHOLD,
            n_training: data.len(),
        };

        let scores: Vec<f64> = data.iter().map(|row| forest.score(row)).collect();
        let sorted = sorted_finite(&scores);
        let q = percentile_sorted(&sorted, 1.0 - cfg.contamination);
        forest.threshold = if q.is_finite() { q.max(MIN_THRESHOLD) } else { MIN_THRESHOLD };
        Ok(forest)
    }

    /// Mean path length of `x` over all trees.
    pub fn expected_path_length(&self, x: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64
    }

    /// Anomaly score in (0, 1]; about 0.5 or less is normal.
    pub fn score(&self, x: &[f64]) -> f64 {
        let c = average_path_length(self.sample_size);
        if c <= 0.0 || x.len() != self.n_features {
            return MIN_THRESHOLD;
        }
        2f64.powf(-self.expected_path_length(x) / c)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_training(&self) -> usize {
        self.n_training
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

//! Random forest classifier over analyst-labeled anomalies.
//!
//! CART trees grown on bootstrap samples, Gini impurity, `ceil(√d)`
//! candidate features per split. The forest outputs the mean of the leaf
//! positive-class frequencies.

use dw_config::ForestSettings;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::ModelError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
enum TreeNode {
    Leaf {
        probability: f64,
        n: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

fn gini(positives: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = positives as f64 / n as f64;
    2.0 * p * (1.0 - p)
}

struct Split {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

struct Grower<'a> {
    x: &'a [Vec<f64>],
    y: &'a [bool],
    cfg: &'a ForestSettings,
    features_per_split: usize,
}

impl Grower<'_> {
    fn best_split(&self, rows: &[usize], rng: &mut StdRng) -> Option<Split> {
        let n_features = self.x[0].len();
        let n = rows.len();
        let total_pos = rows.iter().filter(|&&r| self.y[r]).count();
        let mut best: Option<Split> = None;

        for feature in rand::seq::index::sample(rng, n_features, self.features_per_split).into_iter() {
            let mut sorted: Vec<(f64, bool)> =
                rows.iter().map(|&r| (self.x[r][feature], self.y[r])).collect();
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_pos = 0;
            for i in 1..n {
                if sorted[i - 1].1 {
                    left_pos += 1;
                }
                if sorted[i].0 <= sorted[i - 1].0 {
                    continue;
                }
                let (nl, nr) = (i, n - i);
                let impurity = (nl as f64 * gini(left_pos, nl)
                    + nr as f64 * gini(total_pos - left_pos, nr))
                    / n as f64;
                if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                    best = Some(Split {
                        feature,
                        threshold: 0.5 * (sorted[i - 1].0 + sorted[i].0),
                        impurity,
                    });
                }
            }
        }
        best.filter(|b| b.impurity < gini(total_pos, n))
    }

    fn grow(&self, rows: &[usize], depth: usize, rng: &mut StdRng) -> TreeNode {
        let n = rows.len();
        let positives = rows.iter().filter(|&&r| self.y[r]).count();
        let leaf = TreeNode::Leaf {
            probability: if n == 0 { 0.0 } else { positives as f64 / n as f64 },
            n,
        };
        if depth >= self.cfg.max_depth
            || n < self.cfg.min_samples_split
            || positives == 0
            || positives == n
        {
            return leaf;
        }
        let Some(split) = self.best_split(rows, rng) else {
            return leaf;
        };
        let (left, right): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| self.x[r][split.feature] < split.threshold);
        TreeNode::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(self.grow(&left, depth + 1, rng)),
            right: Box::new(self.grow(&right, depth + 1, rng)),
        }
    }
}

impl TreeNode {
    fn predict(&self, x: &[f64]) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { probability, .. } => return *probability,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => node = if x[*feature] < *threshold { left } else { right },
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<TreeNode>,
    n_features: usize,
    n_training: usize,
    positives: usize,
}

impl RandomForest {
    /// Fit on feature rows `x` with labels `y` (true = anomaly). Both
    /// classes must be present.
    pub fn fit(x: &[Vec<f64>], y: &[bool], cfg: &ForestSettings, seed: u64) -> Result<Self, ModelError> {
        if x.len() != y.len() {
            return Err(ModelError::DimensionMismatch {
                expected: x.len(),
                found: y.len(),
            });
        }
        if x.len() < 2 {
            return Err(ModelError::InsufficientSamples {
                have: x.len(),
                need: 2,
            });
        }
        let n_features = x[0].len();
        if n_features == 0 {
            return Err(ModelError::DimensionMismatch {
                expected: 1,
                found: 0,
            });
        }
        if let Some(bad) = x.iter().find(|r| r.len() != n_features) {
            return Err(ModelError::DimensionMismatch {
                expected: n_features,
                found: bad.len(),
            });
        }
        let positives = y.iter().filter(|&&l| l).count();
        if positives == 0 || positives == y.len() {
            return Err(ModelError::SingleClass);
        }

        let grower = Grower {
            x,
            y,
            cfg,
            features_per_split: ((n_features as f64).sqrt().ceil() as usize).clamp(1, n_features),
        };
        let mut rng = StdRng::seed_from_u64(seed);
        let n = x.len();
        let trees = (0..cfg.n_trees)
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
                grower.grow(&bootstrap, 0, &mut rng)
            })
            .collect();

        Ok(RandomForest {
            trees,
            n_features,
            n_training: n,
            positives,
        })
    }

    /// Probability that `x` is a true anomaly.
    pub fn predict_proba(&self, x: &[f64]) -> f64 {
        if self.trees.is_empty() || x.len() != self.n_features {
            return 0.5;
        }
        self.trees.iter().map(|t| t.predict(x)).sum::<f64>() / self.trees.len() as f64
    }

    pub fn n_training(&self) -> usize {
        self.n_training
    }

    pub fn positives(&self) -> usize {
        self.positives
    }
}

//! Bagged regression trees (random forest regressor).
//!
//! Each tree is grown on a bootstrap sample of the training rows with the
//! squared-error criterion. Every feature is considered at every split, as a
//! regression forest does by default, so the only randomness is the bootstrap
//! draw. All draws come from one seeded [`StdRng`] stream, which makes a fit
//! reproducible for a given seed and training set.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{ForecastError, Result};

/// Two feature values closer than this are treated as equal when searching
/// for split points.
const FEATURE_THRESHOLD: f64 = 1e-7;

/// Forest hyper-parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ForestOptions {
    /// Number of trees
    pub n_trees: usize,
    /// Seed of the bootstrap sampler
    pub seed: u64,
    /// Maximum tree depth (None = grow until leaves are pure)
    pub max_depth: Option<usize>,
    /// Minimum number of samples required to split a node
    pub min_samples_split: usize,
    /// Minimum number of samples in each leaf
    pub min_samples_leaf: usize,
}

impl Default for ForestOptions {
    fn default() -> Self {
        Self {
            n_trees: 200,
            seed: 42,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl ForestOptions {
    fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            return Err(invalid_param("n_trees", self.n_trees, "must be positive"));
        }
        if self.min_samples_split < 2 {
            return Err(invalid_param(
                "min_samples_split",
                self.min_samples_split,
                "must be at least 2",
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(invalid_param(
                "min_samples_leaf",
                self.min_samples_leaf,
                "must be positive",
            ));
        }
        Ok(())
    }
}

fn invalid_param(param: &str, value: usize, reason: &str) -> ForecastError {
    ForecastError::InvalidParameter {
        param: param.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A single regression tree stored as a flat node arena (root at index 0).
#[derive(Debug, Clone)]
struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match &nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
}

struct TreeBuilder<'a> {
    x: &'a [Vec<f64>],
    y: &'a [f64],
    n_features: usize,
    options: &'a ForestOptions,
    nodes: Vec<Node>,
}

impl<'a> TreeBuilder<'a> {
    fn grow(mut self, samples: Vec<usize>) -> RegressionTree {
        self.build(samples, 0);
        RegressionTree { nodes: self.nodes }
    }

    fn build(&mut self, samples: Vec<usize>, depth: usize) -> usize {
        let n = samples.len() as f64;
        let sum: f64 = samples.iter().map(|&i| self.y[i]).sum();
        let sum_sq: f64 = samples.iter().map(|&i| self.y[i].powi(2)).sum();
        let mean = sum / n;
        let impurity = sum_sq / n - mean * mean;

        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value: mean });

        let depth_exhausted = self.options.max_depth.is_some_and(|d| depth >= d);
        if depth_exhausted
            || samples.len() < self.options.min_samples_split
            || samples.len() < 2 * self.options.min_samples_leaf
            || impurity <= f64::EPSILON
        {
            return idx;
        }

        let Some(split) = self.best_split(&samples, sum) else {
            return idx;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .into_iter()
            .partition(|&i| self.x[i][split.feature] <= split.threshold);
        let left = self.build(left, depth + 1);
        let right = self.build(right, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }

    /// Best squared-error split, scored by the proxy `S_l²/n_l + S_r²/n_r`.
    fn best_split(&self, samples: &[usize], total: f64) -> Option<SplitCandidate> {
        let n = samples.len();
        let min_leaf = self.options.min_samples_leaf;
        let mut best: Option<SplitCandidate> = None;
        let mut best_score = f64::NEG_INFINITY;
        let mut sorted = samples.to_vec();

        for feature in 0..self.n_features {
            sorted.sort_by(|&a, &b| self.x[a][feature].total_cmp(&self.x[b][feature]));

            let mut left_sum = 0.0;
            for pos in 1..n {
                left_sum += self.y[sorted[pos - 1]];
                if pos < min_leaf || n - pos < min_leaf {
                    continue;
                }
                let lo = self.x[sorted[pos - 1]][feature];
                let hi = self.x[sorted[pos]][feature];
                if hi <= lo + FEATURE_THRESHOLD {
                    continue;
                }

                let right_sum = total - left_sum;
                let score =
                    left_sum * left_sum / pos as f64 + right_sum * right_sum / (n - pos) as f64;
                if score > best_score {
                    best_score = score;
                    let mut threshold = lo / 2.0 + hi / 2.0;
                    if threshold == hi || !threshold.is_finite() {
                        threshold = lo;
                    }
                    best = Some(SplitCandidate { feature, threshold });
                }
            }
        }

        best
    }
}

/// A fitted random forest regressor.
#[derive(Debug, Clone)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForest {
    /// Fit a forest on feature rows `x` and targets `y`.
    pub fn fit(x: &[Vec<f64>], y: &[f64], options: &ForestOptions) -> Result<Self> {
        options.validate()?;

        if x.is_empty() {
            return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
        }
        if x.len() != y.len() {
            return Err(ForecastError::InvalidInput(format!(
                "Feature rows and targets must have the same length: {} vs {}",
                x.len(),
                y.len()
            )));
        }

        let n_features = x[0].len();
        if n_features == 0 {
            return Err(ForecastError::InvalidInput(
                "Feature rows must not be empty".to_string(),
            ));
        }
        if let Some(i) = x.iter().position(|row| row.len() != n_features) {
            return Err(ForecastError::InvalidInput(format!(
                "Feature row {} has {} values but expected {}",
                i,
                x[i].len(),
                n_features
            )));
        }
        if x.iter().flatten().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(ForecastError::InvalidInput(
                "Training data contains non-finite values".to_string(),
            ));
        }

        let n = x.len();
        let mut rng = StdRng::seed_from_u64(options.seed);
        let trees = (0..options.n_trees)
            .map(|_| {
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                TreeBuilder {
                    x,
                    y,
                    n_features,
                    options,
                    nodes: Vec::new(),
                }
                .grow(bootstrap)
            })
            .collect();

        Ok(Self { trees, n_features })
    }

    /// Average prediction of all trees for each row.
    pub fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<f64>> {
        rows.iter()
            .map(|row| {
                if row.len() != self.n_features {
                    return Err(ForecastError::InvalidInput(format!(
                        "Prediction row has {} values but the model was fitted on {}",
                        row.len(),
                        self.n_features
                    )));
                }
                let total: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
                Ok(total / self.trees.len() as f64)
            })
            .collect()
    }

    /// Number of trees in the ensemble.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Deepest tree in the ensemble.
    pub fn max_depth(&self) -> usize {
        self.trees.iter().map(RegressionTree::depth).max().unwrap_or(0)
    }
}

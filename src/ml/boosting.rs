//! Gradient-boosted regression trees
//!
//! Squared-error boosting with second-order (XGBoost-style) split gain:
//! `gain = G_L^2/(n_L+lambda) + G_R^2/(n_R+lambda) - G^2/(n+lambda)` over
//! residual sums `G`. Leaves hold `learning_rate * G/(n+lambda)`. Every node
//! keeps its cover (training rows that reached it) for tree attribution.
//!
//! Split rule: a row goes left when `x[feature] < threshold`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{BoostingConfig, RolloutConfig};
use crate::error::{ForecastError, Result};
use crate::ml::forecaster::{FeatureRollout, ForecastContext, Forecaster};
use crate::ml::indicators::FeatureTable;
use crate::types::ModelKind;

/// Gains at or below this are treated as no improvement
const MIN_SPLIT_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Split {
    pub feature: usize,
    pub threshold: f64,
    pub left: usize,
    pub right: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    /// `None` for leaves
    pub split: Option<Split>,
    /// Leaf output (already scaled by the learning rate)
    pub value: f64,
    pub cover: f64,
}

impl TreeNode {
    pub fn leaf(value: f64, cover: f64) -> Self {
        Self {
            split: None,
            value,
            cover,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.split.is_none()
    }
}

/// One regression tree stored as an arena; node 0 is the root
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    pub fn new(nodes: Vec<TreeNode>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            let Some(node) = self.nodes.get(index) else {
                return 0.0;
            };
            match node.split {
                None => return node.value,
                Some(split) => {
                    index = if x.get(split.feature).copied().unwrap_or(f64::NAN) < split.threshold {
                        split.left
                    } else {
                        split.right
                    };
                }
            }
        }
    }

    /// Cover-weighted mean leaf value
    pub fn expected_value(&self) -> f64 {
        let Some(root) = self.nodes.first() else {
            return 0.0;
        };
        if root.cover <= 0.0 {
            return 0.0;
        }
        self.nodes
            .iter()
            .filter(|n| n.is_leaf())
            .map(|n| n.value * n.cover)
            .sum::<f64>()
            / root.cover
    }

    fn grow(
        x: &[Vec<f64>],
        residuals: &[f64],
        rows: Vec<usize>,
        config: &BoostingConfig,
    ) -> Self {
        let mut nodes = Vec::new();
        build_node(&mut nodes, x, residuals, rows, 0, config);
        Self { nodes }
    }
}

fn leaf_weight(sum: f64, count: usize, config: &BoostingConfig) -> f64 {
    config.learning_rate * sum / (count as f64 + config.lambda)
}

fn score(sum: f64, count: usize, lambda: f64) -> f64 {
    sum * sum / (count as f64 + lambda)
}

/// Best (gain, feature, threshold) over all features, if any split helps
fn best_split(
    x: &[Vec<f64>],
    residuals: &[f64],
    rows: &[usize],
    config: &BoostingConfig,
) -> Option<(f64, usize, f64)> {
    let n = rows.len();
    let total: f64 = rows.iter().map(|&i| residuals[i]).sum();
    let parent = score(total, n, config.lambda);
    let min_leaf = config.min_samples_leaf.max(1);
    let width = x.get(rows[0]).map_or(0, |r| r.len());

    let mut best: Option<(f64, usize, f64)> = None;
    let mut sorted = rows.to_vec();
    for feature in 0..width {
        sorted.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));

        let mut left_sum = 0.0;
        for k in 1..n {
            left_sum += residuals[sorted[k - 1]];
            if k < min_leaf || n - k < min_leaf {
                continue;
            }
            let lo = x[sorted[k - 1]][feature];
            let hi = x[sorted[k]][feature];
            if lo >= hi {
                continue;
            }
            let gain = score(left_sum, k, config.lambda)
                + score(total - left_sum, n - k, config.lambda)
                - parent;
            if gain > MIN_SPLIT_GAIN && best.map_or(true, |(g, _, _)| gain > g) {
                let mut threshold = lo + (hi - lo) / 2.0;
                if threshold <= lo {
                    threshold = hi;
                }
                best = Some((gain, feature, threshold));
            }
        }
    }
    best
}

fn build_node(
    nodes: &mut Vec<TreeNode>,
    x: &[Vec<f64>],
    residuals: &[f64],
    rows: Vec<usize>,
    depth: usize,
    config: &BoostingConfig,
) -> usize {
    let sum: f64 = rows.iter().map(|&i| residuals[i]).sum();
    let index = nodes.len();
    nodes.push(TreeNode::leaf(leaf_weight(sum, rows.len(), config), rows.len() as f64));

    if depth >= config.max_depth || rows.len() < 2 * config.min_samples_leaf.max(1) {
        return index;
    }
    let Some((_, feature, threshold)) = best_split(x, residuals, &rows, config) else {
        return index;
    };

    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) =
        rows.into_iter().partition(|&i| x[i][feature] < threshold);
    let left = build_node(nodes, x, residuals, left_rows, depth + 1, config);
    let right = build_node(nodes, x, residuals, right_rows, depth + 1, config);
    nodes[index].split = Some(Split {
        feature,
        threshold,
        left,
        right,
    });
    index
}

/// Boosted ensemble: `base_score + sum(tree outputs)`
#[derive(Debug, Clone, PartialEq)]
pub struct GradientBoostedTrees {
    base_score: f64,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl GradientBoostedTrees {
    pub fn from_parts(base_score: f64, trees: Vec<RegressionTree>, n_features: usize) -> Self {
        Self {
            base_score,
            trees,
            n_features,
        }
    }

    pub fn fit(x: &[Vec<f64>], y: &[f64], config: &BoostingConfig) -> Result<Self> {
        let model = ModelKind::Boosting.name();
        if x.is_empty() {
            return Err(ForecastError::fit(model, "no training rows"));
        }
        if x.len() != y.len() {
            return Err(ForecastError::fit(
                model,
                format!("{} feature rows but {} targets", x.len(), y.len()),
            ));
        }
        let n_features = x[0].len();
        if x.iter().any(|row| row.len() != n_features) {
            return Err(ForecastError::fit(model, "ragged feature matrix"));
        }
        if x.iter().flatten().chain(y).any(|v| !v.is_finite()) {
            return Err(ForecastError::fit(model, "non-finite training data"));
        }

        let base_score = y.iter().sum::<f64>() / y.len() as f64;
        let mut predictions = vec![base_score; y.len()];
        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut trees = Vec::with_capacity(config.n_estimators);

        for _ in 0..config.n_estimators {
            let residuals: Vec<f64> = y.iter().zip(&predictions).map(|(t, p)| t - p).collect();
            let rows = sample_rows(y.len(), config.subsample, &mut rng);
            let tree = RegressionTree::grow(x, &residuals, rows, config);
            for (p, row) in predictions.iter_mut().zip(x) {
                *p += tree.predict(row);
            }
            trees.push(tree);
        }

        let mse = y
            .iter()
            .zip(&predictions)
            .map(|(t, p)| (t - p).powi(2))
            .sum::<f64>()
            / y.len() as f64;
        tracing::debug!("Boosting fit: {} trees, in-sample mse {:.6}", trees.len(), mse);

        Ok(Self {
            base_score,
            trees,
            n_features,
        })
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict(x)).sum::<f64>()
    }

    /// Mean model output over the training cover
    pub fn expected_value(&self) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.expected_value()).sum::<f64>()
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

fn sample_rows(n: usize, subsample: f64, rng: &mut StdRng) -> Vec<usize> {
    if subsample >= 1.0 {
        return (0..n).collect();
    }
    let rows: Vec<usize> = (0..n).filter(|_| rng.random::<f64>() < subsample).collect();
    if rows.is_empty() {
        (0..n).collect()
    } else {
        rows
    }
}

/// Row `i` features paired with row `i + 1` close
pub fn next_close_training_set(table: &FeatureTable) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut x = table.feature_matrix();
    x.pop();
    let y = table.closes().into_iter().skip(1).collect();
    (x, y)
}

/// Fit the boosted ensemble on next-day closes of `table`
pub fn fit_on_table(table: &FeatureTable, config: &BoostingConfig) -> Result<GradientBoostedTrees> {
    let (x, y) = next_close_training_set(table);
    GradientBoostedTrees::fit(&x, &y, config)
}

/// Tree forecaster rolling the latest feature vector forward
#[derive(Debug, Clone, Default)]
pub struct BoostingForecaster {
    boosting: BoostingConfig,
    rollout: RolloutConfig,
}

impl BoostingForecaster {
    pub fn new(boosting: BoostingConfig, rollout: RolloutConfig) -> Self {
        Self { boosting, rollout }
    }
}

impl Forecaster for BoostingForecaster {
    fn kind(&self) -> ModelKind {
        ModelKind::Boosting
    }

    fn forecast(&self, table: &FeatureTable, ctx: &ForecastContext) -> Result<Vec<f64>> {
        let model = fit_on_table(table, &self.boosting)?;
        let last = table
            .last_row()
            .ok_or_else(|| ForecastError::fit(self.kind().name(), "empty feature table"))?;

        FeatureRollout::new(&self.rollout, ctx.sentiment).run(
            self.kind(),
            vec![last.feature_vector()],
            ctx.horizon,
            |window| Ok(window.last().map_or(f64::NAN, |v| model.predict(v))),
        )
    }
}

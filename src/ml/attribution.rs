//! Attribution Engine: path-dependent TreeSHAP over the boosted ensemble
//!
//! Exact Shapley values for tree models (Lundberg et al.), where absent
//! features follow the training cover at each split. Contributions are local:
//! `expected_value + sum(phi) == predict(x)`.

use crate::config::BoostingConfig;
use crate::error::{ForecastError, Result};
use crate::ml::boosting::{self, GradientBoostedTrees, RegressionTree};
use crate::ml::indicators::FeatureTable;
use crate::types::AttributionItem;

/// One feature on the current root-to-node path
#[derive(Debug, Clone, Copy)]
struct PathElement {
    /// `None` for the root placeholder
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    pweight: f64,
}

/// Grow the path by one feature, updating permutation weights
fn extend_path(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        pweight: if depth == 0 { 1.0 } else { 0.0 },
    });
    let denom = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].pweight += one_fraction * path[i].pweight * (i + 1) as f64 / denom;
        path[i].pweight = zero_fraction * path[i].pweight * (depth - i) as f64 / denom;
    }
}

/// Undo `extend_path` for the element at `index`
fn unwind_path(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let denom = (depth + 1) as f64;
    let mut next_one_portion = path[depth].pweight;

    for i in (0..depth).rev() {
        if one != 0.0 {
            let tmp = path[i].pweight;
            path[i].pweight = next_one_portion * denom / ((i + 1) as f64 * one);
            next_one_portion = tmp - path[i].pweight * zero * (depth - i) as f64 / denom;
        } else {
            path[i].pweight = path[i].pweight * denom / (zero * (depth - i) as f64);
        }
    }

    for i in index..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero_fraction = path[i + 1].zero_fraction;
        path[i].one_fraction = path[i + 1].one_fraction;
    }
    path.pop();
}

/// Total permutation weight with the element at `index` removed
fn unwound_path_sum(path: &[PathElement], index: usize) -> f64 {
    let depth = path.len() - 1;
    let one = path[index].one_fraction;
    let zero = path[index].zero_fraction;
    let denom = (depth + 1) as f64;
    let mut next_one_portion = path[depth].pweight;
    let mut total = 0.0;

    for i in (0..depth).rev() {
        if one != 0.0 {
            let tmp = next_one_portion * denom / ((i + 1) as f64 * one);
            total += tmp;
            next_one_portion = path[i].pweight - tmp * zero * (depth - i) as f64 / denom;
        } else if zero != 0.0 {
            total += path[i].pweight / zero / ((depth - i) as f64 / denom);
        }
    }
    total
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    tree: &RegressionTree,
    x: &[f64],
    phi: &mut [f64],
    node: usize,
    mut path: Vec<PathElement>,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    let nodes = tree.nodes();
    let Some(current) = nodes.get(node) else {
        return;
    };
    extend_path(&mut path, zero_fraction, one_fraction, feature);

    let Some(split) = current.split else {
        for i in 1..path.len() {
            let weight = unwound_path_sum(&path, i);
            let element = path[i];
            if let Some(f) = element.feature {
                phi[f] += weight * (element.one_fraction - element.zero_fraction) * current.value;
            }
        }
        return;
    };

    let goes_left = x.get(split.feature).copied().unwrap_or(f64::NAN) < split.threshold;
    let (hot, cold) = if goes_left {
        (split.left, split.right)
    } else {
        (split.right, split.left)
    };
    if current.cover <= 0.0 {
        return;
    }
    let hot_fraction = nodes[hot].cover / current.cover;
    let cold_fraction = nodes[cold].cover / current.cover;

    // A feature already on the path is replaced, keeping its incoming fractions
    let mut incoming_zero = 1.0;
    let mut incoming_one = 1.0;
    if let Some(k) = (1..path.len()).find(|&k| path[k].feature == Some(split.feature)) {
        incoming_zero = path[k].zero_fraction;
        incoming_one = path[k].one_fraction;
        unwind_path(&mut path, k);
    }

    recurse(
        tree,
        x,
        phi,
        hot,
        path.clone(),
        hot_fraction * incoming_zero,
        incoming_one,
        Some(split.feature),
    );
    recurse(
        tree,
        x,
        phi,
        cold,
        path,
        cold_fraction * incoming_zero,
        0.0,
        Some(split.feature),
    );
}

/// SHAP values of one tree for `x`
pub fn tree_shap(tree: &RegressionTree, x: &[f64], n_features: usize) -> Vec<f64> {
    let mut phi = vec![0.0; n_features];
    let depth_hint = tree.nodes().len().min(64);
    recurse(tree, x, &mut phi, 0, Vec::with_capacity(depth_hint), 1.0, 1.0, None);
    phi
}

/// SHAP values of the whole ensemble for `x`
pub fn ensemble_shap(model: &GradientBoostedTrees, x: &[f64]) -> Vec<f64> {
    let n = model.n_features();
    model.trees().iter().fold(vec![0.0; n], |mut acc, tree| {
        for (a, v) in acc.iter_mut().zip(tree_shap(tree, x, n)) {
            *a += v;
        }
        acc
    })
}

/// Explains the boosted forecaster's prediction for the latest feature row
#[derive(Debug, Clone, Default)]
pub struct AttributionEngine {
    config: BoostingConfig,
}

impl AttributionEngine {
    pub fn new(config: BoostingConfig) -> Self {
        Self { config }
    }

    /// One contribution per table column, in column order
    pub fn explain(&self, table: &FeatureTable) -> Result<Vec<AttributionItem>> {
        let last = table
            .last_row()
            .ok_or_else(|| ForecastError::Attribution("empty feature table".to_string()))?;
        let model = boosting::fit_on_table(table, &self.config)
            .map_err(|e| ForecastError::Attribution(e.to_string()))?;

        let x = last.feature_vector();
        let phi = ensemble_shap(&model, &x);
        if phi.len() != table.columns().len() {
            return Err(ForecastError::Attribution(format!(
                "{} contributions for {} columns",
                phi.len(),
                table.columns().len()
            )));
        }

        tracing::debug!(
            "Attribution base {:.4}, prediction {:.4}",
            model.expected_value(),
            model.predict(&x)
        );

        Ok(table
            .columns()
            .iter()
            .zip(phi)
            .map(|(name, contribution)| AttributionItem {
                feature_name: name.clone(),
                contribution,
            })
            .collect())
    }
}

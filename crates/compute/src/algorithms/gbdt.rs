//! Gradient-boosted regression trees.
//!
//! Squared-error boosting from the target mean, leaf-wise tree growth over
//! quantile-binned features, and early stopping on a held-out validation
//! set. Split search works on per-feature histograms so one tree costs
//! `O(rows × features × depth)` regardless of how many distinct values a
//! feature takes.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use sensorcast_core::{BoosterParams, ImportanceKind};

/// Upper limit on histogram bins per feature; bin indices fit in a `u8`.
const MAX_BINS: usize = 255;

/// Gains below this are treated as "no improvement".
const MIN_SPLIT_GAIN: f64 = 1e-12;

#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    #[error("no training rows")]
    NoRows,
    #[error("feature column {column} has {actual} rows, expected {expected}")]
    Ragged {
        column: usize,
        expected: usize,
        actual: usize,
    },
    #[error("non-finite value in {0}")]
    NonFinite(&'static str),
}

/// Column-major feature matrix borrowed from the caller.
#[derive(Debug, Clone, Copy)]
pub struct Columns<'a> {
    pub columns: &'a [Vec<f64>],
    pub rows: usize,
}

impl<'a> Columns<'a> {
    pub fn new(columns: &'a [Vec<f64>], rows: usize) -> Result<Self, TrainError> {
        for (i, col) in columns.iter().enumerate() {
            if col.len() != rows {
                return Err(TrainError::Ragged {
                    column: i,
                    expected: rows,
                    actual: col.len(),
                });
            }
            if col.iter().any(|v| !v.is_finite()) {
                return Err(TrainError::NonFinite("features"));
            }
        }
        Ok(Self { columns, rows })
    }

    fn value(&self, feature: usize, row: usize) -> f64 {
        self.columns[feature][row]
    }
}

// ── Binning ──────────────────────────────────────────────────────────

/// Maps raw feature values to histogram bins; bin `b` holds `v <= upper_bounds[b]`.
#[derive(Debug, Clone)]
struct BinMapper {
    upper_bounds: Vec<f64>,
}

impl BinMapper {
    fn fit(values: &[f64], max_bins: usize) -> Self {
        let mut distinct = values.to_vec();
        distinct.sort_by(|a, b| a.total_cmp(b));
        distinct.dedup();

        let mut bounds = Vec::new();
        if distinct.len() <= max_bins {
            for w in distinct.windows(2) {
                bounds.push((w[0] + w[1]) / 2.0);
            }
        } else {
            for i in 1..max_bins {
                let idx = i * distinct.len() / max_bins;
                let b = (distinct[idx - 1] + distinct[idx]) / 2.0;
                if bounds.last().map_or(true, |&last| b > last) {
                    bounds.push(b);
                }
            }
        }
        bounds.push(f64::INFINITY);

        Self {
            upper_bounds: bounds,
        }
    }

    fn bin(&self, value: f64) -> u8 {
        self.upper_bounds.partition_point(|&b| b < value) as u8
    }

    fn n_bins(&self) -> usize {
        self.upper_bounds.len()
    }
}

/// Training matrix after binning, column-major.
struct BinnedMatrix {
    bins: Vec<Vec<u8>>,
    mappers: Vec<BinMapper>,
}

impl BinnedMatrix {
    fn fit(x: Columns<'_>, max_bins: usize) -> Self {
        let max_bins = max_bins.clamp(2, MAX_BINS);
        let mut bins = Vec::with_capacity(x.columns.len());
        let mut mappers = Vec::with_capacity(x.columns.len());
        for col in x.columns {
            let mapper = BinMapper::fit(col, max_bins);
            bins.push(col.iter().map(|&v| mapper.bin(v)).collect());
            mappers.push(mapper);
        }
        Self { bins, mappers }
    }

    fn n_features(&self) -> usize {
        self.bins.len()
    }
}

// ── Trees ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

impl RegressionTree {
    /// Root-first node list; `Split` children index into `nodes`.
    pub fn from_nodes(nodes: Vec<TreeNode>) -> Self {
        Self { nodes }
    }

    /// Evaluate the tree, reading feature values through `feature`.
    pub fn predict_by<F: Fn(usize) -> f64>(&self, feature: F) -> f64 {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature: f,
                    threshold,
                    left,
                    right,
                } => {
                    i = if feature(*f) <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn num_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitInfo {
    feature: usize,
    bin: u8,
    gain: f64,
}

struct LeafCandidate {
    node: usize,
    rows: Vec<u32>,
    sum_grad: f64,
    best: Option<SplitInfo>,
}

/// Split statistics recorded while growing, used for importance.
#[derive(Debug, Clone, Copy)]
struct SplitRecord {
    feature: usize,
    gain: f64,
}

fn find_best_split(
    binned: &BinnedMatrix,
    grad: &[f64],
    rows: &[u32],
    sum_grad: f64,
    min_data: usize,
    lambda: f64,
) -> Option<SplitInfo> {
    let n = rows.len();
    if n < 2 * min_data {
        return None;
    }
    let parent = sum_grad * sum_grad / (n as f64 + lambda);

    let mut best: Option<SplitInfo> = None;
    let mut hist_g = [0.0f64; MAX_BINS];
    let mut hist_n = [0usize; MAX_BINS];

    for f in 0..binned.n_features() {
        let n_bins = binned.mappers[f].n_bins();
        if n_bins < 2 {
            continue;
        }
        hist_g[..n_bins].fill(0.0);
        hist_n[..n_bins].fill(0);

        let col = &binned.bins[f];
        for &r in rows {
            let b = col[r as usize] as usize;
            hist_g[b] += grad[r as usize];
            hist_n[b] += 1;
        }

        let mut left_g = 0.0;
        let mut left_n = 0usize;
        for b in 0..n_bins - 1 {
            left_g += hist_g[b];
            left_n += hist_n[b];
            if left_n < min_data {
                continue;
            }
            let right_n = n - left_n;
            if right_n < min_data {
                break;
            }
            let right_g = sum_grad - left_g;
            let gain = left_g * left_g / (left_n as f64 + lambda)
                + right_g * right_g / (right_n as f64 + lambda)
                - parent;
            if gain > MIN_SPLIT_GAIN && best.map_or(true, |s| gain > s.gain) {
                best = Some(SplitInfo {
                    feature: f,
                    bin: b as u8,
                    gain,
                });
            }
        }
    }

    best
}

fn leaf_candidate(
    node: usize,
    rows: Vec<u32>,
    binned: &BinnedMatrix,
    grad: &[f64],
    params: &BoosterParams,
) -> LeafCandidate {
    let sum_grad: f64 = rows.iter().map(|&r| grad[r as usize]).sum();
    let best = find_best_split(
        binned,
        grad,
        &rows,
        sum_grad,
        params.min_data_in_leaf.max(1),
        params.lambda_l2,
    );
    LeafCandidate {
        node,
        rows,
        sum_grad,
        best,
    }
}

/// Grow one tree leaf-wise: always split the leaf with the largest gain.
fn grow_tree(
    binned: &BinnedMatrix,
    grad: &[f64],
    rows: Vec<u32>,
    params: &BoosterParams,
) -> (RegressionTree, Vec<SplitRecord>) {
    let max_leaves = params.num_leaves.max(1);
    let mut nodes = vec![TreeNode::Leaf { value: 0.0 }];
    let mut leaves = vec![leaf_candidate(0, rows, binned, grad, params)];
    let mut splits = Vec::new();

    while leaves.len() < max_leaves {
        let pick = leaves
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.best.map(|s| (i, s.gain)))
            .fold(None, |acc: Option<(usize, f64)>, (i, g)| match acc {
                Some((_, best)) if best >= g => acc,
                _ => Some((i, g)),
            });
        let Some((idx, _)) = pick else { break };

        let leaf = leaves.swap_remove(idx);
        let Some(split) = leaf.best else { break };

        let col = &binned.bins[split.feature];
        let (left_rows, right_rows): (Vec<u32>, Vec<u32>) = leaf
            .rows
            .into_iter()
            .partition(|&r| col[r as usize] <= split.bin);

        let left = nodes.len();
        let right = left + 1;
        nodes.push(TreeNode::Leaf { value: 0.0 });
        nodes.push(TreeNode::Leaf { value: 0.0 });
        nodes[leaf.node] = TreeNode::Split {
            feature: split.feature,
            threshold: binned.mappers[split.feature].upper_bounds[split.bin as usize],
            left,
            right,
        };
        splits.push(SplitRecord {
            feature: split.feature,
            gain: split.gain,
        });

        leaves.push(leaf_candidate(left, left_rows, binned, grad, params));
        leaves.push(leaf_candidate(right, right_rows, binned, grad, params));
    }

    for leaf in leaves {
        let n = leaf.rows.len() as f64;
        let value = if n > 0.0 {
            -leaf.sum_grad / (n + params.lambda_l2) * params.learning_rate
        } else {
            0.0
        };
        nodes[leaf.node] = TreeNode::Leaf { value };
    }

    (RegressionTree { nodes }, splits)
}

// ── Booster ──────────────────────────────────────────────────────────

/// A fitted gradient-boosted regressor.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BoostedRegressor {
    base_score: f64,
    trees: Vec<RegressionTree>,
    num_features: usize,
    split_importance: Vec<f64>,
    gain_importance: Vec<f64>,
    /// RMSE on the validation rows at the kept iteration, if any were given.
    pub best_validation_rmse: Option<f64>,
}

impl BoostedRegressor {
    /// Fit on `(x, y)`, early-stopping on `valid` when it has rows.
    pub fn fit(
        x: Columns<'_>,
        y: &[f64],
        valid: Option<(Columns<'_>, &[f64])>,
        params: &BoosterParams,
    ) -> Result<Self, TrainError> {
        let n = x.rows;
        if n == 0 || y.is_empty() {
            return Err(TrainError::NoRows);
        }
        if y.len() != n {
            return Err(TrainError::Ragged {
                column: usize::MAX,
                expected: n,
                actual: y.len(),
            });
        }
        if y.iter().any(|v| !v.is_finite()) {
            return Err(TrainError::NonFinite("target"));
        }
        let valid = valid.filter(|(vx, vy)| vx.rows > 0 && vy.len() == vx.rows);
        if let Some((_, vy)) = valid {
            if vy.iter().any(|v| !v.is_finite()) {
                return Err(TrainError::NonFinite("validation target"));
            }
        }

        let num_features = x.columns.len();
        let base_score = y.iter().sum::<f64>() / n as f64;
        let binned = BinnedMatrix::fit(x, params.max_bins);

        let mut pred = vec![base_score; n];
        let mut pred_val = valid.map(|(vx, _)| vec![base_score; vx.rows]);
        let mut grad = vec![0.0; n];
        let mut rng = StdRng::seed_from_u64(params.seed);
        let bagging = params.bagging_fraction < 1.0 && params.bagging_fraction > 0.0;

        let mut trees = Vec::new();
        let mut records: Vec<Vec<SplitRecord>> = Vec::new();
        let mut best_rmse = f64::INFINITY;
        let mut best_round = 0usize;

        for round in 0..params.max_rounds {
            for i in 0..n {
                grad[i] = pred[i] - y[i];
            }

            let rows: Vec<u32> = if bagging {
                let sampled: Vec<u32> = (0..n as u32)
                    .filter(|_| rng.gen::<f64>() < params.bagging_fraction)
                    .collect();
                if sampled.is_empty() { (0..n as u32).collect() } else { sampled }
            } else {
                (0..n as u32).collect()
            };

            let (tree, splits) = grow_tree(&binned, &grad, rows, params);
            let degenerate = splits.is_empty() && !bagging;

            for (i, p) in pred.iter_mut().enumerate() {
                *p += tree.predict_by(|f| x.value(f, i));
            }

            trees.push(tree);
            records.push(splits);

            if let (Some((vx, vy)), Some(pv)) = (valid, pred_val.as_mut()) {
                let last = &trees[trees.len() - 1];
                for (i, p) in pv.iter_mut().enumerate() {
                    *p += last.predict_by(|f| vx.value(f, i));
                }
                let rmse = rmse(pv, vy);
                if rmse < best_rmse {
                    best_rmse = rmse;
                    best_round = round;
                } else if round - best_round >= params.early_stopping_rounds {
                    break;
                }
            }

            if degenerate {
                break;
            }
        }

        let best_validation_rmse = if valid.is_some() && !trees.is_empty() {
            trees.truncate(best_round + 1);
            records.truncate(best_round + 1);
            Some(best_rmse)
        } else {
            None
        };

        let mut split_importance = vec![0.0; num_features];
        let mut gain_importance = vec![0.0; num_features];
        for rec in records.iter().flatten() {
            split_importance[rec.feature] += 1.0;
            gain_importance[rec.feature] += rec.gain;
        }

        Ok(Self {
            base_score,
            trees,
            num_features,
            split_importance,
            gain_importance,
            best_validation_rmse,
        })
    }

    /// Predict one row ordered like the training columns; missing trailing
    /// features read as 0.
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.base_score
            + self
                .trees
                .iter()
                .map(|t| t.predict_by(|f| row.get(f).copied().unwrap_or(0.0)))
                .sum::<f64>()
    }

    pub fn feature_importance(&self, kind: ImportanceKind) -> &[f64] {
        match kind {
            ImportanceKind::Split => &self.split_importance,
            ImportanceKind::Gain => &self.gain_importance,
        }
    }

    /// Assemble a model from already-built trees. Split importance is
    /// counted from the trees; gain is unknown and reported as 0.
    pub fn from_trees(base_score: f64, trees: Vec<RegressionTree>, num_features: usize) -> Self {
        let mut split_importance = vec![0.0; num_features];
        for tree in &trees {
            for node in &tree.nodes {
                if let TreeNode::Split { feature, .. } = node {
                    if let Some(count) = split_importance.get_mut(*feature) {
                        *count += 1.0;
                    }
                }
            }
        }
        Self {
            base_score,
            trees,
            num_features,
            split_importance,
            gain_importance: vec![0.0; num_features],
            best_validation_rmse: None,
        }
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }
}

fn rmse(pred: &[f64], truth: &[f64]) -> f64 {
    let n = pred.len().max(1) as f64;
    let sse: f64 = pred
        .iter()
        .zip(truth)
        .map(|(p, t)| (p - t) * (p - t))
        .sum();
    (sse / n).sqrt()
}

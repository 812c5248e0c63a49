//! CART decision tree used by the analyzers
//!
//! Trees grow depth-first by default. When `max_leaf_nodes` is set the tree
//! grows best-first instead: the frontier node with the largest weighted
//! impurity decrease is split next, until the leaf budget is spent.

use crate::error::{DiagnosticsError, Result};
use ndarray::{Array1, Array2};
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Terminal node
    Leaf {
        value: f64,
        n_samples: usize,
        impurity: f64,
    },
    /// Internal node; samples with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
        impurity: f64,
    },
}

impl TreeNode {
    pub fn n_samples(&self) -> usize {
        match self {
            TreeNode::Leaf { n_samples, .. } | TreeNode::Split { n_samples, .. } => *n_samples,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, TreeNode::Leaf { .. })
    }
}

/// Impurity criterion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Criterion {
    /// Gini impurity (classification)
    Gini,
    /// Shannon entropy (classification)
    Entropy,
    /// Variance (regression)
    MSE,
}

/// Running sufficient statistics for one side of a candidate split
#[derive(Debug, Clone)]
struct SideStats {
    n: usize,
    sum: f64,
    sq_sum: f64,
    class_counts: Vec<usize>,
}

impl SideStats {
    fn empty(n_classes: usize) -> Self {
        Self {
            n: 0,
            sum: 0.0,
            sq_sum: 0.0,
            class_counts: vec![0; n_classes],
        }
    }

    fn add(&mut self, target: f64, class: Option<usize>) {
        self.n += 1;
        self.sum += target;
        self.sq_sum += target * target;
        if let Some(c) = class {
            self.class_counts[c] += 1;
        }
    }

    fn remove(&mut self, target: f64, class: Option<usize>) {
        self.n -= 1;
        self.sum -= target;
        self.sq_sum -= target * target;
        if let Some(c) = class {
            self.class_counts[c] -= 1;
        }
    }

    fn impurity(&self, criterion: Criterion) -> f64 {
        if self.n == 0 {
            return 0.0;
        }
        let n = self.n as f64;
        match criterion {
            Criterion::Gini => {
                1.0 - self
                    .class_counts
                    .iter()
                    .map(|&c| (c as f64 / n).powi(2))
                    .sum::<f64>()
            }
            Criterion::Entropy => -self
                .class_counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / n;
                    p * p.ln()
                })
                .sum::<f64>(),
            Criterion::MSE => (self.sq_sum / n - (self.sum / n).powi(2)).max(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SplitChoice {
    feature_idx: usize,
    threshold: f64,
    /// n_node * (parent impurity - weighted child impurity)
    weighted_gain: f64,
}

/// Node under construction, addressed by arena index
#[derive(Debug)]
struct DraftNode {
    indices: Vec<usize>,
    depth: usize,
    impurity: f64,
    split: Option<SplitChoice>,
    children: Option<(usize, usize)>,
}

/// Decision tree model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    /// Maximum depth (root has depth 0)
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Minimum samples in each child
    pub min_samples_leaf: usize,
    /// Features considered per split; `None` uses all of them
    pub max_features: Option<usize>,
    /// Leaf budget; enables best-first growth
    pub max_leaf_nodes: Option<usize>,
    pub criterion: Criterion,
    /// Seed for per-node feature subsampling
    pub random_state: u64,
    n_features: usize,
    feature_importances: Option<Array1<f64>>,
    is_classification: bool,
    classes: Vec<f64>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new_classifier()
    }
}

impl DecisionTree {
    /// Create a classification tree (Gini)
    pub fn new_classifier() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            max_leaf_nodes: None,
            criterion: Criterion::Gini,
            random_state: 0,
            n_features: 0,
            feature_importances: None,
            is_classification: true,
            classes: Vec::new(),
        }
    }

    /// Create a regression tree (variance reduction)
    pub fn new_regressor() -> Self {
        Self {
            criterion: Criterion::MSE,
            is_classification: false,
            ..Self::new_classifier()
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    pub fn with_max_leaf_nodes(mut self, max_leaf_nodes: usize) -> Self {
        self.max_leaf_nodes = Some(max_leaf_nodes.max(2));
        self
    }

    pub fn with_criterion(mut self, criterion: Criterion) -> Self {
        self.criterion = criterion;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    /// Fit the tree to training data
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        let n_samples = x.nrows();
        let n_features = x.ncols();

        if n_samples != y.len() {
            return Err(DiagnosticsError::length_mismatch("y", n_samples, y.len()));
        }
        if n_samples == 0 || n_features == 0 {
            return Err(DiagnosticsError::ValidationError(format!(
                "cannot fit a tree on a {}x{} matrix",
                n_samples, n_features
            )));
        }
        if x.iter().any(|v| !v.is_finite()) || y.iter().any(|v| !v.is_finite()) {
            return Err(DiagnosticsError::ValidationError(
                "tree inputs must be finite".to_string(),
            ));
        }

        self.n_features = n_features;
        let class_of: Vec<Option<usize>> = if self.is_classification {
            let mut classes: Vec<f64> = y.iter().map(|v| v.round()).collect();
            classes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
            classes.dedup();
            let codes = y
                .iter()
                .map(|v| classes.binary_search_by(|c| c.partial_cmp(&v.round()).unwrap_or(Ordering::Equal)).ok())
                .collect();
            self.classes = classes;
            codes
        } else {
            vec![None; n_samples]
        };

        let mut importances = vec![0.0; n_features];
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);

        let root_indices: Vec<usize> = (0..n_samples).collect();
        let root_impurity = self.stats_for(y, &class_of, &root_indices).impurity(self.criterion);
        let mut arena = vec![DraftNode {
            indices: root_indices,
            depth: 0,
            impurity: root_impurity,
            split: None,
            children: None,
        }];
        let root_split = self.choose_split(x, y, &class_of, &arena[0], &mut rng);
        arena[0].split = root_split;

        let mut frontier: Vec<usize> = vec![0];
        let mut n_leaves = 1usize;

        while !frontier.is_empty() {
            if let Some(budget) = self.max_leaf_nodes {
                if n_leaves >= budget {
                    break;
                }
            }

            // Best-first under a leaf budget, otherwise plain LIFO expansion
            let pos = if self.max_leaf_nodes.is_some() {
                frontier
                    .iter()
                    .enumerate()
                    .filter(|(_, id)| arena[**id].split.is_some())
                    .max_by(|(_, &a), (_, &b)| {
                        let ga = arena[a].split.map_or(0.0, |s| s.weighted_gain);
                        let gb = arena[b].split.map_or(0.0, |s| s.weighted_gain);
                        ga.partial_cmp(&gb).unwrap_or(Ordering::Equal)
                    })
                    .map(|(pos, _)| pos)
            } else {
                frontier.iter().rposition(|&id| arena[id].split.is_some())
            };
            let Some(pos) = pos else { break };
            let node_id = frontier.swap_remove(pos);

            let Some(split) = arena[node_id].split else { continue };
            let depth = arena[node_id].depth;
            let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = arena[node_id]
                .indices
                .iter()
                .partition(|&&i| x[[i, split.feature_idx]] <= split.threshold);

            importances[split.feature_idx] += split.weighted_gain;

            let mut child_ids = [0usize; 2];
            for (slot, indices) in [left_idx, right_idx].into_iter().enumerate() {
                let impurity = self.stats_for(y, &class_of, &indices).impurity(self.criterion);
                let mut child = DraftNode {
                    indices,
                    depth: depth + 1,
                    impurity,
                    split: None,
                    children: None,
                };
                child.split = self.choose_split(x, y, &class_of, &child, &mut rng);
                arena.push(child);
                child_ids[slot] = arena.len() - 1;
                frontier.push(arena.len() - 1);
            }
            arena[node_id].children = Some((child_ids[0], child_ids[1]));
            n_leaves += 1;
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        self.feature_importances = Some(Array1::from_vec(importances));
        self.root = Some(self.assemble(&arena, 0, y, &class_of));

        Ok(self)
    }

    fn stats_for(&self, y: &Array1<f64>, class_of: &[Option<usize>], indices: &[usize]) -> SideStats {
        let mut stats = SideStats::empty(self.classes.len());
        for &i in indices {
            stats.add(y[i], class_of[i]);
        }
        stats
    }

    fn choose_split(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        class_of: &[Option<usize>],
        node: &DraftNode,
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitChoice> {
        let n = node.indices.len();
        let stop = n < self.min_samples_split
            || n < 2 * self.min_samples_leaf
            || self.max_depth.map_or(false, |d| node.depth >= d)
            || node.impurity <= 1e-12;
        if stop {
            return None;
        }

        let candidates: Vec<usize> = match self.max_features {
            Some(k) if k < self.n_features => sample(rng, self.n_features, k).into_vec(),
            _ => (0..self.n_features).collect(),
        };

        candidates
            .into_par_iter()
            .filter_map(|feature_idx| self.best_split_on(x, y, class_of, node, feature_idx))
            .max_by(|a, b| {
                a.weighted_gain
                    .partial_cmp(&b.weighted_gain)
                    .unwrap_or(Ordering::Equal)
                    .then(b.feature_idx.cmp(&a.feature_idx))
            })
    }

    /// Sorted sweep over one feature, moving samples from right to left
    fn best_split_on(
        &self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        class_of: &[Option<usize>],
        node: &DraftNode,
        feature_idx: usize,
    ) -> Option<SplitChoice> {
        let mut order = node.indices.clone();
        order.sort_by(|&a, &b| {
            x[[a, feature_idx]]
                .partial_cmp(&x[[b, feature_idx]])
                .unwrap_or(Ordering::Equal)
        });

        let n = order.len();
        let mut left = SideStats::empty(self.classes.len());
        let mut right = self.stats_for(y, class_of, &order);
        let mut best: Option<SplitChoice> = None;

        for pos in 0..n - 1 {
            let i = order[pos];
            left.add(y[i], class_of[i]);
            right.remove(y[i], class_of[i]);

            let here = x[[i, feature_idx]];
            let next = x[[order[pos + 1], feature_idx]];
            if next - here <= 1e-12 {
                continue;
            }
            if left.n < self.min_samples_leaf || right.n < self.min_samples_leaf {
                continue;
            }

            let child = (left.n as f64 * left.impurity(self.criterion)
                + right.n as f64 * right.impurity(self.criterion))
                / n as f64;
            let weighted_gain = n as f64 * (node.impurity - child);
            if weighted_gain > 1e-12 && best.map_or(true, |b| weighted_gain > b.weighted_gain) {
                best = Some(SplitChoice {
                    feature_idx,
                    threshold: (here + next) / 2.0,
                    weighted_gain,
                });
            }
        }
        best
    }

    fn assemble(&self, arena: &[DraftNode], id: usize, y: &Array1<f64>, class_of: &[Option<usize>]) -> TreeNode {
        let node = &arena[id];
        match (node.children, node.split) {
            (Some((l, r)), Some(split)) => TreeNode::Split {
                feature_idx: split.feature_idx,
                threshold: split.threshold,
                left: Box::new(self.assemble(arena, l, y, class_of)),
                right: Box::new(self.assemble(arena, r, y, class_of)),
                n_samples: node.indices.len(),
                impurity: node.impurity,
            },
            _ => TreeNode::Leaf {
                value: self.leaf_value(y, class_of, &node.indices),
                n_samples: node.indices.len(),
                impurity: node.impurity,
            },
        }
    }

    fn leaf_value(&self, y: &Array1<f64>, class_of: &[Option<usize>], indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        if self.is_classification {
            let stats = self.stats_for(y, class_of, indices);
            // Ties resolve to the smallest class
            let mut best = 0usize;
            for (c, &count) in stats.class_counts.iter().enumerate() {
                if count > stats.class_counts[best] {
                    best = c;
                }
            }
            self.classes.get(best).copied().unwrap_or(0.0)
        } else {
            indices.iter().map(|&i| y[i]).sum::<f64>() / indices.len() as f64
        }
    }

    /// Predict one value per row
    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(DiagnosticsError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(DiagnosticsError::ShapeMismatch {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        Ok(x.rows()
            .into_iter()
            .map(|row| {
                let mut node = root;
                loop {
                    match node {
                        TreeNode::Leaf { value, .. } => break *value,
                        TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                            node = if row[*feature_idx] <= *threshold { left } else { right };
                        }
                    }
                }
            })
            .collect())
    }

    /// Fitted root node, for callers that walk the tree
    pub fn root(&self) -> Option<&TreeNode> {
        self.root.as_ref()
    }

    /// Normalized impurity-decrease importances
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Number of levels, counting a lone root as 1
    pub fn depth(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        self.root.as_ref().map_or(0, walk)
    }

    pub fn n_leaves(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 1,
                TreeNode::Split { left, right, .. } => walk(left) + walk(right),
            }
        }
        self.root.as_ref().map_or(0, walk)
    }
}

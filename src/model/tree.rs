//! Regression trees of a boosted ensemble
//!
//! Nodes are stored flat; children always sit at a higher index than their
//! parent, so every walk from the root terminates and bottom-up passes can
//! simply iterate in reverse.

use serde::{Deserialize, Serialize};

/// Where a missing value goes at a split
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingDirection {
    #[default]
    Left,
    Right,
}

/// A single tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    /// `x[feature] <= threshold` goes left
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default)]
        missing: MissingDirection,
        /// Training samples (or hessian mass) reaching this node
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cover: Option<f64>,
        /// Loss reduction achieved by this split
        #[serde(default, skip_serializing_if = "Option::is_none")]
        gain: Option<f64>,
    },
    Leaf {
        leaf: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cover: Option<f64>,
    },
}

impl Node {
    pub fn cover(&self) -> Option<f64> {
        match self {
            Node::Split { cover, .. } | Node::Leaf { cover, .. } => *cover,
        }
    }
}

/// One boosted tree contributing to the margin of `class`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub class: usize,
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Structural checks against the model's dimensions.
    pub fn validate(&self, num_features: usize, num_classes: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".into());
        }
        if self.class >= num_classes {
            return Err(format!(
                "tree targets class {} but model has {num_classes} classes",
                self.class
            ));
        }

        for (i, node) in self.nodes.iter().enumerate() {
            if let Some(cover) = node.cover() {
                if !cover.is_finite() || cover < 0.0 {
                    return Err(format!("node {i} has invalid cover {cover}"));
                }
            }
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= num_features {
                        return Err(format!(
                            "node {i} splits on feature {feature}, model has {num_features}"
                        ));
                    }
                    if threshold.is_nan() {
                        return Err(format!("node {i} has a NaN threshold"));
                    }
                    for child in [*left, *right] {
                        if child <= i || child >= self.nodes.len() {
                            return Err(format!("node {i} has out-of-order child {child}"));
                        }
                    }
                }
                Node::Leaf { leaf, .. } => {
                    if !leaf.is_finite() {
                        return Err(format!("leaf {i} has non-finite value {leaf}"));
                    }
                }
            }
        }
        Ok(())
    }

    /// Index of the next node on the decision path, or `None` at a leaf.
    #[inline]
    fn step(&self, idx: usize, x: &[Option<f64>]) -> Option<usize> {
        match &self.nodes[idx] {
            Node::Split {
                feature,
                threshold,
                left,
                right,
                missing,
                ..
            } => {
                let go_left = match x[*feature] {
                    Some(v) => v <= *threshold,
                    None => *missing == MissingDirection::Left,
                };
                Some(if go_left { *left } else { *right })
            }
            Node::Leaf { .. } => None,
        }
    }

    /// Leaf value reached by `x`.
    pub fn predict(&self, x: &[Option<f64>]) -> f64 {
        let mut idx = 0;
        while let Some(next) = self.step(idx, x) {
            idx = next;
        }
        match &self.nodes[idx] {
            Node::Leaf { leaf, .. } => *leaf,
            Node::Split { .. } => unreachable!("walk stops only at leaves"),
        }
    }

    /// Cover-weighted expected output of every node.
    ///
    /// Returns `None` when any node lacks a cover.
    pub fn expectations(&self) -> Option<Vec<f64>> {
        let mut expect = vec![0.0; self.nodes.len()];
        let mut covers = vec![0.0; self.nodes.len()];

        for idx in (0..self.nodes.len()).rev() {
            let node = &self.nodes[idx];
            covers[idx] = node.cover()?;
            expect[idx] = match node {
                Node::Leaf { leaf, .. } => *leaf,
                Node::Split { left, right, .. } => {
                    let (cl, cr) = (covers[*left], covers[*right]);
                    if cl + cr > 0.0 {
                        (cl * expect[*left] + cr * expect[*right]) / (cl + cr)
                    } else {
                        0.5 * (expect[*left] + expect[*right])
                    }
                }
            };
        }
        Some(expect)
    }

    /// Add this tree's path attribution for `x` into `out`.
    ///
    /// Each split on the path credits its feature with the change in expected
    /// output; the credits sum to `predict(x) - expect[0]`.
    pub fn attribute(&self, x: &[Option<f64>], expect: &[f64], out: &mut [f64]) {
        let mut idx = 0;
        while let Some(next) = self.step(idx, x) {
            if let Node::Split { feature, .. } = &self.nodes[idx] {
                out[*feature] += expect[next] - expect[idx];
            }
            idx = next;
        }
    }

    /// Add split gains (or split counts when no gain is recorded) per feature.
    pub fn accumulate_importance(&self, out: &mut [f64]) {
        for node in &self.nodes {
            if let Node::Split { feature, gain, .. } = node {
                out[*feature] += gain.unwrap_or(1.0);
            }
        }
    }
}

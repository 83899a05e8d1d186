//! Random-forest classifier artifact.
//!
//! The artifact is a JSON document produced by the training pipeline:
//!
//! ```json
//! {
//!   "feature_names": ["age", "bmi", "diabetes_pedigree_function"],
//!   "classes": [0, 1],
//!   "trees": [
//!     { "nodes": [
//!         { "feature": 1, "threshold": 29.95, "left": 1, "right": 2, "cover": 768 },
//!         { "value": [380, 120], "cover": 500 },
//!         { "value": [120, 148], "cover": 268 }
//!     ] }
//!   ]
//! }
//! ```
//!
//! A split sends a sample left when `x[feature] <= threshold`. Leaf values are
//! class weights and are normalized to probabilities on load. `cover` is the
//! number of training samples that reached the node; Shapley attribution uses
//! it to average over features that are not fixed.

use std::path::Path;

use diabetes_core::FEATURE_NAMES;
use serde::{Deserialize, Serialize};

use crate::error::ModelLoadError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestArtifact {
    pub feature_names: Vec<String>,
    pub classes: Vec<i64>,
    pub trees: Vec<TreeArtifact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeArtifact {
    pub nodes: Vec<NodeArtifact>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeArtifact {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        cover: f64,
    },
    Leaf {
        value: Vec<f64>,
        cover: f64,
    },
}

#[derive(Debug, Clone)]
enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        probabilities: Vec<f64>,
    },
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<TreeNode>,
    covers: Vec<f64>,
}

impl Tree {
    fn from_artifact(
        index: usize,
        artifact: TreeArtifact,
        n_classes: usize,
    ) -> Result<Self, ModelLoadError> {
        if artifact.nodes.is_empty() {
            return Err(ModelLoadError::invalid(format!("tree {index} has no nodes")));
        }

        let len = artifact.nodes.len();
        let mut nodes = Vec::with_capacity(len);
        let mut covers = Vec::with_capacity(len);
        for (position, node) in artifact.nodes.into_iter().enumerate() {
            let at = || format!("tree {index}, node {position}");
            match node {
                NodeArtifact::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    cover,
                } => {
                    if feature >= FEATURE_NAMES.len() {
                        return Err(ModelLoadError::invalid(format!(
                            "{}: split feature {feature} out of range",
                            at()
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(ModelLoadError::invalid(format!("{}: non-finite threshold", at())));
                    }
                    // Children strictly after their parent rules out cycles.
                    for child in [left, right] {
                        if child <= position || child >= len {
                            return Err(ModelLoadError::invalid(format!(
                                "{}: child index {child} out of range",
                                at()
                            )));
                        }
                    }
                    check_cover(cover, &at())?;
                    nodes.push(TreeNode::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    });
                    covers.push(cover);
                }
                NodeArtifact::Leaf { value, cover } => {
                    if value.len() != n_classes {
                        return Err(ModelLoadError::invalid(format!(
                            "{}: leaf has {} class weights, expected {n_classes}",
                            at(),
                            value.len()
                        )));
                    }
                    if value.iter().any(|w| !w.is_finite() || *w < 0.0) {
                        return Err(ModelLoadError::invalid(format!(
                            "{}: leaf weights must be finite and non-negative",
                            at()
                        )));
                    }
                    let total: f64 = value.iter().sum();
                    if total <= 0.0 {
                        return Err(ModelLoadError::invalid(format!("{}: leaf weights sum to zero", at())));
                    }
                    check_cover(cover, &at())?;
                    nodes.push(TreeNode::Leaf {
                        probabilities: value.iter().map(|w| w / total).collect(),
                    });
                    covers.push(cover);
                }
            }
        }
        Ok(Self { nodes, covers })
    }

    fn leaf(&self, x: &[f64; 3]) -> &[f64] {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { probabilities } => return probabilities,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Expected class probabilities when only the features in `known` follow
    /// `x`; splits on any other feature are averaged by training cover.
    fn conditional_expectation(&self, x: &[f64; 3], known: u8) -> Vec<f64> {
        self.expectation_at(0, x, known)
    }

    fn expectation_at(&self, index: usize, x: &[f64; 3], known: u8) -> Vec<f64> {
        match &self.nodes[index] {
            TreeNode::Leaf { probabilities } => probabilities.clone(),
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if known & (1 << feature) != 0 {
                    let next = if x[*feature] <= *threshold { *left } else { *right };
                    return self.expectation_at(next, x, known);
                }
                let (left_cover, right_cover) = (self.covers[*left], self.covers[*right]);
                let total = left_cover + right_cover;
                let left_values = self.expectation_at(*left, x, known);
                let right_values = self.expectation_at(*right, x, known);
                left_values
                    .iter()
                    .zip(&right_values)
                    .map(|(l, r)| (l * left_cover + r * right_cover) / total)
                    .collect()
            }
        }
    }
}

fn check_cover(cover: f64, at: &str) -> Result<(), ModelLoadError> {
    if cover.is_finite() && cover > 0.0 {
        Ok(())
    } else {
        Err(ModelLoadError::invalid(format!("{at}: cover must be positive")))
    }
}

/// Summary of the loaded classifier, surfaced through `get_model_info`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub algorithm: &'static str,
    pub tree_count: usize,
    pub node_count: usize,
    pub classes: Vec<i64>,
    pub feature_names: Vec<String>,
}

/// A validated random forest over the three model features.
#[derive(Debug, Clone)]
pub struct Forest {
    feature_names: Vec<String>,
    classes: Vec<i64>,
    trees: Vec<Tree>,
}

impl Forest {
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ModelLoadError> {
        let artifact: ForestArtifact = serde_json::from_str(raw)?;
        Self::from_artifact(artifact)
    }

    pub fn from_artifact(artifact: ForestArtifact) -> Result<Self, ModelLoadError> {
        let expected: Vec<&str> = FEATURE_NAMES.iter().map(|f| f.as_str()).collect();
        if artifact.feature_names != expected {
            return Err(ModelLoadError::invalid(format!(
                "feature names {:?} do not match {:?}",
                artifact.feature_names, expected
            )));
        }
        if artifact.classes != [0, 1] {
            return Err(ModelLoadError::invalid(format!(
                "expected binary classes [0, 1], got {:?}",
                artifact.classes
            )));
        }
        if artifact.trees.is_empty() {
            return Err(ModelLoadError::invalid("forest has no trees"));
        }

        let n_classes = artifact.classes.len();
        let trees = artifact
            .trees
            .into_iter()
            .enumerate()
            .map(|(index, tree)| Tree::from_artifact(index, tree, n_classes))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            feature_names: artifact.feature_names,
            classes: artifact.classes,
            trees,
        })
    }

    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    /// Mean of the per-tree leaf probabilities.
    pub fn predict_proba(&self, x: &[f64; 3]) -> Vec<f64> {
        let mut sums = vec![0.0; self.class_count()];
        for tree in &self.trees {
            for (sum, p) in sums.iter_mut().zip(tree.leaf(x)) {
                *sum += p;
            }
        }
        let n = self.trees.len() as f64;
        sums.into_iter().map(|s| s / n).collect()
    }

    /// Forest-level conditional expectation for the coalition `known`
    /// (bit `i` set means feature `i` is fixed to `x[i]`).
    pub fn conditional_expectation(&self, x: &[f64; 3], known: u8) -> Vec<f64> {
        let mut sums = vec![0.0; self.class_count()];
        for tree in &self.trees {
            for (sum, p) in sums.iter_mut().zip(tree.conditional_expectation(x, known)) {
                *sum += p;
            }
        }
        let n = self.trees.len() as f64;
        sums.into_iter().map(|s| s / n).collect()
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            algorithm: "random_forest",
            tree_count: self.trees.len(),
            node_count: self.trees.iter().map(|t| t.nodes.len()).sum(),
            classes: self.classes.clone(),
            feature_names: self.feature_names.clone(),
        }
    }
}

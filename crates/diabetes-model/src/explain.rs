//! Shapley-value attribution for the risk forest.
//!
//! [`TreeExplainer`] computes path-dependent tree Shapley values: for every
//! coalition of features it evaluates the forest with those features fixed to
//! the subject's values and the remaining splits averaged by training cover,
//! then combines the coalition values with the exact Shapley weights. With
//! three features that is eight coalitions per subject, so the exact sum is
//! cheaper than any sampling scheme.
//!
//! [`AttributionEngine`] sits on top and owns the contract the tools rely on:
//! the raw output must be two classes by three features, the positive-class row
//! is mapped onto feature names by declared position, and anything else comes
//! back as [`AttributionOutcome::Unavailable`] rather than an error.

use std::fmt;
use std::sync::Arc;

use diabetes_core::{FeatureName, FeatureVector, FEATURE_NAMES};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::forest::Forest;

const POSITIVE_CLASS: usize = 1;
const EXPECTED_CLASSES: usize = 2;

/// Raw explainer output for one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapOutput {
    /// Per-class expected model output (the attribution baseline).
    pub expected_values: Vec<f64>,
    /// Contributions indexed `[class][feature]`.
    pub values: Vec<Vec<f64>>,
}

/// Produces per-class, per-feature Shapley values for a feature row.
pub trait Explainer: Send + Sync {
    fn shap_values(&self, x: &[f64; 3]) -> anyhow::Result<ShapOutput>;
}

/// Exact Shapley values over the forest's own trees.
#[derive(Debug, Clone)]
pub struct TreeExplainer {
    forest: Arc<Forest>,
}

impl TreeExplainer {
    pub fn new(forest: Arc<Forest>) -> Self {
        Self { forest }
    }
}

impl Explainer for TreeExplainer {
    fn shap_values(&self, x: &[f64; 3]) -> anyhow::Result<ShapOutput> {
        let n_features = self.forest.feature_count();
        anyhow::ensure!(n_features <= 8, "too many features for exact Shapley values");
        let coalitions = 1usize << n_features;

        let coalition_values: Vec<Vec<f64>> = (0..coalitions)
            .map(|mask| self.forest.conditional_expectation(x, mask as u8))
            .collect();

        let n_classes = self.forest.class_count();
        let mut values = vec![vec![0.0; n_features]; n_classes];
        for feature in 0..n_features {
            let bit = 1usize << feature;
            for mask in (0..coalitions).filter(|m| m & bit == 0) {
                let weight = shapley_weight(mask.count_ones() as usize, n_features);
                let with = &coalition_values[mask | bit];
                let without = &coalition_values[mask];
                for class in 0..n_classes {
                    values[class][feature] += weight * (with[class] - without[class]);
                }
            }
        }

        Ok(ShapOutput {
            expected_values: coalition_values[0].clone(),
            values,
        })
    }
}

/// `|S|! (M - |S| - 1)! / M!`
fn shapley_weight(coalition_size: usize, n_features: usize) -> f64 {
    factorial(coalition_size) * factorial(n_features - coalition_size - 1) / factorial(n_features)
}

fn factorial(n: usize) -> f64 {
    (1..=n).map(|k| k as f64).product()
}

/// Signed contribution of each feature toward the positive class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Attribution {
    contributions: [f64; 3],
    base_value: f64,
}

impl Attribution {
    pub fn get(&self, feature: FeatureName) -> f64 {
        self.contributions[feature.index()]
    }

    /// Baseline positive-class probability before any feature is known.
    pub fn base_value(&self) -> f64 {
        self.base_value
    }

    /// Contributions in declared feature order.
    pub fn iter(&self) -> impl Iterator<Item = (FeatureName, f64)> + '_ {
        FEATURE_NAMES.iter().map(move |name| (*name, self.get(*name)))
    }

    pub fn total(&self) -> f64 {
        self.contributions.iter().sum()
    }
}

impl Serialize for Attribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(FEATURE_NAMES.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name.as_str(), &value)?;
        }
        map.end()
    }
}

/// Either an attribution or an explicit, explained absence of one.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributionOutcome {
    Available(Attribution),
    Unavailable { reason: String },
}

impl AttributionOutcome {
    pub fn attribution(&self) -> Option<&Attribution> {
        match self {
            AttributionOutcome::Available(attribution) => Some(attribution),
            AttributionOutcome::Unavailable { .. } => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, AttributionOutcome::Available(_))
    }
}

/// Attribution view over the shared forest.
#[derive(Clone)]
pub struct AttributionEngine {
    explainer: Arc<dyn Explainer>,
}

impl fmt::Debug for AttributionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributionEngine").finish_non_exhaustive()
    }
}

impl AttributionEngine {
    pub(crate) fn for_forest(forest: Arc<Forest>) -> Self {
        Self {
            explainer: Arc::new(TreeExplainer::new(forest)),
        }
    }

    /// Use a custom explainer. It must explain the same classifier that serves
    /// predictions; the engine cannot check that.
    pub fn with_explainer(explainer: Arc<dyn Explainer>) -> Self {
        Self { explainer }
    }

    pub fn explain(&self, features: &FeatureVector) -> AttributionOutcome {
        let output = match self.explainer.shap_values(&features.to_array()) {
            Ok(output) => output,
            Err(err) => {
                tracing::warn!(error = %err, "attribution computation failed");
                return AttributionOutcome::Unavailable {
                    reason: format!("attribution computation failed: {err}"),
                };
            }
        };

        if let Err(reason) = check_shape(&output) {
            tracing::warn!(%reason, "unexpected attribution shape");
            return AttributionOutcome::Unavailable { reason };
        }

        let row = &output.values[POSITIVE_CLASS];
        let mut contributions = [0.0; 3];
        for name in FEATURE_NAMES {
            contributions[name.index()] = row[name.index()];
        }
        AttributionOutcome::Available(Attribution {
            contributions,
            base_value: output.expected_values[POSITIVE_CLASS],
        })
    }
}

fn check_shape(output: &ShapOutput) -> Result<(), String> {
    let classes = output.values.len();
    let widths: Vec<usize> = output.values.iter().map(Vec::len).collect();
    if classes != EXPECTED_CLASSES
        || output.expected_values.len() != EXPECTED_CLASSES
        || widths.iter().any(|w| *w != FEATURE_NAMES.len())
    {
        return Err(format!(
            "expected {EXPECTED_CLASSES} classes x {} features, got {classes} classes with widths {widths:?} and {} expected values",
            FEATURE_NAMES.len(),
            output.expected_values.len()
        ));
    }
    let finite = output
        .values
        .iter()
        .flatten()
        .chain(&output.expected_values)
        .all(|v| v.is_finite());
    if !finite {
        return Err("attribution contains non-finite values".to_string());
    }
    Ok(())
}

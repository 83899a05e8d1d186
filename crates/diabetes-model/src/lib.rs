//! Risk Model Adapter and Attribution Engine.
//!
//! The classifier is a random forest loaded once from a JSON artifact
//! ([`forest`]). [`LoadedModel`] owns it behind an `Arc` and hands out the two
//! read-only views the tools use: [`RiskModel`] for prediction and
//! [`AttributionEngine`] for Shapley attribution. Both views share the same
//! forest, so an explanation always describes the model that made the prediction.

pub mod error;
pub mod explain;
pub mod forest;
pub mod risk;

use std::path::Path;
use std::sync::Arc;

pub use error::ModelLoadError;
pub use explain::{
    Attribution, AttributionEngine, AttributionOutcome, Explainer, ShapOutput, TreeExplainer,
};
pub use forest::{Forest, ForestArtifact, ModelInfo, NodeArtifact, TreeArtifact};
pub use risk::{RiskAssessment, RiskBand, RiskModel};

/// The process-wide model, built once during startup and never mutated.
#[derive(Debug, Clone)]
pub struct LoadedModel {
    forest: Arc<Forest>,
}

impl LoadedModel {
    /// Load the artifact. A failure here is fatal: no tool may run without a model.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
        let forest = Forest::load(path.as_ref())?;
        tracing::info!(
            path = %path.as_ref().display(),
            trees = forest.tree_count(),
            "Loaded risk model"
        );
        Ok(Self::from_forest(forest))
    }

    pub fn from_forest(forest: Forest) -> Self {
        Self {
            forest: Arc::new(forest),
        }
    }

    pub fn risk_model(&self) -> RiskModel {
        RiskModel::new(self.forest.clone())
    }

    pub fn attribution_engine(&self) -> AttributionEngine {
        AttributionEngine::for_forest(self.forest.clone())
    }

    pub fn info(&self) -> ModelInfo {
        self.forest.info()
    }
}

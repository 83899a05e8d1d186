//! Domain tools for the diabetes risk agent.
//!
//! This crate provides:
//! - Risk tools: `predict_risk`, `explain_risk`, `predict_and_explain`
//! - Reference tools: `get_guidelines`, `get_model_info`
//! - The reference documents the protocol server publishes as resources
//!
//! All tools built by [`create_diabetes_tools`] share one [`LoadedModel`], so
//! predictions and explanations always come from the same classifier.
//!
//! ```rust,no_run
//! use diabetes_model::LoadedModel;
//! use diabetes_toolkit::diabetes_tool_registry;
//!
//! let model = LoadedModel::load("models/diabetes_forest.json")?;
//! let registry = diabetes_tool_registry(&model);
//! assert!(registry.has("predict_risk"));
//! # Ok::<(), diabetes_model::ModelLoadError>(())
//! ```

pub mod reference;
pub mod risk;
pub mod schema;

use std::sync::Arc;

pub use diabetes_core::tools::{Tool, ToolBox, ToolRegistry, ToolSchema};
use diabetes_model::LoadedModel;

pub use reference::{
    guidelines, model_info, read_reference, reference_documents, GetGuidelinesTool,
    GetModelInfoTool, ReferenceDocument, GUIDELINES_URI, MODEL_INFO_URI,
};
pub use risk::{ExplainRiskTool, PredictAndExplainTool, PredictRiskTool, EXPLANATION_FALLBACK};

/// All five tools over one model.
pub fn create_diabetes_tools(model: &LoadedModel) -> Vec<ToolBox> {
    vec![
        Arc::new(PredictRiskTool::new(model.risk_model())),
        Arc::new(ExplainRiskTool::new(model.attribution_engine())),
        Arc::new(PredictAndExplainTool::new(
            model.risk_model(),
            model.attribution_engine(),
        )),
        Arc::new(GetGuidelinesTool),
        Arc::new(GetModelInfoTool::new(model.info())),
    ]
}

pub fn diabetes_tool_registry(model: &LoadedModel) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register_all(create_diabetes_tools(model));
    registry
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fixture_model;
    use diabetes_core::ToolInvocation;
    use serde_json::json;

    #[test]
    fn registry_exposes_all_tools() {
        let registry = diabetes_tool_registry(&fixture_model());
        assert_eq!(
            registry.names(),
            vec![
                "explain_risk",
                "get_guidelines",
                "get_model_info",
                "predict_and_explain",
                "predict_risk"
            ]
        );
    }

    #[tokio::test]
    async fn invalid_input_becomes_structured_error() {
        let registry = diabetes_tool_registry(&fixture_model());
        let result = registry
            .dispatch(ToolInvocation::new(
                "predict_risk",
                json!({"age": -1, "bmi": 28, "diabetes_pedigree_function": 0.5}),
            ))
            .await;
        assert!(result.output.is_error());
        let payload = result.output.to_json();
        assert_eq!(payload["error"]["kind"], "invalid_feature");
        assert!(payload["error"]["message"].as_str().unwrap().contains("age"));
    }
}

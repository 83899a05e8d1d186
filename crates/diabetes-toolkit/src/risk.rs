//! Prediction and attribution tools.
//!
//! Each tool validates its arguments through [`FeatureVector::from_args`]
//! before touching the model, so an out-of-domain input never reaches the
//! classifier or the explainer.

use async_trait::async_trait;
use diabetes_core::{FeatureVector, Tool, ToolError, ToolSchema};
use diabetes_model::{AttributionEngine, AttributionOutcome, RiskAssessment, RiskModel};
use serde_json::{json, Map, Value};

use crate::schema::{assessment_returns, combined_returns, explanation_returns, feature_parameters};

/// Shown in place of an attribution when the explainer cannot produce one.
pub const EXPLANATION_FALLBACK: &str =
    "Explanation not available for this input. The risk prediction is still valid.";

fn assessment_fields(assessment: &RiskAssessment) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("prediction".into(), json!(assessment.label));
    fields.insert("probability".into(), json!(assessment.probability));
    fields.insert("risk_band".into(), json!(assessment.band()));
    fields
}

fn attribution_fields(outcome: &AttributionOutcome) -> Map<String, Value> {
    let mut fields = Map::new();
    match outcome {
        AttributionOutcome::Available(attribution) => {
            fields.insert("explanation".into(), json!(attribution));
            fields.insert("base_value".into(), json!(attribution.base_value()));
        }
        AttributionOutcome::Unavailable { reason } => {
            fields.insert("unavailable".into(), json!({ "reason": reason }));
            fields.insert("message".into(), json!(EXPLANATION_FALLBACK));
        }
    }
    fields
}

/// `predict_risk`: label, probability, and interpretation band.
pub struct PredictRiskTool {
    model: RiskModel,
}

impl PredictRiskTool {
    pub fn new(model: RiskModel) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Tool for PredictRiskTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "predict_risk",
            "Predict diabetes risk from age, BMI, and diabetes pedigree function. \
             Returns the predicted class (0 or 1) and the probability of diabetes.",
            feature_parameters("Subject features"),
        )
        .with_returns(assessment_returns())
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let features = FeatureVector::from_args(&args)?;
        let assessment = self.model.predict(&features);
        tracing::debug!(
            label = assessment.label,
            probability = assessment.probability,
            "predicted risk"
        );
        Ok(Value::Object(assessment_fields(&assessment)))
    }
}

/// `explain_risk`: per-feature Shapley contributions toward the diabetic class.
pub struct ExplainRiskTool {
    engine: AttributionEngine,
}

impl ExplainRiskTool {
    pub fn new(engine: AttributionEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Tool for ExplainRiskTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "explain_risk",
            "Explain how age, BMI, and diabetes pedigree function each push the predicted \
             diabetes risk up or down (Shapley values; positive means higher risk).",
            feature_parameters("Subject features"),
        )
        .with_returns(explanation_returns())
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let features = FeatureVector::from_args(&args)?;
        let outcome = self.engine.explain(&features);
        Ok(Value::Object(attribution_fields(&outcome)))
    }
}

/// `predict_and_explain`: a prediction, plus attribution only for a positive label.
pub struct PredictAndExplainTool {
    model: RiskModel,
    engine: AttributionEngine,
}

impl PredictAndExplainTool {
    pub fn new(model: RiskModel, engine: AttributionEngine) -> Self {
        Self { model, engine }
    }
}

#[async_trait]
impl Tool for PredictAndExplainTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "predict_and_explain",
            "Predict diabetes risk and, when the subject is classified as diabetic, \
             explain which features drive that risk.",
            feature_parameters("Subject features"),
        )
        .with_returns(combined_returns())
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let features = FeatureVector::from_args(&args)?;
        let assessment = self.model.predict(&features);
        let mut fields = assessment_fields(&assessment);
        if assessment.is_positive() {
            let outcome = self.engine.explain(&features);
            fields.extend(attribution_fields(&outcome));
        }
        Ok(Value::Object(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{counting_engine, fixture_model};
    use diabetes_core::FeatureError;
    use diabetes_model::{Explainer, ShapOutput};
    use std::sync::Arc;

    #[tokio::test]
    async fn predict_risk_reports_label_probability_and_band() {
        let tool = PredictRiskTool::new(fixture_model().risk_model());
        let out = tool
            .execute(json!({"age": 45, "bmi": 28, "diabetes_pedigree_function": 0.5}))
            .await
            .unwrap();
        assert_eq!(out, json!({"prediction": 0, "probability": 0.2, "risk_band": "low"}));

        let again = tool
            .execute(json!({"age": 45, "bmi": 28, "diabetes_pedigree_function": 0.5}))
            .await
            .unwrap();
        assert_eq!(out.to_string(), again.to_string());
    }

    #[tokio::test]
    async fn invalid_age_is_rejected_before_prediction() {
        let (engine, calls) = counting_engine();
        let tool = PredictAndExplainTool::new(fixture_model().risk_model(), engine);
        let err = tool
            .execute(json!({"age": -1, "bmi": 28, "diabetes_pedigree_function": 0.5}))
            .await
            .unwrap_err();
        match err {
            ToolError::InvalidFeature(inner) => {
                assert_eq!(inner.feature(), Some(diabetes_core::FeatureName::Age));
            }
            other => panic!("expected invalid feature, got {other:?}"),
        }
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_argument_names_the_feature() {
        let tool = PredictRiskTool::new(fixture_model().risk_model());
        let err = tool.execute(json!({"age": 45, "bmi": 28})).await.unwrap_err();
        assert!(matches!(
            err,
            ToolError::InvalidFeature(FeatureError::Missing { .. })
        ));
    }

    #[tokio::test]
    async fn explain_risk_returns_named_contributions() {
        let tool = ExplainRiskTool::new(fixture_model().attribution_engine());
        let out = tool
            .execute(json!({"age": 45, "bmi": 35, "diabetes_pedigree_function": 0.5}))
            .await
            .unwrap();
        let explanation = out["explanation"].as_object().unwrap();
        assert_eq!(
            explanation.keys().collect::<Vec<_>>(),
            ["age", "bmi", "diabetes_pedigree_function"]
        );
        // Only BMI splits in the fixture forest.
        assert_eq!(explanation["age"], 0.0);
        assert!(explanation["bmi"].as_f64().unwrap() > 0.0);
        assert!(out.get("unavailable").is_none());
    }

    struct BrokenExplainer;

    impl Explainer for BrokenExplainer {
        fn shap_values(&self, _x: &[f64; 3]) -> anyhow::Result<ShapOutput> {
            Ok(ShapOutput {
                expected_values: vec![0.5],
                values: vec![vec![0.0; 3]],
            })
        }
    }

    #[tokio::test]
    async fn explain_risk_degrades_to_fallback_text() {
        let tool = ExplainRiskTool::new(AttributionEngine::with_explainer(Arc::new(BrokenExplainer)));
        let out = tool
            .execute(json!({"age": 45, "bmi": 35, "diabetes_pedigree_function": 0.5}))
            .await
            .unwrap();
        assert!(out.get("explanation").is_none());
        assert_eq!(out["message"], EXPLANATION_FALLBACK);
        assert!(out["unavailable"]["reason"].as_str().unwrap().contains("classes"));
    }

    #[tokio::test]
    async fn combined_tool_skips_attribution_for_negative_label() {
        let (engine, calls) = counting_engine();
        let tool = PredictAndExplainTool::new(fixture_model().risk_model(), engine);
        let out = tool
            .execute(json!({"age": 45, "bmi": 28, "diabetes_pedigree_function": 0.5}))
            .await
            .unwrap();
        assert_eq!(out["prediction"], 0);
        assert!(out.get("explanation").is_none());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn combined_tool_explains_positive_label_once() {
        let (engine, calls) = counting_engine();
        let tool = PredictAndExplainTool::new(fixture_model().risk_model(), engine);
        let out = tool
            .execute(json!({"age": 45, "bmi": 35, "diabetes_pedigree_function": 0.5}))
            .await
            .unwrap();
        assert_eq!(out["prediction"], 1);
        assert_eq!(out["probability"], 0.8);
        assert_eq!(out["risk_band"], "high");
        assert!(out["explanation"].is_object());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn combined_tool_reports_unavailable_attribution_for_positive_label() {
        let engine = AttributionEngine::with_explainer(Arc::new(BrokenExplainer));
        let tool = PredictAndExplainTool::new(fixture_model().risk_model(), engine);
        let out = tool
            .execute(json!({"age": 45, "bmi": 35, "diabetes_pedigree_function": 0.5}))
            .await
            .unwrap();
        assert_eq!(out["prediction"], 1);
        assert_eq!(out["probability"], 0.8);
        assert!(out.get("explanation").is_none());
        assert!(out["unavailable"]["reason"].is_string());
        assert_eq!(out["message"], EXPLANATION_FALLBACK);
    }
}

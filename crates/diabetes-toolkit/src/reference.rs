//! Static reference documents and the tools that return them.
//!
//! The same documents are published as resources by the protocol server, under
//! [`GUIDELINES_URI`] and [`MODEL_INFO_URI`].

use async_trait::async_trait;
use diabetes_core::{Tool, ToolError, ToolParameterSchema, ToolSchema};
use diabetes_model::ModelInfo;
use serde::Serialize;
use serde_json::{json, Value};

pub const GUIDELINES_URI: &str = "diabetes://guidelines/risk-factors";
pub const MODEL_INFO_URI: &str = "diabetes://model/info";

/// A document addressable by URI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceDocument {
    pub uri: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    #[serde(rename = "mimeType")]
    pub mime_type: &'static str,
}

pub fn reference_documents() -> Vec<ReferenceDocument> {
    vec![
        ReferenceDocument {
            uri: GUIDELINES_URI,
            name: "risk-factors",
            description: "Comprehensive diabetes risk factors and guidelines.",
            mime_type: "application/json",
        },
        ReferenceDocument {
            uri: MODEL_INFO_URI,
            name: "model-info",
            description: "Information about the diabetes prediction model.",
            mime_type: "application/json",
        },
    ]
}

/// Resolve a document URI. `None` for anything not in [`reference_documents`].
pub fn read_reference(uri: &str, info: &ModelInfo) -> Option<Value> {
    match uri {
        GUIDELINES_URI => Some(guidelines()),
        MODEL_INFO_URI => Some(model_info(info)),
        _ => None,
    }
}

pub fn guidelines() -> Value {
    json!({
        "primary_risk_factors": {
            "age": {
                "low_risk": "< 45 years",
                "moderate_risk": "45-54 years",
                "high_risk": "> 55 years",
                "description": "Risk increases with age, especially after 45"
            },
            "bmi": {
                "normal": "18.5-24.9",
                "overweight": "25-29.9",
                "obese": "> 30",
                "description": "Higher BMI significantly increases diabetes risk"
            },
            "diabetes_pedigree_function": {
                "low": "< 0.3",
                "moderate": "0.3-0.6",
                "high": "> 0.6",
                "description": "Genetic predisposition based on family history"
            }
        },
        "interpretation": {
            "probability_ranges": {
                "low_risk": "< 0.3 (30%)",
                "moderate_risk": "0.3-0.7 (30-70%)",
                "high_risk": "> 0.7 (70%)"
            },
            "recommendations": {
                "low_risk": ["Maintain healthy lifestyle", "Regular check-ups"],
                "moderate_risk": ["Lifestyle modifications", "More frequent monitoring"],
                "high_risk": ["Immediate medical consultation", "Comprehensive screening"]
            }
        }
    })
}

pub fn model_info(info: &ModelInfo) -> Value {
    json!({
        "model_type": "Random forest classifier",
        "input_features": [
            "age (years)",
            "bmi (Body Mass Index)",
            "diabetes_pedigree_function (genetic predisposition)"
        ],
        "output": {
            "prediction": "Binary classification (0: No diabetes, 1: Diabetes)",
            "probability": "Confidence score (0-1)",
            "explanation": "Shapley value of each feature toward the diabetic class"
        },
        "usage_notes": [
            "Model trained on historical patient data",
            "Predictions are for screening purposes only",
            "Always consult healthcare professionals for medical decisions",
            "Not suitable for children under 18"
        ],
        "limitations": [
            "Based on limited features",
            "May not capture all risk factors",
            "Cultural and genetic variations not fully accounted for"
        ],
        "loaded_model": info,
    })
}

/// `get_guidelines`: risk-factor bands and interpretation ranges.
pub struct GetGuidelinesTool;

#[async_trait]
impl Tool for GetGuidelinesTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::no_params(
            "get_guidelines",
            "Get diabetes risk-factor guidelines: age, BMI, and pedigree bands, \
             probability interpretation ranges, and recommendations.",
        )
        .with_returns(ToolParameterSchema::object(
            "Risk-factor guidelines",
            [
                (
                    "primary_risk_factors".to_string(),
                    ToolParameterSchema::object("Bands per input feature", Vec::new(), Vec::new()),
                ),
                (
                    "interpretation".to_string(),
                    ToolParameterSchema::object(
                        "Probability ranges and recommendations",
                        Vec::new(),
                        Vec::new(),
                    ),
                ),
            ],
            Vec::new(),
        ))
    }

    async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
        Ok(guidelines())
    }
}

/// `get_model_info`: what the model is, what it is for, and what it cannot do.
pub struct GetModelInfoTool {
    info: ModelInfo,
}

impl GetModelInfoTool {
    pub fn new(info: ModelInfo) -> Self {
        Self { info }
    }
}

#[async_trait]
impl Tool for GetModelInfoTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema::no_params(
            "get_model_info",
            "Describe the diabetes prediction model: inputs, outputs, usage notes, and limitations.",
        )
        .with_returns(ToolParameterSchema::object(
            "Model information",
            Vec::new(),
            Vec::new(),
        ))
    }

    async fn execute(&self, _args: Value) -> Result<Value, ToolError> {
        Ok(model_info(&self.info))
    }
}

//! Shared argument and result schemas for the risk tools.

use diabetes_core::{FeatureName, ToolParameterSchema};
use serde_json::json;

/// `{age, bmi, diabetes_pedigree_function}`, all required numbers.
pub fn feature_parameters(description: &str) -> ToolParameterSchema {
    let properties = [
        (
            FeatureName::Age,
            ToolParameterSchema::number("Age in years").with_keyword("minimum", json!(0)),
        ),
        (
            FeatureName::Bmi,
            ToolParameterSchema::number("Body Mass Index (kg/m^2)")
                .with_keyword("exclusiveMinimum", json!(0)),
        ),
        (
            FeatureName::Pedigree,
            ToolParameterSchema::number(
                "Diabetes pedigree function: genetic predisposition from family history",
            )
            .with_keyword("minimum", json!(0)),
        ),
    ];

    ToolParameterSchema::object(
        description,
        properties
            .into_iter()
            .map(|(name, schema)| (name.as_str().to_string(), schema)),
        vec![
            FeatureName::Age.as_str().to_string(),
            FeatureName::Bmi.as_str().to_string(),
            FeatureName::Pedigree.as_str().to_string(),
        ],
    )
}

fn assessment_properties() -> Vec<(String, ToolParameterSchema)> {
    vec![
        (
            "prediction".to_string(),
            ToolParameterSchema::integer("Binary classification (0: no diabetes, 1: diabetes)"),
        ),
        (
            "probability".to_string(),
            ToolParameterSchema::number("Probability of diabetes, rounded to 4 decimals"),
        ),
        (
            "risk_band".to_string(),
            ToolParameterSchema::string("Interpretation band: low, moderate or high"),
        ),
    ]
}

fn explanation_properties() -> Vec<(String, ToolParameterSchema)> {
    let contributions = ToolParameterSchema::object(
        "Signed contribution of each feature toward the diabetic class",
        [FeatureName::Age, FeatureName::Bmi, FeatureName::Pedigree]
            .into_iter()
            .map(|name| {
                (
                    name.as_str().to_string(),
                    ToolParameterSchema::number(format!("Contribution of {name}")),
                )
            }),
        Vec::new(),
    );
    vec![
        ("explanation".to_string(), contributions),
        (
            "base_value".to_string(),
            ToolParameterSchema::number("Average diabetic-class probability before any feature is known"),
        ),
        (
            "unavailable".to_string(),
            ToolParameterSchema::object(
                "Present instead of `explanation` when attribution could not be computed",
                [(
                    "reason".to_string(),
                    ToolParameterSchema::string("Why attribution is unavailable"),
                )],
                vec!["reason".to_string()],
            ),
        ),
        (
            "message".to_string(),
            ToolParameterSchema::string("Human-readable fallback when attribution is unavailable"),
        ),
    ]
}

pub fn assessment_returns() -> ToolParameterSchema {
    ToolParameterSchema::object(
        "Risk assessment",
        assessment_properties(),
        vec![
            "prediction".to_string(),
            "probability".to_string(),
            "risk_band".to_string(),
        ],
    )
}

pub fn explanation_returns() -> ToolParameterSchema {
    ToolParameterSchema::object("Feature attribution", explanation_properties(), Vec::new())
}

pub fn combined_returns() -> ToolParameterSchema {
    ToolParameterSchema::object(
        "Risk assessment, with attribution when the subject is classified as diabetic",
        assessment_properties()
            .into_iter()
            .chain(explanation_properties()),
        vec![
            "prediction".to_string(),
            "probability".to_string(),
            "risk_band".to_string(),
        ],
    )
}

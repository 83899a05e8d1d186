//! Feature validation: the only admission path for untrusted tool arguments.
//!
//! Every prediction or explanation starts from a [`FeatureVector`], and the only
//! way to build one is [`FeatureVector::validate`] (or [`FeatureVector::from_args`],
//! which parses a JSON argument object and then validates it).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The three model inputs, in the order the classifier was trained on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureName {
    Age,
    Bmi,
    #[serde(rename = "diabetes_pedigree_function")]
    Pedigree,
}

/// Declared feature order. Model columns and attribution vectors index into this.
pub const FEATURE_NAMES: [FeatureName; 3] = [FeatureName::Age, FeatureName::Bmi, FeatureName::Pedigree];

impl FeatureName {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureName::Age => "age",
            FeatureName::Bmi => "bmi",
            FeatureName::Pedigree => "diabetes_pedigree_function",
        }
    }

    /// Position of this feature in [`FEATURE_NAMES`].
    pub fn index(&self) -> usize {
        match self {
            FeatureName::Age => 0,
            FeatureName::Bmi => 1,
            FeatureName::Pedigree => 2,
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            FeatureName::Age => &["age"],
            FeatureName::Bmi => &["bmi"],
            FeatureName::Pedigree => &["diabetes_pedigree_function", "pedigree"],
        }
    }
}

impl fmt::Display for FeatureName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejection reasons for tool arguments.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("missing required feature \"{feature}\"")]
    Missing { feature: FeatureName },

    #[error("\"{feature}\" must be a number, got {value}")]
    NotNumeric { feature: FeatureName, value: String },

    #[error("\"{feature}\" must be finite, got {value}")]
    NonFinite { feature: FeatureName, value: f64 },

    #[error("\"{feature}\" out of domain: {value} (must be {bound})")]
    OutOfDomain {
        feature: FeatureName,
        value: f64,
        bound: &'static str,
    },

    #[error("tool arguments must be a JSON object, got {0}")]
    NotAnObject(String),
}

impl FeatureError {
    pub fn feature(&self) -> Option<FeatureName> {
        match self {
            FeatureError::Missing { feature }
            | FeatureError::NotNumeric { feature, .. }
            | FeatureError::NonFinite { feature, .. }
            | FeatureError::OutOfDomain { feature, .. } => Some(*feature),
            FeatureError::NotAnObject(_) => None,
        }
    }
}

/// Validated model input. Immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureVector {
    age: f64,
    bmi: f64,
    #[serde(rename = "diabetes_pedigree_function")]
    pedigree: f64,
}

impl FeatureVector {
    /// Range-check raw values: all finite, `age >= 0`, `bmi > 0`, `pedigree >= 0`.
    pub fn validate(age: f64, bmi: f64, pedigree: f64) -> Result<Self, FeatureError> {
        check(FeatureName::Age, age, |v| v >= 0.0, ">= 0")?;
        check(FeatureName::Bmi, bmi, |v| v > 0.0, "> 0")?;
        check(FeatureName::Pedigree, pedigree, |v| v >= 0.0, ">= 0")?;
        Ok(Self { age, bmi, pedigree })
    }

    /// Parse a tool argument object and validate it.
    ///
    /// Numbers are accepted as JSON numbers or as numeric strings (language
    /// models frequently quote them). Anything else is rejected.
    pub fn from_args(args: &Value) -> Result<Self, FeatureError> {
        let object = args
            .as_object()
            .ok_or_else(|| FeatureError::NotAnObject(args.to_string()))?;

        let mut values = [0.0_f64; 3];
        for name in FEATURE_NAMES {
            let raw = name
                .aliases()
                .iter()
                .find_map(|alias| object.get(*alias))
                .filter(|v| !v.is_null())
                .ok_or(FeatureError::Missing { feature: name })?;
            values[name.index()] = numeric(name, raw)?;
        }

        Self::validate(values[0], values[1], values[2])
    }

    pub fn age(&self) -> f64 {
        self.age
    }

    pub fn bmi(&self) -> f64 {
        self.bmi
    }

    pub fn pedigree(&self) -> f64 {
        self.pedigree
    }

    pub fn get(&self, name: FeatureName) -> f64 {
        match name {
            FeatureName::Age => self.age,
            FeatureName::Bmi => self.bmi,
            FeatureName::Pedigree => self.pedigree,
        }
    }

    /// Values in [`FEATURE_NAMES`] order.
    pub fn to_array(&self) -> [f64; 3] {
        [self.age, self.bmi, self.pedigree]
    }
}

fn check(
    feature: FeatureName,
    value: f64,
    in_domain: impl Fn(f64) -> bool,
    bound: &'static str,
) -> Result<(), FeatureError> {
    if !value.is_finite() {
        return Err(FeatureError::NonFinite { feature, value });
    }
    if !in_domain(value) {
        return Err(FeatureError::OutOfDomain {
            feature,
            value,
            bound,
        });
    }
    Ok(())
}

fn numeric(feature: FeatureName, raw: &Value) -> Result<f64, FeatureError> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| FeatureError::NotNumeric {
        feature,
        value: raw.to_string(),
    })
}

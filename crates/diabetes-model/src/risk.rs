use std::sync::Arc;

use diabetes_core::FeatureVector;
use serde::{Deserialize, Serialize};

use crate::forest::{Forest, ModelInfo};

/// Decimal places kept on reported probabilities.
pub const PROBABILITY_DECIMALS: i32 = 4;

/// Classifier output for one subject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// 1 when the classifier flags the subject as diabetic.
    pub label: u8,
    /// Probability of the positive class, rounded to four decimals.
    pub probability: f64,
}

impl RiskAssessment {
    pub fn is_positive(&self) -> bool {
        self.label == 1
    }

    pub fn band(&self) -> RiskBand {
        RiskBand::for_probability(self.probability)
    }
}

/// Interpretation bands from the risk-factor guidelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskBand {
    Low,
    Moderate,
    High,
}

impl RiskBand {
    /// `< 0.3` low, `0.3..=0.7` moderate, `> 0.7` high.
    pub fn for_probability(probability: f64) -> Self {
        if probability < 0.3 {
            RiskBand::Low
        } else if probability <= 0.7 {
            RiskBand::Moderate
        } else {
            RiskBand::High
        }
    }
}

/// Read-only prediction view over the shared forest.
#[derive(Debug, Clone)]
pub struct RiskModel {
    forest: Arc<Forest>,
}

impl RiskModel {
    pub(crate) fn new(forest: Arc<Forest>) -> Self {
        Self { forest }
    }

    /// Deterministic prediction. The label follows the forest's own decision
    /// rule: the most probable class, with ties going to class 0.
    pub fn predict(&self, features: &FeatureVector) -> RiskAssessment {
        let proba = self.forest.predict_proba(&features.to_array());
        let (negative, positive) = (proba[0], proba[1]);
        let label = u8::from(positive > negative);
        RiskAssessment {
            label,
            probability: round_probability(positive),
        }
    }

    pub fn info(&self) -> ModelInfo {
        self.forest.info()
    }

    pub(crate) fn forest(&self) -> &Arc<Forest> {
        &self.forest
    }
}

fn round_probability(p: f64) -> f64 {
    let scale = 10f64.powi(PROBABILITY_DECIMALS);
    ((p * scale).round() / scale).clamp(0.0, 1.0)
}

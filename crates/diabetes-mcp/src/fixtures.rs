//! Shared test fixtures.

use diabetes_model::{Forest, LoadedModel};

use crate::server::McpServer;

/// One split on bmi at 30: below predicts 0.2, above predicts 0.8.
pub(crate) const FOREST: &str = r#"{
    "feature_names": ["age", "bmi", "diabetes_pedigree_function"],
    "classes": [0, 1],
    "trees": [ { "nodes": [
        { "feature": 1, "threshold": 30.0, "left": 1, "right": 2, "cover": 100 },
        { "value": [8, 2], "cover": 60 },
        { "value": [2, 8], "cover": 40 }
    ] } ]
}"#;

pub(crate) fn fixture_model() -> LoadedModel {
    LoadedModel::from_forest(Forest::from_json_str(FOREST).unwrap())
}

pub(crate) fn fixture_server() -> McpServer {
    McpServer::new(&fixture_model())
}

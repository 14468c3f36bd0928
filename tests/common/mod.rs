//! Common test utilities for prediction tests
//!
//! Model artifact fixtures written to temporary directories, and helpers
//! for reading the Prometheus exposition output.

#![allow(dead_code)]

use failure_predictor::config::ModelConfig;
use failure_predictor::ml::PredictionService;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use tempfile::TempDir;

pub const CLASSES: [&str; 3] = ["No Failure", "Heat Dissipation Failure", "Overstrain Failure"];

pub const COLUMNS: [&str; 7] = [
    "Air temperature [K]",
    "Process temperature [K]",
    "Rotational speed [rpm]",
    "Torque [Nm]",
    "Tool wear [min]",
    "Type_L",
    "Type_M",
];

/// Decision tree on torque then tool wear.
///
/// - torque <= 50: 85% no failure, 10% heat, 5% overstrain
/// - torque > 50 and tool wear <= 150: 60/10/30
/// - torque > 50 and tool wear > 150: 20/10/70
pub fn tree_artifact() -> Value {
    json!({
        "format_version": 1,
        "name": "failure-type-tree",
        "version": "2024.1",
        "classes": CLASSES,
        "feature_names_in": COLUMNS,
        "params": {
            "kind": "decision_tree",
            "nodes": [
                {"type": "split", "feature": 3, "threshold": 50.0, "left": 1, "right": 2},
                {"type": "leaf", "value": [85.0, 10.0, 5.0]},
                {"type": "split", "feature": 4, "threshold": 150.0, "left": 3, "right": 4},
                {"type": "leaf", "value": [60.0, 10.0, 30.0]},
                {"type": "leaf", "value": [20.0, 10.0, 70.0]}
            ]
        }
    })
}

/// Three-class logistic regression without recorded feature names
pub fn logistic_artifact() -> Value {
    json!({
        "format_version": 1,
        "name": "failure-type-logit",
        "classes": CLASSES,
        "n_features_in": 7,
        "params": {
            "kind": "logistic_regression",
            "coefficients": [
                [0.0, 0.0, 0.0, -0.10, -0.01, 0.0, 0.0],
                [0.0, 0.0, 0.0, 0.00, 0.00, 0.0, 0.0],
                [0.0, 0.0, 0.0, 0.05, 0.01, 0.0, 0.0]
            ],
            "intercepts": [6.0, 0.0, -2.0]
        }
    })
}

/// Nearest centroid model: predicts labels only
pub fn centroid_artifact() -> Value {
    json!({
        "format_version": 1,
        "name": "failure-type-centroid",
        "classes": ["No Failure", "Overstrain Failure"],
        "feature_names_in": ["Torque [Nm]", "Tool wear [min]"],
        "params": {
            "kind": "nearest_centroid",
            "centroids": [[35.0, 80.0], [65.0, 220.0]]
        }
    })
}

/// Temporary directory holding model artifacts
pub struct ArtifactDir {
    dir: TempDir,
}

impl ArtifactDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("create temp dir"),
        }
    }

    /// Write `artifact` as JSON and return its path
    pub fn write(&self, name: &str, artifact: &Value) -> PathBuf {
        self.write_bytes(name, serde_json::to_vec_pretty(artifact).unwrap().as_slice())
    }

    pub fn write_bytes(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, bytes).expect("write artifact");
        path
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Model configuration pointing at `path`
pub fn model_config(path: PathBuf) -> ModelConfig {
    ModelConfig {
        path,
        ..Default::default()
    }
}

/// Prediction service over the decision tree fixture
pub fn tree_service() -> PredictionService {
    let dir = ArtifactDir::new();
    let path = dir.write("tree.json", &tree_artifact());
    PredictionService::from_config(&model_config(path)).expect("load tree fixture")
}

/// Parse Prometheus exposition format into metric name -> lines
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics = HashMap::new();
    let mut current_metric = String::new();

    for line in output.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with("# HELP") || line.starts_with("# TYPE") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 3 {
                current_metric = parts[2].to_string();
            }
        } else if !current_metric.is_empty() {
            metrics
                .entry(current_metric.clone())
                .or_insert_with(Vec::new)
                .push(line.to_string());
        }
    }

    metrics
}

/// Value of a sample line, e.g. `metric{a="1"} 42.5` -> Some(42.5)
pub fn extract_metric_value(line: &str) -> Option<f64> {
    line.split_whitespace().last()?.parse::<f64>().ok()
}

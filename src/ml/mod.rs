/// Failure prediction from machine sensor readings
///
/// This module provides:
/// - Feature reconciliation of loosely typed input against a model's schema
/// - Classifier artifacts (logistic regression, decision tree, nearest centroid)
/// - An inference adapter exposing optional capabilities uniformly
/// - Aggregate failure risk and threshold alerting

pub mod adapter;
pub mod classifier;
pub mod features;
pub mod models;
pub mod risk;
pub mod service;

pub use adapter::{InferenceAdapter, ModelCapabilities, SchemaSource};
pub use classifier::{
    from_artifact, from_bytes, load_classifier, Classifier, DecisionTreeClassifier,
    LogisticRegressionClassifier, NearestCentroidClassifier,
};
pub use features::{coerce, reconcile, FeatureReconciler, FeatureSchema, FeatureVector, NEUTRAL_DEFAULT};
pub use models::{
    ClassDistribution, ClassProbability, ModelArtifact, ModelMetadata, ModelParams, ModelType,
    TreeNode, ARTIFACT_FORMAT_VERSION, DEFAULT_NO_FAILURE_LABEL, DEFAULT_RISK_THRESHOLD,
};
pub use risk::{aggregate_failure_risk, RiskAssessment, RiskPolicy};
pub use service::{ModelInfo, PredictionReport, PredictionService};

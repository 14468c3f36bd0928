use crate::config::ModelConfig;
use crate::error::Result;
use crate::metrics::{
    MODEL_INFO, PREDICTIONS_TOTAL, PREDICTION_DURATION_SECONDS, PREDICTION_ERRORS_TOTAL,
    RISK_WARNINGS_TOTAL,
};
use crate::ml::adapter::{InferenceAdapter, ModelCapabilities, SchemaSource};
use crate::ml::classifier::{load_classifier, Classifier};
use crate::ml::features::{FeatureReconciler, FeatureVector};
use crate::ml::models::{ClassProbability, ModelMetadata};
use crate::ml::risk::{RiskAssessment, RiskPolicy};
use crate::models::{RawFields, SensorReading};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of one prediction request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionReport {
    /// Request identifier
    pub id: Uuid,

    /// When the prediction was made
    pub predicted_at: DateTime<Utc>,

    /// Predicted failure category
    pub label: String,

    /// Class probabilities in classifier order, when available
    pub probabilities: Option<Vec<ClassProbability>>,

    /// Aggregate risk, when probabilities are available
    pub risk: Option<RiskAssessment>,

    /// Reconciled input, as (feature name, value) in schema order
    pub features: Vec<(String, f64)>,
}

/// Description of the loaded model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(flatten)]
    pub metadata: ModelMetadata,
    pub classes: Vec<String>,
    pub feature_schema: Vec<String>,
    pub schema_source: SchemaSource,
    pub capabilities: ModelCapabilities,
    pub no_failure_label: String,
    pub risk_threshold: f64,
}

/// Reconcile, predict and assess risk for incoming readings
pub struct PredictionService {
    reconciler: FeatureReconciler,
    adapter: InferenceAdapter,
    risk_policy: RiskPolicy,
}

impl PredictionService {
    /// Create a service around an already built adapter
    pub fn new(adapter: InferenceAdapter, risk_policy: RiskPolicy) -> Self {
        let service = Self {
            reconciler: FeatureReconciler::new(adapter.schema().clone()),
            adapter,
            risk_policy,
        };
        service.check_no_failure_label();
        service.publish_model_info();
        service
    }

    /// Create a service around a classifier
    pub fn with_classifier(
        classifier: Arc<dyn Classifier>,
        config: &ModelConfig,
    ) -> Result<Self> {
        let adapter = InferenceAdapter::new(classifier, config.fallback_schema()?)?;
        Ok(Self::new(adapter, config.risk_policy()?))
    }

    /// Load the configured artifact and build the service
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let classifier = load_classifier(&config.path)?;
        Self::with_classifier(classifier, config)
    }

    fn check_no_failure_label(&self) {
        if !self.adapter.capabilities().predict_proba {
            info!("Model provides no labelled probabilities; risk alerting disabled");
            return;
        }

        let label = self.risk_policy.no_failure_label();
        if !self.adapter.labels().iter().any(|l| l == label) {
            warn!(
                no_failure_label = %label,
                classes = ?self.adapter.labels(),
                "No-failure label is not among the model classes; predictions will fail risk assessment"
            );
        }
    }

    fn publish_model_info(&self) {
        let metadata = self.adapter.metadata();
        MODEL_INFO
            .with_label_values(&[
                metadata.name.as_str(),
                &metadata.model_type.to_string(),
                metadata.digest.as_deref().unwrap_or("unknown"),
            ])
            .set(1.0);
    }

    pub fn adapter(&self) -> &InferenceAdapter {
        &self.adapter
    }

    pub fn risk_policy(&self) -> &RiskPolicy {
        &self.risk_policy
    }

    pub fn model_info(&self) -> ModelInfo {
        ModelInfo {
            metadata: self.adapter.metadata().clone(),
            classes: self.adapter.labels().to_vec(),
            feature_schema: self.adapter.schema().names().to_vec(),
            schema_source: self.adapter.schema_source(),
            capabilities: self.adapter.capabilities(),
            no_failure_label: self.risk_policy.no_failure_label().to_string(),
            risk_threshold: self.risk_policy.threshold(),
        }
    }

    /// Predict from a typed sensor reading
    pub fn predict_reading(&self, reading: &SensorReading) -> Result<PredictionReport> {
        self.predict_fields(&reading.to_raw_fields())
    }

    /// Predict from loosely typed named fields
    pub fn predict_fields(&self, fields: &RawFields) -> Result<PredictionReport> {
        let model_type = self.adapter.metadata().model_type.to_string();
        let timer = Instant::now();

        let result = self.run(fields);

        PREDICTION_DURATION_SECONDS
            .with_label_values(&[model_type.as_str()])
            .observe(timer.elapsed().as_secs_f64());

        match &result {
            Ok(report) => {
                PREDICTIONS_TOTAL
                    .with_label_values(&[report.label.as_str()])
                    .inc();
            }
            Err(e) => {
                PREDICTION_ERRORS_TOTAL
                    .with_label_values(&[e.error_code()])
                    .inc();
            }
        }

        result
    }

    fn run(&self, fields: &RawFields) -> Result<PredictionReport> {
        let vector = self.reconciler.reconcile(fields)?;
        let label = self.adapter.predict(&vector)?;

        let (probabilities, risk) = if self.adapter.capabilities().predict_proba {
            let distribution = self.adapter.predict_proba(&vector)?;
            let risk = self.risk_policy.assess(&distribution)?;
            (Some(distribution.entries().to_vec()), Some(risk))
        } else {
            (None, None)
        };

        let report = PredictionReport {
            id: Uuid::new_v4(),
            predicted_at: Utc::now(),
            label,
            probabilities,
            risk,
            features: named_values(&vector),
        };

        match &report.risk {
            Some(risk) if risk.warning => {
                RISK_WARNINGS_TOTAL.inc();
                warn!(
                    prediction_id = %report.id,
                    label = %report.label,
                    aggregate_risk = risk.aggregate_risk,
                    threshold = risk.threshold,
                    "Aggregate failure risk above threshold"
                );
            }
            _ => {
                debug!(prediction_id = %report.id, label = %report.label, "Prediction complete");
            }
        }

        Ok(report)
    }
}

fn named_values(vector: &FeatureVector) -> Vec<(String, f64)> {
    vector
        .names()
        .iter()
        .cloned()
        .zip(vector.values().iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::ml::classifier::from_artifact;
    use crate::ml::models::ModelArtifact;
    use crate::models::{columns, ProductType};
    use serde_json::json;

    /// Tree splitting on torque: low torque is mostly healthy, high torque
    /// is mostly overstrained.
    fn torque_tree(classes: serde_json::Value) -> Arc<dyn Classifier> {
        let artifact: ModelArtifact = serde_json::from_value(json!({
            "format_version": 1,
            "name": "torque-tree",
            "classes": classes,
            "n_features_in": 7,
            "params": {
                "kind": "decision_tree",
                "nodes": [
                    {"type": "split", "feature": 3, "threshold": 50.0, "left": 1, "right": 2},
                    {"type": "leaf", "value": [85.0, 15.0]},
                    {"type": "leaf", "value": [40.0, 60.0]}
                ]
            }
        }))
        .unwrap();
        from_artifact(artifact, None, None).unwrap()
    }

    fn service() -> PredictionService {
        PredictionService::with_classifier(
            torque_tree(json!(["No Failure", "Overstrain Failure"])),
            &ModelConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_low_torque_no_warning() {
        let report = service().predict_reading(&SensorReading::default()).unwrap();

        assert_eq!(report.label, "No Failure");
        let risk = report.risk.unwrap();
        assert!((risk.aggregate_risk - 0.15).abs() < 1e-9);
        assert!(!risk.warning);
        assert_eq!(report.probabilities.unwrap().len(), 2);
    }

    #[test]
    fn test_high_torque_warns() {
        let reading = SensorReading {
            torque_nm: 70.0,
            product_type: ProductType::L,
            ..Default::default()
        };
        let report = service().predict_reading(&reading).unwrap();

        assert_eq!(report.label, "Overstrain Failure");
        assert!(report.risk.unwrap().warning);
        assert_eq!(report.features.len(), 7);
        assert_eq!(report.features[5], (columns::TYPE_L.to_string(), 1.0));
    }

    #[test]
    fn test_product_type_h_maps_to_zero_flags() {
        let reading = SensorReading {
            product_type: ProductType::H,
            ..Default::default()
        };
        let report = service().predict_reading(&reading).unwrap();

        assert_eq!(report.features[5].1, 0.0);
        assert_eq!(report.features[6].1, 0.0);
    }

    #[test]
    fn test_raw_fields_schema_mismatch() {
        let fields = RawFields::new().with(columns::TORQUE, "heavy");
        let err = service().predict_fields(&fields).unwrap_err();
        assert_eq!(err.field(), Some(columns::TORQUE));
    }

    #[test]
    fn test_missing_no_failure_label_surfaces() {
        let service = PredictionService::with_classifier(
            torque_tree(json!(["Normal", "Overstrain Failure"])),
            &ModelConfig::default(),
        )
        .unwrap();

        assert!(matches!(
            service.predict_reading(&SensorReading::default()),
            Err(AppError::LabelNotFound(_))
        ));
    }

    #[test]
    fn test_unlabelled_model_skips_risk() {
        let artifact: ModelArtifact = serde_json::from_value(json!({
            "format_version": 1,
            "name": "unlabelled",
            "params": {
                "kind": "logistic_regression",
                "coefficients": [[0.0, 0.0, 0.0, 0.1, 0.0, 0.0, 0.0]],
                "intercepts": [-4.0]
            }
        }))
        .unwrap();
        let service = PredictionService::with_classifier(
            from_artifact(artifact, None, None).unwrap(),
            &ModelConfig::default(),
        )
        .unwrap();

        let report = service.predict_reading(&SensorReading::default()).unwrap();
        assert_eq!(report.label, "0");
        assert!(report.probabilities.is_none());
        assert!(report.risk.is_none());
    }

    #[test]
    fn test_model_info() {
        let info = service().model_info();
        assert_eq!(info.metadata.name, "torque-tree");
        assert_eq!(info.schema_source, SchemaSource::Default);
        assert_eq!(info.feature_schema.len(), 7);
        assert!(info.capabilities.predict_proba);
        assert_eq!(info.risk_threshold, 0.20);
    }
}

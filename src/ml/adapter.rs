use crate::error::{AppError, Result};
use crate::ml::classifier::Classifier;
use crate::ml::features::{FeatureSchema, FeatureVector};
use crate::ml::models::{ClassDistribution, ModelMetadata};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Optional classifier capabilities, detected when the adapter is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCapabilities {
    /// Probability estimates can be produced and labelled
    pub predict_proba: bool,

    /// Class labels are recorded
    pub classes: bool,

    /// Feature names are recorded
    pub feature_names_in: bool,
}

/// Where the adapter's feature schema came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaSource {
    /// The model's own `feature_names_in`
    Model,
    /// Supplied by configuration
    Configured,
    /// Built-in column list
    Default,
}

/// Uniform front over a loaded classifier
pub struct InferenceAdapter {
    classifier: Arc<dyn Classifier>,
    schema: FeatureSchema,
    schema_source: SchemaSource,
    labels: Vec<String>,
    capabilities: ModelCapabilities,
}

impl InferenceAdapter {
    /// Wrap `classifier`, settling its feature schema.
    ///
    /// The model's recorded feature names take precedence over `fallback`;
    /// with neither, the built-in column list is used. The schema width must
    /// match the model's input width.
    pub fn new(classifier: Arc<dyn Classifier>, fallback: Option<FeatureSchema>) -> Result<Self> {
        let (schema, schema_source) = match classifier.feature_names_in() {
            Some(names) => {
                let schema = FeatureSchema::new(names.iter().cloned()).map_err(|e| {
                    AppError::ModelUnavailable(format!("invalid model feature names: {}", e))
                })?;
                if fallback.as_ref().is_some_and(|f| f != &schema) {
                    warn!("Configured feature schema ignored in favour of the model's feature names");
                }
                (schema, SchemaSource::Model)
            }
            None => match fallback {
                Some(schema) => (schema, SchemaSource::Configured),
                None => (FeatureSchema::default_columns(), SchemaSource::Default),
            },
        };

        if schema.len() != classifier.n_features() {
            return Err(AppError::ModelUnavailable(format!(
                "feature schema has {} names but the model expects {} features",
                schema.len(),
                classifier.n_features()
            )));
        }

        let labels = match classifier.classes() {
            Some(classes) => classes.to_vec(),
            None => (0..classifier.n_classes()).map(|i| i.to_string()).collect(),
        };

        let capabilities = ModelCapabilities {
            predict_proba: classifier.supports_proba() && classifier.classes().is_some(),
            classes: classifier.classes().is_some(),
            feature_names_in: classifier.feature_names_in().is_some(),
        };

        info!(
            model = %classifier.metadata().name,
            schema_source = ?schema_source,
            n_features = schema.len(),
            predict_proba = capabilities.predict_proba,
            "Inference adapter ready"
        );

        Ok(Self {
            classifier,
            schema,
            schema_source,
            labels,
            capabilities,
        })
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn schema_source(&self) -> SchemaSource {
        self.schema_source
    }

    pub fn capabilities(&self) -> ModelCapabilities {
        self.capabilities
    }

    /// Class labels in classifier order (indices when none are recorded)
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Class labels as recorded by the model
    pub fn classes(&self) -> Option<&[String]> {
        self.classifier.classes()
    }

    /// Feature names as recorded by the model
    pub fn feature_names_in(&self) -> Option<&[String]> {
        self.classifier.feature_names_in()
    }

    pub fn metadata(&self) -> &ModelMetadata {
        self.classifier.metadata()
    }

    fn check_alignment(&self, vector: &FeatureVector) -> Result<()> {
        if !vector.is_aligned_with(&self.schema) {
            return Err(AppError::Internal(
                "feature vector is not aligned with the model schema".to_string(),
            ));
        }
        Ok(())
    }

    /// Predict the label for a reconciled vector
    pub fn predict(&self, vector: &FeatureVector) -> Result<String> {
        self.check_alignment(vector)?;
        let idx = self.classifier.predict(vector.values())?;

        self.labels.get(idx).cloned().ok_or_else(|| {
            AppError::Internal(format!(
                "classifier returned class index {} of {}",
                idx,
                self.labels.len()
            ))
        })
    }

    /// Probability of each class, labelled by position in classifier order
    pub fn predict_proba(&self, vector: &FeatureVector) -> Result<ClassDistribution> {
        if !self.capabilities.predict_proba {
            let reason = if self.classifier.supports_proba() {
                "model does not record class labels for its probability estimates"
            } else {
                "model does not provide probability estimates"
            };
            return Err(AppError::CapabilityUnavailable(reason.to_string()));
        }

        self.check_alignment(vector)?;
        let proba = self.classifier.predict_proba(vector.values())?;
        ClassDistribution::from_parts(&self.labels, &proba.to_vec())
    }
}

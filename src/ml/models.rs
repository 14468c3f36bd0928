use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};

/// Artifact format version understood by this build
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Label of the class that denotes normal operation
pub const DEFAULT_NO_FAILURE_LABEL: &str = "No Failure";

/// Aggregate risk above which a warning is raised
pub const DEFAULT_RISK_THRESHOLD: f64 = 0.20;

/// Allowed deviation of a probability distribution's total from 1.0
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Serialized classifier as stored on disk.
///
/// Mirrors the attributes a fitted estimator exposes: optional `classes`
/// and `feature_names_in`, plus the family-specific parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Artifact format version
    pub format_version: u32,

    /// Model name
    pub name: String,

    /// Model version
    #[serde(default)]
    pub version: Option<String>,

    /// Ordered class labels
    #[serde(default)]
    pub classes: Option<Vec<String>>,

    /// Ordered feature names the model was fitted on
    #[serde(default)]
    pub feature_names_in: Option<Vec<String>>,

    /// Number of input features, when names are not recorded
    #[serde(default)]
    pub n_features_in: Option<usize>,

    /// Estimator parameters
    pub params: ModelParams,
}

impl ModelArtifact {
    /// Parse an artifact from raw bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| AppError::ModelUnavailable(format!("corrupt model artifact: {}", e)))
    }

    /// Serialize the artifact as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn model_type(&self) -> ModelType {
        self.params.model_type()
    }
}

/// Estimator parameters, one variant per supported family
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelParams {
    /// Linear model; a single coefficient row means a binary problem
    LogisticRegression {
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    },

    /// CART tree stored as a flat node array rooted at index 0
    DecisionTree { nodes: Vec<TreeNode> },

    /// One centroid per class
    NearestCentroid { centroids: Vec<Vec<f64>> },
}

impl ModelParams {
    pub fn model_type(&self) -> ModelType {
        match self {
            ModelParams::LogisticRegression { .. } => ModelType::LogisticRegression,
            ModelParams::DecisionTree { .. } => ModelType::DecisionTree,
            ModelParams::NearestCentroid { .. } => ModelType::NearestCentroid,
        }
    }
}

/// Decision tree node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    /// Go left when `x[feature] <= threshold`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },

    /// Per-class sample counts (or weights)
    Leaf { value: Vec<f64> },
}

/// Model type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Logistic regression
    LogisticRegression,

    /// Decision tree
    DecisionTree,

    /// Nearest centroid
    NearestCentroid,
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelType::LogisticRegression => write!(f, "Logistic Regression"),
            ModelType::DecisionTree => write!(f, "Decision Tree"),
            ModelType::NearestCentroid => write!(f, "Nearest Centroid"),
        }
    }
}

/// Model metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,

    /// Model version
    pub version: Option<String>,

    /// Model type
    pub model_type: ModelType,

    /// Number of input features
    pub n_features: usize,

    /// Number of classes
    pub n_classes: usize,

    /// SHA-256 of the artifact bytes
    pub digest: Option<String>,

    /// Where the artifact was loaded from
    pub source: Option<String>,

    /// Load timestamp
    pub loaded_at: chrono::DateTime<chrono::Utc>,
}

/// Probability assigned to one class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassProbability {
    pub label: String,
    pub probability: f64,
}

/// Probability distribution over a classifier's labels, in the
/// classifier's own class order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ClassProbability>", into = "Vec<ClassProbability>")]
pub struct ClassDistribution {
    entries: Vec<ClassProbability>,
}

impl TryFrom<Vec<ClassProbability>> for ClassDistribution {
    type Error = AppError;

    fn try_from(entries: Vec<ClassProbability>) -> Result<Self> {
        let distribution = Self { entries };
        distribution.validate()?;
        Ok(distribution)
    }
}

impl From<ClassDistribution> for Vec<ClassProbability> {
    fn from(distribution: ClassDistribution) -> Self {
        distribution.entries
    }
}

impl ClassDistribution {
    /// Zip labels with probabilities by position and validate the result
    pub fn from_parts(labels: &[String], probabilities: &[f64]) -> Result<Self> {
        if labels.len() != probabilities.len() {
            return Err(AppError::Internal(format!(
                "{} labels but {} probabilities",
                labels.len(),
                probabilities.len()
            )));
        }

        Self::from_pairs(
            labels
                .iter()
                .cloned()
                .zip(probabilities.iter().copied()),
        )
    }

    /// Build from `(label, probability)` pairs, keeping their order
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let entries: Vec<ClassProbability> = pairs
            .into_iter()
            .map(|(label, probability)| ClassProbability {
                label: label.into(),
                probability,
            })
            .collect();

        Self::try_from(entries)
    }

    fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(AppError::Internal("empty class distribution".to_string()));
        }

        for entry in &self.entries {
            let p = entry.probability;
            if !p.is_finite() || !(0.0..=1.0).contains(&p) {
                return Err(AppError::Internal(format!(
                    "probability {} for '{}' outside [0, 1]",
                    p, entry.label
                )));
            }
        }

        let total: f64 = self.entries.iter().map(|e| e.probability).sum();
        if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
            return Err(AppError::Internal(format!(
                "class probabilities sum to {}, expected 1.0",
                total
            )));
        }

        Ok(())
    }

    /// Probability of a label, if the label is known
    pub fn get(&self, label: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.label == label)
            .map(|e| e.probability)
    }

    /// Most probable entry; ties resolve to the earliest class
    pub fn most_likely(&self) -> &ClassProbability {
        let mut best = &self.entries[0];
        for entry in &self.entries[1..] {
            if entry.probability > best.probability {
                best = entry;
            }
        }
        best
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClassProbability> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[ClassProbability] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|e| e.probability).sum()
    }
}

use crate::error::{AppError, Result};
use crate::ml::models::{
    ModelArtifact, ModelMetadata, ModelParams, ModelType, TreeNode, ARTIFACT_FORMAT_VERSION,
};
use ndarray::{Array1, Array2};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Fitted classifier, treated as a read-only function of its input.
///
/// `predict` is mandatory; probability estimates, class labels and feature
/// names are optional capabilities an implementation may not have.
pub trait Classifier: Send + Sync {
    /// Predict the class index for one feature vector
    fn predict(&self, features: &Array1<f64>) -> Result<usize>;

    /// Predict class probabilities for one feature vector
    fn predict_proba(&self, _features: &Array1<f64>) -> Result<Array1<f64>> {
        Err(AppError::CapabilityUnavailable(format!(
            "{} does not provide probability estimates",
            self.model_type()
        )))
    }

    /// Whether `predict_proba` is implemented
    fn supports_proba(&self) -> bool {
        false
    }

    /// Ordered class labels, if recorded
    fn classes(&self) -> Option<&[String]> {
        None
    }

    /// Ordered feature names the model was fitted on, if recorded
    fn feature_names_in(&self) -> Option<&[String]> {
        None
    }

    /// Number of input features
    fn n_features(&self) -> usize;

    /// Number of classes
    fn n_classes(&self) -> usize;

    /// Get model metadata
    fn metadata(&self) -> &ModelMetadata;

    /// Get model type
    fn model_type(&self) -> ModelType;
}

/// Attributes shared by every artifact-backed classifier
#[derive(Debug, Clone)]
struct Fitted {
    metadata: ModelMetadata,
    classes: Option<Vec<String>>,
    feature_names_in: Option<Vec<String>>,
}

impl Fitted {
    fn check_input(&self, features: &Array1<f64>) -> Result<()> {
        if features.len() != self.metadata.n_features {
            return Err(AppError::Internal(format!(
                "{} expects {} features, got {}",
                self.metadata.name,
                self.metadata.n_features,
                features.len()
            )));
        }
        Ok(())
    }

    /// Reject intermediate results that overflowed for this input
    fn check_finite(&self, values: &Array1<f64>, what: &str) -> Result<()> {
        if values.iter().all(|v| v.is_finite()) {
            return Ok(());
        }
        Err(AppError::Validation(format!(
            "input is outside the numeric range of {}: {} overflowed",
            self.metadata.name, what
        )))
    }
}

/// Index of the largest value; ties go to the lowest index
fn argmax(values: &Array1<f64>) -> usize {
    let mut best = 0;
    for (idx, &value) in values.iter().enumerate() {
        if value > values[best] {
            best = idx;
        }
    }
    best
}

/// Multinomial (or binary) logistic regression
#[derive(Debug, Clone)]
pub struct LogisticRegressionClassifier {
    fitted: Fitted,

    /// n_rows × n_features, where n_rows is n_classes or 1 for binary
    coefficients: Array2<f64>,

    intercepts: Array1<f64>,
}

impl LogisticRegressionClassifier {
    fn decision_function(&self, features: &Array1<f64>) -> Array1<f64> {
        self.coefficients.dot(features) + &self.intercepts
    }

    fn sigmoid(z: f64) -> f64 {
        1.0 / (1.0 + (-z).exp())
    }

    fn softmax(scores: &Array1<f64>) -> Array1<f64> {
        let max = scores.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
        let exp = scores.mapv(|v| (v - max).exp());
        let total = exp.sum();
        exp / total
    }
}

impl Classifier for LogisticRegressionClassifier {
    fn predict(&self, features: &Array1<f64>) -> Result<usize> {
        let proba = self.predict_proba(features)?;
        Ok(argmax(&proba))
    }

    fn predict_proba(&self, features: &Array1<f64>) -> Result<Array1<f64>> {
        self.fitted.check_input(features)?;
        let scores = self.decision_function(features);
        self.fitted.check_finite(&scores, "decision scores")?;

        if scores.len() == 1 {
            let p = Self::sigmoid(scores[0]);
            Ok(Array1::from_vec(vec![1.0 - p, p]))
        } else {
            Ok(Self::softmax(&scores))
        }
    }

    fn supports_proba(&self) -> bool {
        true
    }

    fn classes(&self) -> Option<&[String]> {
        self.fitted.classes.as_deref()
    }

    fn feature_names_in(&self) -> Option<&[String]> {
        self.fitted.feature_names_in.as_deref()
    }

    fn n_features(&self) -> usize {
        self.fitted.metadata.n_features
    }

    fn n_classes(&self) -> usize {
        self.fitted.metadata.n_classes
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.fitted.metadata
    }

    fn model_type(&self) -> ModelType {
        ModelType::LogisticRegression
    }
}

/// CART decision tree with per-leaf class counts
#[derive(Debug, Clone)]
pub struct DecisionTreeClassifier {
    fitted: Fitted,
    nodes: Vec<TreeNode>,
}

impl DecisionTreeClassifier {
    fn leaf_for(&self, features: &Array1<f64>) -> &[f64] {
        let mut idx = 0;
        // Children always point forward, so this walk terminates.
        loop {
            match &self.nodes[idx] {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                TreeNode::Leaf { value } => return value.as_slice(),
            }
        }
    }
}

impl Classifier for DecisionTreeClassifier {
    fn predict(&self, features: &Array1<f64>) -> Result<usize> {
        let proba = self.predict_proba(features)?;
        Ok(argmax(&proba))
    }

    fn predict_proba(&self, features: &Array1<f64>) -> Result<Array1<f64>> {
        self.fitted.check_input(features)?;
        let counts = Array1::from_vec(self.leaf_for(features).to_vec());
        let total = counts.sum();

        if total <= 0.0 {
            return Err(AppError::Internal(format!(
                "{} reached a leaf with no samples",
                self.fitted.metadata.name
            )));
        }

        Ok(counts / total)
    }

    fn supports_proba(&self) -> bool {
        true
    }

    fn classes(&self) -> Option<&[String]> {
        self.fitted.classes.as_deref()
    }

    fn feature_names_in(&self) -> Option<&[String]> {
        self.fitted.feature_names_in.as_deref()
    }

    fn n_features(&self) -> usize {
        self.fitted.metadata.n_features
    }

    fn n_classes(&self) -> usize {
        self.fitted.metadata.n_classes
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.fitted.metadata
    }

    fn model_type(&self) -> ModelType {
        ModelType::DecisionTree
    }
}

/// Nearest centroid by Euclidean distance; labels only
#[derive(Debug, Clone)]
pub struct NearestCentroidClassifier {
    fitted: Fitted,
    centroids: Array2<f64>,
}

impl Classifier for NearestCentroidClassifier {
    fn predict(&self, features: &Array1<f64>) -> Result<usize> {
        self.fitted.check_input(features)?;

        let distances: Array1<f64> = self
            .centroids
            .rows()
            .into_iter()
            .map(|row| (&row - features).mapv(|d| d * d).sum())
            .collect();
        self.fitted.check_finite(&distances, "centroid distances")?;

        let mut best = 0;
        for (idx, &d) in distances.iter().enumerate() {
            if d < distances[best] {
                best = idx;
            }
        }
        Ok(best)
    }

    fn classes(&self) -> Option<&[String]> {
        self.fitted.classes.as_deref()
    }

    fn feature_names_in(&self) -> Option<&[String]> {
        self.fitted.feature_names_in.as_deref()
    }

    fn n_features(&self) -> usize {
        self.fitted.metadata.n_features
    }

    fn n_classes(&self) -> usize {
        self.fitted.metadata.n_classes
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.fitted.metadata
    }

    fn model_type(&self) -> ModelType {
        ModelType::NearestCentroid
    }
}

fn unavailable(msg: impl Into<String>) -> AppError {
    AppError::ModelUnavailable(msg.into())
}

fn rows_to_matrix(rows: &[Vec<f64>], what: &str) -> Result<Array2<f64>> {
    let n_rows = rows.len();
    if n_rows == 0 {
        return Err(unavailable(format!("{} is empty", what)));
    }

    let n_cols = rows[0].len();
    if n_cols == 0 {
        return Err(unavailable(format!("{} rows are empty", what)));
    }
    if rows.iter().any(|r| r.len() != n_cols) {
        return Err(unavailable(format!("{} rows have unequal lengths", what)));
    }
    if rows.iter().flatten().any(|v| !v.is_finite()) {
        return Err(unavailable(format!("{} contains non-finite values", what)));
    }

    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((n_rows, n_cols), flat)
        .map_err(|e| unavailable(format!("{} has an invalid shape: {}", what, e)))
}

/// Validate the tree and return (n_classes, minimum feature count)
fn check_tree(nodes: &[TreeNode]) -> Result<(usize, usize)> {
    if nodes.is_empty() {
        return Err(unavailable("decision tree has no nodes"));
    }

    let mut n_classes = None;
    let mut min_features = 0;

    for (idx, node) in nodes.iter().enumerate() {
        match node {
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                for &child in [left, right] {
                    if child <= idx || child >= nodes.len() {
                        return Err(unavailable(format!(
                            "decision tree node {} has invalid child {}",
                            idx, child
                        )));
                    }
                }
                if !threshold.is_finite() {
                    return Err(unavailable(format!(
                        "decision tree node {} has a non-finite threshold",
                        idx
                    )));
                }
                let width = feature.checked_add(1).ok_or_else(|| {
                    unavailable(format!(
                        "decision tree node {} splits on feature index {}",
                        idx, feature
                    ))
                })?;
                min_features = min_features.max(width);
            }
            TreeNode::Leaf { value } => {
                if value.is_empty() || value.iter().any(|v| !v.is_finite() || *v < 0.0) {
                    return Err(unavailable(format!(
                        "decision tree leaf {} has invalid class counts",
                        idx
                    )));
                }
                if value.iter().sum::<f64>() <= 0.0 {
                    return Err(unavailable(format!(
                        "decision tree leaf {} has no samples",
                        idx
                    )));
                }
                match n_classes {
                    None => n_classes = Some(value.len()),
                    Some(n) if n != value.len() => {
                        return Err(unavailable(format!(
                            "decision tree leaf {} has {} classes, expected {}",
                            idx,
                            value.len(),
                            n
                        )));
                    }
                    Some(_) => {}
                }
            }
        }
    }

    // Forward-only children cannot reach a leaf-less dead end.
    let n_classes = n_classes.ok_or_else(|| unavailable("decision tree has no leaves"))?;
    Ok((n_classes, min_features))
}

/// Settle the model's input width from names, declared count and params
fn resolve_n_features(artifact: &ModelArtifact, from_params: Option<usize>, min: usize) -> Result<usize> {
    let candidates = [
        ("feature_names_in", artifact.feature_names_in.as_ref().map(Vec::len)),
        ("n_features_in", artifact.n_features_in),
        ("parameters", from_params),
    ];

    let mut resolved: Option<(&str, usize)> = None;
    for (source, count) in candidates {
        let Some(count) = count else { continue };
        match resolved {
            None => resolved = Some((source, count)),
            Some((first, n)) if n != count => {
                return Err(unavailable(format!(
                    "{} implies {} features but {} implies {}",
                    first, n, source, count
                )));
            }
            Some(_) => {}
        }
    }

    let n_features = resolved.map(|(_, n)| n).unwrap_or(min);
    if n_features == 0 {
        return Err(unavailable("model declares zero input features"));
    }
    if n_features < min {
        return Err(unavailable(format!(
            "model uses feature index {} but declares only {} features",
            min - 1,
            n_features
        )));
    }
    Ok(n_features)
}

fn check_names(names: &[String], what: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name.as_str()) {
            return Err(unavailable(format!("{} repeats '{}'", what, name)));
        }
    }
    Ok(())
}

/// Build a classifier from a parsed artifact
pub fn from_artifact(artifact: ModelArtifact, digest: Option<String>, source: Option<String>) -> Result<Arc<dyn Classifier>> {
    if artifact.format_version != ARTIFACT_FORMAT_VERSION {
        return Err(unavailable(format!(
            "unsupported artifact format version {} (expected {})",
            artifact.format_version, ARTIFACT_FORMAT_VERSION
        )));
    }

    if let Some(names) = &artifact.feature_names_in {
        check_names(names, "feature_names_in")?;
    }
    if let Some(classes) = &artifact.classes {
        check_names(classes, "classes")?;
    }

    let model_type = artifact.model_type();
    let classifier: Arc<dyn Classifier> = match &artifact.params {
        ModelParams::LogisticRegression {
            coefficients,
            intercepts,
        } => {
            let coefficients = rows_to_matrix(coefficients, "coefficients")?;
            if intercepts.len() != coefficients.nrows() {
                return Err(unavailable(format!(
                    "{} intercepts for {} coefficient rows",
                    intercepts.len(),
                    coefficients.nrows()
                )));
            }
            if intercepts.iter().any(|v| !v.is_finite()) {
                return Err(unavailable("intercepts contain non-finite values"));
            }

            let n_classes = if coefficients.nrows() == 1 {
                2
            } else {
                coefficients.nrows()
            };
            let n_features = resolve_n_features(&artifact, Some(coefficients.ncols()), 0)?;
            let fitted = fit_attributes(&artifact, model_type, n_features, n_classes, digest, source)?;

            Arc::new(LogisticRegressionClassifier {
                fitted,
                coefficients,
                intercepts: Array1::from_vec(intercepts.clone()),
            })
        }
        ModelParams::DecisionTree { nodes } => {
            let (n_classes, min_features) = check_tree(nodes)?;
            let n_features = resolve_n_features(&artifact, None, min_features)?;
            let fitted = fit_attributes(&artifact, model_type, n_features, n_classes, digest, source)?;

            Arc::new(DecisionTreeClassifier {
                fitted,
                nodes: nodes.clone(),
            })
        }
        ModelParams::NearestCentroid { centroids } => {
            let centroids = rows_to_matrix(centroids, "centroids")?;
            let n_features = resolve_n_features(&artifact, Some(centroids.ncols()), 0)?;
            let fitted = fit_attributes(&artifact, model_type, n_features, centroids.nrows(), digest, source)?;

            Arc::new(NearestCentroidClassifier { fitted, centroids })
        }
    };

    Ok(classifier)
}

fn fit_attributes(
    artifact: &ModelArtifact,
    model_type: ModelType,
    n_features: usize,
    n_classes: usize,
    digest: Option<String>,
    source: Option<String>,
) -> Result<Fitted> {
    if let Some(classes) = &artifact.classes {
        if classes.len() != n_classes {
            return Err(unavailable(format!(
                "artifact lists {} classes but parameters describe {}",
                classes.len(),
                n_classes
            )));
        }
    }

    Ok(Fitted {
        metadata: ModelMetadata {
            name: artifact.name.clone(),
            version: artifact.version.clone(),
            model_type,
            n_features,
            n_classes,
            digest,
            source,
            loaded_at: chrono::Utc::now(),
        },
        classes: artifact.classes.clone(),
        feature_names_in: artifact.feature_names_in.clone(),
    })
}

/// Build a classifier from raw artifact bytes
pub fn from_bytes(bytes: &[u8], source: Option<String>) -> Result<Arc<dyn Classifier>> {
    let digest = format!("{:x}", Sha256::digest(bytes));
    let artifact = ModelArtifact::from_slice(bytes)?;
    from_artifact(artifact, Some(digest), source)
}

/// Load and validate a classifier artifact from disk
pub fn load_classifier(path: impl AsRef<Path>) -> Result<Arc<dyn Classifier>> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| {
        unavailable(format!("cannot read model artifact {}: {}", path.display(), e))
    })?;

    let classifier = from_bytes(&bytes, Some(path.display().to_string()))?;
    let metadata = classifier.metadata();

    info!(
        model = %metadata.name,
        model_type = %metadata.model_type,
        n_features = metadata.n_features,
        n_classes = metadata.n_classes,
        digest = metadata.digest.as_deref().unwrap_or(""),
        "Loaded model artifact from {}",
        path.display()
    );

    Ok(classifier)
}

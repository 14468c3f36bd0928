use crate::error::{AppError, Result};
use crate::models::{columns, RawFields, RawValue};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::debug;

/// Value substituted for schema features absent from the input
pub const NEUTRAL_DEFAULT: f64 = 0.0;

/// Ordered list of feature names a classifier expects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// Create a schema, rejecting empty, blank or duplicate names
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();

        if names.is_empty() {
            return Err(AppError::Validation(
                "feature schema must name at least one feature".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for name in &names {
            if name.trim().is_empty() {
                return Err(AppError::Validation(
                    "feature schema contains a blank name".to_string(),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(AppError::Validation(format!(
                    "feature schema names '{}' more than once",
                    name
                )));
            }
        }

        Ok(Self { names })
    }

    /// Columns of the standard two-flag encoding of product type
    pub fn default_columns() -> Self {
        Self {
            names: [
                columns::AIR_TEMPERATURE,
                columns::PROCESS_TEMPERATURE,
                columns::ROTATIONAL_SPEED,
                columns::TORQUE,
                columns::TOOL_WEAR,
                columns::TYPE_L,
                columns::TYPE_M,
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }
}

impl TryFrom<Vec<String>> for FeatureSchema {
    type Error = AppError;

    fn try_from(names: Vec<String>) -> Result<Self> {
        Self::new(names)
    }
}

impl From<FeatureSchema> for Vec<String> {
    fn from(schema: FeatureSchema) -> Self {
        schema.names
    }
}

/// Numeric feature vector aligned with a schema
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    names: Vec<String>,
    values: Array1<f64>,
}

impl FeatureVector {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &Array1<f64> {
        &self.values
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.values.to_vec()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.values[idx])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the slots line up with `schema`, name for name
    pub fn is_aligned_with(&self, schema: &FeatureSchema) -> bool {
        self.names.as_slice() == schema.names()
    }
}

/// Coerce one raw value to a finite float
pub fn coerce(field: &str, value: &RawValue) -> Result<f64> {
    let mismatch = || AppError::SchemaMismatch {
        field: field.to_string(),
        value: value.to_string(),
    };

    let number = match value {
        RawValue::Number(n) => *n,
        RawValue::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        RawValue::Text(s) => s.trim().parse::<f64>().map_err(|_| mismatch())?,
        RawValue::Other(_) => return Err(mismatch()),
    };

    if number.is_finite() {
        Ok(number)
    } else {
        Err(mismatch())
    }
}

/// Build the feature vector for `schema` from `raw`.
///
/// Slots follow schema order. Features missing from `raw` take
/// [`NEUTRAL_DEFAULT`]; fields outside the schema are dropped. The first
/// value that cannot be coerced fails the whole call.
pub fn reconcile(raw: &RawFields, schema: &FeatureSchema) -> Result<FeatureVector> {
    let mut values = Array1::zeros(schema.len());

    for (idx, name) in schema.names().iter().enumerate() {
        values[idx] = match raw.get(name) {
            Some(value) => coerce(name, value)?,
            None => {
                debug!(feature = %name, "Feature missing from input, using neutral default");
                NEUTRAL_DEFAULT
            }
        };
    }

    for name in raw.names().filter(|n| !schema.contains(n)) {
        debug!(field = %name, "Dropping field not in feature schema");
    }

    Ok(FeatureVector {
        names: schema.names().to_vec(),
        values,
    })
}

/// Reconciler bound to a fixed schema
#[derive(Debug, Clone)]
pub struct FeatureReconciler {
    schema: FeatureSchema,
}

impl FeatureReconciler {
    pub fn new(schema: FeatureSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn reconcile(&self, raw: &RawFields) -> Result<FeatureVector> {
        reconcile(raw, &self.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scenario_schema() -> FeatureSchema {
        FeatureSchema::new(["Air temperature [K]", "Torque [Nm]", "Type_L", "Type_M"]).unwrap()
    }

    fn scenario_input() -> RawFields {
        RawFields::new()
            .with("Air temperature [K]", 300.0)
            .with("Torque [Nm]", 40.0)
            .with("Type_L", 1i64)
            .with("Type_M", 0i64)
    }

    #[test]
    fn test_reconcile_full_input() {
        let vector = reconcile(&scenario_input(), &scenario_schema()).unwrap();
        assert_eq!(vector.to_vec(), vec![300.0, 40.0, 1.0, 0.0]);
        assert!(vector.is_aligned_with(&scenario_schema()));
    }

    #[test]
    fn test_reconcile_missing_field_defaults_to_zero() {
        let mut raw = scenario_input();
        raw.remove("Torque [Nm]");

        let vector = reconcile(&raw, &scenario_schema()).unwrap();
        assert_eq!(vector.to_vec(), vec![300.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_reconcile_drops_extra_fields_and_reorders() {
        let raw = RawFields::new()
            .with("Type_M", 1i64)
            .with("Type_H", 0i64)
            .with("Torque [Nm]", 55.5)
            .with("Machine ID", "M14860");

        let vector = reconcile(&raw, &scenario_schema()).unwrap();
        assert_eq!(vector.len(), 4);
        assert_eq!(vector.names(), scenario_schema().names());
        assert_eq!(vector.to_vec(), vec![0.0, 55.5, 0.0, 1.0]);
    }

    #[test]
    fn test_reconcile_coerces_text_and_bool() {
        let raw = RawFields::new()
            .with("Air temperature [K]", " 298.1 ")
            .with("Type_L", true)
            .with("Type_M", false);

        let vector = reconcile(&raw, &scenario_schema()).unwrap();
        assert_eq!(vector.to_vec(), vec![298.1, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_reconcile_reports_failing_field() {
        let raw = scenario_input().with("Torque [Nm]", "forty");

        match reconcile(&raw, &scenario_schema()) {
            Err(AppError::SchemaMismatch { field, value }) => {
                assert_eq!(field, "Torque [Nm]");
                assert_eq!(value, "forty");
            }
            other => panic!("expected schema mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_reconcile_ignores_bad_value_outside_schema() {
        let raw = scenario_input().with("Comment", "not a number");
        assert!(reconcile(&raw, &scenario_schema()).is_ok());
    }

    #[test]
    fn test_reconcile_rejects_null_and_structured_values() {
        for value in [json!(null), json!([40.0]), json!({"value": 40.0})] {
            let raw = scenario_input().with("Torque [Nm]", RawValue::Other(value.clone()));

            match reconcile(&raw, &scenario_schema()) {
                Err(AppError::SchemaMismatch { field, value: shown }) => {
                    assert_eq!(field, "Torque [Nm]");
                    assert_eq!(shown, value.to_string());
                }
                other => panic!("expected schema mismatch, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_coerce_rejects_non_finite() {
        assert!(coerce("x", &RawValue::Text("NaN".to_string())).is_err());
        assert!(coerce("x", &RawValue::Text("inf".to_string())).is_err());
        assert!(coerce("x", &RawValue::Number(f64::INFINITY)).is_err());
        assert_eq!(coerce("x", &RawValue::Text("1e2".to_string())).unwrap(), 100.0);
    }

    #[test]
    fn test_length_and_order_match_schema_for_many_schemas() {
        let pool = [
            "Air temperature [K]",
            "Process temperature [K]",
            "Rotational speed [rpm]",
            "Torque [Nm]",
            "Tool wear [min]",
            "Type_L",
            "Type_M",
        ];
        let raw = RawFields::new()
            .with("Torque [Nm]", 12.0)
            .with("Type_L", 1.0)
            .with("Tool wear [min]", 7.0);

        for len in 1..=pool.len() {
            for start in 0..pool.len() {
                let names: Vec<&str> = (0..len).map(|i| pool[(start + i) % pool.len()]).collect();
                let schema = FeatureSchema::new(names.clone()).unwrap();
                let vector = reconcile(&raw, &schema).unwrap();

                assert_eq!(vector.len(), schema.len());
                for (idx, name) in names.iter().enumerate() {
                    assert_eq!(vector.names()[idx], *name);
                    let expected = match raw.get(name) {
                        Some(value) => coerce(name, value).unwrap(),
                        None => NEUTRAL_DEFAULT,
                    };
                    assert_eq!(vector.values()[idx], expected);
                }
            }
        }
    }

    #[test]
    fn test_schema_rejects_duplicates_and_empty() {
        assert!(FeatureSchema::new(Vec::<String>::new()).is_err());
        assert!(FeatureSchema::new(["a", "b", "a"]).is_err());
        assert!(FeatureSchema::new(["a", " "]).is_err());
    }

    #[test]
    fn test_schema_deserialization_validates() {
        let ok: FeatureSchema = serde_json::from_str(r#"["Type_L", "Type_M"]"#).unwrap();
        assert_eq!(ok.len(), 2);
        assert!(serde_json::from_str::<FeatureSchema>(r#"["Type_L", "Type_L"]"#).is_err());
    }

    #[test]
    fn test_default_columns() {
        let schema = FeatureSchema::default_columns();
        assert_eq!(schema.len(), 7);
        assert_eq!(schema.position(columns::TYPE_M), Some(6));
        assert!(!schema.contains(columns::TYPE_H));
    }

    #[test]
    fn test_reconciler_wraps_schema() {
        let reconciler = FeatureReconciler::new(scenario_schema());
        let vector = reconciler.reconcile(&scenario_input()).unwrap();
        assert_eq!(vector.get("Torque [Nm]"), Some(40.0));
        assert_eq!(reconciler.schema().len(), 4);
    }
}

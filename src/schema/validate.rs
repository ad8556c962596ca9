//! Raw input normalisation
//!
//! Turns a loosely typed name -> value mapping into a [`FeatureVector`]
//! laid out in schema order. Missing stays missing: imputation belongs to
//! the model, not to the validator.

use serde::Serialize;
use serde_json::Value;

use super::FeatureSchema;
use crate::error::{StarlingError, StarlingResult};

/// Raw request payload: feature name -> JSON value
pub type RawFeatures = serde_json::Map<String, Value>;

/// Feature values in schema order; `None` marks a missing feature
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    values: Vec<Option<f64>>,
}

impl FeatureVector {
    /// Wrap values already laid out in schema order.
    pub fn from_values(schema: &FeatureSchema, values: Vec<Option<f64>>) -> StarlingResult<Self> {
        if values.len() != schema.len() {
            return Err(StarlingError::artifact(
                "feature vector",
                format!("expected {} values, got {}", schema.len(), values.len()),
            ));
        }
        Ok(Self { values })
    }

    /// Validate a raw mapping against the schema.
    ///
    /// Unknown keys and non-numeric values are rejected by name; a vector
    /// with nothing present is rejected as empty.
    pub fn validate(schema: &FeatureSchema, raw: &RawFeatures) -> StarlingResult<Self> {
        let mut values = vec![None; schema.len()];

        for (name, value) in raw {
            let idx = schema
                .feature_index(name)
                .ok_or_else(|| StarlingError::UnknownFeature { name: name.clone() })?;
            values[idx] = coerce(name, value)?;
        }

        if values.iter().all(Option::is_none) {
            return Err(StarlingError::EmptyVector);
        }

        Ok(Self { values })
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn get(&self, idx: usize) -> Option<f64> {
        self.values.get(idx).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn present_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Render back to a name -> number|null mapping in schema order.
    pub fn to_named(&self, schema: &FeatureSchema) -> indexmap::IndexMap<String, Option<f64>> {
        schema
            .feature_names()
            .zip(self.values.iter())
            .map(|(name, v)| (name.to_string(), *v))
            .collect()
    }
}

/// Coerce one JSON value to an optional finite number.
fn coerce(name: &str, value: &Value) -> StarlingResult<Option<f64>> {
    let invalid = || StarlingError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    };

    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_f64().ok_or_else(invalid)?,
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed.parse::<f64>().map_err(|_| invalid())?
        }
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => return Err(invalid()),
    };

    if parsed.is_finite() {
        Ok(Some(parsed))
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> FeatureSchema {
        FeatureSchema::from_names(["a", "b", "c"], ["X", "Y", "Z"]).unwrap()
    }

    fn raw(v: Value) -> RawFeatures {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_partial_vector_keeps_missing() {
        let fv = FeatureVector::validate(&schema(), &raw(json!({"a": 1.0, "b": 2.0}))).unwrap();
        assert_eq!(fv.values(), &[Some(1.0), Some(2.0), None]);
        assert_eq!(fv.present_count(), 2);
    }

    #[test]
    fn test_unknown_key_is_named() {
        let err = FeatureVector::validate(&schema(), &raw(json!({"d": 5}))).unwrap_err();
        match err {
            StarlingError::UnknownFeature { name } => assert_eq!(name, "d"),
            other => panic!("expected UnknownFeature, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = FeatureVector::validate(&schema(), &RawFeatures::new()).unwrap_err();
        assert!(matches!(err, StarlingError::EmptyVector));

        let err =
            FeatureVector::validate(&schema(), &raw(json!({"a": null, "b": ""}))).unwrap_err();
        assert!(matches!(err, StarlingError::EmptyVector));
    }

    #[test]
    fn test_numeric_strings_coerced() {
        let fv = FeatureVector::validate(&schema(), &raw(json!({"a": " 3.5 ", "c": "1e2"}))).unwrap();
        assert_eq!(fv.values(), &[Some(3.5), None, Some(100.0)]);
    }

    #[test]
    fn test_zero_is_not_missing() {
        let fv = FeatureVector::validate(&schema(), &raw(json!({"a": 0}))).unwrap();
        assert_eq!(fv.get(0), Some(0.0));
        assert_eq!(fv.get(1), None);
    }

    #[test]
    fn test_invalid_values_named() {
        for bad in [json!("abc"), json!(true), json!([1]), json!({"x": 1}), json!("NaN"), json!("inf")] {
            let err = FeatureVector::validate(&schema(), &raw(json!({"b": bad}))).unwrap_err();
            match err {
                StarlingError::InvalidValue { name, .. } => assert_eq!(name, "b"),
                other => panic!("expected InvalidValue, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_to_named_roundtrips_through_validate() {
        let s = schema();
        let fv = FeatureVector::from_values(&s, vec![Some(1.0), None, Some(-2.0)]).unwrap();
        let named = fv.to_named(&s);
        let as_json = serde_json::to_value(&named).unwrap();
        let back = FeatureVector::validate(&s, as_json.as_object().unwrap()).unwrap();
        assert_eq!(back, fv);
    }
}

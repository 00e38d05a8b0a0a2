//! Feature Encoder
//!
//! Turns a raw request record into the numeric vector the classifier was
//! fitted on: categorical columns go through their label encoder, then
//! columns are selected in expected-feature order. Extra keys are dropped.

use std::collections::{BTreeMap, HashMap};

use serde_json::{Map, Value};
use thiserror::Error;

/// Raw request body: feature name -> raw value
pub type RawRecord = Map<String, Value>;

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("missing required features: {}", .0.join(", "))]
    MissingFeatures(Vec<String>),

    #[error("feature '{feature}' is non-numeric: {value}")]
    NonNumeric { feature: String, value: String },

    #[error("feature '{feature}' contains previously unseen label: '{label}'")]
    UnseenLabel { feature: String, label: String },
}

/// Fitted label encoder: category label -> integer code
#[derive(Debug, Clone)]
pub struct LabelEncoder {
    codes: HashMap<String, i64>,
}

impl LabelEncoder {
    /// Build from the fitted class list; the code of a label is its position
    pub fn from_classes<I, S>(classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let codes = classes
            .into_iter()
            .enumerate()
            .map(|(i, label)| (label.into(), i as i64))
            .collect();
        Self { codes }
    }

    pub fn transform(&self, label: &str) -> Option<i64> {
        self.codes.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }
}

/// Ordered numeric row matching the classifier's input schema
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Textual form of a scalar, used for categorical lookup and record summaries
pub fn value_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        // f64 parsing accepts "NaN" and "inf"; the classifier must not see them
        Value::String(s) => s.trim().parse().ok().filter(|f: &f64| f.is_finite()),
        _ => None,
    }
}

/// Encode a raw record against the fitted encoders and feature order
pub fn encode(
    record: &RawRecord,
    encoders: &BTreeMap<String, LabelEncoder>,
    feature_names: &[String],
) -> Result<FeatureVector, EncodeError> {
    // Categorical columns first, whether or not the model uses them.
    // Feature order, then any remaining encoders by name, so the first
    // reported unseen label is stable.
    let ordered = feature_names
        .iter()
        .filter_map(|name| encoders.get_key_value(name))
        .chain(
            encoders
                .iter()
                .filter(|(name, _)| !feature_names.contains(*name)),
        );

    let mut encoded: HashMap<&str, f64> = HashMap::new();
    for (name, encoder) in ordered {
        let Some(raw) = record.get(name) else {
            continue;
        };
        let label = value_label(raw).unwrap_or_else(|| raw.to_string());
        let code = encoder.transform(&label).ok_or_else(|| EncodeError::UnseenLabel {
            feature: name.clone(),
            label: label.clone(),
        })?;
        encoded.insert(name.as_str(), code as f64);
    }

    let missing: Vec<String> = feature_names
        .iter()
        .filter(|name| !record.contains_key(name.as_str()))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(EncodeError::MissingFeatures(missing));
    }

    let mut row = Vec::with_capacity(feature_names.len());
    for name in feature_names {
        let value = match encoded.get(name.as_str()) {
            Some(code) => *code,
            None => {
                let raw = &record[name.as_str()];
                numeric(raw).ok_or_else(|| EncodeError::NonNumeric {
                    feature: name.clone(),
                    value: raw.to_string(),
                })?
            }
        };
        row.push(value);
    }

    Ok(FeatureVector(row))
}

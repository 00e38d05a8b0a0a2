//! Prediction Engine
//!
//! Runs the classifier on an encoded vector and turns its output into a
//! verdict: the label, and the probability of the predicted class as a
//! percentage.

use thiserror::Error;

use super::artifacts::ModelStore;
use super::classifier::{Classifier, InferenceError};
use super::encoder::{self, EncodeError, FeatureVector, RawRecord};

/// Class code the classifier uses for attacks
pub const ATTACK_CLASS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Label {
    Attack,
    Normal,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Attack => "Attack",
            Label::Normal => "Normal",
        }
    }

    pub fn is_attack(&self) -> bool {
        matches!(self, Label::Attack)
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier verdict for one record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub label: Label,
    /// 0 - 100
    pub confidence: f64,
}

#[derive(Debug, Error)]
pub enum PredictError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Inference(#[from] InferenceError),
}

/// Round to two decimals
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Score an encoded vector
pub fn classify(classifier: &dyn Classifier, vector: &FeatureVector) -> Result<Verdict, InferenceError> {
    let class = classifier.predict(vector.as_slice())?;
    let proba = classifier.predict_proba(vector.as_slice())?;

    let max = proba
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return Err(InferenceError::EmptyOutput);
    }

    let label = if class == ATTACK_CLASS { Label::Attack } else { Label::Normal };

    Ok(Verdict {
        label,
        confidence: (max * 100.0).clamp(0.0, 100.0),
    })
}

/// Encode then classify a raw record
pub fn predict(store: &ModelStore, record: &RawRecord) -> Result<Verdict, PredictError> {
    let vector = encoder::encode(record, store.encoders(), store.feature_names())?;
    let verdict = classify(store.classifier(), &vector)?;

    tracing::debug!(
        features = vector.len(),
        "Prediction: {} ({:.2}%)",
        verdict.label,
        verdict.confidence
    );

    Ok(verdict)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::model::encoder::LabelEncoder;

    /// Classifier that always returns the same distribution
    pub struct FixedClassifier {
        pub classes: Vec<i64>,
        pub proba: Vec<f64>,
    }

    impl Classifier for FixedClassifier {
        fn classes(&self) -> &[i64] {
            &self.classes
        }

        fn predict_proba(&self, _row: &[f64]) -> Result<Vec<f64>, InferenceError> {
            Ok(self.proba.clone())
        }
    }

    /// Store over protocol_type/service/flag/src_bytes/dst_bytes with a fixed classifier
    pub fn fixed_store(proba: Vec<f64>) -> ModelStore {
        let mut encoders = BTreeMap::new();
        encoders.insert("protocol_type".to_string(), LabelEncoder::from_classes(["icmp", "tcp", "udp"]));
        encoders.insert("service".to_string(), LabelEncoder::from_classes(["ftp", "http", "smtp"]));
        encoders.insert("flag".to_string(), LabelEncoder::from_classes(["REJ", "S0", "SF"]));

        let features = ["duration", "protocol_type", "service", "flag", "src_bytes", "dst_bytes"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        ModelStore::new(
            Box::new(FixedClassifier { classes: vec![0, 1], proba }),
            encoders,
            features,
        )
    }

    fn sample() -> RawRecord {
        serde_json::json!({
            "duration": 0,
            "protocol_type": "tcp",
            "service": "http",
            "flag": "SF",
            "src_bytes": 200,
            "dst_bytes": 400
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn test_attack_confidence_is_max_probability() {
        let store = fixed_store(vec![0.1, 0.9]);
        let verdict = predict(&store, &sample()).unwrap();

        assert_eq!(verdict.label, Label::Attack);
        assert_eq!(round2(verdict.confidence), 90.0);
    }

    #[test]
    fn test_normal_uses_normal_probability() {
        let store = fixed_store(vec![0.75, 0.25]);
        let verdict = predict(&store, &sample()).unwrap();

        assert_eq!(verdict.label, Label::Normal);
        assert_eq!(round2(verdict.confidence), 75.0);
        assert!(!verdict.label.is_attack());
    }

    #[test]
    fn test_deterministic() {
        let store = fixed_store(vec![0.3, 0.7]);
        let a = predict(&store, &sample()).unwrap();
        let b = predict(&store, &sample()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_encode_error_surfaces() {
        let store = fixed_store(vec![0.5, 0.5]);
        let mut record = sample();
        record.remove("dst_bytes");

        let err = predict(&store, &record).unwrap_err();
        assert!(matches!(err, PredictError::Encode(EncodeError::MissingFeatures(_))));
    }

    #[test]
    fn test_round2() {
        assert_eq!(round2(66.666_666), 66.67);
        assert_eq!(round2(0.0), 0.0);
    }
}

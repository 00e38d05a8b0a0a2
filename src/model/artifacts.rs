//! Model Artifact Store
//!
//! Loads the classifier, the categorical encoders and the expected feature
//! list once at startup. The store is immutable afterwards and shared by
//! reference across requests.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use super::classifier::{Classifier, SerializedModel};
use super::encoder::LabelEncoder;

pub const MODEL_FILE: &str = "best_ids_model.json";
pub const ENCODERS_FILE: &str = "encoders.json";
pub const FEATURES_FILE: &str = "feature_names.json";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("model artifacts missing: {}", format_missing(.0))]
    Missing(Vec<(&'static str, PathBuf)>),

    #[error("artifact {name} is malformed: {reason}")]
    Malformed { name: &'static str, reason: String },

    #[error("failed to read artifact {name}: {source}")]
    Io {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}

fn format_missing(missing: &[(&'static str, PathBuf)]) -> String {
    missing
        .iter()
        .map(|(name, path)| format!("{} ({})", name, path.display()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Loaded model state
pub struct ModelStore {
    classifier: Box<dyn Classifier>,
    encoders: BTreeMap<String, LabelEncoder>,
    feature_names: Vec<String>,
    fingerprint: Option<String>,
}

impl std::fmt::Debug for ModelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelStore")
            .field("encoders", &self.encoders.keys().collect::<Vec<_>>())
            .field("features", &self.feature_names.len())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl ModelStore {
    pub fn new(
        classifier: Box<dyn Classifier>,
        encoders: BTreeMap<String, LabelEncoder>,
        feature_names: Vec<String>,
    ) -> Self {
        Self {
            classifier,
            encoders,
            feature_names,
            fingerprint: None,
        }
    }

    /// Load all three artifacts from `dir`
    pub fn load(dir: &Path) -> Result<Self, ArtifactError> {
        let model_path = dir.join(MODEL_FILE);
        let encoders_path = dir.join(ENCODERS_FILE);
        let features_path = dir.join(FEATURES_FILE);

        let missing: Vec<(&'static str, PathBuf)> = [
            (MODEL_FILE, &model_path),
            (ENCODERS_FILE, &encoders_path),
            (FEATURES_FILE, &features_path),
        ]
        .into_iter()
        .filter(|(_, path)| !path.exists())
        .map(|(name, path)| (name, path.clone()))
        .collect();

        if !missing.is_empty() {
            return Err(ArtifactError::Missing(missing));
        }

        let model_bytes = read(MODEL_FILE, &model_path)?;
        let model: SerializedModel = parse(MODEL_FILE, &model_bytes)?;
        model.validate().map_err(|reason| ArtifactError::Malformed {
            name: MODEL_FILE,
            reason,
        })?;

        let classes: BTreeMap<String, Vec<String>> =
            parse(ENCODERS_FILE, &read(ENCODERS_FILE, &encoders_path)?)?;
        let encoders: BTreeMap<String, LabelEncoder> = classes
            .into_iter()
            .map(|(name, labels)| (name, LabelEncoder::from_classes(labels)))
            .collect();

        let feature_names: Vec<String> = parse(FEATURES_FILE, &read(FEATURES_FILE, &features_path)?)?;
        if feature_names.len() != model.n_features() {
            return Err(ArtifactError::Malformed {
                name: FEATURES_FILE,
                reason: format!(
                    "{} feature names for a model expecting {}",
                    feature_names.len(),
                    model.n_features()
                ),
            });
        }

        let fingerprint = hex::encode(Sha256::digest(&model_bytes));

        tracing::info!(
            kind = model.kind(),
            features = feature_names.len(),
            encoders = encoders.len(),
            sha256 = %fingerprint,
            "Model artifacts loaded from {}",
            dir.display()
        );
        for (name, encoder) in &encoders {
            tracing::debug!("Encoder {}: {} labels", name, encoder.len());
        }

        let mut store = Self::new(Box::new(model), encoders, feature_names);
        store.fingerprint = Some(fingerprint);
        Ok(store)
    }

    pub fn classifier(&self) -> &dyn Classifier {
        self.classifier.as_ref()
    }

    pub fn encoders(&self) -> &BTreeMap<String, LabelEncoder> {
        &self.encoders
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// SHA-256 of the classifier file, when loaded from disk
    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }
}

fn read(name: &'static str, path: &Path) -> Result<Vec<u8>, ArtifactError> {
    fs::read(path).map_err(|source| ArtifactError::Io { name, source })
}

fn parse<T: serde::de::DeserializeOwned>(name: &'static str, bytes: &[u8]) -> Result<T, ArtifactError> {
    serde_json::from_slice(bytes).map_err(|e| ArtifactError::Malformed {
        name,
        reason: e.to_string(),
    })
}

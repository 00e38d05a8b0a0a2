//! Classifier - serialized binary classifiers
//!
//! Models are exported from training as JSON. Tree models keep the flat
//! node-array layout of a fitted CART tree (`children_left`,
//! `children_right`, `feature`, `threshold`, `value`); leaves have
//! `children_left == -1` and samples go left when `x[feature] <= threshold`.

use serde::Deserialize;
use thiserror::Error;

const LEAF: i64 = -1;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("X has {got} features, but the model is expecting {expected} features as input")]
    FeatureCount { expected: usize, got: usize },

    #[error("model produced no class probabilities")]
    EmptyOutput,
}

/// Anything that can score an encoded feature vector
pub trait Classifier: Send + Sync {
    /// Class codes, in the order used by `predict_proba`
    fn classes(&self) -> &[i64];

    /// Probability distribution over `classes()` for one row
    fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>, InferenceError>;

    /// Discrete class code for one row
    fn predict(&self, row: &[f64]) -> Result<i64, InferenceError> {
        let proba = self.predict_proba(row)?;
        let idx = argmax(&proba).ok_or(InferenceError::EmptyOutput)?;
        self.classes()
            .get(idx)
            .copied()
            .ok_or(InferenceError::EmptyOutput)
    }
}

/// First index of the maximum value
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

// ============================================================================
// SERIALIZED MODELS
// ============================================================================

/// Classifier artifact as written by the training pipeline
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SerializedModel {
    RandomForest(RandomForest),
    DecisionTree(DecisionTree),
    LogisticRegression(LogisticRegression),
}

impl SerializedModel {
    pub fn kind(&self) -> &'static str {
        match self {
            SerializedModel::RandomForest(_) => "random_forest",
            SerializedModel::DecisionTree(_) => "decision_tree",
            SerializedModel::LogisticRegression(_) => "logistic_regression",
        }
    }

    /// Structural checks, run once at load time
    pub fn validate(&self) -> Result<(), String> {
        match self {
            SerializedModel::RandomForest(m) => {
                if m.trees.is_empty() {
                    return Err("random forest has no trees".to_string());
                }
                check_classes(&m.classes)?;
                for (i, tree) in m.trees.iter().enumerate() {
                    tree.validate(m.classes.len(), m.n_features)
                        .map_err(|e| format!("tree {}: {}", i, e))?;
                }
                Ok(())
            }
            SerializedModel::DecisionTree(m) => {
                check_classes(&m.classes)?;
                m.tree.validate(m.classes.len(), m.n_features)
            }
            SerializedModel::LogisticRegression(m) => {
                if m.classes.len() != 2 {
                    return Err(format!(
                        "logistic regression must be binary, got {} classes",
                        m.classes.len()
                    ));
                }
                if m.coef.len() != m.n_features {
                    return Err(format!(
                        "coef has {} weights for {} features",
                        m.coef.len(),
                        m.n_features
                    ));
                }
                Ok(())
            }
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            SerializedModel::RandomForest(m) => m.n_features,
            SerializedModel::DecisionTree(m) => m.n_features,
            SerializedModel::LogisticRegression(m) => m.n_features,
        }
    }

    fn check_width(&self, row: &[f64]) -> Result<(), InferenceError> {
        let expected = self.n_features();
        if row.len() != expected {
            return Err(InferenceError::FeatureCount { expected, got: row.len() });
        }
        Ok(())
    }
}

impl Classifier for SerializedModel {
    fn classes(&self) -> &[i64] {
        match self {
            SerializedModel::RandomForest(m) => &m.classes,
            SerializedModel::DecisionTree(m) => &m.classes,
            SerializedModel::LogisticRegression(m) => &m.classes,
        }
    }

    fn predict_proba(&self, row: &[f64]) -> Result<Vec<f64>, InferenceError> {
        self.check_width(row)?;
        let proba = match self {
            SerializedModel::RandomForest(m) => m.proba(row),
            SerializedModel::DecisionTree(m) => m.tree.proba(row),
            SerializedModel::LogisticRegression(m) => m.proba(row),
        };
        if proba.is_empty() {
            return Err(InferenceError::EmptyOutput);
        }
        Ok(proba)
    }
}

fn check_classes(classes: &[i64]) -> Result<(), String> {
    if classes.len() < 2 {
        return Err(format!("need at least 2 classes, got {}", classes.len()));
    }
    Ok(())
}

/// Averaged ensemble of trees
#[derive(Debug, Clone, Deserialize)]
pub struct RandomForest {
    pub classes: Vec<i64>,
    pub n_features: usize,
    pub trees: Vec<Tree>,
}

impl RandomForest {
    fn proba(&self, row: &[f64]) -> Vec<f64> {
        let mut sum = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (acc, p) in sum.iter_mut().zip(tree.proba(row)) {
                *acc += p;
            }
        }
        let n = self.trees.len() as f64;
        sum.iter().map(|s| s / n).collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionTree {
    pub classes: Vec<i64>,
    pub n_features: usize,
    pub tree: Tree,
}

/// Binary logistic regression; P(classes[1]) = sigmoid(coef . x + intercept)
#[derive(Debug, Clone, Deserialize)]
pub struct LogisticRegression {
    pub classes: Vec<i64>,
    pub n_features: usize,
    pub coef: Vec<f64>,
    pub intercept: f64,
}

impl LogisticRegression {
    fn proba(&self, row: &[f64]) -> Vec<f64> {
        let z: f64 = self.coef.iter().zip(row).map(|(w, x)| w * x).sum::<f64>() + self.intercept;
        let p = 1.0 / (1.0 + (-z).exp());
        vec![1.0 - p, p]
    }
}

/// One fitted tree in flat array form
#[derive(Debug, Clone, Deserialize)]
pub struct Tree {
    pub children_left: Vec<i64>,
    pub children_right: Vec<i64>,
    pub feature: Vec<i64>,
    pub threshold: Vec<f64>,
    /// Per-node class weights
    pub value: Vec<Vec<f64>>,
}

impl Tree {
    fn validate(&self, n_classes: usize, n_features: usize) -> Result<(), String> {
        let n = self.children_left.len();
        if n == 0 {
            return Err("tree has no nodes".to_string());
        }
        if self.children_right.len() != n
            || self.feature.len() != n
            || self.threshold.len() != n
            || self.value.len() != n
        {
            return Err("node arrays have mismatched lengths".to_string());
        }

        for i in 0..n {
            let left = self.children_left[i];
            let right = self.children_right[i];
            if left == LEAF {
                if self.value[i].len() != n_classes {
                    return Err(format!(
                        "leaf {} has {} class weights, expected {}",
                        i,
                        self.value[i].len(),
                        n_classes
                    ));
                }
                continue;
            }
            // Children always come after their parent, which rules out cycles
            for child in [left, right] {
                if child <= i as i64 || child >= n as i64 {
                    return Err(format!("node {} has invalid child {}", i, child));
                }
            }
            let f = self.feature[i];
            if f < 0 || f as usize >= n_features {
                return Err(format!("node {} splits on unknown feature {}", i, f));
            }
        }
        Ok(())
    }

    fn leaf(&self, row: &[f64]) -> usize {
        let mut node = 0usize;
        while self.children_left[node] != LEAF {
            let x = row[self.feature[node] as usize];
            node = if x <= self.threshold[node] {
                self.children_left[node] as usize
            } else {
                self.children_right[node] as usize
            };
        }
        node
    }

    fn proba(&self, row: &[f64]) -> Vec<f64> {
        let weights = &self.value[self.leaf(row)];
        let total: f64 = weights.iter().sum();
        if total > 0.0 {
            weights.iter().map(|w| w / total).collect()
        } else {
            vec![1.0 / weights.len() as f64; weights.len()]
        }
    }
}

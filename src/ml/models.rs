use crate::models::TriageScore;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MLConfig {
    /// Name of the label column in the training table
    #[serde(default = "default_target_column")]
    pub target_column: String,

    /// Field delimiter of the training table
    #[serde(default = "default_delimiter")]
    pub delimiter: char,

    /// Feature columns to train on; empty means every column except the target
    #[serde(default)]
    pub feature_columns: Vec<String>,

    /// Vital-sign columns whose non-numeric values exclude a row
    #[serde(default = "default_numeric_columns")]
    pub numeric_columns: Vec<String>,

    /// Held-out fraction (0.0 - 1.0)
    #[serde(default = "default_test_size")]
    pub test_size: f64,

    /// Seed shared by the split, the forest and the linear SVC
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of trees in the random forest
    #[serde(default = "default_n_trees")]
    pub n_trees: u16,

    /// Neighbours consulted by the KNN classifier
    #[serde(default = "default_k_neighbors")]
    pub k_neighbors: usize,

    /// Inverse regularization strength of the linear SVC
    #[serde(default = "default_svc_c")]
    pub svc_c: f64,

    /// Maximum coordinate-descent epochs of the linear SVC
    #[serde(default = "default_svc_max_iter")]
    pub svc_max_iter: usize,

    /// Projected-gradient stopping tolerance of the linear SVC
    #[serde(default = "default_svc_tolerance")]
    pub svc_tolerance: f64,
}

impl Default for MLConfig {
    fn default() -> Self {
        Self {
            target_column: default_target_column(),
            delimiter: default_delimiter(),
            feature_columns: Vec::new(),
            numeric_columns: default_numeric_columns(),
            test_size: default_test_size(),
            seed: default_seed(),
            n_trees: default_n_trees(),
            k_neighbors: default_k_neighbors(),
            svc_c: default_svc_c(),
            svc_max_iter: default_svc_max_iter(),
            svc_tolerance: default_svc_tolerance(),
        }
    }
}

fn default_target_column() -> String {
    "KTAS_expert".to_string()
}

fn default_delimiter() -> char {
    ','
}

fn default_numeric_columns() -> Vec<String> {
    ["SBP", "DBP", "HR", "RR", "BT"]
        .iter()
        .map(|c| c.to_string())
        .collect()
}

fn default_test_size() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

fn default_n_trees() -> u16 {
    100
}

fn default_k_neighbors() -> usize {
    5
}

fn default_svc_c() -> f64 {
    1.0
}

fn default_svc_max_iter() -> usize {
    10000
}

fn default_svc_tolerance() -> f64 {
    1e-4
}

/// Training sample for ML models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSample {
    /// Feature vector in dataset column order
    pub features: Vec<f64>,

    /// Expert triage label
    pub score: TriageScore,
}

impl TrainingSample {
    pub fn new(features: Vec<f64>, score: TriageScore) -> Self {
        Self { features, score }
    }
}

/// Training dataset
#[derive(Debug, Clone)]
pub struct TrainingDataset {
    /// Feature matrix (n_samples × n_features)
    pub features: Array2<f64>,

    /// Zero-based class labels (score - 1)
    pub labels: Vec<usize>,

    /// Column names, in matrix column order
    pub feature_names: Vec<String>,

    /// Number of samples
    pub n_samples: usize,

    /// Number of features
    pub n_features: usize,
}

impl TrainingDataset {
    /// Create a new training dataset from samples
    pub fn from_samples(samples: &[TrainingSample], feature_names: Vec<String>) -> Self {
        let n_samples = samples.len();
        let n_features = feature_names.len();

        let mut features = Array2::zeros((n_samples, n_features));
        let mut labels = Vec::with_capacity(n_samples);

        for (i, sample) in samples.iter().enumerate() {
            for (j, &val) in sample.features.iter().take(n_features).enumerate() {
                features[[i, j]] = val;
            }
            labels.push(sample.score.label());
        }

        Self {
            features,
            labels,
            feature_names,
            n_samples,
            n_features,
        }
    }

    /// Same rows and labels with a different feature matrix (e.g. after scaling)
    pub fn with_features(&self, features: Array2<f64>) -> Self {
        Self {
            n_features: features.ncols(),
            features,
            labels: self.labels.clone(),
            feature_names: self.feature_names.clone(),
            n_samples: self.n_samples,
        }
    }

    /// Shuffled train/test split, reproducible for a given seed
    pub fn train_test_split(&self, test_size: f64, seed: u64) -> (TrainingDataset, TrainingDataset) {
        let n_test = ((self.n_samples as f64) * test_size).ceil() as usize;
        let n_test = n_test.min(self.n_samples);

        let mut indices: Vec<usize> = (0..self.n_samples).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);

        let (test_idx, train_idx) = indices.split_at(n_test);
        (self.select(train_idx), self.select(test_idx))
    }

    fn select(&self, rows: &[usize]) -> TrainingDataset {
        TrainingDataset {
            features: self.features.select(ndarray::Axis(0), rows),
            labels: rows.iter().map(|&i| self.labels[i]).collect(),
            feature_names: self.feature_names.clone(),
            n_samples: rows.len(),
            n_features: self.n_features,
        }
    }

    /// Number of distinct classes present
    pub fn n_classes(&self) -> usize {
        let mut seen: Vec<usize> = self.labels.clone();
        seen.sort_unstable();
        seen.dedup();
        seen.len()
    }
}

/// Model evaluation metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Exact-match accuracy
    pub accuracy: f64,

    /// Macro-averaged precision
    pub precision: f64,

    /// Macro-averaged recall
    pub recall: f64,

    /// Macro-averaged F1 score
    pub f1_score: f64,

    /// Number of evaluated samples
    pub n_samples: usize,

    /// Per-class metrics keyed by triage score
    pub per_class_metrics: BTreeMap<u8, ClassMetrics>,
}

/// Per-class evaluation metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

impl ModelMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score zero-based predictions against zero-based truth labels.
    ///
    /// Per-class entries are reported by triage score (label + 1); classes
    /// absent from both truth and predictions are left out of the macro average.
    pub fn evaluate(y_true: &[usize], y_pred: &[usize]) -> Self {
        let n_samples = y_true.len();
        if n_samples == 0 {
            return Self::new();
        }

        let correct = y_true
            .iter()
            .zip(y_pred.iter())
            .filter(|(t, p)| t == p)
            .count();
        let accuracy = correct as f64 / n_samples as f64;

        let mut classes: Vec<usize> = y_true.iter().chain(y_pred.iter()).copied().collect();
        classes.sort_unstable();
        classes.dedup();

        let mut per_class = BTreeMap::new();

        for &class_idx in &classes {
            let tp = y_true
                .iter()
                .zip(y_pred.iter())
                .filter(|(t, p)| **t == class_idx && **p == class_idx)
                .count();

            let fp = y_pred
                .iter()
                .zip(y_true.iter())
                .filter(|(p, t)| **p == class_idx && **t != class_idx)
                .count();

            let fn_count = y_true
                .iter()
                .zip(y_pred.iter())
                .filter(|(t, p)| **t == class_idx && **p != class_idx)
                .count();

            let precision = if tp + fp > 0 {
                tp as f64 / (tp + fp) as f64
            } else {
                0.0
            };

            let recall = if tp + fn_count > 0 {
                tp as f64 / (tp + fn_count) as f64
            } else {
                0.0
            };

            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            let support = y_true.iter().filter(|&&t| t == class_idx).count();

            per_class.insert(
                (class_idx + 1) as u8,
                ClassMetrics {
                    precision,
                    recall,
                    f1_score: f1,
                    support,
                },
            );
        }

        let n_classes = per_class.len().max(1) as f64;
        let avg_precision = per_class.values().map(|m| m.precision).sum::<f64>() / n_classes;
        let avg_recall = per_class.values().map(|m| m.recall).sum::<f64>() / n_classes;
        let avg_f1 = per_class.values().map(|m| m.f1_score).sum::<f64>() / n_classes;

        Self {
            accuracy,
            precision: avg_precision,
            recall: avg_recall,
            f1_score: avg_f1,
            n_samples,
            per_class_metrics: per_class,
        }
    }
}

/// Model metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Model name
    pub name: String,

    /// Model type
    pub model_type: ModelType,

    /// Training timestamp
    pub trained_at: chrono::DateTime<chrono::Utc>,

    /// Number of training samples
    pub n_training_samples: usize,

    /// Number of features
    pub n_features: usize,

    /// Metrics on the training rows
    pub training_metrics: ModelMetrics,

    /// Hyperparameters
    pub hyperparameters: BTreeMap<String, String>,
}

impl ModelMetadata {
    pub fn new(model_type: ModelType) -> Self {
        Self {
            name: model_type.to_string(),
            model_type,
            trained_at: chrono::Utc::now(),
            n_training_samples: 0,
            n_features: 0,
            training_metrics: ModelMetrics::new(),
            hyperparameters: BTreeMap::new(),
        }
    }

    pub fn with_hyperparameter(mut self, key: &str, value: impl ToString) -> Self {
        self.hyperparameters.insert(key.to_string(), value.to_string());
        self
    }
}

/// Model type enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Bagged decision trees
    RandomForest,

    /// One-vs-rest linear support vector classifier
    LinearSvc,

    /// K-Nearest Neighbors
    Knn,

    /// Hard-voting ensemble of the three
    Ensemble,
}

impl std::fmt::Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelType::RandomForest => write!(f, "Random Forest"),
            ModelType::LinearSvc => write!(f, "Linear SVC"),
            ModelType::Knn => write!(f, "K-Nearest Neighbors"),
            ModelType::Ensemble => write!(f, "Voting Ensemble"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(v: i64) -> TriageScore {
        TriageScore::new(v).unwrap()
    }

    #[test]
    fn test_training_dataset_from_samples() {
        let samples = vec![
            TrainingSample::new(vec![1.0, 2.0], score(1)),
            TrainingSample::new(vec![3.0, 4.0], score(2)),
            TrainingSample::new(vec![5.0, 6.0], score(5)),
        ];

        let dataset = TrainingDataset::from_samples(&samples, vec!["a".into(), "b".into()]);

        assert_eq!(dataset.n_samples, 3);
        assert_eq!(dataset.n_features, 2);
        assert_eq!(dataset.features.shape(), &[3, 2]);
        assert_eq!(dataset.labels, vec![0, 1, 4]);
        assert_eq!(dataset.n_classes(), 3);
    }

    #[test]
    fn test_train_test_split() {
        let samples: Vec<TrainingSample> = (0..100)
            .map(|i| {
                TrainingSample::new(
                    vec![i as f64, (i * 2) as f64],
                    score(if i % 2 == 0 { 1 } else { 2 }),
                )
            })
            .collect();

        let dataset = TrainingDataset::from_samples(&samples, vec!["x".into(), "y".into()]);
        let (train, test) = dataset.train_test_split(0.2, 42);

        assert_eq!(train.n_samples, 80);
        assert_eq!(test.n_samples, 20);
        assert_eq!(train.n_features, 2);
        assert_eq!(test.labels.len(), 20);

        // same seed, same partition
        let (_, test_again) = dataset.train_test_split(0.2, 42);
        assert_eq!(test.features, test_again.features);

        // rows keep their labels through the shuffle
        for (row, &label) in test.features.rows().into_iter().zip(test.labels.iter()) {
            let i = row[0] as usize;
            assert_eq!(label, if i % 2 == 0 { 0 } else { 1 });
        }
    }

    #[test]
    fn test_evaluate_metrics() {
        let truth = vec![0, 0, 1, 1, 2];
        let pred = vec![0, 1, 1, 1, 2];
        let metrics = ModelMetrics::evaluate(&truth, &pred);

        assert!((metrics.accuracy - 0.8).abs() < 1e-12);
        assert_eq!(metrics.n_samples, 5);
        assert_eq!(metrics.per_class_metrics[&1].support, 2);
        assert!((metrics.per_class_metrics[&2].precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(metrics.per_class_metrics[&3].recall, 1.0);
    }

    #[test]
    fn test_ml_config_default() {
        let config = MLConfig::default();
        assert_eq!(config.target_column, "KTAS_expert");
        assert_eq!(config.test_size, 0.2);
        assert_eq!(config.seed, 42);
        assert_eq!(config.k_neighbors, 5);
        assert_eq!(config.numeric_columns.len(), 5);
    }

    #[test]
    fn test_model_type_display() {
        assert_eq!(ModelType::RandomForest.to_string(), "Random Forest");
        assert_eq!(ModelType::LinearSvc.to_string(), "Linear SVC");
        assert_eq!(ModelType::Knn.to_string(), "K-Nearest Neighbors");
    }
}

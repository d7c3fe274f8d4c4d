use crate::error::{AppError, Result};
use crate::ml::models::{ModelMetadata, ModelMetrics, ModelType, TrainingDataset};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use smartcore::ensemble::random_forest_classifier::{
    RandomForestClassifier, RandomForestClassifierParameters,
};
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::metrics::distance::euclidian::Euclidian;
use smartcore::neighbors::knn_classifier::{KNNClassifier, KNNClassifierParameters};
use tracing::{debug, warn};

/// Trait for the base classifiers of the voting ensemble.
///
/// Labels are zero-based (triage score - 1) on both sides of the trait.
pub trait Classifier: Send + Sync {
    /// Train the classifier, returning metrics on the training rows
    fn train(&mut self, dataset: &TrainingDataset) -> Result<ModelMetrics>;

    /// Predict class labels, one per row
    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>>;

    /// Get model metadata
    fn metadata(&self) -> &ModelMetadata;

    /// Get model type
    fn model_type(&self) -> ModelType;

    /// Check if model is trained
    fn is_trained(&self) -> bool;

    /// Width of the feature space the model was fitted on
    fn n_features(&self) -> usize {
        self.metadata().n_features
    }
}

fn ndarray_to_densematrix(arr: &Array2<f64>) -> DenseMatrix<f64> {
    let shape = arr.shape();
    let data: Vec<f64> = arr.iter().copied().collect();
    DenseMatrix::new(shape[0], shape[1], data, false)
}

fn labels_to_targets(labels: &[usize]) -> Vec<i32> {
    labels.iter().map(|&x| x as i32).collect()
}

fn targets_to_labels(targets: &[i32]) -> Result<Vec<usize>> {
    targets
        .iter()
        .map(|&t| {
            usize::try_from(t)
                .map_err(|_| AppError::Model(format!("classifier produced negative label {}", t)))
        })
        .collect()
}

/// Reject matrices the fitted model cannot score
fn check_input(model: &dyn Classifier, features: &Array2<f64>) -> Result<()> {
    if !model.is_trained() {
        return Err(AppError::Model(format!("{} is not trained", model.model_type())));
    }
    if features.ncols() != model.n_features() {
        return Err(AppError::EnsembleInput(format!(
            "{} expects {} features, got {}",
            model.model_type(),
            model.n_features(),
            features.ncols()
        )));
    }
    if features.iter().any(|v| !v.is_finite()) {
        return Err(AppError::EnsembleInput(
            "feature matrix contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

fn check_training_set(dataset: &TrainingDataset) -> Result<()> {
    if dataset.n_samples == 0 {
        return Err(AppError::TrainingData("no training rows".to_string()));
    }
    if dataset.labels.len() != dataset.n_samples {
        return Err(AppError::TrainingData(format!(
            "{} labels for {} rows",
            dataset.labels.len(),
            dataset.n_samples
        )));
    }
    Ok(())
}

fn record_training(
    metadata: &mut ModelMetadata,
    dataset: &TrainingDataset,
    metrics: &ModelMetrics,
) {
    metadata.n_training_samples = dataset.n_samples;
    metadata.n_features = dataset.n_features;
    metadata.trained_at = chrono::Utc::now();
    metadata.training_metrics = metrics.clone();
}

/// Random forest over the scaled vitals
#[derive(Serialize, Deserialize)]
pub struct RandomForestModel {
    /// Model metadata
    metadata: ModelMetadata,

    /// Trained model
    model: Option<RandomForestClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>>>,

    /// Number of trees
    n_trees: u16,

    /// Bootstrap seed
    seed: u64,
}

impl RandomForestModel {
    pub fn new(n_trees: u16, seed: u64) -> Self {
        Self {
            metadata: ModelMetadata::new(ModelType::RandomForest)
                .with_hyperparameter("n_trees", n_trees)
                .with_hyperparameter("seed", seed),
            model: None,
            n_trees,
            seed,
        }
    }
}

impl Classifier for RandomForestModel {
    fn train(&mut self, dataset: &TrainingDataset) -> Result<ModelMetrics> {
        check_training_set(dataset)?;

        let x = ndarray_to_densematrix(&dataset.features);
        let y = labels_to_targets(&dataset.labels);

        let params = RandomForestClassifierParameters::default()
            .with_n_trees(self.n_trees)
            .with_seed(self.seed);

        let model = RandomForestClassifier::fit(&x, &y, params)
            .map_err(|e| AppError::Model(format!("Failed to train random forest: {}", e)))?;

        self.model = Some(model);
        self.metadata.n_features = dataset.n_features;

        let predictions = self.predict(&dataset.features)?;
        let metrics = ModelMetrics::evaluate(&dataset.labels, &predictions);
        record_training(&mut self.metadata, dataset, &metrics);

        Ok(metrics)
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        check_input(self, features)?;
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| AppError::Model("Random forest not trained".to_string()))?;

        let x = ndarray_to_densematrix(features);
        let predictions = model
            .predict(&x)
            .map_err(|e| AppError::Model(format!("Random forest prediction failed: {}", e)))?;

        targets_to_labels(&predictions)
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn model_type(&self) -> ModelType {
        ModelType::RandomForest
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }
}

/// K-nearest-neighbour classifier (Euclidean distance, uniform weights)
#[derive(Serialize, Deserialize)]
pub struct KnnModel {
    /// Model metadata
    metadata: ModelMetadata,

    /// Trained model
    model: Option<KNNClassifier<f64, i32, DenseMatrix<f64>, Vec<i32>, Euclidian<f64>>>,

    /// Neighbours consulted per prediction
    k: usize,
}

impl KnnModel {
    pub fn new(k: usize) -> Self {
        Self {
            metadata: ModelMetadata::new(ModelType::Knn).with_hyperparameter("k", k),
            model: None,
            k,
        }
    }
}

impl Classifier for KnnModel {
    fn train(&mut self, dataset: &TrainingDataset) -> Result<ModelMetrics> {
        check_training_set(dataset)?;
        if dataset.n_samples < self.k {
            return Err(AppError::TrainingData(format!(
                "KNN needs at least {} training rows, got {}",
                self.k, dataset.n_samples
            )));
        }

        let x = ndarray_to_densematrix(&dataset.features);
        let y = labels_to_targets(&dataset.labels);

        let params = KNNClassifierParameters::default().with_k(self.k);
        let model = KNNClassifier::fit(&x, &y, params)
            .map_err(|e| AppError::Model(format!("Failed to fit KNN: {}", e)))?;

        self.model = Some(model);
        self.metadata.n_features = dataset.n_features;

        let predictions = self.predict(&dataset.features)?;
        let metrics = ModelMetrics::evaluate(&dataset.labels, &predictions);
        record_training(&mut self.metadata, dataset, &metrics);

        Ok(metrics)
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        check_input(self, features)?;
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| AppError::Model("KNN not trained".to_string()))?;

        let x = ndarray_to_densematrix(features);
        let predictions = model
            .predict(&x)
            .map_err(|e| AppError::Model(format!("KNN prediction failed: {}", e)))?;

        targets_to_labels(&predictions)
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn model_type(&self) -> ModelType {
        ModelType::Knn
    }

    fn is_trained(&self) -> bool {
        self.model.is_some()
    }
}

/// One-vs-rest linear SVC: L2-regularised squared hinge loss, solved in the dual
/// by coordinate descent with the intercept treated as an extra unit feature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSvcModel {
    /// Model metadata
    metadata: ModelMetadata,

    /// Inverse regularization strength
    c: f64,

    /// Maximum passes over the training rows
    max_iter: usize,

    /// Projected-gradient stopping tolerance
    tolerance: f64,

    /// Seed of the coordinate visiting order
    seed: u64,

    /// Labels seen during training, in weight-row order
    classes: Vec<usize>,

    /// One weight row per class (n_classes × n_features)
    weights: Option<Array2<f64>>,

    /// One intercept per class
    intercepts: Option<Array1<f64>>,
}

impl LinearSvcModel {
    pub fn new(c: f64, max_iter: usize, tolerance: f64, seed: u64) -> Self {
        Self {
            metadata: ModelMetadata::new(ModelType::LinearSvc)
                .with_hyperparameter("c", c)
                .with_hyperparameter("max_iter", max_iter)
                .with_hyperparameter("tolerance", tolerance)
                .with_hyperparameter("loss", "squared_hinge"),
            c,
            max_iter,
            tolerance,
            seed,
            classes: Vec::new(),
            weights: None,
            intercepts: None,
        }
    }

    /// Fit one binary separator; `signs` holds +1.0 / -1.0 per row.
    fn fit_binary(&self, x: &Array2<f64>, signs: &[f64], rng: &mut StdRng) -> (Array1<f64>, f64) {
        let n = x.nrows();
        let diag = 0.5 / self.c;
        let qd: Vec<f64> = x
            .rows()
            .into_iter()
            .map(|row| row.dot(&row) + 1.0 + diag)
            .collect();

        let mut alpha = vec![0.0; n];
        let mut w = Array1::<f64>::zeros(x.ncols());
        let mut b = 0.0;
        let mut order: Vec<usize> = (0..n).collect();
        let mut converged = false;

        for _ in 0..self.max_iter {
            order.shuffle(rng);
            let mut pg_max = f64::NEG_INFINITY;
            let mut pg_min = f64::INFINITY;

            for &i in &order {
                let xi = x.row(i);
                let g = signs[i] * (w.dot(&xi) + b) - 1.0 + diag * alpha[i];
                let pg = if alpha[i] == 0.0 { g.min(0.0) } else { g };
                pg_max = pg_max.max(pg);
                pg_min = pg_min.min(pg);

                if pg.abs() > 1e-12 {
                    let old = alpha[i];
                    alpha[i] = (old - g / qd[i]).max(0.0);
                    let delta = (alpha[i] - old) * signs[i];
                    w.scaled_add(delta, &xi);
                    b += delta;
                }
            }

            if pg_max - pg_min <= self.tolerance {
                converged = true;
                break;
            }
        }

        if !converged {
            warn!(
                max_iter = self.max_iter,
                "Linear SVC did not converge; consider raising svc_max_iter"
            );
        }

        (w, b)
    }

    /// Decision values (n_rows × n_classes)
    fn decision_function(&self, features: &Array2<f64>) -> Result<Array2<f64>> {
        let weights = self
            .weights
            .as_ref()
            .ok_or_else(|| AppError::Model("Linear SVC not trained".to_string()))?;
        let intercepts = self
            .intercepts
            .as_ref()
            .ok_or_else(|| AppError::Model("Linear SVC not trained".to_string()))?;

        Ok(features.dot(&weights.t()) + intercepts)
    }
}

impl Classifier for LinearSvcModel {
    fn train(&mut self, dataset: &TrainingDataset) -> Result<ModelMetrics> {
        check_training_set(dataset)?;
        if self.c <= 0.0 {
            return Err(AppError::Configuration(format!(
                "svc_c must be positive, got {}",
                self.c
            )));
        }

        let mut classes = dataset.labels.clone();
        classes.sort_unstable();
        classes.dedup();

        let mut weights = Array2::<f64>::zeros((classes.len(), dataset.n_features));
        let mut intercepts = Array1::<f64>::zeros(classes.len());

        // a single class needs no separator: zero weights always pick it
        if classes.len() > 1 {
            let mut rng = StdRng::seed_from_u64(self.seed);
            for (k, &class) in classes.iter().enumerate() {
                let signs: Vec<f64> = dataset
                    .labels
                    .iter()
                    .map(|&l| if l == class { 1.0 } else { -1.0 })
                    .collect();
                let (w, b) = self.fit_binary(&dataset.features, &signs, &mut rng);
                weights.row_mut(k).assign(&w);
                intercepts[k] = b;
                debug!(class = class + 1, intercept = b, "Fitted one-vs-rest separator");
            }
        }

        self.classes = classes;
        self.weights = Some(weights);
        self.intercepts = Some(intercepts);
        self.metadata.n_features = dataset.n_features;

        let predictions = self.predict(&dataset.features)?;
        let metrics = ModelMetrics::evaluate(&dataset.labels, &predictions);
        record_training(&mut self.metadata, dataset, &metrics);

        Ok(metrics)
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        check_input(self, features)?;
        let scores = self.decision_function(features)?;

        Ok(scores
            .axis_iter(Axis(0))
            .map(|row| {
                // first maximum wins, i.e. the lowest label on exact ties
                let mut best = 0;
                for (k, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = k;
                    }
                }
                self.classes[best]
            })
            .collect())
    }

    fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    fn model_type(&self) -> ModelType {
        ModelType::LinearSvc
    }

    fn is_trained(&self) -> bool {
        self.weights.is_some() && !self.classes.is_empty()
    }
}

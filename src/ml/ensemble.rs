use crate::error::{AppError, Result};
use crate::ml::classifier::{Classifier, KnnModel, LinearSvcModel, RandomForestModel};
use crate::ml::models::{MLConfig, ModelMetrics, ModelType, TrainingDataset};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Voter order, which is also the tie-break precedence: when no class has a
/// strict majority, the earliest voter among the tied classes decides.
pub const VOTER_PRECEDENCE: [ModelType; 3] =
    [ModelType::RandomForest, ModelType::LinearSvc, ModelType::Knn];

/// Hard (unweighted) majority vote over labels listed in voter precedence order.
///
/// Returns `None` only for an empty ballot.
pub fn hard_vote(votes: &[usize]) -> Option<usize> {
    let mut tally: BTreeMap<usize, usize> = BTreeMap::new();
    for &vote in votes {
        *tally.entry(vote).or_insert(0) += 1;
    }
    let top = *tally.values().max()?;

    votes.iter().copied().find(|vote| tally[vote] == top)
}

/// Per-voter labels for one row together with the ensemble decision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ballot {
    /// (voter, zero-based label) in precedence order
    pub votes: Vec<(ModelType, usize)>,

    /// Zero-based winning label
    pub decision: usize,
}

/// The three fitted base classifiers combined by hard voting
#[derive(Serialize, Deserialize)]
pub struct VotingEnsemble {
    forest: RandomForestModel,
    svc: LinearSvcModel,
    knn: KnnModel,
}

impl VotingEnsemble {
    /// Untrained ensemble with hyperparameters taken from `config`
    pub fn new(config: &MLConfig) -> Self {
        Self {
            forest: RandomForestModel::new(config.n_trees, config.seed),
            svc: LinearSvcModel::new(
                config.svc_c,
                config.svc_max_iter,
                config.svc_tolerance,
                config.seed,
            ),
            knn: KnnModel::new(config.k_neighbors),
        }
    }

    /// Fit each base classifier independently on the same scaled matrix
    pub fn train(&mut self, dataset: &TrainingDataset) -> Result<BTreeMap<ModelType, ModelMetrics>> {
        let mut metrics = BTreeMap::new();
        metrics.insert(ModelType::RandomForest, self.forest.train(dataset)?);
        metrics.insert(ModelType::LinearSvc, self.svc.train(dataset)?);
        metrics.insert(ModelType::Knn, self.knn.train(dataset)?);
        Ok(metrics)
    }

    /// Base classifiers in precedence order
    pub fn voters(&self) -> [&dyn Classifier; 3] {
        [&self.forest, &self.svc, &self.knn]
    }

    pub fn is_trained(&self) -> bool {
        self.voters().iter().all(|v| v.is_trained())
    }

    /// Feature width shared by all voters, or an error if they disagree
    pub fn n_features(&self) -> Result<usize> {
        let widths: Vec<usize> = self.voters().iter().map(|v| v.n_features()).collect();
        if widths.windows(2).all(|w| w[0] == w[1]) {
            Ok(widths[0])
        } else {
            Err(AppError::ArtifactLoad(format!(
                "base classifiers disagree on feature width: {:?}",
                widths
            )))
        }
    }

    /// One ballot per row of `features`
    pub fn ballots(&self, features: &Array2<f64>) -> Result<Vec<Ballot>> {
        let per_voter: Vec<(ModelType, Vec<usize>)> = self
            .voters()
            .iter()
            .map(|voter| -> Result<(ModelType, Vec<usize>)> {
                Ok((voter.model_type(), voter.predict(features)?))
            })
            .collect::<Result<_>>()?;

        (0..features.nrows())
            .map(|row| -> Result<Ballot> {
                let votes: Vec<(ModelType, usize)> = per_voter
                    .iter()
                    .map(|(model, labels)| (*model, labels[row]))
                    .collect();
                let labels: Vec<usize> = votes.iter().map(|(_, label)| *label).collect();
                let decision = hard_vote(&labels)
                    .ok_or_else(|| AppError::Internal("empty ballot".to_string()))?;
                Ok(Ballot { votes, decision })
            })
            .collect()
    }

    /// Zero-based ensemble labels, one per row
    pub fn predict(&self, features: &Array2<f64>) -> Result<Vec<usize>> {
        Ok(self
            .ballots(features)?
            .into_iter()
            .map(|ballot| ballot.decision)
            .collect())
    }

    /// Held-out exact-match evaluation of each voter and of the ensemble
    pub fn evaluate(&self, dataset: &TrainingDataset) -> Result<BTreeMap<ModelType, ModelMetrics>> {
        let mut report = BTreeMap::new();
        for voter in self.voters() {
            let predictions = voter.predict(&dataset.features)?;
            let metrics = ModelMetrics::evaluate(&dataset.labels, &predictions);
            info!(
                model = %voter.model_type(),
                accuracy = metrics.accuracy,
                "Held-out accuracy (exact match)"
            );
            report.insert(voter.model_type(), metrics);
        }

        let predictions = self.predict(&dataset.features)?;
        let metrics = ModelMetrics::evaluate(&dataset.labels, &predictions);
        info!(
            model = %ModelType::Ensemble,
            accuracy = metrics.accuracy,
            "Held-out accuracy (exact match)"
        );
        report.insert(ModelType::Ensemble, metrics);

        Ok(report)
    }
}

/// Machine learning side of the triage engine
///
/// This module provides:
/// - Deterministic feature encoding of intake observations
/// - Standardization fitted on the training partition
/// - Three base classifiers (random forest, linear SVC, KNN) combined by hard voting
/// - The offline training harness and the versioned on-disk artifact

pub mod artifact;
pub mod classifier;
pub mod ensemble;
pub mod features;
pub mod models;
pub mod scaler;
pub mod training;

pub use artifact::{ArtifactInfo, ArtifactManifest, ModelArtifact};
pub use classifier::{Classifier, KnnModel, LinearSvcModel, RandomForestModel};
pub use ensemble::{hard_vote, Ballot, VotingEnsemble, VOTER_PRECEDENCE};
pub use features::{EncodedObservation, EncodingIssue, FeatureEncoder, FeatureVector};
pub use models::{
    MLConfig, ModelMetadata, ModelMetrics, ModelType, TrainingDataset, TrainingSample,
};
pub use scaler::StandardScaler;
pub use training::{ExclusionReason, Trainer, TrainingSummary, TrainingTable};

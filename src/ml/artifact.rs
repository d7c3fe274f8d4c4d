use crate::error::{AppError, Result};
use crate::ml::ensemble::{Ballot, VotingEnsemble};
use crate::ml::features::FeatureVector;
use crate::ml::scaler::StandardScaler;
use crate::ml::training::TrainingSummary;
use chrono::{DateTime, Utc};
use ndarray::Axis;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const SCALER_FILE: &str = "scaler.bin";
pub const CLASSIFIERS_FILE: &str = "classifiers.bin";
pub const FEATURE_NAMES_FILE: &str = "feature_names.json";

#[derive(Serialize, Deserialize)]
struct ScalerPart {
    run_id: Uuid,
    scaler: StandardScaler,
}

#[derive(Serialize, Deserialize)]
struct ClassifiersPart {
    run_id: Uuid,
    ensemble: VotingEnsemble,
}

#[derive(Serialize, Deserialize)]
struct FeatureNamesPart {
    run_id: Uuid,
    names: Vec<String>,
}

/// Identity of one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub format_version: u32,
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub summary: TrainingSummary,
}

/// Checksum of one stored part
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartDigest {
    pub sha256: String,
    pub bytes: u64,
}

/// Written last, so a directory without a manifest is never mistaken for a complete artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub info: ArtifactInfo,

    /// File name -> digest
    pub parts: BTreeMap<String, PartDigest>,
}

/// Scaler, base classifiers and feature order from a single training run.
///
/// Immutable once built or loaded; share it behind an `Arc`.
pub struct ModelArtifact {
    info: ArtifactInfo,
    feature_names: Vec<String>,
    scaler: StandardScaler,
    ensemble: VotingEnsemble,
}

impl ModelArtifact {
    /// Assemble an artifact from freshly trained parts
    pub fn new(
        run_id: Uuid,
        feature_names: Vec<String>,
        scaler: StandardScaler,
        ensemble: VotingEnsemble,
        summary: TrainingSummary,
    ) -> Result<Self> {
        let artifact = Self {
            info: ArtifactInfo {
                format_version: ARTIFACT_FORMAT_VERSION,
                run_id,
                created_at: Utc::now(),
                summary,
            },
            feature_names,
            scaler,
            ensemble,
        };
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn info(&self) -> &ArtifactInfo {
        &self.info
    }

    pub fn run_id(&self) -> Uuid {
        self.info.run_id
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn ensemble(&self) -> &VotingEnsemble {
        &self.ensemble
    }

    /// Scale one encoded row and collect the base classifiers' votes
    pub fn ballot(&self, vector: &FeatureVector) -> Result<Ballot> {
        if vector.len() != self.feature_names.len() {
            return Err(AppError::EnsembleInput(format!(
                "feature vector has {} values, artifact expects {}",
                vector.len(),
                self.feature_names.len()
            )));
        }

        let scaled = self.scaler.transform_row(vector.view())?.insert_axis(Axis(0));
        self.ensemble
            .ballots(&scaled)?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Internal("ensemble returned no ballot".to_string()))
    }

    /// Write all parts, then the manifest, into `dir`
    pub fn save(&self, dir: &Path) -> Result<ArtifactManifest> {
        fs::create_dir_all(dir)?;
        let run_id = self.info.run_id;

        let scaler_bytes = bincode::serialize(&ScalerPart {
            run_id,
            scaler: self.scaler.clone(),
        })?;
        let classifier_bytes = bincode::serialize(&ClassifiersPartRef {
            run_id,
            ensemble: &self.ensemble,
        })?;
        let names_bytes = serde_json::to_vec_pretty(&FeatureNamesPart {
            run_id,
            names: self.feature_names.clone(),
        })?;

        let mut parts = BTreeMap::new();
        for (file, bytes) in [
            (SCALER_FILE, &scaler_bytes),
            (CLASSIFIERS_FILE, &classifier_bytes),
            (FEATURE_NAMES_FILE, &names_bytes),
        ] {
            fs::write(dir.join(file), bytes)?;
            parts.insert(file.to_string(), digest(bytes));
            debug!(file, bytes = bytes.len(), "Wrote artifact part");
        }

        let manifest = ArtifactManifest {
            info: self.info.clone(),
            parts,
        };
        fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec_pretty(&manifest)?)?;

        info!(run_id = %run_id, dir = %dir.display(), "Model artifact saved");
        Ok(manifest)
    }

    /// Load and cross-check every part; any missing, corrupt or foreign part is fatal
    pub fn load(dir: &Path) -> Result<Self> {
        let manifest = Self::read_manifest(dir)?;
        let run_id = manifest.info.run_id;

        if manifest.info.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(AppError::ArtifactLoad(format!(
                "unsupported artifact format version {} (expected {})",
                manifest.info.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }

        let scaler_bytes = read_part(dir, &manifest, SCALER_FILE)?;
        let classifier_bytes = read_part(dir, &manifest, CLASSIFIERS_FILE)?;
        let names_bytes = read_part(dir, &manifest, FEATURE_NAMES_FILE)?;

        let scaler: ScalerPart = decode_bincode(SCALER_FILE, &scaler_bytes)?;
        let classifiers: ClassifiersPart = decode_bincode(CLASSIFIERS_FILE, &classifier_bytes)?;
        let names: FeatureNamesPart = serde_json::from_slice(&names_bytes).map_err(|e| {
            AppError::ArtifactLoad(format!("{} is corrupt: {}", FEATURE_NAMES_FILE, e))
        })?;

        for (file, part_run) in [
            (SCALER_FILE, scaler.run_id),
            (CLASSIFIERS_FILE, classifiers.run_id),
            (FEATURE_NAMES_FILE, names.run_id),
        ] {
            if part_run != run_id {
                return Err(AppError::ArtifactLoad(format!(
                    "{} belongs to training run {}, manifest is run {}",
                    file, part_run, run_id
                )));
            }
        }

        let artifact = Self {
            info: manifest.info,
            feature_names: names.names,
            scaler: scaler.scaler,
            ensemble: classifiers.ensemble,
        };
        artifact.validate()?;

        info!(
            run_id = %run_id,
            n_features = artifact.feature_names.len(),
            dir = %dir.display(),
            "Model artifact loaded"
        );
        Ok(artifact)
    }

    /// Read only the manifest (used for inspection)
    pub fn read_manifest(dir: &Path) -> Result<ArtifactManifest> {
        let path = dir.join(MANIFEST_FILE);
        let bytes = fs::read(&path).map_err(|e| {
            AppError::ArtifactLoad(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::ArtifactLoad(format!("{} is corrupt: {}", MANIFEST_FILE, e)))
    }

    fn validate(&self) -> Result<()> {
        if self.feature_names.is_empty() {
            return Err(AppError::ArtifactLoad("feature name list is empty".to_string()));
        }

        let mut seen = HashSet::new();
        if let Some(dup) = self.feature_names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(AppError::ArtifactLoad(format!(
                "duplicate feature name '{}'",
                dup
            )));
        }

        let width = self.feature_names.len();
        if self.scaler.n_features() != width {
            return Err(AppError::ArtifactLoad(format!(
                "scaler fitted on {} columns, feature list has {}",
                self.scaler.n_features(),
                width
            )));
        }

        if !self.ensemble.is_trained() {
            return Err(AppError::ArtifactLoad(
                "artifact contains an untrained classifier".to_string(),
            ));
        }

        let ensemble_width = self.ensemble.n_features()?;
        if ensemble_width != width {
            return Err(AppError::ArtifactLoad(format!(
                "classifiers fitted on {} columns, feature list has {}",
                ensemble_width, width
            )));
        }

        Ok(())
    }
}

/// Borrowing twin of `ClassifiersPart` so saving does not need to clone the models
#[derive(Serialize)]
struct ClassifiersPartRef<'a> {
    run_id: Uuid,
    ensemble: &'a VotingEnsemble,
}

fn digest(bytes: &[u8]) -> PartDigest {
    PartDigest {
        sha256: format!("{:x}", Sha256::digest(bytes)),
        bytes: bytes.len() as u64,
    }
}

fn read_part(dir: &Path, manifest: &ArtifactManifest, file: &str) -> Result<Vec<u8>> {
    let expected = manifest.parts.get(file).ok_or_else(|| {
        AppError::ArtifactLoad(format!("manifest does not list part {}", file))
    })?;

    let bytes = fs::read(dir.join(file))
        .map_err(|e| AppError::ArtifactLoad(format!("missing artifact part {}: {}", file, e)))?;

    let actual = digest(&bytes);
    if actual != *expected {
        return Err(AppError::ArtifactLoad(format!(
            "checksum mismatch for {} (expected {}, found {})",
            file, expected.sha256, actual.sha256
        )));
    }

    Ok(bytes)
}

fn decode_bincode<T: DeserializeOwned>(file: &str, bytes: &[u8]) -> Result<T> {
    bincode::deserialize(bytes)
        .map_err(|e| AppError::ArtifactLoad(format!("{} is corrupt: {}", file, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::models::{MLConfig, TrainingDataset, TrainingSample};
    use crate::models::TriageScore;

    fn names(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|c| c.to_string()).collect()
    }

    fn summary() -> TrainingSummary {
        TrainingSummary {
            rows_read: 30,
            rows_excluded: BTreeMap::new(),
            n_train: 30,
            n_test: 0,
            n_features: 2,
            test_size: 0.2,
            seed: 1,
            evaluation: BTreeMap::new(),
        }
    }

    fn fitted_parts() -> (StandardScaler, VotingEnsemble) {
        let samples: Vec<TrainingSample> = (0..30)
            .map(|i| {
                let score = (i % 3) as i64 * 2 + 1;
                let x = score as f64 * 10.0 + (i % 5) as f64 * 0.1;
                TrainingSample::new(vec![x, -x], TriageScore::new(score).unwrap())
            })
            .collect();
        let dataset = TrainingDataset::from_samples(&samples, names(&["a", "b"]));
        let scaler = StandardScaler::fit(&dataset.features).unwrap();
        let scaled = dataset.with_features(scaler.transform(&dataset.features).unwrap());

        let config = MLConfig {
            n_trees: 5,
            k_neighbors: 3,
            svc_max_iter: 200,
            ..MLConfig::default()
        };
        let mut ensemble = VotingEnsemble::new(&config);
        ensemble.train(&scaled).unwrap();
        (scaler, ensemble)
    }

    #[test]
    fn test_rejects_duplicate_feature_names() {
        let (scaler, ensemble) = fitted_parts();
        let result = ModelArtifact::new(Uuid::new_v4(), names(&["a", "a"]), scaler, ensemble, summary());
        match result {
            Err(AppError::ArtifactLoad(msg)) => assert!(msg.contains("duplicate")),
            _ => panic!("expected duplicate feature name error"),
        }
    }

    #[test]
    fn test_rejects_width_mismatch() {
        let (scaler, ensemble) = fitted_parts();
        let result = ModelArtifact::new(Uuid::new_v4(), names(&["a", "b", "c"]), scaler, ensemble, summary());
        assert!(matches!(result, Err(AppError::ArtifactLoad(_))));
    }

    #[test]
    fn test_rejects_untrained_ensemble() {
        let (scaler, _) = fitted_parts();
        let untrained = VotingEnsemble::new(&MLConfig::default());
        let result = ModelArtifact::new(Uuid::new_v4(), names(&["a", "b"]), scaler, untrained, summary());
        assert!(matches!(result, Err(AppError::ArtifactLoad(_))));
    }

    #[test]
    fn test_ballot_checks_vector_width() {
        let (scaler, ensemble) = fitted_parts();
        let artifact =
            ModelArtifact::new(Uuid::new_v4(), names(&["a", "b"]), scaler, ensemble, summary()).unwrap();

        let ballot = artifact.ballot(&FeatureVector::from(vec![50.0, -50.0])).unwrap();
        assert_eq!(ballot.decision, 4);

        assert!(matches!(
            artifact.ballot(&FeatureVector::from(vec![1.0])),
            Err(AppError::EnsembleInput(_))
        ));
    }

    #[test]
    fn test_unknown_format_version_is_rejected() {
        let (scaler, ensemble) = fitted_parts();
        let artifact =
            ModelArtifact::new(Uuid::new_v4(), names(&["a", "b"]), scaler, ensemble, summary()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let mut manifest = artifact.save(dir.path()).unwrap();

        manifest.info.format_version = ARTIFACT_FORMAT_VERSION + 1;
        fs::write(
            dir.path().join(MANIFEST_FILE),
            serde_json::to_vec(&manifest).unwrap(),
        )
        .unwrap();

        match ModelArtifact::load(dir.path()) {
            Err(AppError::ArtifactLoad(msg)) => assert!(msg.contains("format version")),
            _ => panic!("expected format version error"),
        }
    }
}

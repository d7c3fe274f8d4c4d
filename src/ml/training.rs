use crate::error::{AppError, Result};
use crate::metrics::TRAINING_ROWS_EXCLUDED_TOTAL;
use crate::ml::artifact::ModelArtifact;
use crate::ml::ensemble::VotingEnsemble;
use crate::ml::models::{MLConfig, ModelMetrics, ModelType, TrainingDataset, TrainingSample};
use crate::ml::scaler::StandardScaler;
use crate::models::TriageScore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use strum::{AsRefStr, Display};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Why a training row was left out
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, AsRefStr, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExclusionReason {
    /// A vital-sign column held a non-numeric value
    NonNumericVital,
    /// Another feature column was empty or non-numeric
    MissingFeature,
    /// Target was not an integer score in 1..=5
    InvalidLabel,
    /// Field count differs from the header
    MalformedRow,
}

/// Labeled rows parsed from a delimited training table
#[derive(Debug, Clone)]
pub struct TrainingTable {
    pub feature_names: Vec<String>,
    pub samples: Vec<TrainingSample>,
    pub rows_read: usize,
    pub excluded: BTreeMap<ExclusionReason, usize>,
}

impl TrainingTable {
    pub fn from_path(path: &Path, config: &MLConfig) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            AppError::TrainingData(format!("cannot open {}: {}", path.display(), e))
        })?;
        Self::from_reader(BufReader::new(file), config)
    }

    /// Parse a header line followed by data rows.
    ///
    /// Rows that cannot be used are counted per reason and skipped; only a
    /// missing target column or an empty result fails the whole table.
    pub fn from_reader<R: BufRead>(reader: R, config: &MLConfig) -> Result<Self> {
        let mut lines = reader.lines();
        let header = loop {
            match lines.next() {
                Some(line) => {
                    let line = line?;
                    if !line.trim().is_empty() {
                        break split_fields(&line, config.delimiter);
                    }
                }
                None => return Err(AppError::TrainingData("training table is empty".to_string())),
            }
        };

        let target_idx = header
            .iter()
            .position(|c| *c == config.target_column)
            .ok_or_else(|| {
                AppError::TrainingData(format!(
                    "target column '{}' not found in header",
                    config.target_column
                ))
            })?;

        let feature_idx: Vec<usize> = if config.feature_columns.is_empty() {
            (0..header.len()).filter(|&i| i != target_idx).collect()
        } else {
            config
                .feature_columns
                .iter()
                .map(|name| {
                    header.iter().position(|c| c == name).ok_or_else(|| {
                        AppError::TrainingData(format!("feature column '{}' not found in header", name))
                    })
                })
                .collect::<Result<_>>()?
        };
        if feature_idx.is_empty() {
            return Err(AppError::TrainingData("no feature columns".to_string()));
        }
        let feature_names: Vec<String> = feature_idx.iter().map(|&i| header[i].clone()).collect();

        for vital in &config.numeric_columns {
            if !header.contains(vital) {
                warn!(column = %vital, "Configured vital column not present in training table");
            }
        }
        let is_vital: Vec<bool> = feature_names
            .iter()
            .map(|n| config.numeric_columns.contains(n))
            .collect();

        let mut samples = Vec::new();
        let mut excluded = BTreeMap::new();
        let mut rows_read = 0;

        for (line_no, line) in lines.enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            rows_read += 1;

            match parse_row(&line, config.delimiter, header.len(), target_idx, &feature_idx, &is_vital) {
                Ok(sample) => samples.push(sample),
                Err(reason) => {
                    // header is line 1
                    debug!(line = line_no + 2, reason = %reason, "Excluding training row");
                    *excluded.entry(reason).or_insert(0) += 1;
                }
            }
        }

        for (reason, count) in &excluded {
            warn!(reason = %reason, count, "Excluded training rows");
            TRAINING_ROWS_EXCLUDED_TOTAL
                .with_label_values(&[reason.as_ref()])
                .inc_by(*count as f64);
        }

        if samples.is_empty() {
            return Err(AppError::TrainingData(format!(
                "no usable rows out of {} read",
                rows_read
            )));
        }

        Ok(Self {
            feature_names,
            samples,
            rows_read,
            excluded,
        })
    }

    pub fn rows_excluded(&self) -> usize {
        self.excluded.values().sum()
    }
}

/// Split one line on `delimiter`, honouring double-quoted fields.
///
/// A delimiter inside quotes belongs to the field and `""` inside quotes is a literal quote.
fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == delimiter && !in_quotes => {
                fields.push(field.trim().to_string());
                field.clear();
            }
            c => field.push(c),
        }
    }
    fields.push(field.trim().to_string());
    fields
}

fn parse_number(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_row(
    line: &str,
    delimiter: char,
    width: usize,
    target_idx: usize,
    feature_idx: &[usize],
    is_vital: &[bool],
) -> std::result::Result<TrainingSample, ExclusionReason> {
    let fields = split_fields(line, delimiter);
    if fields.len() != width {
        return Err(ExclusionReason::MalformedRow);
    }

    let mut features = Vec::with_capacity(feature_idx.len());
    let mut missing = false;
    let mut bad_vital = false;
    for (pos, &idx) in feature_idx.iter().enumerate() {
        match parse_number(&fields[idx]) {
            Some(v) => features.push(v),
            None if is_vital[pos] => bad_vital = true,
            None => missing = true,
        }
    }
    if bad_vital {
        return Err(ExclusionReason::NonNumericVital);
    }
    if missing {
        return Err(ExclusionReason::MissingFeature);
    }

    let score = parse_number(&fields[target_idx])
        .filter(|v| v.fract() == 0.0)
        .and_then(|v| TriageScore::new(v as i64).ok())
        .ok_or(ExclusionReason::InvalidLabel)?;

    Ok(TrainingSample::new(features, score))
}

/// Outcome counts and held-out evaluation of one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub rows_read: usize,
    pub rows_excluded: BTreeMap<ExclusionReason, usize>,
    pub n_train: usize,
    pub n_test: usize,
    pub n_features: usize,
    pub test_size: f64,
    pub seed: u64,

    /// Held-out metrics per base classifier and for the ensemble
    pub evaluation: BTreeMap<ModelType, ModelMetrics>,
}

/// Offline training harness: split, fit scaler, fit ensemble, evaluate
pub struct Trainer {
    config: MLConfig,
}

impl Trainer {
    pub fn new(config: MLConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MLConfig {
        &self.config
    }

    pub fn train(&self, table: &TrainingTable) -> Result<ModelArtifact> {
        let config = &self.config;
        if !(config.test_size > 0.0 && config.test_size < 1.0) {
            return Err(AppError::Configuration(format!(
                "test_size must be in (0, 1), got {}",
                config.test_size
            )));
        }

        let dataset = TrainingDataset::from_samples(&table.samples, table.feature_names.clone());
        let (train, test) = dataset.train_test_split(config.test_size, config.seed);
        if train.n_samples == 0 || test.n_samples == 0 {
            return Err(AppError::TrainingData(format!(
                "{} usable rows are too few for a {:.0}% hold-out split",
                dataset.n_samples,
                config.test_size * 100.0
            )));
        }

        info!(
            n_train = train.n_samples,
            n_test = test.n_samples,
            n_features = dataset.n_features,
            n_classes = train.n_classes(),
            "Training ensemble"
        );

        // fitted on the training partition only, then applied to both
        let scaler = StandardScaler::fit(&train.features)?;
        let train_scaled = train.with_features(scaler.transform(&train.features)?);
        let test_scaled = test.with_features(scaler.transform(&test.features)?);

        let mut ensemble = VotingEnsemble::new(config);
        ensemble.train(&train_scaled)?;
        let evaluation = ensemble.evaluate(&test_scaled)?;

        let summary = TrainingSummary {
            rows_read: table.rows_read,
            rows_excluded: table.excluded.clone(),
            n_train: train.n_samples,
            n_test: test.n_samples,
            n_features: dataset.n_features,
            test_size: config.test_size,
            seed: config.seed,
            evaluation,
        };

        ModelArtifact::new(
            Uuid::new_v4(),
            table.feature_names.clone(),
            scaler,
            ensemble,
            summary,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TABLE: &str = "\
Sex,Arrival mode,Injury,Mental,Pain,SBP,DBP,HR,RR,BT,KTAS_expert
2,2,2,1,2,110,70,90,18,37.0,3
1,1,1,1,1,120,80,72,16,36.6,4
1,3,1,1,2,??,80,72,16,36.6,4
1,3,1,1,2,130,,72,16,36.6,4
1,3,1,1,2,130,85,72,16,36.6,7
1,3,1,1,2,130,85,72,16,36.6,2.5
1,3,1
";

    #[test]
    fn test_rows_are_excluded_by_reason() {
        let table = TrainingTable::from_reader(Cursor::new(TABLE), &MLConfig::default()).unwrap();

        assert_eq!(table.rows_read, 7);
        assert_eq!(table.samples.len(), 2);
        assert_eq!(table.rows_excluded(), 5);
        assert_eq!(table.excluded[&ExclusionReason::NonNumericVital], 2);
        assert_eq!(table.excluded[&ExclusionReason::InvalidLabel], 2);
        assert_eq!(table.excluded[&ExclusionReason::MalformedRow], 1);

        assert_eq!(table.feature_names.len(), 10);
        assert_eq!(table.feature_names[0], "Sex");
        assert_eq!(table.samples[0].score.value(), 3);
        assert_eq!(table.samples[0].features[5], 110.0);
    }

    #[test]
    fn test_missing_target_column_is_fatal() {
        let config = MLConfig {
            target_column: "KTAS_triage".to_string(),
            ..MLConfig::default()
        };
        let err = TrainingTable::from_reader(Cursor::new(TABLE), &config).unwrap_err();
        assert!(matches!(err, AppError::TrainingData(_)));
    }

    #[test]
    fn test_selected_feature_columns() {
        let config = MLConfig {
            feature_columns: vec!["HR".to_string(), "SBP".to_string()],
            ..MLConfig::default()
        };
        let table = TrainingTable::from_reader(Cursor::new(TABLE), &config).unwrap();
        assert_eq!(table.feature_names, vec!["HR", "SBP"]);
        assert_eq!(table.samples[0].features, vec![90.0, 110.0]);
    }

    #[test]
    fn test_semicolon_delimiter_and_quotes() {
        let data = "\"HR\";\"KTAS_expert\"\n\"90\";\"2\"\n";
        let config = MLConfig {
            delimiter: ';',
            numeric_columns: vec!["HR".to_string()],
            ..MLConfig::default()
        };
        let table = TrainingTable::from_reader(Cursor::new(data), &config).unwrap();
        assert_eq!(table.samples.len(), 1);
        assert_eq!(table.samples[0].features, vec![90.0]);
    }

    #[test]
    fn test_quoted_delimiter_stays_in_field() {
        let data = r#"Chief complaint,HR,SBP,KTAS_expert
"fell, hit head",90,110,2
"said ""dizzy"", then fainted",72,120,3
chest pain,80,130,4
"#;
        let config = MLConfig {
            feature_columns: vec!["HR".to_string(), "SBP".to_string()],
            ..MLConfig::default()
        };
        let table = TrainingTable::from_reader(Cursor::new(data), &config).unwrap();

        assert_eq!(table.rows_read, 3);
        assert_eq!(table.samples.len(), 3);
        assert_eq!(table.rows_excluded(), 0);
        assert_eq!(table.samples[0].features, vec![90.0, 110.0]);
        assert_eq!(table.samples[1].score.value(), 3);
    }

    #[test]
    fn test_split_fields_unescapes_quotes() {
        assert_eq!(
            split_fields(r#" a ,"b;c" ; "say ""hi""" "#, ';'),
            vec!["a ,b;c".to_string(), r#"say "hi""#.to_string()]
        );
        assert_eq!(split_fields("x,,y", ','), vec!["x", "", "y"]);
    }

    #[test]
    fn test_all_rows_excluded_is_fatal() {
        let data = "HR,KTAS_expert\nfast,2\n";
        let config = MLConfig {
            numeric_columns: vec!["HR".to_string()],
            ..MLConfig::default()
        };
        assert!(TrainingTable::from_reader(Cursor::new(data), &config).is_err());
    }

    #[test]
    fn test_invalid_test_size() {
        let table = TrainingTable::from_reader(Cursor::new(TABLE), &MLConfig::default()).unwrap();
        let trainer = Trainer::new(MLConfig {
            test_size: 1.5,
            ..MLConfig::default()
        });
        assert!(matches!(trainer.train(&table), Err(AppError::Configuration(_))));
    }
}

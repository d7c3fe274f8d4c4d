//! Common test utilities
//!
//! Synthetic training tables, a shared trained artifact and scripted assessors.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use triage_engine::{
    assessor::{AssessorError, SeverityAssessor},
    ml::{MLConfig, ModelArtifact, Trainer, TrainingTable},
    models::{BodyTemperature, Observation},
};

pub const HEADER: &str = "Sex,Arrival mode,Injury,Mental,Pain,SBP,DBP,HR,RR,BT,KTAS_expert";

/// Vital signs at the center of a score's cluster
pub fn vitals_for(score: u8) -> (f64, f64, f64, f64, f64) {
    let s = score as f64;
    (
        80.0 + 15.0 * s,
        50.0 + 8.0 * s,
        150.0 - 18.0 * s,
        30.0 - 3.0 * s,
        36.0 + 0.4 * (5.0 - s),
    )
}

/// One row per index; scores cycle 1..=5 and vitals separate the classes cleanly
pub fn synthetic_rows(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let score = (i % 5) as u8 + 1;
            let jitter = ((i * 7) % 11) as f64 / 10.0;
            let (sbp, dbp, hr, rr, bt) = vitals_for(score);
            let sex = 1 + i % 2;
            let arrival = 1 + i % 4;
            let injury = 1 + i % 2;
            let mental = if score == 1 { 3 } else { 1 };
            let pain = if score <= 3 { 2 } else { 1 };
            format!(
                "{},{},{},{},{},{:.1},{:.1},{:.1},{:.1},{:.2},{}",
                sex,
                arrival,
                injury,
                mental,
                pain,
                sbp + 3.0 * (jitter - 0.5),
                dbp + (jitter - 0.5),
                hr + 2.0 * (jitter - 0.5),
                rr + (jitter - 0.5),
                bt + 0.1 * (jitter - 0.5),
                score
            )
        })
        .collect()
}

/// Header plus `n` clean rows plus the given extra rows
pub fn synthetic_table(n: usize, extra_rows: &[&str]) -> String {
    let mut lines = vec![HEADER.to_string()];
    lines.extend(synthetic_rows(n));
    lines.extend(extra_rows.iter().map(|r| r.to_string()));
    lines.join("\n") + "\n"
}

/// Small, fast training configuration
pub fn test_config() -> MLConfig {
    MLConfig {
        n_trees: 20,
        svc_max_iter: 1000,
        ..MLConfig::default()
    }
}

pub fn train_artifact(seed: u64) -> ModelArtifact {
    let config = MLConfig {
        seed,
        ..test_config()
    };
    let table = TrainingTable::from_reader(std::io::Cursor::new(synthetic_table(200, &[])), &config)
        .expect("synthetic table parses");
    Trainer::new(config).train(&table).expect("training succeeds")
}

/// Artifact trained once per test binary
pub fn shared_artifact() -> Arc<ModelArtifact> {
    static ARTIFACT: OnceLock<Arc<ModelArtifact>> = OnceLock::new();
    ARTIFACT.get_or_init(|| Arc::new(train_artifact(42))).clone()
}

/// Observation whose vitals sit at the center of `score`'s cluster
pub fn observation_for(score: u8) -> Observation {
    let (sbp, dbp, hr, rr, bt) = vitals_for(score);
    Observation::new()
        .with_sex("male")
        .with_arrival_mode("walk")
        .with_consciousness(if score == 1 { "pain response" } else { "alert" })
        .with_pain_level(if score <= 3 { 8 } else { 1 })
        .with_blood_pressure(sbp, dbp)
        .with_heart_rate(hr)
        .with_respiratory_rate(rr)
        .with_temperature(BodyTemperature::Celsius(bt))
}

/// Never answers before the caller's timeout
pub struct SlowAssessor(pub Duration);

#[async_trait]
impl SeverityAssessor for SlowAssessor {
    fn name(&self) -> &str {
        "slow"
    }

    async fn assess(&self, _case_description: &str) -> Result<String, AssessorError> {
        tokio::time::sleep(self.0).await;
        Ok("1;too late".to_string())
    }
}

/// Always fails at the transport level
pub struct DownAssessor;

#[async_trait]
impl SeverityAssessor for DownAssessor {
    fn name(&self) -> &str {
        "down"
    }

    async fn assess(&self, _case_description: &str) -> Result<String, AssessorError> {
        Err(AssessorError::Unavailable("connection refused".to_string()))
    }
}

/// Helper function to parse Prometheus exposition format
/// Returns a map of metric lines for easy assertion
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics = HashMap::new();
    let mut current_metric = String::new();

    for line in output.lines() {
        let line = line.trim();

        if line.is_empty() {
            continue;
        }

        if line.starts_with("# HELP") || line.starts_with("# TYPE") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 3 {
                current_metric = parts[2].to_string();
                metrics
                    .entry(current_metric.clone())
                    .or_insert_with(Vec::new)
                    .push(line.to_string());
            }
        } else if !current_metric.is_empty() {
            metrics
                .entry(current_metric.clone())
                .or_insert_with(Vec::new)
                .push(line.to_string());
        }
    }

    metrics
}

/// Online triage: the ML path and the external assessor, fused per request

pub mod context;

pub use context::{
    InferenceContext, MlPrediction, StageFailure, TriageReport, TriageStatus, VoterScore,
};

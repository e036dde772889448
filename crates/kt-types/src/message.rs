//! Session message kinds exchanged over one duplex tuning connection.

use serde::{Deserialize, Serialize};

/// Payload of a `session-start` message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStart {
    /// Comma-separable list of requested project names.
    pub projects: String,
    /// Search engine name for the main tuning task (e.g. "bayes").
    pub engine: String,
    /// Client-requested iteration budget.
    pub iterations: u32,
    /// Resume from the persisted tuning log instead of starting fresh.
    #[serde(default)]
    pub restart: bool,
    /// Random warm-up evaluations before the model-driven search.
    #[serde(default)]
    pub random_starts: u32,
    /// Engine used for the importance-filtering pre-pass.
    #[serde(default)]
    pub feature_filter_engine: String,
    /// Iteration budget of one feature-filter cycle.
    #[serde(default)]
    pub feature_filter_iters: u32,
    /// How many feature-filter cycles to run before the full tuning pass.
    #[serde(default)]
    pub feature_filter_cycles: u32,
}

/// Running history shown to the client with each benchmark request.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TuningSummary {
    /// `base=<objective>` captured on the first iteration.
    pub base_eval: String,
    /// `min=<objective>` running minimum so far.
    pub min_eval: String,
    /// Accumulated wall-clock seconds across iterations.
    pub total_time_secs: i64,
    /// Iteration counter at the time of the request.
    pub iteration: u32,
}

/// One message on the duplex tuning session, either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TuningMessage {
    /// Client opens a tuning session for one or more projects.
    SessionStart(SessionStart),
    /// Client reports one benchmark evaluation (`metric=value,...`).
    BenchmarkResult { evaluation: String },
    /// Peer-propagated scripts to apply locally (both directions).
    SyncConfig { scripts: String },
    /// Client advances to the next feature-filter cycle (or full tuning).
    RestartCycle,
    /// Client asks to revert a project to its baseline.
    Restore { project: String },
    /// Human-readable progress text.
    Display { text: String },
    /// Next candidate to benchmark, with the running summary.
    BenchmarkRequest {
        candidate: String,
        summary: TuningSummary,
    },
    /// Candidate failed the inter-parameter relation check; the client must
    /// re-run the benchmark without the session advancing.
    Threshold,
    /// Server signals the client to begin the next feature-filter cycle.
    CycleRestart,
    /// Final status of the session.
    Ending { status: String },
}

impl TuningMessage {
    pub fn display(text: impl Into<String>) -> Self {
        Self::Display { text: text.into() }
    }

    pub fn ending(status: impl Into<String>) -> Self {
        Self::Ending {
            status: status.into(),
        }
    }
}

//! Wire bodies of the search-service endpoints.

use kt_types::Knob;
use serde::{Deserialize, Serialize};

/// Body POSTed to create one optimization task.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    /// Remaining evaluation budget (client budget minus recovered history).
    pub max_eval: u32,
    /// Search engine name ("bayes", "random", ...).
    pub engine: String,
    /// Random warm-up evaluations before model-driven search.
    pub random_starts: u32,
    /// Declarative part of every knob offered to the search.
    pub knobs: Vec<Knob>,
    /// Candidate history recovered from the tuning log, one value vector per
    /// completed iteration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub x_ref: Vec<Vec<String>>,
    /// Objective history matching `x_ref`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub y_ref: Vec<String>,
}

/// Response of create-task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskResponse {
    pub task_id: String,
    pub status: String,
}

/// Exclusive handle on one remote task; deleted exactly once at session end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskHandle {
    pub task_id: String,
}

/// Body PUT once per iteration with the previous evaluation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub iterations: u32,
    /// Comma-joined bare metric values; empty on the very first call.
    pub value: String,
}

/// Response of submit-result: the next candidate or the finish signal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Next candidate as `name=value,...`; on finish, the best one found.
    #[serde(default)]
    pub param: String,
    #[serde(default)]
    pub finished: bool,
    /// Global importance ranking `name:score,...`, present when finished
    /// after a feature-filter task.
    #[serde(default)]
    pub rank: String,
}

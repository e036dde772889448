//! HTTP client for the remote search service.

use std::time::Duration;

use async_trait::async_trait;
use kt_types::{TuneError, TuneResult};
use tracing::{debug, info};

use crate::payload::{CreateTaskRequest, CreateTaskResponse, SubmitRequest, SubmitResponse, TaskHandle};

/// The remote black-box search service, seen as three request/response
/// endpoints. Abstracted so the iteration engine can run against a scripted
/// fake in tests.
#[async_trait]
pub trait SearchService: Send + Sync {
    /// Create a task from the knob set and budget; returns its handle.
    async fn create_task(&self, request: CreateTaskRequest) -> TuneResult<TaskHandle>;

    /// Submit the last evaluation; receive the next candidate or the finish
    /// signal with the global importance ranking.
    async fn submit(&self, task: &TaskHandle, request: SubmitRequest) -> TuneResult<SubmitResponse>;

    /// Delete the task. Idempotent on the remote side.
    async fn delete_task(&self, task: &TaskHandle) -> TuneResult<()>;
}

/// reqwest-backed implementation against `<base_url>/optimizer`.
pub struct HttpSearchService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpSearchService {
    /// Build a client with a per-request deadline. A stalled remote call
    /// fails the current operation instead of blocking the session forever.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> TuneResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TuneError::remote)?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn task_url(&self, task: &TaskHandle) -> String {
        format!("{}/{}", self.base_url, task.task_id)
    }
}

#[async_trait]
impl SearchService for HttpSearchService {
    async fn create_task(&self, request: CreateTaskRequest) -> TuneResult<TaskHandle> {
        debug!(engine = %request.engine, max_eval = request.max_eval, "creating optimizer task");
        let response = self
            .client
            .post(&self.base_url)
            .json(&request)
            .send()
            .await
            .map_err(TuneError::remote)?;

        let body: CreateTaskResponse = response.json().await.map_err(TuneError::remote)?;
        if body.status != "OK" {
            return Err(TuneError::Remote(format!(
                "create task failed: {}",
                body.status
            )));
        }
        info!(task_id = %body.task_id, "optimizer task created");
        Ok(TaskHandle {
            task_id: body.task_id,
        })
    }

    async fn submit(&self, task: &TaskHandle, request: SubmitRequest) -> TuneResult<SubmitResponse> {
        debug!(task_id = %task.task_id, iteration = request.iterations, "submitting evaluation");
        let response = self
            .client
            .put(self.task_url(task))
            .json(&request)
            .send()
            .await
            .map_err(TuneError::remote)?;

        if !response.status().is_success() {
            return Err(TuneError::Remote(format!(
                "submit result failed with status {}",
                response.status()
            )));
        }
        response.json().await.map_err(TuneError::remote)
    }

    async fn delete_task(&self, task: &TaskHandle) -> TuneResult<()> {
        let response = self
            .client
            .delete(self.task_url(task))
            .send()
            .await
            .map_err(TuneError::remote)?;
        if !response.status().is_success() {
            return Err(TuneError::Remote(format!(
                "delete task failed with status {}",
                response.status()
            )));
        }
        info!(task_id = %task.task_id, "optimizer task deleted");
        Ok(())
    }
}

//! # kt-optimizer
//!
//! Typed request/response payloads for the remote black-box search service
//! and the HTTP client that consumes its three endpoints: create-task,
//! submit-result, and delete-task.

mod client;
mod payload;

pub use client::{HttpSearchService, SearchService};
pub use payload::{
    CreateTaskRequest, CreateTaskResponse, SubmitRequest, SubmitResponse, TaskHandle,
};

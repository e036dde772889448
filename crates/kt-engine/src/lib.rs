//! # kt-engine
//!
//! The tuning orchestration core: a long-lived, message-driven control loop
//! that drives the remote search service across request/response rounds,
//! persists per-iteration history for resume, prunes the parameter space by
//! measured importance, keeps a restorable baseline, and propagates applied
//! configuration to cluster peers.

pub mod baseline;
pub mod cluster;
pub mod config;
pub mod filter;
pub mod orchestrator;
pub mod run;
pub mod session;
pub mod tuning_log;

pub use baseline::BaselineManager;
pub use cluster::{ClusterSync, PeerLink, TcpPeerLink};
pub use config::DaemonConfig;
pub use filter::{partition, FilterOutcome};
pub use orchestrator::Orchestrator;
pub use run::{StepOutcome, TuningRun};
pub use session::{MessageSink, Outbound, SessionLock};
pub use tuning_log::{LogEntry, LogRecovery, TuningLog};

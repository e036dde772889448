//! # kt-types
//!
//! Core types shared across the KnobTune workspace: the error taxonomy,
//! tunable-parameter (knob) definitions, session message kinds, and the
//! delimited payload encodings used at the remote-service boundary.

pub mod encoding;
pub mod errors;
pub mod knob;
pub mod message;

pub use encoding::{CandidateSetting, Evaluation, ImportanceRank};
pub use errors::{TuneError, TuneResult};
pub use knob::{Knob, KnobKind};
pub use message::{SessionStart, TuningMessage, TuningSummary};

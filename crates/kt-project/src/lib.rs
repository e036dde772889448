//! # kt-project
//!
//! Declarative tuning-project definitions: loading and merging the on-disk
//! YAML files, validating candidates against inter-parameter relations, and
//! running the external apply/restart/read-value script hooks.

mod definition;
mod script;
mod store;

pub use definition::{ProjectDefinition, Relation, RelationOp};
pub use script::{scripts_for_sync, ProjectRuntime, ScriptRunner, ShellRunner};
pub use store::ProjectStore;

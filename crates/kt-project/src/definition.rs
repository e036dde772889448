//! Project definition model and the order-preserving merge.

use kt_types::{CandidateSetting, Knob};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Comparison operator of an inter-parameter relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationOp {
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "==")]
    Eq,
}

/// One inter-parameter constraint, e.g. `rmem_min <= rmem_max`.
///
/// Either side may be a knob name (resolved from the candidate) or a numeric
/// literal. A side that cannot be resolved to a number leaves the relation
/// satisfied; only a provable violation rejects a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub left: String,
    pub op: RelationOp,
    pub right: String,
}

impl Relation {
    fn resolve(side: &str, candidate: &CandidateSetting) -> Option<f64> {
        if let Some(value) = candidate.value_of(side) {
            return value.parse().ok();
        }
        side.parse().ok()
    }

    /// Whether the candidate satisfies this relation.
    pub fn holds(&self, candidate: &CandidateSetting) -> bool {
        let (Some(left), Some(right)) = (
            Self::resolve(&self.left, candidate),
            Self::resolve(&self.right, candidate),
        ) else {
            return true;
        };
        match self.op {
            RelationOp::Le => left <= right,
            RelationOp::Lt => left < right,
            RelationOp::Ge => left >= right,
            RelationOp::Gt => left > right,
            RelationOp::Eq => (left - right).abs() < f64::EPSILON,
        }
    }
}

/// A declarative tuning project: an ordered knob list plus apply/restart
/// plumbing, parsed from one YAML file under the project directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDefinition {
    pub project: String,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Script run after applying a candidate (service restart etc.).
    #[serde(default)]
    pub restart: String,
    /// Inter-parameter constraints a candidate must satisfy before apply.
    #[serde(default)]
    pub relations: Vec<Relation>,
    /// Ordered knob set. Duplicate names are legal after a merge.
    #[serde(default)]
    pub knobs: Vec<Knob>,
}

fn default_max_iterations() -> u32 {
    100
}

impl ProjectDefinition {
    pub fn new(project: impl Into<String>, max_iterations: u32) -> Self {
        Self {
            project: project.into(),
            max_iterations,
            restart: String::new(),
            relations: Vec::new(),
            knobs: Vec::new(),
        }
    }

    /// Merge `other` into this project by appending its knobs and relations.
    ///
    /// Duplicate knob names are NOT de-duplicated: apply walks knobs in
    /// order, so the later definition of a repeated name wins at apply time.
    pub fn merge(&mut self, other: ProjectDefinition) {
        debug!(base = %self.project, merged = %other.project, knobs = other.knobs.len(), "merging project");
        self.knobs.extend(other.knobs);
        self.relations.extend(other.relations);
    }

    /// Whether the candidate satisfies every declared relation.
    pub fn match_relations(&self, candidate: &CandidateSetting) -> bool {
        self.relations.iter().all(|r| r.holds(candidate))
    }

    /// Knobs not statically skipped in the YAML definition.
    pub fn active_knobs(&self) -> impl Iterator<Item = &Knob> {
        self.knobs.iter().filter(|k| !k.skip)
    }
}

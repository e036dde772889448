//! Tunable parameter (knob) definitions.

use serde::{Deserialize, Serialize};

/// How a knob's value space is described to the search service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnobKind {
    /// Continuous range with inclusive `[min, max]` bounds.
    Continuous,
    /// Discrete stepped values or an explicit item list.
    Discrete,
    /// Categorical choice from `options`.
    Categorical,
    /// Value derived from a reference expression over other knobs.
    Reference,
}

impl Default for KnobKind {
    fn default() -> Self {
        Self::Continuous
    }
}

/// One tunable system or application setting.
///
/// A knob's live value is read and written through external shell hooks
/// (`get` / `set`); the search service only ever sees the declarative part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Knob {
    /// Unique name within a project (e.g. "vm.swappiness").
    pub name: String,
    /// Underlying data type reported to the search service ("int", "string"...).
    #[serde(default)]
    pub dtype: String,
    #[serde(default, rename = "type")]
    pub kind: KnobKind,
    /// Inclusive bounds for continuous knobs.
    #[serde(default)]
    pub range: Option<(i64, i64)>,
    /// Enumerated values for discrete knobs.
    #[serde(default)]
    pub items: Vec<i64>,
    #[serde(default)]
    pub step: i64,
    /// Choices for categorical knobs.
    #[serde(default)]
    pub options: Vec<String>,
    /// Reference expression for derived knobs.
    #[serde(default, rename = "ref")]
    pub ref_value: String,
    /// Script that prints the current live value.
    #[serde(default)]
    pub get: String,
    /// Script that applies a value; `$value` is substituted before execution.
    #[serde(default)]
    pub set: String,
    /// Statically excluded from the next optimizer task.
    #[serde(default)]
    pub skip: bool,
}

impl Knob {
    /// Minimal knob with a name; the rest defaults. Used heavily in tests.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dtype: "int".to_string(),
            kind: KnobKind::Continuous,
            range: None,
            items: Vec::new(),
            step: 0,
            options: Vec::new(),
            ref_value: String::new(),
            get: String::new(),
            set: String::new(),
            skip: false,
        }
    }

    pub fn with_range(mut self, min: i64, max: i64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn with_scripts(mut self, get: impl Into<String>, set: impl Into<String>) -> Self {
        self.get = get.into();
        self.set = set.into();
        self
    }

    pub fn with_skip(mut self, skip: bool) -> Self {
        self.skip = skip;
        self
    }
}

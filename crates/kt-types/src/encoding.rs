//! Delimited payload encodings used at the search-service boundary.
//!
//! The remote protocol packs candidates, evaluations and importance rankings
//! as delimited text (`,` between pairs, `=` inside candidate/evaluation
//! pairs, `:` inside rank pairs). All parse/format logic lives here so the
//! delimiter contract stays in one place.

use serde::{Deserialize, Serialize};

use crate::errors::{TuneError, TuneResult};

/// A concrete candidate configuration: ordered `name=value` pairs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CandidateSetting {
    pub pairs: Vec<(String, String)>,
}

impl CandidateSetting {
    /// Parse `name=value,name=value`. Entries without `=` are skipped.
    pub fn parse(raw: &str) -> Self {
        let mut pairs = Vec::new();
        for item in raw.split(',') {
            if let Some((name, value)) = item.split_once('=') {
                pairs.push((name.trim().to_string(), value.trim().to_string()));
            }
        }
        Self { pairs }
    }

    /// Value for `name`; the last occurrence wins when duplicated.
    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Just the values, in pair order, for the resume history seed.
    pub fn values(&self) -> Vec<String> {
        self.pairs.iter().map(|(_, v)| v.clone()).collect()
    }
}

impl std::fmt::Display for CandidateSetting {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let joined = self
            .pairs
            .iter()
            .map(|(n, v)| format!("{n}={v}"))
            .collect::<Vec<_>>()
            .join(",");
        write!(f, "{joined}")
    }
}

/// One benchmark evaluation: named metric values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Evaluation {
    pub metrics: Vec<(String, f64)>,
}

impl Evaluation {
    /// Parse `metric=value,metric=value`.
    ///
    /// Entries without `=` are skipped; a non-numeric value is a hard error
    /// because it would silently corrupt the objective.
    pub fn parse(raw: &str) -> TuneResult<Self> {
        let mut metrics = Vec::new();
        for item in raw.split(',') {
            let Some((name, value)) = item.split_once('=') else {
                continue;
            };
            let parsed: f64 = value.trim().parse().map_err(|_| {
                TuneError::Evaluation(format!("metric {} has non-numeric value {value}", name.trim()))
            })?;
            metrics.push((name.trim().to_string(), parsed));
        }
        Ok(Self { metrics })
    }

    /// The objective score: the sum of all metric values.
    pub fn objective(&self) -> f64 {
        self.metrics.iter().map(|(_, v)| v).sum()
    }

    /// Bare values joined with commas, as submitted to the search service.
    pub fn submit_values(&self) -> String {
        self.metrics
            .iter()
            .map(|(_, v)| v.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Optimizer-reported importance of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceRank {
    pub name: String,
    pub score: f64,
}

impl ImportanceRank {
    /// Parse `name:score,name:score`. Malformed entries are skipped.
    pub fn parse_list(raw: &str) -> Vec<Self> {
        let mut ranks = Vec::new();
        for item in raw.split(',') {
            let Some((name, score)) = item.split_once(':') else {
                continue;
            };
            let Ok(score) = score.trim().parse::<f64>() else {
                continue;
            };
            ranks.push(Self {
                name: name.trim().to_string(),
                score,
            });
        }
        ranks
    }

    /// Format a rank list back to `name:score` pairs with two decimals.
    pub fn format_list(ranks: &[Self]) -> String {
        ranks
            .iter()
            .map(|r| format!("{}:{:.2}", r.name, r.score))
            .collect::<Vec<_>>()
            .join(",")
    }
}

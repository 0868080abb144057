//! Named, directionally-aware scores attached to report rows

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Set-level score written onto PSM rows by FDR estimation
pub const PSM_COMBINED_FDR_SCORE: &str = "psm_combined_fdr_score";
/// Aggregated protein score written by [`crate::scoring::Scoring`]
pub const PROTEIN_SCORE: &str = "protein_score";

/// Name fragments of scores where smaller values are better
const LOWER_IS_BETTER_SUFFIX: [&str; 4] = ["evalue", "pvalue", "qvalue", "expect"];
const LOWER_IS_BETTER: [&str; 4] = ["pep", "fdr", "expectation", "fdrscore"];

/// Default direction for a score name. E-values, p-values, q-values, PEP and
/// FDR-derived scores are lower-is-better, anything else higher-is-better.
pub fn default_higher_better(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    let tokens = name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>();

    let lower = tokens.iter().any(|t| {
        LOWER_IS_BETTER.contains(t) || LOWER_IS_BETTER_SUFFIX.iter().any(|s| t.ends_with(*s))
    }) || tokens
        .windows(2)
        .any(|w| matches!(w[0], "e" | "p" | "q") && w[1] == "value");
    !lower
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreModel {
    pub name: String,
    pub value: f64,
    pub higher_better: bool,
}

impl ScoreModel {
    /// Create a score with the default direction for `name`
    pub fn new<S: Into<String>>(name: S, value: f64) -> Self {
        let name = name.into();
        let higher_better = default_higher_better(&name);
        Self {
            name,
            value,
            higher_better,
        }
    }

    pub fn with_direction<S: Into<String>>(name: S, value: f64, higher_better: bool) -> Self {
        Self {
            name: name.into(),
            value,
            higher_better,
        }
    }

    /// NaN scores are carried through ingestion but treated as absent
    pub fn is_valid(&self) -> bool {
        !self.value.is_nan()
    }

    /// Compare two scores, returning [`Ordering::Less`] if `self` is better
    pub fn compare_with(&self, other: &ScoreModel, higher_better: bool) -> Ordering {
        let ord = self.value.total_cmp(&other.value);
        match higher_better {
            true => ord.reverse(),
            false => ord,
        }
    }

    /// Compare using this score's own direction
    pub fn compare(&self, other: &ScoreModel) -> Ordering {
        self.compare_with(other, self.higher_better)
    }
}

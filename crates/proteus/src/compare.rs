//! Score-based comparison shared by sorting, ranking and FDR estimation.
//!
//! Every comparator in this module orders rows *best first*: sorting a slice
//! ascending with one of them puts the best row at index 0. Rows lacking the
//! requested score always sort after rows that have it, whatever direction
//! was requested.

use crate::score::ScoreModel;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Capability of a report row to expose named scores for comparison
pub trait CompareScore {
    /// All scores cached on this row
    fn scores(&self) -> &[ScoreModel];

    /// Resolve a named score. NaN values count as absent.
    fn compare_score(&self, name: &str) -> Option<&ScoreModel> {
        self.scores()
            .iter()
            .find(|score| score.name == name && score.is_valid())
    }
}

/// Compare two optional scores. `higher_better` overrides the direction
/// carried by the score models.
pub fn compare_scores(
    a: Option<&ScoreModel>,
    b: Option<&ScoreModel>,
    higher_better: Option<bool>,
) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(a), Some(b)) => match higher_better {
            Some(hb) => a.compare_with(b, hb),
            None => a.compare(b),
        },
    }
}

pub fn compare_by_score<T: CompareScore>(
    a: &T,
    b: &T,
    name: &str,
    higher_better: Option<bool>,
) -> Ordering {
    compare_scores(a.compare_score(name), b.compare_score(name), higher_better)
}

/// Rank-only comparison. Unranked rows (`None`) come after every ranked
/// row, in both directions.
pub fn compare_ranks(a: Option<u32>, b: Option<u32>, descending: bool) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(a), Some(b)) if descending => b.cmp(&a),
        (Some(a), Some(b)) => a.cmp(&b),
    }
}

/// Does any row carry a valid score called `name`?
pub fn has_score<T: CompareScore>(rows: &[T], name: &str) -> bool {
    rows.iter().any(|row| row.compare_score(name).is_some())
}

pub type RowComparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

pub fn score_comparator<T: CompareScore + 'static>(
    name: &str,
    higher_better: Option<bool>,
) -> RowComparator<T> {
    let name = name.to_string();
    Arc::new(move |a: &T, b: &T| compare_by_score(a, b, &name, higher_better))
}

/// Maps human-readable sort keys to comparators for one kind of report row.
///
/// Keys of the form `score:<name>` resolve to a score comparator without
/// needing to be registered.
pub struct SortRegistry<T> {
    orders: BTreeMap<&'static str, RowComparator<T>>,
}

impl<T: CompareScore + 'static> Default for SortRegistry<T> {
    fn default() -> Self {
        Self {
            orders: BTreeMap::new(),
        }
    }
}

impl<T: CompareScore + 'static> SortRegistry<T> {
    pub fn register<F>(mut self, key: &'static str, f: F) -> Self
    where
        F: Fn(&T, &T) -> Ordering + Send + Sync + 'static,
    {
        self.orders.insert(key, Arc::new(f));
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.orders.keys().copied()
    }

    pub fn get(&self, key: &str) -> Option<RowComparator<T>> {
        if let Some(cmp) = self.orders.get(key) {
            return Some(Arc::clone(cmp));
        }
        if let Some(name) = key.strip_prefix("score:") {
            return Some(score_comparator(name, None));
        }
        log::warn!(
            "unknown sort order `{}`, expected one of: {}, or score:<name>",
            key,
            self.orders.keys().copied().collect::<Vec<_>>().join(", ")
        );
        None
    }

    /// Stable sort of `rows` by the comparator registered for `key`.
    /// Returns `false`, leaving `rows` untouched, if `key` does not resolve
    /// against this dataset.
    pub fn sort(&self, key: &str, rows: &mut [T]) -> bool
    where
        T: Send,
    {
        let cmp = match self.get(key) {
            Some(cmp) => cmp,
            None => return false,
        };
        if let Some(name) = key.strip_prefix("score:") {
            if !rows.is_empty() && !has_score(rows, name) {
                log::warn!("score `{}` does not exist in the current dataset", name);
                return false;
            }
        }
        rows.par_sort_by(|a, b| cmp(a, b));
        true
    }
}

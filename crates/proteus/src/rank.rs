//! Competition ranking ("1224" ranking): tied rows share a rank, and every
//! tie consumes as many rank slots as it has rows.

use crate::compare::{compare_by_score, has_score, CompareScore};
use rayon::prelude::*;
use std::cmp::Ordering;

pub trait Rankable {
    /// `None` until a rank has been calculated
    fn rank(&self) -> Option<u32>;
    fn set_rank(&mut self, rank: Option<u32>);
}

/// Stable-sort `rows` by `cmp` and assign competition ranks starting at 1.
/// Rows comparing [`Ordering::Equal`] to the first row of their run share
/// that row's rank.
pub fn calculate_ranks<T, F>(rows: &mut [T], cmp: F)
where
    T: Rankable + Send,
    F: Fn(&T, &T) -> Ordering + Sync,
{
    rows.par_sort_by(&cmp);

    let mut start = 0;
    while start < rows.len() {
        let mut end = start + 1;
        while end < rows.len() && cmp(&rows[start], &rows[end]) == Ordering::Equal {
            end += 1;
        }
        let rank = start as u32 + 1;
        for row in &mut rows[start..end] {
            row.set_rank(Some(rank));
        }
        start = end;
    }
}

/// Rank rows by a named score. If no row carries the score this is a no-op
/// (ranks are left untouched) and `false` is returned. Rows lacking the
/// score compare equal to each other and share the last rank.
pub fn rank_by_score<T>(rows: &mut [T], name: &str, higher_better: Option<bool>) -> bool
where
    T: Rankable + CompareScore + Send,
{
    if !has_score(rows, name) {
        if !rows.is_empty() {
            log::warn!("cannot rank by `{}`: score does not exist in the current dataset", name);
        }
        return false;
    }

    calculate_ranks(rows, |a, b| compare_by_score(a, b, name, higher_better));
    true
}

//! Target/decoy FDR estimation
//!
//! Rows are sorted best to worst by a named score, the running FDR is
//! estimated from the number of decoys seen so far, and q-values are the
//! cumulative minimum of the FDR taken from the worst row upwards.
//!
//! Jones et al., https://doi.org/10.1002/pmic.200800473 (FDR score)

use crate::compare::{compare_by_score, CompareScore};
use crate::graph::{AccessionIx, IdentGraph, PsmIx};
use crate::Error;
use log::info;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::Instant;

pub const DEFAULT_DECOY_PATTERN: &str = "^(DECOY_|decoy_|REV_|rev_)";

/// Everything a row can be classified as decoy by
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecoyEvidence {
    pub accessions: Vec<AccessionIx>,
    pub psms: Vec<PsmIx>,
}

pub trait DecoyStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// A row is a decoy only if all of its evidence is decoy
    fn is_decoy(&self, evidence: &DecoyEvidence, graph: &IdentGraph) -> bool;
}

/// Decoy accessions are recognized by a regular expression
pub struct AccessionPattern(pub Regex);

impl DecoyStrategy for AccessionPattern {
    fn name(&self) -> &'static str {
        "accession_pattern"
    }

    fn is_decoy(&self, evidence: &DecoyEvidence, graph: &IdentGraph) -> bool {
        !evidence.accessions.is_empty()
            && evidence
                .accessions
                .iter()
                .all(|&ix| self.0.is_match(&graph[ix].accession))
    }
}

/// Decoy accessions were flagged by the ingestion layer
pub struct ExplicitMarker;

impl DecoyStrategy for ExplicitMarker {
    fn name(&self) -> &'static str {
        "explicit_marker"
    }

    fn is_decoy(&self, evidence: &DecoyEvidence, graph: &IdentGraph) -> bool {
        !evidence.accessions.is_empty()
            && evidence
                .accessions
                .iter()
                .all(|&ix| graph[ix].decoy == Some(true))
    }
}

/// Decoy PSMs were flagged by the search engine
pub struct SearchEngineFlag;

impl DecoyStrategy for SearchEngineFlag {
    fn name(&self) -> &'static str {
        "search_engine"
    }

    fn is_decoy(&self, evidence: &DecoyEvidence, graph: &IdentGraph) -> bool {
        !evidence.psms.is_empty()
            && evidence
                .psms
                .iter()
                .all(|&ix| graph[ix].decoy == Some(true))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum DecoyConfig {
    AccessionPattern { pattern: String },
    ExplicitMarker,
    SearchEngine,
}

impl Default for DecoyConfig {
    fn default() -> Self {
        DecoyConfig::AccessionPattern {
            pattern: DEFAULT_DECOY_PATTERN.into(),
        }
    }
}

impl DecoyConfig {
    pub fn build(&self) -> Result<Box<dyn DecoyStrategy>, Error> {
        Ok(match self {
            DecoyConfig::AccessionPattern { pattern } => {
                Box::new(AccessionPattern(Regex::new(pattern)?))
            }
            DecoyConfig::ExplicitMarker => Box::new(ExplicitMarker),
            DecoyConfig::SearchEngine => Box::new(SearchEngineFlag),
        })
    }
}

/// A report row that takes part in FDR estimation
pub trait FdrRow: CompareScore {
    fn decoy_evidence(&self, graph: &IdentGraph) -> DecoyEvidence;
    fn is_decoy(&self) -> bool;
    fn set_decoy(&mut self, decoy: bool);
    fn fdr(&self) -> f64;
    fn set_fdr(&mut self, fdr: f64);
    fn q_value(&self) -> f64;
    fn set_q_value(&mut self, q_value: f64);
    fn fdr_score(&self) -> f64;
    fn set_fdr_score(&mut self, fdr_score: f64);
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FdrSummary {
    pub targets: usize,
    pub decoys: usize,
    /// Scored rows with a q-value at or below the threshold
    pub passing: usize,
    /// Rows without the score, left with NaN statistics
    pub unscored: usize,
}

pub struct FdrEstimator {
    strategy: Box<dyn DecoyStrategy>,
    pub threshold: f64,
    pub decoy_ratio: f64,
}

impl FdrEstimator {
    pub fn new(strategy: Box<dyn DecoyStrategy>) -> Self {
        Self {
            strategy,
            threshold: 0.01,
            decoy_ratio: 1.0,
        }
    }

    pub fn threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Target to decoy database size factor
    pub fn decoy_ratio(mut self, ratio: f64) -> Self {
        self.decoy_ratio = ratio;
        self
    }

    pub fn strategy(&self) -> &dyn DecoyStrategy {
        self.strategy.as_ref()
    }

    /// Classify every row as target or decoy, returning the number of decoys
    pub fn assign_decoys<T: FdrRow + Send>(&self, rows: &mut [T], graph: &IdentGraph) -> usize {
        rows.par_iter_mut()
            .map(|row| {
                let decoy = self.strategy.is_decoy(&row.decoy_evidence(graph), graph);
                row.set_decoy(decoy);
                decoy as usize
            })
            .sum()
    }

    /// Sort `rows` best to worst by the score `name` and assign FDR,
    /// q-value and FDR score to every row. Rows lacking the score end up
    /// last, with NaN statistics.
    pub fn calculate<T: FdrRow + Send>(
        &self,
        rows: &mut [T],
        name: &str,
        higher_better: Option<bool>,
    ) -> FdrSummary {
        let time = Instant::now();
        let cmp = |a: &T, b: &T| compare_by_score(a, b, name, higher_better);
        rows.par_sort_by(cmp);

        let scored = rows
            .iter()
            .take_while(|row| row.compare_score(name).is_some())
            .count();
        let (scored, unscored) = rows.split_at_mut(scored);
        for row in unscored.iter_mut() {
            row.set_fdr(f64::NAN);
            row.set_q_value(f64::NAN);
            row.set_fdr_score(f64::NAN);
        }

        let mut summary = FdrSummary {
            unscored: unscored.len(),
            ..Default::default()
        };

        // Forward scan: tied rows share the FDR reached at the end of the tie
        let mut fdr = Vec::with_capacity(scored.len());
        let mut start = 0;
        while start < scored.len() {
            let mut end = start + 1;
            while end < scored.len() && cmp(&scored[start], &scored[end]) == Ordering::Equal {
                end += 1;
            }
            for row in &scored[start..end] {
                match row.is_decoy() {
                    true => summary.decoys += 1,
                    false => summary.targets += 1,
                }
            }
            let value =
                summary.decoys as f64 * self.decoy_ratio / summary.targets.max(1) as f64;
            fdr.extend(std::iter::repeat(value).take(end - start));
            start = end;
        }

        // Backward scan: q = q[::-1].cummin()[::-1]
        let mut q_values = fdr.clone();
        let mut q_min = f64::INFINITY;
        for q in q_values.iter_mut().rev() {
            q_min = q_min.min(*q);
            *q = q_min;
        }

        let scores = scored
            .iter()
            .filter_map(|row| row.compare_score(name).map(|s| s.value))
            .collect::<Vec<_>>();
        let fdr_scores = fdr_scores(&scores, &q_values);

        for (i, row) in scored.iter_mut().enumerate() {
            row.set_fdr(fdr[i]);
            row.set_q_value(q_values[i]);
            row.set_fdr_score(fdr_scores[i]);
            if q_values[i] <= self.threshold {
                summary.passing += 1;
            }
        }

        info!(
            "FDR on `{}` using {} decoys: {} targets, {} decoys, {} rows q <= {} ({}ms)",
            name,
            self.strategy.name(),
            summary.targets,
            summary.decoys,
            summary.passing,
            self.threshold,
            time.elapsed().as_millis()
        );
        summary
    }
}

/// FDR score of best-to-worst sorted rows: the q-value interpolated linearly
/// by score between the last rows of each q-value level, starting from
/// q = 0 at the best score.
pub fn fdr_scores(scores: &[f64], q_values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(scores.len());
    let (mut s_a, mut q_a) = match scores.first() {
        Some(&s) => (s, 0.0),
        None => return out,
    };
    let mut start = 0;
    for node in 0..scores.len() {
        if node + 1 < scores.len() && q_values[node + 1] <= q_values[node] {
            continue;
        }
        let (s_b, q_b) = (scores[node], q_values[node]);
        let width = s_b - s_a;
        for &s in &scores[start..=node] {
            out.push(match width == 0.0 {
                true => q_b,
                false => q_a + (q_b - q_a) * (s - s_a) / width,
            });
        }
        s_a = s_b;
        q_a = q_b;
        start = node + 1;
    }
    out
}

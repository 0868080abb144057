//! Protein scoring: PSM scores of a protein's peptides are selected per
//! peptide and aggregated into a single comparable score.

use crate::compare::CompareScore;
use crate::graph::{IdentGraph, PsmSetIx};
use crate::report::{ReportProtein, ReportPsm};
use crate::score::{default_higher_better, ScoreModel, PROTEIN_SCORE, PSM_COMBINED_FDR_SCORE};
use fnv::FnvHashMap;
use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub trait ScoreAggregation: Send + Sync {
    fn name(&self) -> &'static str;
    fn higher_score_better(&self) -> bool;
    /// Aggregate a list of scores. NaN entries are ignored, and the result is
    /// NaN if nothing usable is left.
    fn aggregate(&self, scores: &[f64]) -> f64;
}

fn usable(scores: &[f64]) -> impl Iterator<Item = f64> + '_ {
    scores.iter().copied().filter(|s| !s.is_nan())
}

/// log10 for probability-like scores; zero (e.g. the FDR score of the best
/// row) is clamped to the smallest positive value to stay finite
fn log10(score: f64) -> f64 {
    score.max(f64::MIN_POSITIVE).log10()
}

/// Sum of the raw scores
pub struct Additive;

impl ScoreAggregation for Additive {
    fn name(&self) -> &'static str {
        "additive"
    }

    fn higher_score_better(&self) -> bool {
        true
    }

    fn aggregate(&self, scores: &[f64]) -> f64 {
        let mut scores = usable(scores).peekable();
        match scores.peek() {
            Some(_) => scores.sum(),
            None => f64::NAN,
        }
    }
}

/// Product of the scores, computed in the log domain
pub struct Multiplicative;

impl ScoreAggregation for Multiplicative {
    fn name(&self) -> &'static str {
        "multiplicative"
    }

    fn higher_score_better(&self) -> bool {
        false
    }

    fn aggregate(&self, scores: &[f64]) -> f64 {
        let mut scores = usable(scores).map(log10).peekable();
        match scores.peek() {
            Some(_) => scores.sum(),
            None => f64::NAN,
        }
    }
}

/// Negative mean of the log10 scores, for probability-like scores where
/// smaller is better
pub struct GeometricMean;

impl ScoreAggregation for GeometricMean {
    fn name(&self) -> &'static str {
        "geometric_mean"
    }

    fn higher_score_better(&self) -> bool {
        true
    }

    fn aggregate(&self, scores: &[f64]) -> f64 {
        let (sum, n) = usable(scores).fold((0.0, 0usize), |(sum, n), s| (sum + log10(s), n + 1));
        match n {
            0 => f64::NAN,
            n => -sum / n as f64,
        }
    }
}

pub trait PsmSelection: Send + Sync {
    fn name(&self) -> &'static str;
    /// Push the contributions of one peptide that take part in aggregation
    fn select(&self, contributions: &[f64], higher_better: bool, out: &mut Vec<f64>);
}

pub struct OnlyBestPsm;

impl PsmSelection for OnlyBestPsm {
    fn name(&self) -> &'static str {
        "only_best"
    }

    fn select(&self, contributions: &[f64], higher_better: bool, out: &mut Vec<f64>) {
        let best = usable(contributions).reduce(|a, b| match higher_better {
            true => a.max(b),
            false => a.min(b),
        });
        out.extend(best);
    }
}

pub struct AllPsms;

impl PsmSelection for AllPsms {
    fn name(&self) -> &'static str {
        "all_psms"
    }

    fn select(&self, contributions: &[f64], _: bool, out: &mut Vec<f64>) {
        out.extend(usable(contributions));
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringMethod {
    Additive,
    Multiplicative,
    #[default]
    GeometricMean,
}

impl ScoringMethod {
    pub fn build(self) -> Box<dyn ScoreAggregation> {
        match self {
            ScoringMethod::Additive => Box::new(Additive),
            ScoringMethod::Multiplicative => Box::new(Multiplicative),
            ScoringMethod::GeometricMean => Box::new(GeometricMean),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PsmMode {
    #[default]
    OnlyBest,
    AllPsms,
}

impl PsmMode {
    pub fn build(self) -> Box<dyn PsmSelection> {
        match self {
            PsmMode::OnlyBest => Box::new(OnlyBestPsm),
            PsmMode::AllPsms => Box::new(AllPsms),
        }
    }
}

pub struct Scoring {
    aggregation: Box<dyn ScoreAggregation>,
    selection: Box<dyn PsmSelection>,
    score_name: String,
    /// Scores read from the PSM-set itself rather than its member PSMs
    set_level_scores: Vec<String>,
}

impl Scoring {
    pub fn new<S: Into<String>>(method: ScoringMethod, mode: PsmMode, score_name: S) -> Self {
        Self {
            aggregation: method.build(),
            selection: mode.build(),
            score_name: score_name.into(),
            set_level_scores: vec![PSM_COMBINED_FDR_SCORE.into()],
        }
    }

    pub fn with_set_level_scores(mut self, names: Vec<String>) -> Self {
        self.set_level_scores = names;
        self
    }

    pub fn score_name(&self) -> &str {
        &self.score_name
    }

    pub fn higher_score_better(&self) -> bool {
        self.aggregation.higher_score_better()
    }

    fn is_set_level(&self) -> bool {
        self.set_level_scores.iter().any(|s| s == &self.score_name)
    }

    /// Qualifying contributions of one peptide, given its PSM rows.
    /// Non-scoring PSMs never contribute, and a set contributes its
    /// set-level score only if at least one member is scoring.
    pub fn peptide_contributions<'a, I>(&self, rows: I, graph: &IdentGraph) -> Vec<f64>
    where
        I: IntoIterator<Item = &'a ReportPsm>,
    {
        let mut contributions = Vec::new();
        for row in rows {
            match self.is_set_level() {
                true => {
                    if graph[row.set].scoring {
                        contributions.extend(row.compare_score(&self.score_name).map(|s| s.value));
                    }
                }
                false => contributions.extend(
                    graph
                        .members(row.set)
                        .filter(|psm| !psm.non_scoring)
                        .filter_map(|psm| psm.score(&self.score_name)),
                ),
            }
        }
        contributions
    }

    /// Score of one protein row, NaN if no peptide contributes
    pub fn calculate_score(
        &self,
        protein: &ReportProtein,
        psms: &FnvHashMap<PsmSetIx, &ReportPsm>,
        graph: &IdentGraph,
    ) -> f64 {
        let higher_better = default_higher_better(&self.score_name);
        let mut selected = Vec::new();
        for &peptide in &protein.peptides {
            let rows = graph[peptide]
                .psm_sets
                .iter()
                .filter_map(|set| psms.get(set).copied());
            let contributions = self.peptide_contributions(rows, graph);
            self.selection
                .select(&contributions, higher_better, &mut selected);
        }
        self.aggregation.aggregate(&selected)
    }

    /// Write the `protein_score` of every protein row
    pub fn score_proteins(&self, proteins: &mut [ReportProtein], psms: &[ReportPsm], graph: &IdentGraph) {
        let time = Instant::now();
        let lookup = psms
            .iter()
            .map(|row| (row.set, row))
            .collect::<FnvHashMap<_, _>>();

        let higher_better = self.higher_score_better();
        proteins.par_iter_mut().for_each(|protein| {
            let score = self.calculate_score(protein, &lookup, graph);
            protein.set_score(ScoreModel::with_direction(PROTEIN_SCORE, score, higher_better));
        });

        info!(
            "scored {} proteins from `{}` ({}, {}) in {}ms",
            proteins.len(),
            self.score_name,
            self.aggregation.name(),
            self.selection.name(),
            time.elapsed().as_millis()
        );
    }
}

//! Report rows derived from the identification graph.
//!
//! Rows are produced in stages: PSM rows (one per PSM-set) straight from the
//! graph, peptide rows from the PSM rows that survived filtering, and protein
//! rows from protein inference over the peptide rows. Only the derived fields
//! (scores, rank, decoy flag, FDR, q-value, FDR score) are mutated after a
//! row has been created.

use crate::compare::{compare_ranks, CompareScore, SortRegistry};
use crate::fdr::{DecoyEvidence, FdrRow};
use crate::filter::{apply_filters, Entity, Filter, FilterKey, FilterValue, Filterable};
use crate::graph::{AccessionIx, FileId, GroupIx, IdentGraph, PeptideIx, PsmIx, PsmSet, PsmSetIx};
use crate::inference::ProteinInference;
use crate::rank::Rankable;
use crate::score::{ScoreModel, PSM_COMBINED_FDR_SCORE};
use crate::scoring::Scoring;
use log::info;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

/// Best value of every named score, each in its own direction
fn best_scores<'a, I>(scores: I) -> Vec<ScoreModel>
where
    I: IntoIterator<Item = &'a ScoreModel>,
{
    let mut best: BTreeMap<&str, &ScoreModel> = BTreeMap::new();
    for score in scores.into_iter().filter(|s| s.is_valid()) {
        match best.entry(score.name.as_str()) {
            Entry::Vacant(e) => {
                e.insert(score);
            }
            Entry::Occupied(mut e) => {
                if score.compare(e.get()) == Ordering::Less {
                    e.insert(score);
                }
            }
        }
    }
    best.into_values().cloned().collect()
}

fn upsert(scores: &mut Vec<ScoreModel>, score: ScoreModel) {
    match scores.iter_mut().find(|s| s.name == score.name) {
        Some(s) => *s = score,
        None => scores.push(score),
    }
}

/// Statistics are NaN until calculated; NaN sorts last
fn compare_stat(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => a.total_cmp(&b),
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
    }
}

fn accession_list<I>(accessions: I, graph: &IdentGraph) -> FilterValue
where
    I: IntoIterator<Item = AccessionIx>,
{
    FilterValue::LiteralList(
        accessions
            .into_iter()
            .map(|ix| graph[ix].accession.clone())
            .collect(),
    )
}

/// Distinct descriptions of `accessions` as seen from `file`
fn description_list<I>(accessions: I, file: FileId, graph: &IdentGraph) -> FilterValue
where
    I: IntoIterator<Item = AccessionIx>,
{
    FilterValue::LiteralList(
        accessions
            .into_iter()
            .flat_map(|ix| graph[ix].descriptions_in(file))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(String::from)
            .collect(),
    )
}

fn modification_list(peptide: PeptideIx, graph: &IdentGraph) -> FilterValue {
    FilterValue::LiteralList(
        graph[peptide]
            .modifications
            .iter()
            .map(|(_, m)| match m.description.is_empty() {
                true => m.to_string(),
                false => m.description.clone(),
            })
            .collect(),
    )
}

fn count_psms(sets: &[PsmSetIx], file: FileId, graph: &IdentGraph) -> usize {
    sets.iter()
        .flat_map(|&set| graph.members(set))
        .filter(|psm| file.is_all() || psm.file == file)
        .count()
}

fn count_spectra(sets: &[PsmSetIx], file: FileId, graph: &IdentGraph) -> usize {
    sets.iter()
        .flat_map(|&set| graph.members(set))
        .filter(|psm| file.is_all() || psm.file == file)
        .map(|psm| (psm.file, psm.spectrum.as_str()))
        .collect::<BTreeSet<_>>()
        .len()
}

/// A peptide is unique if all of its accessions belong to one group
fn is_unique(peptide: PeptideIx, graph: &IdentGraph) -> bool {
    graph[peptide]
        .accessions
        .iter()
        .map(|&ix| graph[ix].group)
        .collect::<BTreeSet<_>>()
        .len()
        == 1
}

fn psms_of(sets: &[PsmSetIx], graph: &IdentGraph) -> Vec<PsmIx> {
    sets.iter()
        .flat_map(|&set| graph[set].psms.iter().copied())
        .collect()
}

/// Values every row kind shares
fn common_value<T: CompareScore>(
    row: &T,
    key: &FilterKey,
    rank: Option<u32>,
    stats: (bool, f64, f64, f64),
) -> Option<FilterValue> {
    let (decoy, fdr, q_value, fdr_score) = stats;
    // Statistics stay NaN on rows FDR estimation did not score
    let stat = |value: f64| (!value.is_nan()).then_some(FilterValue::Numerical(value));
    match key {
        FilterKey::Rank => rank.map(|r| FilterValue::Numerical(r as f64)),
        FilterKey::Decoy => Some(FilterValue::Boolean(decoy)),
        FilterKey::Fdr => stat(fdr),
        FilterKey::QValue => stat(q_value),
        FilterKey::FdrScore => stat(fdr_score),
        FilterKey::Score(name) => row
            .compare_score(name)
            .map(|s| FilterValue::Numerical(s.value)),
        _ => None,
    }
}

/// Report row of one PSM-set
#[derive(Clone, Debug, PartialEq)]
pub struct ReportPsm {
    pub set: PsmSetIx,
    pub peptide: PeptideIx,
    /// Modified peptide sequence
    pub sequence: String,
    pub charge: i32,
    /// Best member score per name, plus set-level scores
    pub scores: Vec<ScoreModel>,
    pub rank: Option<u32>,
    pub decoy: bool,
    pub fdr: f64,
    pub q_value: f64,
    pub fdr_score: f64,
}

impl ReportPsm {
    pub fn new(set: &PsmSet, graph: &IdentGraph) -> Self {
        Self {
            set: set.ix,
            peptide: set.peptide,
            sequence: graph[set.peptide].to_string(),
            charge: set.charge,
            scores: best_scores(graph.members(set.ix).flat_map(|psm| psm.scores.iter())),
            rank: graph.members(set.ix).filter_map(|psm| psm.rank).min(),
            decoy: false,
            fdr: f64::NAN,
            q_value: f64::NAN,
            fdr_score: f64::NAN,
        }
    }
}

/// Report row of one peptide, over the PSM rows supporting it
#[derive(Clone, Debug, PartialEq)]
pub struct ReportPeptide {
    pub peptide: PeptideIx,
    pub sequence: String,
    pub psm_sets: Vec<PsmSetIx>,
    pub scores: Vec<ScoreModel>,
    pub rank: Option<u32>,
    pub decoy: bool,
    pub fdr: f64,
    pub q_value: f64,
    pub fdr_score: f64,
}

/// Report row of one inferred protein (one or more merged groups)
#[derive(Clone, Debug, PartialEq)]
pub struct ReportProtein {
    /// Member accessions joined by ','
    pub name: String,
    pub accessions: Vec<AccessionIx>,
    /// Accessions whose evidence is a strict subset of this protein's
    pub subset_accessions: Vec<AccessionIx>,
    pub groups: Vec<GroupIx>,
    pub peptides: Vec<PeptideIx>,
    pub psm_sets: Vec<PsmSetIx>,
    pub scores: Vec<ScoreModel>,
    pub rank: Option<u32>,
    pub decoy: bool,
    pub fdr: f64,
    pub q_value: f64,
    pub fdr_score: f64,
}

impl ReportProtein {
    pub fn new(
        accessions: Vec<AccessionIx>,
        groups: Vec<GroupIx>,
        peptides: Vec<PeptideIx>,
        psm_sets: Vec<PsmSetIx>,
        graph: &IdentGraph,
    ) -> Self {
        let mut names = accessions
            .iter()
            .map(|&ix| graph[ix].accession.as_str())
            .collect::<Vec<_>>();
        names.sort_unstable();
        Self {
            name: names.join(","),
            accessions,
            subset_accessions: Vec::new(),
            groups,
            peptides,
            psm_sets,
            scores: Vec::new(),
            rank: None,
            decoy: false,
            fdr: f64::NAN,
            q_value: f64::NAN,
            fdr_score: f64::NAN,
        }
    }

    pub fn add_subset_accessions<I: IntoIterator<Item = AccessionIx>>(&mut self, accessions: I) {
        self.subset_accessions.extend(accessions);
        self.subset_accessions.sort_unstable();
        self.subset_accessions.dedup();
    }

    pub fn set_score(&mut self, score: ScoreModel) {
        upsert(&mut self.scores, score);
    }
}

macro_rules! report_row {
    ($row:ty) => {
        impl CompareScore for $row {
            fn scores(&self) -> &[ScoreModel] {
                &self.scores
            }
        }

        impl Rankable for $row {
            fn rank(&self) -> Option<u32> {
                self.rank
            }

            fn set_rank(&mut self, rank: Option<u32>) {
                self.rank = rank;
            }
        }
    };
}

report_row!(ReportPsm);
report_row!(ReportPeptide);
report_row!(ReportProtein);

impl FdrRow for ReportPsm {
    fn decoy_evidence(&self, graph: &IdentGraph) -> DecoyEvidence {
        DecoyEvidence {
            accessions: graph[self.peptide].accessions.iter().copied().collect(),
            psms: graph[self.set].psms.clone(),
        }
    }

    fn is_decoy(&self) -> bool {
        self.decoy
    }

    fn set_decoy(&mut self, decoy: bool) {
        self.decoy = decoy;
    }

    fn fdr(&self) -> f64 {
        self.fdr
    }

    fn set_fdr(&mut self, fdr: f64) {
        self.fdr = fdr;
    }

    fn q_value(&self) -> f64 {
        self.q_value
    }

    fn set_q_value(&mut self, q_value: f64) {
        self.q_value = q_value;
    }

    fn fdr_score(&self) -> f64 {
        self.fdr_score
    }

    /// Also stored as the set-level `psm_combined_fdr_score`
    fn set_fdr_score(&mut self, fdr_score: f64) {
        self.fdr_score = fdr_score;
        upsert(
            &mut self.scores,
            ScoreModel::with_direction(PSM_COMBINED_FDR_SCORE, fdr_score, false),
        );
    }
}

impl FdrRow for ReportPeptide {
    fn decoy_evidence(&self, graph: &IdentGraph) -> DecoyEvidence {
        DecoyEvidence {
            accessions: graph[self.peptide].accessions.iter().copied().collect(),
            psms: psms_of(&self.psm_sets, graph),
        }
    }

    fn is_decoy(&self) -> bool {
        self.decoy
    }

    fn set_decoy(&mut self, decoy: bool) {
        self.decoy = decoy;
    }

    fn fdr(&self) -> f64 {
        self.fdr
    }

    fn set_fdr(&mut self, fdr: f64) {
        self.fdr = fdr;
    }

    fn q_value(&self) -> f64 {
        self.q_value
    }

    fn set_q_value(&mut self, q_value: f64) {
        self.q_value = q_value;
    }

    fn fdr_score(&self) -> f64 {
        self.fdr_score
    }

    fn set_fdr_score(&mut self, fdr_score: f64) {
        self.fdr_score = fdr_score;
    }
}

impl FdrRow for ReportProtein {
    fn decoy_evidence(&self, graph: &IdentGraph) -> DecoyEvidence {
        DecoyEvidence {
            accessions: self.accessions.clone(),
            psms: psms_of(&self.psm_sets, graph),
        }
    }

    fn is_decoy(&self) -> bool {
        self.decoy
    }

    fn set_decoy(&mut self, decoy: bool) {
        self.decoy = decoy;
    }

    fn fdr(&self) -> f64 {
        self.fdr
    }

    fn set_fdr(&mut self, fdr: f64) {
        self.fdr = fdr;
    }

    fn q_value(&self) -> f64 {
        self.q_value
    }

    fn set_q_value(&mut self, q_value: f64) {
        self.q_value = q_value;
    }

    fn fdr_score(&self) -> f64 {
        self.fdr_score
    }

    fn set_fdr_score(&mut self, fdr_score: f64) {
        self.fdr_score = fdr_score;
    }
}

impl Filterable for ReportPsm {
    const ENTITY: Entity = Entity::Psm;

    fn filter_value(&self, key: &FilterKey, file: FileId, graph: &IdentGraph) -> Option<FilterValue> {
        let sets = std::slice::from_ref(&self.set);
        let peptide = &graph[self.peptide];
        Some(match key {
            FilterKey::Charge => FilterValue::Numerical(self.charge as f64),
            FilterKey::Sequence => FilterValue::Literal(peptide.sequence.clone()),
            FilterKey::Modifications => modification_list(self.peptide, graph),
            FilterKey::Accessions => accession_list(peptide.accessions.iter().copied(), graph),
            FilterKey::Description => {
                description_list(peptide.accessions.iter().copied(), file, graph)
            }
            FilterKey::NrPsms => FilterValue::Numerical(count_psms(sets, file, graph) as f64),
            FilterKey::NrSpectra => FilterValue::Numerical(count_spectra(sets, file, graph) as f64),
            FilterKey::NrAccessions => FilterValue::Numerical(peptide.accessions.len() as f64),
            FilterKey::Unique => FilterValue::Boolean(is_unique(self.peptide, graph)),
            _ => {
                let stats = (self.decoy, self.fdr, self.q_value, self.fdr_score);
                return common_value(self, key, self.rank, stats);
            }
        })
    }
}

impl Filterable for ReportPeptide {
    const ENTITY: Entity = Entity::Peptide;

    fn filter_value(&self, key: &FilterKey, file: FileId, graph: &IdentGraph) -> Option<FilterValue> {
        let peptide = &graph[self.peptide];
        Some(match key {
            FilterKey::Sequence => FilterValue::Literal(peptide.sequence.clone()),
            FilterKey::Modifications => modification_list(self.peptide, graph),
            FilterKey::Accessions => accession_list(peptide.accessions.iter().copied(), graph),
            FilterKey::Description => {
                description_list(peptide.accessions.iter().copied(), file, graph)
            }
            FilterKey::NrPsms => {
                FilterValue::Numerical(count_psms(&self.psm_sets, file, graph) as f64)
            }
            FilterKey::NrSpectra => {
                FilterValue::Numerical(count_spectra(&self.psm_sets, file, graph) as f64)
            }
            FilterKey::NrAccessions => FilterValue::Numerical(peptide.accessions.len() as f64),
            FilterKey::Unique => FilterValue::Boolean(is_unique(self.peptide, graph)),
            _ => {
                let stats = (self.decoy, self.fdr, self.q_value, self.fdr_score);
                return common_value(self, key, self.rank, stats);
            }
        })
    }
}

impl Filterable for ReportProtein {
    const ENTITY: Entity = Entity::Protein;

    fn filter_value(&self, key: &FilterKey, file: FileId, graph: &IdentGraph) -> Option<FilterValue> {
        let accessions = self.accessions.iter().copied();
        Some(match key {
            FilterKey::Accessions => accession_list(accessions, graph),
            FilterKey::Description => description_list(accessions, file, graph),
            FilterKey::NrPsms => {
                FilterValue::Numerical(count_psms(&self.psm_sets, file, graph) as f64)
            }
            FilterKey::NrSpectra => {
                FilterValue::Numerical(count_spectra(&self.psm_sets, file, graph) as f64)
            }
            FilterKey::NrPeptides => FilterValue::Numerical(self.peptides.len() as f64),
            FilterKey::NrAccessions => FilterValue::Numerical(self.accessions.len() as f64),
            _ => {
                let stats = (self.decoy, self.fdr, self.q_value, self.fdr_score);
                return common_value(self, key, self.rank, stats);
            }
        })
    }
}

pub fn psm_orders() -> SortRegistry<ReportPsm> {
    SortRegistry::default()
        .register("rank", |a: &ReportPsm, b: &ReportPsm| compare_ranks(a.rank, b.rank, false))
        .register("sequence", |a: &ReportPsm, b: &ReportPsm| a.sequence.cmp(&b.sequence))
        .register("charge", |a: &ReportPsm, b: &ReportPsm| a.charge.cmp(&b.charge))
        .register("q_value", |a: &ReportPsm, b: &ReportPsm| compare_stat(a.q_value, b.q_value))
}

pub fn peptide_orders() -> SortRegistry<ReportPeptide> {
    SortRegistry::default()
        .register("rank", |a: &ReportPeptide, b: &ReportPeptide| {
            compare_ranks(a.rank, b.rank, false)
        })
        .register("sequence", |a: &ReportPeptide, b: &ReportPeptide| {
            a.sequence.cmp(&b.sequence)
        })
        .register("nr_psms", |a: &ReportPeptide, b: &ReportPeptide| {
            b.psm_sets.len().cmp(&a.psm_sets.len())
        })
        .register("q_value", |a: &ReportPeptide, b: &ReportPeptide| {
            compare_stat(a.q_value, b.q_value)
        })
}

pub fn protein_orders() -> SortRegistry<ReportProtein> {
    SortRegistry::default()
        .register("rank", |a: &ReportProtein, b: &ReportProtein| {
            compare_ranks(a.rank, b.rank, false)
        })
        .register("accession", |a: &ReportProtein, b: &ReportProtein| a.name.cmp(&b.name))
        .register("nr_peptides", |a: &ReportProtein, b: &ReportProtein| {
            b.peptides.len().cmp(&a.peptides.len())
        })
        .register("nr_psms", |a: &ReportProtein, b: &ReportProtein| {
            b.psm_sets.len().cmp(&a.psm_sets.len())
        })
        .register("q_value", |a: &ReportProtein, b: &ReportProtein| {
            compare_stat(a.q_value, b.q_value)
        })
}

/// The identification graph together with the report rows built from it
pub struct Report {
    pub graph: IdentGraph,
    pub psms: Vec<ReportPsm>,
    pub peptides: Vec<ReportPeptide>,
    pub proteins: Vec<ReportProtein>,
}

impl Report {
    /// Create one PSM row per PSM-set
    pub fn new(graph: IdentGraph) -> Self {
        let psms = graph
            .psm_sets
            .par_iter()
            .map(|set| ReportPsm::new(set, &graph))
            .collect();
        Self {
            graph,
            psms,
            peptides: Vec::new(),
            proteins: Vec::new(),
        }
    }

    /// (Re)build peptide rows from the current PSM rows
    pub fn assemble_peptides(&mut self) {
        let time = Instant::now();
        let mut by_peptide: BTreeMap<PeptideIx, Vec<&ReportPsm>> = BTreeMap::new();
        for row in &self.psms {
            by_peptide.entry(row.peptide).or_default().push(row);
        }
        self.peptides = by_peptide
            .into_iter()
            .map(|(peptide, rows)| ReportPeptide {
                peptide,
                sequence: self.graph[peptide].to_string(),
                psm_sets: rows.iter().map(|row| row.set).collect(),
                scores: best_scores(rows.iter().flat_map(|row| row.scores.iter())),
                rank: None,
                decoy: false,
                fdr: f64::NAN,
                q_value: f64::NAN,
                fdr_score: f64::NAN,
            })
            .collect();
        info!(
            "assembled {} peptides from {} PSM-sets in {}ms",
            self.peptides.len(),
            self.psms.len(),
            time.elapsed().as_millis()
        );
    }

    /// (Re)build protein rows from the current peptide rows
    pub fn infer_proteins(&mut self, method: ProteinInference) {
        self.proteins = method.infer(&self.peptides, &self.graph);
    }

    pub fn score_proteins(&mut self, scoring: &Scoring) {
        scoring.score_proteins(&mut self.proteins, &self.psms, &self.graph);
    }

    pub fn filter_psms(&mut self, filters: &[Filter]) {
        let rows = std::mem::take(&mut self.psms);
        self.psms = apply_filters(rows, filters, &self.graph);
    }

    pub fn filter_peptides(&mut self, filters: &[Filter]) {
        let rows = std::mem::take(&mut self.peptides);
        self.peptides = apply_filters(rows, filters, &self.graph);
    }

    pub fn filter_proteins(&mut self, filters: &[Filter]) {
        let rows = std::mem::take(&mut self.proteins);
        self.proteins = apply_filters(rows, filters, &self.graph);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::fdr::{DecoyConfig, FdrEstimator};
    use crate::filter::Comparison;
    use crate::graph::test::psm;
    use crate::graph::GraphBuilder;
    use crate::rank::rank_by_score;
    use crate::scoring::{PsmMode, ScoringMethod};

    fn report() -> Report {
        let mut builder = GraphBuilder::default();
        builder.add_file("a.mzid");
        builder.add_file("b.mzid");
        let mut first = psm("PEPTIDEK", &["P1"], 1, "s1", &[("mascot_score", 40.0)]);
        first.rank = Some(2);
        builder.add_psm(first).unwrap();
        builder
            .add_psm(psm("PEPTIDEK", &["P1"], 1, "s2", &[("mascot_score", 20.0)]))
            .unwrap();
        builder
            .add_psm(psm("PEPTIDEK", &["P1"], 2, "s1", &[("mascot_score", 30.0)]))
            .unwrap();
        let mut non_scoring = psm("ELVISK", &["P1", "P2"], 1, "s3", &[("mascot_score", 10.0)]);
        non_scoring.non_scoring = true;
        builder.add_psm(non_scoring).unwrap();
        builder
            .add_psm(psm("LVNELTEFAK", &["DECOY_P3"], 1, "s4", &[("mascot_score", 15.0)]))
            .unwrap();

        let p1 = builder.add_accession("P1");
        builder.describe(p1, 1, "Serum albumin").unwrap();
        builder.describe(p1, 2, "Albumin").unwrap();

        let mut report = Report::new(builder.build());
        report.assemble_peptides();
        report.infer_proteins(ProteinInference::Slim);
        report
    }

    #[test]
    fn psm_rows() {
        let report = report();
        assert_eq!(report.psms.len(), 4);
        let first = &report.psms[0];
        assert_eq!(first.sequence, "PEPTIDEK");
        assert_eq!(first.compare_score("mascot_score").map(|s| s.value), Some(40.0));
        assert_eq!(first.rank, Some(2));
        assert_eq!(report.psms[1].rank, None);
        assert!(first.q_value.is_nan());

        let mut row = first.clone();
        row.set_fdr_score(0.25);
        row.set_fdr_score(0.5);
        let combined = row
            .scores
            .iter()
            .filter(|s| s.name == PSM_COMBINED_FDR_SCORE)
            .collect::<Vec<_>>();
        assert_eq!(combined.len(), 1);
        assert_eq!(combined[0].value, 0.5);
        assert!(!combined[0].higher_better);
    }

    #[test]
    fn peptide_and_protein_rows() {
        let report = report();
        assert_eq!(report.peptides.len(), 3);
        assert_eq!(report.peptides[0].psm_sets.len(), 2);
        assert_eq!(
            report.peptides[0].compare_score("mascot_score").map(|s| s.value),
            Some(40.0)
        );

        let names = report.proteins.iter().map(|p| p.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["P1", "DECOY_P3"]);
        let p2 = report.graph.find_accession("P2").unwrap();
        assert_eq!(report.proteins[0].subset_accessions, vec![p2]);
        assert_eq!(report.proteins[0].psm_sets.len(), 3);
    }

    #[test]
    fn protein_scores() {
        let mut report = report();
        let scoring = Scoring::new(ScoringMethod::Additive, PsmMode::OnlyBest, "mascot_score");
        report.score_proteins(&scoring);
        assert_eq!(report.proteins[0].compare_score("protein_score").map(|s| s.value), Some(40.0));
        assert_eq!(report.proteins[1].compare_score("protein_score").map(|s| s.value), Some(15.0));

        let scoring = Scoring::new(ScoringMethod::Additive, PsmMode::AllPsms, "mascot_score");
        report.score_proteins(&scoring);
        assert_eq!(report.proteins[0].compare_score("protein_score").map(|s| s.value), Some(90.0));
        assert_eq!(report.proteins[0].scores.len(), 1);

        // Set-level scores are read from the PSM rows; the set of the
        // non-scoring PSM never contributes
        for (row, score) in report.psms.iter_mut().zip([0.01, 0.02, 0.0, 0.5]) {
            row.set_fdr_score(score);
        }
        let scoring = Scoring::new(ScoringMethod::Additive, PsmMode::AllPsms, PSM_COMBINED_FDR_SCORE);
        report.score_proteins(&scoring);
        let score = report.proteins[0].compare_score("protein_score").unwrap().value;
        assert!((score - 0.03).abs() < 1e-12);

        // Missing scores aggregate to NaN, and NaN scores are absent
        let scoring = Scoring::new(ScoringMethod::Additive, PsmMode::AllPsms, "xcorr");
        report.score_proteins(&scoring);
        assert!(report.proteins[0].scores[0].value.is_nan());
        assert!(report.proteins[0].compare_score("protein_score").is_none());
    }

    #[test]
    fn decoys_and_fdr() {
        let mut report = report();
        let estimator = FdrEstimator::new(DecoyConfig::default().build().unwrap());
        assert_eq!(estimator.assign_decoys(&mut report.psms, &report.graph), 1);
        assert_eq!(estimator.assign_decoys(&mut report.proteins, &report.graph), 1);
        assert!(report.proteins[1].decoy);

        let summary = estimator.calculate(&mut report.psms, "mascot_score", None);
        assert_eq!(summary.targets, 3);
        assert_eq!(summary.decoys, 1);
        assert!(report.psms.iter().all(|row| row.compare_score(PSM_COMBINED_FDR_SCORE).is_some()));
        assert!(rank_by_score(&mut report.psms, "mascot_score", None));
        assert_eq!(report.psms[0].rank, Some(1));
    }

    #[test]
    fn filter_values() {
        let mut report = report();
        let protein = &report.proteins[0];
        let descriptions = |file| protein.filter_value(&FilterKey::Description, FileId(file), &report.graph);
        assert_eq!(
            descriptions(0),
            Some(FilterValue::LiteralList(vec!["Albumin".into(), "Serum albumin".into()]))
        );
        assert_eq!(
            descriptions(2),
            Some(FilterValue::LiteralList(vec!["Albumin".into()]))
        );
        assert_eq!(
            protein.filter_value(&FilterKey::NrPsms, FileId(1), &report.graph),
            Some(FilterValue::Numerical(3.0))
        );
        assert_eq!(
            protein.filter_value(&FilterKey::NrSpectra, FileId::ALL, &report.graph),
            Some(FilterValue::Numerical(4.0))
        );
        assert_eq!(
            report.psms[0].filter_value(&FilterKey::Unique, FileId::ALL, &report.graph),
            Some(FilterValue::Boolean(true))
        );
        assert_eq!(
            report.psms[2].filter_value(&FilterKey::Unique, FileId::ALL, &report.graph),
            Some(FilterValue::Boolean(false))
        );

        let charge = Filter::new(FilterKey::Charge, Comparison::Equal, FilterValue::Numerical(2.0)).unwrap();
        let single = Filter::new(FilterKey::NrPsms, Comparison::Equal, FilterValue::Numerical(1.0)).unwrap();
        report.filter_psms(&[charge.clone(), single]);
        assert_eq!(report.psms.len(), 3);
        // Charge does not apply to proteins and is skipped
        report.filter_proteins(&[charge]);
        assert_eq!(report.proteins.len(), 2);
    }

    #[test]
    fn unscored_statistics_are_absent() {
        let mut report = report();
        let row = &report.psms[0];
        for key in [FilterKey::QValue, FilterKey::Fdr, FilterKey::FdrScore] {
            assert_eq!(row.filter_value(&key, FileId::ALL, &report.graph), None);
        }

        // Like a missing score, an unset q-value skips the filter either way
        let q = Filter::new(FilterKey::QValue, Comparison::LessEqual, FilterValue::Numerical(0.01)).unwrap();
        assert_eq!(q.evaluate(row, &report.graph), None);
        assert_eq!(q.clone().negate(true).evaluate(row, &report.graph), None);
        let before = report.psms.len();
        report.filter_psms(&[q]);
        assert_eq!(report.psms.len(), before);
    }

    #[test]
    fn sort_orders() {
        let mut report = report();
        assert!(psm_orders().sort("sequence", &mut report.psms));
        assert_eq!(report.psms[0].sequence, "ELVISK");
        assert!(protein_orders().sort("accession", &mut report.proteins));
        assert_eq!(report.proteins[0].name, "DECOY_P3");
        assert!(peptide_orders().sort("nr_psms", &mut report.peptides));
        assert_eq!(report.peptides[0].psm_sets.len(), 2);
        assert!(peptide_orders().sort("score:mascot_score", &mut report.peptides));
        assert_eq!(report.peptides[0].sequence, "PEPTIDEK");
        assert!(!protein_orders().sort("coverage", &mut report.proteins));
    }
}

//! # Protein inference
//!
//! Accession groups of the identification graph are restricted to the
//! peptides still present in the report. Groups left with identical evidence
//! are merged into one candidate, and an (almost) minimal set of candidates
//! explaining every peptide is selected on the candidate/peptide bipartite
//! graph.
//!
//! Zhang, B., Chambers, M. C., & Tabb, D. L. (2007). Proteomic parsimony through
//! bipartite graph analysis improves accuracy and transparency. Journal of proteome research,
//! 6(9), 3549-3557. https://doi.org/10.1021/pr070230d

use crate::graph::{AccessionIx, GroupIx, IdentGraph, PeptideIx};
use crate::report::{ReportPeptide, ReportProtein};
use fnv::FnvHashMap;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProteinInference {
    /// Report every candidate
    All,
    /// Report a parsimonious cover of the peptides
    #[default]
    Slim,
}

impl ProteinInference {
    /// Which candidates are reported, given the peptide indices each
    /// candidate explains
    fn cover(&self, evidence: &[Vec<u32>], peptides: usize) -> Vec<bool> {
        match self {
            ProteinInference::All => vec![true; evidence.len()],
            ProteinInference::Slim => {
                let mut cover = Parsimony::new(evidence, peptides);
                cover.select_unique();
                while let Some(candidate) = cover.most_explaining() {
                    cover.select(candidate);
                }
                cover.selected
            }
        }
    }

    /// Build protein rows from the peptide rows of a report
    pub fn infer(&self, peptides: &[ReportPeptide], graph: &IdentGraph) -> Vec<ReportProtein> {
        let time = Instant::now();
        let present = peptides
            .iter()
            .map(|row| (row.peptide, row))
            .collect::<FnvHashMap<_, _>>();

        let mut merged: BTreeMap<Vec<PeptideIx>, Vec<GroupIx>> = BTreeMap::new();
        for group in &graph.groups {
            let evidence = group
                .peptides
                .iter()
                .copied()
                .filter(|peptide| present.contains_key(peptide))
                .collect::<Vec<_>>();
            if !evidence.is_empty() {
                merged.entry(evidence).or_default().push(group.ix);
            }
        }
        let candidates = merged.into_iter().collect::<Vec<_>>();

        let right = present
            .keys()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .enumerate()
            .map(|(i, peptide)| (peptide, i as u32))
            .collect::<FnvHashMap<_, _>>();
        let evidence = candidates
            .iter()
            .map(|(peptides, _)| {
                peptides
                    .iter()
                    .filter_map(|peptide| right.get(peptide).copied())
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        let cover = self.cover(&evidence, right.len());

        let accessions_of = |groups: &Vec<GroupIx>| {
            groups
                .iter()
                .flat_map(|&g| graph[g].accessions.iter().copied())
                .collect::<BTreeSet<AccessionIx>>()
        };

        let mut proteins = Vec::new();
        let mut reported = FnvHashMap::default();
        for (i, (evidence, groups)) in candidates.iter().enumerate() {
            if !cover[i] {
                continue;
            }
            let psm_sets = evidence
                .iter()
                .filter_map(|peptide| present.get(peptide))
                .flat_map(|row| row.psm_sets.iter().copied())
                .collect::<BTreeSet<_>>();
            reported.insert(i, proteins.len());
            proteins.push(ReportProtein::new(
                accessions_of(groups).into_iter().collect(),
                groups.clone(),
                evidence.clone(),
                psm_sets.into_iter().collect(),
                graph,
            ));
        }

        // Unreported candidates explained by a single reported one
        let mut containing: FnvHashMap<PeptideIx, Vec<usize>> = FnvHashMap::default();
        for &i in reported.keys() {
            for &peptide in &candidates[i].0 {
                containing.entry(peptide).or_default().push(i);
            }
        }
        let mut subsets = 0;
        for (i, (evidence, groups)) in candidates.iter().enumerate() {
            if cover[i] {
                continue;
            }
            let mut supersets = evidence
                .first()
                .and_then(|peptide| containing.get(peptide))
                .cloned()
                .unwrap_or_default();
            supersets.sort_unstable();
            for j in supersets {
                let superset = &candidates[j].0;
                if superset.len() > evidence.len()
                    && evidence.iter().all(|p| superset.binary_search(p).is_ok())
                {
                    let protein = &mut proteins[reported[&j]];
                    protein.add_subset_accessions(accessions_of(groups));
                    subsets += 1;
                }
            }
        }

        info!(
            "inferred {} of {} protein candidates from {} peptides ({:?}, {} subset relations) in {}ms",
            proteins.len(),
            candidates.len(),
            right.len(),
            self,
            subsets,
            time.elapsed().as_millis()
        );
        proteins
    }
}

/// Greedy set cover over candidate/peptide adjacency lists
struct Parsimony<'a> {
    evidence: &'a [Vec<u32>],
    /// Number of candidates holding each peptide
    holders: Vec<u32>,
    explained: Vec<bool>,
    selected: Vec<bool>,
}

impl<'a> Parsimony<'a> {
    fn new(evidence: &'a [Vec<u32>], peptides: usize) -> Self {
        let mut holders = vec![0; peptides];
        for &peptide in evidence.iter().flatten() {
            holders[peptide as usize] += 1;
        }
        Self {
            evidence,
            holders,
            explained: vec![false; peptides],
            selected: vec![false; evidence.len()],
        }
    }

    fn select(&mut self, candidate: usize) {
        self.selected[candidate] = true;
        for &peptide in &self.evidence[candidate] {
            self.explained[peptide as usize] = true;
        }
    }

    /// Peptides of `candidate` not yet explained by a selected candidate
    fn unexplained(&self, candidate: usize) -> usize {
        self.evidence[candidate]
            .iter()
            .filter(|&&peptide| !self.explained[peptide as usize])
            .count()
    }

    /// Candidates holding a peptide nobody else holds are always reported
    fn select_unique(&mut self) {
        let unique = (0..self.evidence.len())
            .filter(|&candidate| {
                self.evidence[candidate]
                    .iter()
                    .any(|&peptide| self.holders[peptide as usize] == 1)
            })
            .collect::<Vec<_>>();
        for candidate in unique {
            self.select(candidate);
        }
    }

    /// The candidate explaining the most remaining peptides, then the one
    /// with the most evidence overall; the last one wins a full tie
    fn most_explaining(&self) -> Option<usize> {
        (0..self.evidence.len())
            .filter(|&candidate| !self.selected[candidate])
            .map(|candidate| (candidate, self.unexplained(candidate)))
            .filter(|&(_, open)| open > 0)
            .max_by_key(|&(candidate, open)| (open, self.evidence[candidate].len()))
            .map(|(candidate, _)| candidate)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::test::psm;
    use crate::graph::GraphBuilder;
    use crate::report::Report;
    use itertools::Itertools;

    fn report() -> Report {
        let proteins = vec![
            vec!["protein_7"],
            vec!["protein_4", "protein_6", "protein_9"],
            vec!["protein_1"],
            vec!["protein_1", "protein_5"],
            vec!["protein_7"],
            vec!["protein_3", "protein_6"],
            vec!["protein_1"],
            vec!["protein_1", "protein_2", "protein_5", "protein_8"],
            vec!["protein_1"],
            vec!["protein_4", "protein_9"],
        ];
        let mut builder = GraphBuilder::default();
        builder.add_file("a.mzid");
        for (i, accessions) in proteins.iter().enumerate() {
            let sequence = format!("PEPTIDE{}K", (b'A' + i as u8) as char);
            builder
                .add_psm(psm(&sequence, accessions, 1, &format!("s{}", i), &[]))
                .unwrap();
        }
        let mut report = Report::new(builder.build());
        report.assemble_peptides();
        report
    }

    fn names(proteins: &[ReportProtein]) -> Vec<String> {
        proteins.iter().map(|p| p.name.clone()).collect()
    }

    #[test]
    fn slim_cover() {
        let report = report();
        let proteins = ProteinInference::Slim.infer(&report.peptides, &report.graph);
        assert_eq!(
            names(&proteins),
            vec!["protein_7", "protein_6", "protein_4,protein_9", "protein_1"]
        );

        let subsets = proteins
            .iter()
            .map(|p| {
                p.subset_accessions
                    .iter()
                    .map(|&ix| report.graph[ix].accession.as_str())
                    .sorted()
                    .join(",")
            })
            .collect::<Vec<_>>();
        assert_eq!(subsets, vec!["", "protein_3", "", "protein_2,protein_5,protein_8"]);

        // Every present peptide is explained by a reported protein
        for peptide in &report.peptides {
            assert!(proteins.iter().any(|p| p.peptides.contains(&peptide.peptide)));
        }
        assert_eq!(proteins[3].peptides.len(), 5);
        assert_eq!(proteins[3].psm_sets.len(), 5);
    }

    #[test]
    fn all_candidates() {
        let report = report();
        let proteins = ProteinInference::All.infer(&report.peptides, &report.graph);
        assert_eq!(proteins.len(), 7);
        assert!(proteins.iter().all(|p| p.subset_accessions.is_empty()));
        assert!(names(&proteins).contains(&"protein_2,protein_8".to_string()));
    }

    #[test]
    fn restricted_evidence() {
        let mut report = report();
        // Drop the peptide shared by protein_3 and protein_6
        report.peptides.retain(|p| p.peptide != PeptideIx(5));
        let proteins = ProteinInference::Slim.infer(&report.peptides, &report.graph);
        let names = names(&proteins);
        assert!(!names.contains(&"protein_3".to_string()));
        assert!(!names.contains(&"protein_6".to_string()));
        let protein = proteins
            .iter()
            .find(|p| p.name == "protein_4,protein_9")
            .unwrap();
        assert_eq!(protein.subset_accessions.len(), 1);
    }
}

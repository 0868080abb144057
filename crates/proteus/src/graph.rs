//! The identification graph: accessions, protein groups, peptides, PSMs and
//! PSM-sets, stored in flat arenas and cross-linked by index.
//!
//! Accession → Group is single-valued (`Accession::group`), Group → Accession
//! is many-valued (`Group::accessions`). Neither side owns the other, so
//! there are no reference cycles: links are resolved through the
//! [`std::ops::Index`] impls on [`IdentGraph`].

use crate::modification::Modification;
use crate::score::ScoreModel;
use crate::Error;
use fnv::FnvHashMap;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::time::Instant;

#[derive(Hash, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[repr(transparent)]
pub struct AccessionIx(pub u32);

#[derive(Hash, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[repr(transparent)]
pub struct GroupIx(pub u32);

#[derive(Hash, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PeptideIx(pub u32);

#[derive(Hash, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PsmIx(pub u32);

#[derive(Hash, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PsmSetIx(pub u32);

/// Input file identifier. Files are numbered from 1, `FileId(0)` is reserved
/// to mean "all files".
#[derive(Hash, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub u32);

impl FileId {
    pub const ALL: FileId = FileId(0);

    pub fn is_all(self) -> bool {
        self == Self::ALL
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Accession {
    pub ix: AccessionIx,
    pub accession: String,
    pub files: BTreeSet<FileId>,
    pub descriptions: BTreeMap<FileId, String>,
    pub sequence: Option<String>,
    pub db_refs: BTreeSet<String>,
    /// Decoy marker carried over from ingestion, if the source provided one
    pub decoy: Option<bool>,
    /// Owning group, set once accessions have been grouped
    pub group: Option<GroupIx>,
    pub peptides: BTreeSet<PeptideIx>,
}

impl Accession {
    fn new(ix: AccessionIx, accession: String) -> Self {
        Self {
            ix,
            accession,
            files: BTreeSet::new(),
            descriptions: BTreeMap::new(),
            sequence: None,
            db_refs: BTreeSet::new(),
            decoy: None,
            group: None,
            peptides: BTreeSet::new(),
        }
    }

    /// Descriptions as seen from `file`. [`FileId::ALL`] merges the
    /// descriptions of every file, each distinct text once.
    pub fn descriptions_in(&self, file: FileId) -> Vec<&str> {
        match file.is_all() {
            true => self
                .descriptions
                .values()
                .map(String::as_str)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            false => self
                .descriptions
                .get(&file)
                .map(|d| vec![d.as_str()])
                .unwrap_or_default(),
        }
    }
}

/// Accessions sharing an identical set of supporting peptides
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Group {
    pub ix: GroupIx,
    pub accessions: BTreeSet<AccessionIx>,
    pub peptides: BTreeSet<PeptideIx>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Peptide {
    pub ix: PeptideIx,
    pub sequence: String,
    /// Modifications by position: 0 is the N-terminus, 1..=len are residues,
    /// len + 1 is the C-terminus
    pub modifications: Vec<(usize, Modification)>,
    pub accessions: BTreeSet<AccessionIx>,
    pub psm_sets: Vec<PsmSetIx>,
}

impl Peptide {
    fn key(sequence: &str, modifications: &[(usize, Modification)]) -> String {
        let mut key = sequence.to_string();
        for (position, m) in modifications {
            let _ = write!(key, "|{}:{}:{}", position, m.residue, m.mass_string());
        }
        key
    }
}

impl std::fmt::Display for Peptide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mods_at = |pos: usize| {
            self.modifications
                .iter()
                .filter(move |(p, _)| *p == pos)
                .map(|(_, m)| m.mass_string())
        };
        let len = self.sequence.chars().count();
        for mass in mods_at(0) {
            write!(f, "[{}]-", mass)?;
        }
        for (idx, residue) in self.sequence.chars().enumerate() {
            f.write_char(residue)?;
            for mass in mods_at(idx + 1) {
                write!(f, "[{}]", mass)?;
            }
        }
        for mass in mods_at(len + 1) {
            write!(f, "-[{}]", mass)?;
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Psm {
    pub ix: PsmIx,
    pub peptide: PeptideIx,
    pub file: FileId,
    /// Spectrum identifier, unique within a file
    pub spectrum: String,
    pub charge: i32,
    /// Rank reported by the search engine
    pub rank: Option<u32>,
    /// Decoy flag reported by the search engine
    pub decoy: Option<bool>,
    /// Excluded from protein score aggregation
    pub non_scoring: bool,
    pub scores: Vec<ScoreModel>,
}

impl Psm {
    pub fn score(&self, name: &str) -> Option<f64> {
        self.scores
            .iter()
            .find(|s| s.name == name && s.is_valid())
            .map(|s| s.value)
    }
}

/// PSMs merged at peptide + charge + file (or spectrum) granularity
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PsmSet {
    pub ix: PsmSetIx,
    pub peptide: PeptideIx,
    pub charge: i32,
    pub files: BTreeSet<FileId>,
    pub psms: Vec<PsmIx>,
    /// At least one member PSM takes part in score aggregation
    pub scoring: bool,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct IdentGraph {
    /// File names, `files[0]` is `FileId(1)`
    pub files: Vec<String>,
    pub accessions: Vec<Accession>,
    pub groups: Vec<Group>,
    pub peptides: Vec<Peptide>,
    pub psms: Vec<Psm>,
    pub psm_sets: Vec<PsmSet>,
}

impl IdentGraph {
    pub fn file_name(&self, file: FileId) -> Option<&str> {
        match file.0 {
            0 => None,
            n => self.files.get(n as usize - 1).map(String::as_str),
        }
    }

    pub fn file_ids(&self) -> impl Iterator<Item = FileId> {
        (1..=self.files.len() as u32).map(FileId)
    }

    pub fn find_accession(&self, accession: &str) -> Option<AccessionIx> {
        self.accessions
            .iter()
            .find(|acc| acc.accession == accession)
            .map(|acc| acc.ix)
    }

    /// Member PSMs of a PSM-set
    pub fn members(&self, set: PsmSetIx) -> impl Iterator<Item = &Psm> + '_ {
        self[set].psms.iter().map(move |&ix| &self[ix])
    }
}

impl std::ops::Index<AccessionIx> for IdentGraph {
    type Output = Accession;

    fn index(&self, index: AccessionIx) -> &Self::Output {
        &self.accessions[index.0 as usize]
    }
}

impl std::ops::Index<GroupIx> for IdentGraph {
    type Output = Group;

    fn index(&self, index: GroupIx) -> &Self::Output {
        &self.groups[index.0 as usize]
    }
}

impl std::ops::Index<PeptideIx> for IdentGraph {
    type Output = Peptide;

    fn index(&self, index: PeptideIx) -> &Self::Output {
        &self.peptides[index.0 as usize]
    }
}

impl std::ops::Index<PsmIx> for IdentGraph {
    type Output = Psm;

    fn index(&self, index: PsmIx) -> &Self::Output {
        &self.psms[index.0 as usize]
    }
}

impl std::ops::Index<PsmSetIx> for IdentGraph {
    type Output = PsmSet;

    fn index(&self, index: PsmSetIx) -> &Self::Output {
        &self.psm_sets[index.0 as usize]
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ModificationInput {
    pub position: usize,
    #[serde(flatten)]
    pub modification: Modification,
}

/// A single PSM as handed over by a search-engine result parser
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PsmInput {
    pub sequence: String,
    #[serde(default)]
    pub modifications: Vec<ModificationInput>,
    pub accessions: Vec<String>,
    pub file: u32,
    pub spectrum: String,
    pub charge: i32,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub decoy: Option<bool>,
    #[serde(default)]
    pub non_scoring: bool,
    /// `null` scores are kept as NaN
    #[serde(default)]
    pub scores: BTreeMap<String, Option<f64>>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct AccessionInput {
    pub accession: String,
    /// Description per file id
    #[serde(default)]
    pub descriptions: BTreeMap<u32, String>,
    #[serde(default)]
    pub sequence: Option<String>,
    #[serde(default)]
    pub db_refs: Vec<String>,
    #[serde(default)]
    pub decoy: Option<bool>,
}

/// Serialized form of an identification graph, as written by the ingestion
/// layer
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct GraphInput {
    pub files: Vec<String>,
    #[serde(default)]
    pub accessions: Vec<AccessionInput>,
    pub psms: Vec<PsmInput>,
}

impl GraphInput {
    pub fn build(self, merge_across_files: bool) -> Result<IdentGraph, Error> {
        let mut builder = GraphBuilder::default().merge_across_files(merge_across_files);
        for file in self.files {
            builder.add_file(file);
        }
        // Once accessions are declared, PSMs may only reference declared ones
        let declared = !self.accessions.is_empty();
        for input in self.accessions {
            builder.add_accession_input(input)?;
        }
        for psm in self.psms {
            if declared {
                if let Some(acc) = psm
                    .accessions
                    .iter()
                    .find(|acc| !builder.accession_map.contains_key(acc.as_str()))
                {
                    return Err(Error::UnknownAccession(acc.clone()));
                }
            }
            builder.add_psm(psm)?;
        }
        Ok(builder.build())
    }
}

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SetScope {
    File(FileId),
    Spectrum(String),
}

#[derive(Default)]
pub struct GraphBuilder {
    files: Vec<String>,
    accessions: Vec<Accession>,
    accession_map: FnvHashMap<String, AccessionIx>,
    peptides: Vec<Peptide>,
    peptide_map: FnvHashMap<String, PeptideIx>,
    psms: Vec<Psm>,
    merge_across_files: bool,
}

impl GraphBuilder {
    /// Merge PSMs of the same spectrum from different files into one set,
    /// instead of keeping one set per file
    pub fn merge_across_files(mut self, merge: bool) -> Self {
        self.merge_across_files = merge;
        self
    }

    pub fn add_file<S: Into<String>>(&mut self, name: S) -> FileId {
        self.files.push(name.into());
        FileId(self.files.len() as u32)
    }

    fn check_file(&self, file: u32) -> Result<FileId, Error> {
        match file >= 1 && file as usize <= self.files.len() {
            true => Ok(FileId(file)),
            false => Err(Error::UnknownFile(file)),
        }
    }

    /// Look up an accession, inserting it if it is new
    pub fn add_accession(&mut self, accession: &str) -> AccessionIx {
        match self.accession_map.get(accession) {
            Some(&ix) => ix,
            None => {
                let ix = AccessionIx(self.accessions.len() as u32);
                self.accessions.push(Accession::new(ix, accession.into()));
                self.accession_map.insert(accession.into(), ix);
                ix
            }
        }
    }

    pub fn describe<S: Into<String>>(
        &mut self,
        accession: AccessionIx,
        file: u32,
        description: S,
    ) -> Result<(), Error> {
        let file = self.check_file(file)?;
        let acc = &mut self.accessions[accession.0 as usize];
        acc.files.insert(file);
        acc.descriptions.insert(file, description.into());
        Ok(())
    }

    pub fn add_accession_input(&mut self, input: AccessionInput) -> Result<AccessionIx, Error> {
        let ix = self.add_accession(&input.accession);
        for (file, description) in input.descriptions {
            self.describe(ix, file, description)?;
        }
        let acc = &mut self.accessions[ix.0 as usize];
        if input.sequence.is_some() {
            acc.sequence = input.sequence;
        }
        acc.db_refs.extend(input.db_refs);
        if input.decoy.is_some() {
            acc.decoy = input.decoy;
        }
        Ok(ix)
    }

    fn add_peptide(&mut self, sequence: String, mut modifications: Vec<(usize, Modification)>) -> PeptideIx {
        modifications.sort_by_key(|(position, _)| *position);
        let key = Peptide::key(&sequence, &modifications);
        match self.peptide_map.get(&key) {
            Some(&ix) => ix,
            None => {
                let ix = PeptideIx(self.peptides.len() as u32);
                self.peptides.push(Peptide {
                    ix,
                    sequence,
                    modifications,
                    accessions: BTreeSet::new(),
                    psm_sets: Vec::new(),
                });
                self.peptide_map.insert(key, ix);
                ix
            }
        }
    }

    pub fn add_psm(&mut self, input: PsmInput) -> Result<PsmIx, Error> {
        let file = self.check_file(input.file)?;
        if input.accessions.is_empty() {
            return Err(Error::MissingAccessions(input.spectrum));
        }
        let len = input.sequence.chars().count();
        if let Some(m) = input.modifications.iter().find(|m| m.position > len + 1) {
            return Err(Error::ModificationPosition {
                sequence: input.sequence,
                position: m.position,
            });
        }

        let modifications = input
            .modifications
            .into_iter()
            .map(|m| (m.position, m.modification))
            .collect();
        let peptide = self.add_peptide(input.sequence, modifications);

        for accession in &input.accessions {
            let ix = self.add_accession(accession);
            let acc = &mut self.accessions[ix.0 as usize];
            acc.files.insert(file);
            acc.peptides.insert(peptide);
            self.peptides[peptide.0 as usize].accessions.insert(ix);
        }

        let ix = PsmIx(self.psms.len() as u32);
        self.psms.push(Psm {
            ix,
            peptide,
            file,
            spectrum: input.spectrum,
            charge: input.charge,
            rank: input.rank,
            decoy: input.decoy,
            non_scoring: input.non_scoring,
            scores: input
                .scores
                .into_iter()
                .map(|(name, value)| ScoreModel::new(name, value.unwrap_or(f64::NAN)))
                .collect(),
        });
        Ok(ix)
    }

    /// Merge PSMs into PSM-sets and cluster accessions into groups
    pub fn build(mut self) -> IdentGraph {
        let time = Instant::now();

        let mut sets: BTreeMap<(PeptideIx, i32, SetScope), Vec<PsmIx>> = BTreeMap::new();
        for psm in &self.psms {
            let scope = match self.merge_across_files {
                true => SetScope::Spectrum(psm.spectrum.clone()),
                false => SetScope::File(psm.file),
            };
            sets.entry((psm.peptide, psm.charge, scope))
                .or_default()
                .push(psm.ix);
        }

        let mut psm_sets = Vec::with_capacity(sets.len());
        for ((peptide, charge, _), psms) in sets {
            let ix = PsmSetIx(psm_sets.len() as u32);
            let members = psms.iter().map(|p| &self.psms[p.0 as usize]);
            psm_sets.push(PsmSet {
                ix,
                peptide,
                charge,
                files: members.clone().map(|p| p.file).collect(),
                scoring: members.clone().any(|p| !p.non_scoring),
                psms,
            });
            self.peptides[peptide.0 as usize].psm_sets.push(ix);
        }

        let mut clusters: BTreeMap<&BTreeSet<PeptideIx>, Vec<AccessionIx>> = BTreeMap::new();
        for acc in self.accessions.iter().filter(|acc| !acc.peptides.is_empty()) {
            clusters.entry(&acc.peptides).or_default().push(acc.ix);
        }
        let groups = clusters
            .into_iter()
            .enumerate()
            .map(|(i, (peptides, accessions))| Group {
                ix: GroupIx(i as u32),
                accessions: accessions.into_iter().collect(),
                peptides: peptides.clone(),
            })
            .collect::<Vec<_>>();
        for group in &groups {
            for acc in &group.accessions {
                self.accessions[acc.0 as usize].group = Some(group.ix);
            }
        }

        info!(
            "built identification graph: {} files, {} accessions in {} groups, {} peptides, {} PSMs in {} sets ({}ms)",
            self.files.len(),
            self.accessions.len(),
            groups.len(),
            self.peptides.len(),
            self.psms.len(),
            psm_sets.len(),
            time.elapsed().as_millis()
        );

        IdentGraph {
            files: self.files,
            accessions: self.accessions,
            groups,
            peptides: self.peptides,
            psms: self.psms,
            psm_sets,
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub(crate) fn psm(
        sequence: &str,
        accessions: &[&str],
        file: u32,
        spectrum: &str,
        scores: &[(&str, f64)],
    ) -> PsmInput {
        PsmInput {
            sequence: sequence.into(),
            accessions: accessions.iter().map(|s| s.to_string()).collect(),
            file,
            spectrum: spectrum.into(),
            charge: 2,
            scores: scores
                .iter()
                .map(|(name, value)| (name.to_string(), Some(*value)))
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn groups_share_evidence() {
        let mut builder = GraphBuilder::default();
        builder.add_file("a.mzid");
        builder.add_psm(psm("PEPTIDE", &["P1", "P2"], 1, "s1", &[])).unwrap();
        builder.add_psm(psm("ELVISK", &["P1", "P2"], 1, "s2", &[])).unwrap();
        builder.add_psm(psm("ELVISK", &["P3", "P1", "P2"], 1, "s3", &[])).unwrap();
        let graph = builder.build();

        assert_eq!(graph.peptides.len(), 2);
        assert_eq!(graph.groups.len(), 2);
        let p1 = graph.find_accession("P1").unwrap();
        let p2 = graph.find_accession("P2").unwrap();
        let p3 = graph.find_accession("P3").unwrap();
        assert_eq!(graph[p1].group, graph[p2].group);
        assert_ne!(graph[p1].group, graph[p3].group);

        // Exclusive membership: every accession in exactly one group
        for acc in &graph.accessions {
            let owners = graph
                .groups
                .iter()
                .filter(|g| g.accessions.contains(&acc.ix))
                .count();
            assert_eq!(owners, 1);
            assert!(graph[acc.group.unwrap()].accessions.contains(&acc.ix));
        }
        assert_eq!(graph[graph[p1].group.unwrap()].peptides.len(), 2);
        assert_eq!(graph[graph[p3].group.unwrap()].peptides.len(), 1);
    }

    #[test]
    fn psm_sets_by_file() {
        let mut builder = GraphBuilder::default();
        builder.add_file("a.mzid");
        builder.add_file("b.mzid");
        builder.add_psm(psm("PEPTIDE", &["P1"], 1, "s1", &[])).unwrap();
        builder.add_psm(psm("PEPTIDE", &["P1"], 1, "s2", &[])).unwrap();
        builder.add_psm(psm("PEPTIDE", &["P1"], 2, "s1", &[])).unwrap();
        let graph = builder.build();
        assert_eq!(graph.psm_sets.len(), 2);
        assert_eq!(graph.psm_sets[0].psms.len(), 2);
        assert_eq!(graph[graph.find_accession("P1").unwrap()].files.len(), 2);

        let mut builder = GraphBuilder::default().merge_across_files(true);
        builder.add_file("a.mzid");
        builder.add_file("b.mzid");
        builder.add_psm(psm("PEPTIDE", &["P1"], 1, "s1", &[])).unwrap();
        builder.add_psm(psm("PEPTIDE", &["P1"], 1, "s2", &[])).unwrap();
        builder.add_psm(psm("PEPTIDE", &["P1"], 2, "s1", &[])).unwrap();
        let graph = builder.build();
        assert_eq!(graph.psm_sets.len(), 2);
        let merged = graph.psm_sets.iter().find(|s| s.psms.len() == 2).unwrap();
        assert_eq!(merged.files.len(), 2);
    }

    #[test]
    fn modified_peptides_are_distinct() {
        let mut builder = GraphBuilder::default();
        builder.add_file("a.mzid");
        let mut input = psm("PEPMTIDE", &["P1"], 1, "s1", &[]);
        input.modifications.push(ModificationInput {
            position: 4,
            modification: Modification::new('M', 15.994915, "Oxidation"),
        });
        builder.add_psm(input).unwrap();
        builder.add_psm(psm("PEPMTIDE", &["P1"], 1, "s2", &[])).unwrap();
        let graph = builder.build();
        assert_eq!(graph.peptides.len(), 2);
        assert_eq!(graph.peptides[0].to_string(), "PEPM[15.9949]TIDE");
        assert_eq!(graph.peptides[1].to_string(), "PEPMTIDE");
    }

    #[test]
    fn structural_errors() {
        let mut builder = GraphBuilder::default();
        builder.add_file("a.mzid");
        assert!(matches!(
            builder.add_psm(psm("PEPTIDE", &["P1"], 2, "s1", &[])),
            Err(Error::UnknownFile(2))
        ));
        assert!(matches!(
            builder.add_psm(psm("PEPTIDE", &[], 1, "s1", &[])),
            Err(Error::MissingAccessions(_))
        ));
        let mut input = psm("PEPTIDE", &["P1"], 1, "s1", &[]);
        input.modifications.push(ModificationInput {
            position: 12,
            modification: Modification::new('C', 57.021464, "Carbamidomethyl"),
        });
        assert!(matches!(
            builder.add_psm(input),
            Err(Error::ModificationPosition { position: 12, .. })
        ));
    }

    #[test]
    fn descriptions_per_file() {
        let input: GraphInput = serde_json::from_str(
            r#"{
                "files": ["a.mzid", "b.mzid", "c.mzid"],
                "accessions": [
                    {"accession": "P1", "descriptions": {"1": "Actin", "2": "Actin, cytoplasmic", "3": "Actin"}}
                ],
                "psms": [
                    {"sequence": "PEPTIDE", "accessions": ["P1"], "file": 1, "spectrum": "s1", "charge": 2,
                     "scores": {"mascot_score": 41.5, "xtandem_expect": null}}
                ]
            }"#,
        )
        .unwrap();
        let graph = input.build(false).unwrap();
        let acc = &graph[graph.find_accession("P1").unwrap()];
        assert_eq!(acc.descriptions_in(FileId::ALL), vec!["Actin", "Actin, cytoplasmic"]);
        assert_eq!(acc.descriptions_in(FileId(2)), vec!["Actin, cytoplasmic"]);
        assert!(acc.descriptions_in(FileId(7)).is_empty());
        assert_eq!(acc.files.len(), 3);

        let psm = &graph.psms[0];
        assert_eq!(psm.score("mascot_score"), Some(41.5));
        let undeclared: GraphInput = serde_json::from_str(
            r#"{
                "files": ["a.mzid"],
                "accessions": [{"accession": "P1"}],
                "psms": [{"sequence": "PEPTIDE", "accessions": ["P2"], "file": 1, "spectrum": "s1", "charge": 2}]
            }"#,
        )
        .unwrap();
        assert!(matches!(undeclared.build(false), Err(Error::UnknownAccession(_))));
        assert_eq!(psm.score("xtandem_expect"), None);
        assert!(psm.scores.iter().any(|s| s.name == "xtandem_expect" && s.value.is_nan()));
    }
}

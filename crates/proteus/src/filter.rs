//! A small predicate language over report rows.
//!
//! A [`Filter`] extracts a value from a row ([`Filterable::filter_value`]),
//! compares it to a configured value and optionally negates the result.
//! Filters that cannot be applied to a row (the key does not support the
//! row's entity kind, or the row has no such value) are skipped, i.e. they
//! accept the row. Filter lists are AND-composed.

use crate::graph::{FileId, IdentGraph};
use crate::Error;
use log::{info, warn};
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Instant;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Psm,
    Peptide,
    Protein,
}

impl Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Entity::Psm => "PSM",
            Entity::Peptide => "peptide",
            Entity::Protein => "protein",
        })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Numerical,
    Literal,
    LiteralList,
    Boolean,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Boolean(bool),
    Numerical(f64),
    Literal(String),
    LiteralList(Vec<String>),
}

impl FilterValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            FilterValue::Boolean(_) => ValueType::Boolean,
            FilterValue::Numerical(_) => ValueType::Numerical,
            FilterValue::Literal(_) => ValueType::Literal,
            FilterValue::LiteralList(_) => ValueType::LiteralList,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Equal,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Contains,
    Regex,
}

impl Comparison {
    pub fn valid_for(self, value_type: ValueType) -> bool {
        match value_type {
            ValueType::Numerical => !matches!(self, Comparison::Contains | Comparison::Regex),
            ValueType::Literal => {
                matches!(self, Comparison::Equal | Comparison::Contains | Comparison::Regex)
            }
            ValueType::LiteralList => matches!(self, Comparison::Contains | Comparison::Regex),
            ValueType::Boolean => self == Comparison::Equal,
        }
    }
}

impl Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Comparison::Equal => "equal",
            Comparison::Less => "less",
            Comparison::LessEqual => "less_equal",
            Comparison::Greater => "greater",
            Comparison::GreaterEqual => "greater_equal",
            Comparison::Contains => "contains",
            Comparison::Regex => "regex",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FilterKey {
    Charge,
    Rank,
    Decoy,
    QValue,
    Fdr,
    FdrScore,
    Sequence,
    Modifications,
    Accessions,
    Description,
    NrPsms,
    NrSpectra,
    NrPeptides,
    NrAccessions,
    Unique,
    Score(String),
}

impl FilterKey {
    pub fn short_name(&self) -> String {
        match self {
            FilterKey::Charge => "charge".into(),
            FilterKey::Rank => "rank".into(),
            FilterKey::Decoy => "decoy".into(),
            FilterKey::QValue => "q_value".into(),
            FilterKey::Fdr => "fdr".into(),
            FilterKey::FdrScore => "fdr_score".into(),
            FilterKey::Sequence => "sequence".into(),
            FilterKey::Modifications => "modifications".into(),
            FilterKey::Accessions => "accessions".into(),
            FilterKey::Description => "description".into(),
            FilterKey::NrPsms => "nr_psms".into(),
            FilterKey::NrSpectra => "nr_spectra".into(),
            FilterKey::NrPeptides => "nr_peptides".into(),
            FilterKey::NrAccessions => "nr_accessions".into(),
            FilterKey::Unique => "unique".into(),
            FilterKey::Score(name) => format!("score:{}", name),
        }
    }

    pub fn label(&self) -> String {
        match self {
            FilterKey::Charge => "Charge".into(),
            FilterKey::Rank => "Rank".into(),
            FilterKey::Decoy => "Decoy".into(),
            FilterKey::QValue => "q-value".into(),
            FilterKey::Fdr => "FDR".into(),
            FilterKey::FdrScore => "FDR score".into(),
            FilterKey::Sequence => "Sequence".into(),
            FilterKey::Modifications => "Modifications".into(),
            FilterKey::Accessions => "Accessions".into(),
            FilterKey::Description => "Description".into(),
            FilterKey::NrPsms => "#PSMs".into(),
            FilterKey::NrSpectra => "#Spectra".into(),
            FilterKey::NrPeptides => "#Peptides".into(),
            FilterKey::NrAccessions => "#Accessions".into(),
            FilterKey::Unique => "Unique".into(),
            FilterKey::Score(name) => format!("Score ({})", name),
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            FilterKey::Decoy | FilterKey::Unique => ValueType::Boolean,
            FilterKey::Sequence => ValueType::Literal,
            FilterKey::Modifications | FilterKey::Accessions | FilterKey::Description => {
                ValueType::LiteralList
            }
            _ => ValueType::Numerical,
        }
    }

    pub fn supports(&self, entity: Entity) -> bool {
        match self {
            FilterKey::Charge => entity == Entity::Psm,
            FilterKey::Sequence | FilterKey::Modifications | FilterKey::Unique => {
                entity != Entity::Protein
            }
            FilterKey::NrPeptides => entity == Entity::Protein,
            _ => true,
        }
    }

    /// Values of file-scoped keys can be restricted to a single input file
    pub fn file_scoped(&self) -> bool {
        matches!(
            self,
            FilterKey::Description | FilterKey::NrPsms | FilterKey::NrSpectra
        )
    }
}

impl FromStr for FilterKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "charge" => FilterKey::Charge,
            "rank" => FilterKey::Rank,
            "decoy" => FilterKey::Decoy,
            "q_value" => FilterKey::QValue,
            "fdr" => FilterKey::Fdr,
            "fdr_score" => FilterKey::FdrScore,
            "sequence" => FilterKey::Sequence,
            "modifications" => FilterKey::Modifications,
            "accessions" => FilterKey::Accessions,
            "description" => FilterKey::Description,
            "nr_psms" => FilterKey::NrPsms,
            "nr_spectra" => FilterKey::NrSpectra,
            "nr_peptides" => FilterKey::NrPeptides,
            "nr_accessions" => FilterKey::NrAccessions,
            "unique" => FilterKey::Unique,
            _ => match s.strip_prefix("score:") {
                Some(name) if !name.is_empty() => FilterKey::Score(name.into()),
                _ => return Err(Error::UnknownFilter(s.into())),
            },
        })
    }
}

impl Display for FilterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.short_name())
    }
}

/// A report row a [`Filter`] can be applied to
pub trait Filterable {
    const ENTITY: Entity;

    /// Extract the value behind `key`, refined to `file` for file-scoped
    /// keys. `None` if the row carries no such value.
    fn filter_value(&self, key: &FilterKey, file: FileId, graph: &IdentGraph) -> Option<FilterValue>;
}

/// Serialized form of a filter, as found in parameter files
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub key: String,
    pub comparison: Comparison,
    pub value: FilterValue,
    #[serde(default)]
    pub negate: bool,
    /// Restrict file-scoped filters to one file, 0 meaning all files
    #[serde(default)]
    pub file: u32,
}

#[derive(Clone, Debug)]
pub struct Filter {
    pub key: FilterKey,
    pub comparison: Comparison,
    pub value: FilterValue,
    regex: Option<Regex>,
    pub negate: bool,
    pub file: FileId,
}

impl TryFrom<FilterSpec> for Filter {
    type Error = Error;

    fn try_from(spec: FilterSpec) -> Result<Self, Self::Error> {
        let key = spec.key.parse::<FilterKey>()?;
        let value_type = key.value_type();
        if !spec.comparison.valid_for(value_type) {
            return Err(Error::InvalidComparison {
                key: key.short_name(),
                comparison: spec.comparison.to_string(),
            });
        }

        // Lists are compared against a single literal
        let expected = match (value_type, spec.comparison) {
            (ValueType::LiteralList, _) | (_, Comparison::Regex) => ValueType::Literal,
            (value_type, _) => value_type,
        };
        if spec.value.value_type() != expected {
            return Err(Error::InvalidFilterValue {
                key: key.short_name(),
                expected: format!("{:?}", expected).to_lowercase(),
            });
        }

        let regex = match (&spec.comparison, &spec.value) {
            (Comparison::Regex, FilterValue::Literal(pattern)) => Some(Regex::new(pattern)?),
            _ => None,
        };

        if spec.file != 0 && !key.file_scoped() {
            warn!("filter `{}` is not file-scoped, ignoring file {}", key, spec.file);
        }

        Ok(Filter {
            file: match key.file_scoped() {
                true => FileId(spec.file),
                false => FileId::ALL,
            },
            key,
            comparison: spec.comparison,
            value: spec.value,
            regex,
            negate: spec.negate,
        })
    }
}

impl Filter {
    pub fn new(key: FilterKey, comparison: Comparison, value: FilterValue) -> Result<Self, Error> {
        Filter::try_from(FilterSpec {
            key: key.short_name(),
            comparison,
            value,
            negate: false,
            file: 0,
        })
    }

    pub fn negate(mut self, negate: bool) -> Self {
        self.negate = negate;
        self
    }

    pub fn in_file(mut self, file: FileId) -> Self {
        if self.key.file_scoped() {
            self.file = file;
        }
        self
    }

    fn compare_literal(&self, value: &str) -> bool {
        match (&self.comparison, &self.value, &self.regex) {
            (Comparison::Regex, _, Some(regex)) => regex.is_match(value),
            (Comparison::Equal, FilterValue::Literal(s), _) => value == s,
            (Comparison::Contains, FilterValue::Literal(s), _) => value.contains(s.as_str()),
            _ => false,
        }
    }

    /// Compare a row value, without applying negation. `None` if the
    /// comparison is undefined for this value.
    fn compare(&self, value: &FilterValue) -> Option<bool> {
        match (value, &self.value) {
            (FilterValue::Numerical(x), FilterValue::Numerical(t)) => {
                let (x, t) = (*x, *t);
                Some(match self.comparison {
                    Comparison::Equal => x == t,
                    Comparison::Less => x < t,
                    Comparison::LessEqual => x <= t,
                    Comparison::Greater => x > t,
                    Comparison::GreaterEqual => x >= t,
                    _ => return None,
                })
            }
            (FilterValue::Boolean(x), FilterValue::Boolean(t)) => match self.comparison {
                Comparison::Equal => Some(x == t),
                _ => None,
            },
            (FilterValue::Literal(x), _) => Some(self.compare_literal(x)),
            (FilterValue::LiteralList(xs), _) => match self.comparison {
                Comparison::Contains | Comparison::Regex => {
                    Some(xs.iter().any(|x| self.compare_literal(x)))
                }
                _ => None,
            },
            _ => None,
        }
    }

    /// `None` if this filter does not apply to `row`
    pub fn evaluate<T: Filterable>(&self, row: &T, graph: &IdentGraph) -> Option<bool> {
        if !self.key.supports(T::ENTITY) {
            return None;
        }
        let value = row.filter_value(&self.key, self.file, graph)?;
        self.compare(&value).map(|pass| pass != self.negate)
    }

    pub fn accepts<T: Filterable>(&self, row: &T, graph: &IdentGraph) -> bool {
        self.evaluate(row, graph).unwrap_or(true)
    }
}

impl Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.negate {
            f.write_str("not ")?;
        }
        write!(f, "{} {} {:?}", self.key, self.comparison, self.value)?;
        if !self.file.is_all() {
            write!(f, " in file {}", self.file)?;
        }
        Ok(())
    }
}

pub fn parse_filters(specs: Vec<FilterSpec>) -> Result<Vec<Filter>, Error> {
    specs.into_iter().map(Filter::try_from).collect()
}

/// Names of the `score:<name>` filters that no row carries a value for
pub fn unresolved_scores<'a, T: Filterable + Sync>(
    rows: &[T],
    filters: &'a [Filter],
    graph: &IdentGraph,
) -> Vec<&'a str> {
    filters
        .iter()
        .filter_map(|filter| match &filter.key {
            FilterKey::Score(name) => Some((filter, name.as_str())),
            _ => None,
        })
        .filter(|(filter, _)| {
            !rows
                .par_iter()
                .any(|row| row.filter_value(&filter.key, filter.file, graph).is_some())
        })
        .map(|(_, name)| name)
        .collect()
}

/// Keep the rows accepted by every filter, preserving their order
pub fn apply_filters<T: Filterable + Send + Sync>(rows: Vec<T>, filters: &[Filter], graph: &IdentGraph) -> Vec<T> {
    if filters.is_empty() {
        return rows;
    }
    let time = Instant::now();
    if !rows.is_empty() {
        for name in unresolved_scores(&rows, filters, graph) {
            warn!(
                "score `{}` does not exist in the current dataset, its {} filter is skipped",
                name,
                T::ENTITY
            );
        }
    }
    let before = rows.len();
    let rows = rows
        .into_par_iter()
        .filter(|row| filters.iter().all(|filter| filter.accepts(row, graph)))
        .collect::<Vec<_>>();

    if before > 0 && rows.is_empty() {
        warn!(
            "no {} passed the filters: {}",
            T::ENTITY,
            filters.iter().map(|f| f.to_string()).collect::<Vec<_>>().join(", ")
        );
    }
    info!(
        "filtered {} rows: {}/{} kept ({}ms)",
        T::ENTITY,
        rows.len(),
        before,
        time.elapsed().as_millis()
    );
    rows
}

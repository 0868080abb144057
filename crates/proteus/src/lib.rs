pub mod compare;
pub mod fdr;
pub mod filter;
pub mod graph;
pub mod inference;
pub mod modification;
pub mod rank;
pub mod report;
pub mod score;
pub mod scoring;
pub mod view;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("unknown file id {0}, files are numbered from 1")]
    UnknownFile(u32),
    #[error("accession `{0}` is not declared")]
    UnknownAccession(String),
    #[error("PSM for spectrum `{0}` has no accessions")]
    MissingAccessions(String),
    #[error("modification at position {position} is outside of peptide `{sequence}`")]
    ModificationPosition { sequence: String, position: usize },
    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
    #[error("unknown filter `{0}`")]
    UnknownFilter(String),
    #[error("filter `{key}` does not support comparison `{comparison}`")]
    InvalidComparison { key: String, comparison: String },
    #[error("filter `{key}` expects a {expected} value")]
    InvalidFilterValue { key: String, expected: String },
}

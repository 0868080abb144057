use anyhow::{ensure, Context};
use clap::ArgMatches;
use proteus_core::{
    fdr::DecoyConfig,
    filter::{parse_filters, Filter, FilterSpec},
    inference::ProteinInference,
    score::PSM_COMBINED_FDR_SCORE,
    scoring::{PsmMode, Scoring, ScoringMethod},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Serialize)]
/// Actual report parameters - may include overrides or default values not set by user
pub struct Settings {
    pub version: String,
    pub input: String,
    pub merge_across_files: bool,
    pub decoys: DecoyConfig,
    pub fdr_threshold: f64,
    pub decoy_ratio: f64,
    pub psm: LevelSettings,
    pub peptide: LevelSettings,
    pub protein: ProteinSettings,
    pub output_paths: Vec<String>,

    #[serde(skip_serializing)]
    pub output_directory: PathBuf,
}

#[derive(Serialize)]
/// FDR score, sort order and filters of the PSM or peptide level
pub struct LevelSettings {
    pub score: String,
    pub higher_better: Option<bool>,
    pub sort: Option<String>,
    pub filters: Vec<FilterSpec>,

    #[serde(skip_serializing)]
    pub parsed_filters: Vec<Filter>,
}

#[derive(Serialize)]
pub struct ProteinSettings {
    pub inference: ProteinInference,
    pub scoring: ScoringMethod,
    pub psm_mode: PsmMode,
    /// PSM score the protein score is aggregated from
    pub score: String,
    pub set_level_scores: Vec<String>,
    pub sort: Option<String>,
    pub filters: Vec<FilterSpec>,

    #[serde(skip_serializing)]
    pub parsed_filters: Vec<Filter>,
}

impl ProteinSettings {
    pub fn scoring(&self) -> Scoring {
        Scoring::new(self.scoring, self.psm_mode, self.score.as_str())
            .with_set_level_scores(self.set_level_scores.clone())
    }
}

#[derive(Deserialize, Default)]
/// Input report parameters deserialized from JSON file
pub struct Input {
    pub input: Option<String>,
    pub output_directory: Option<String>,
    pub merge_across_files: Option<bool>,
    pub decoys: Option<DecoyConfig>,
    pub fdr_threshold: Option<f64>,
    pub decoy_ratio: Option<f64>,
    pub psm: Option<LevelOptions>,
    pub peptide: Option<LevelOptions>,
    pub protein: Option<ProteinOptions>,
}

#[derive(Deserialize, Default)]
pub struct LevelOptions {
    pub score: Option<String>,
    pub higher_better: Option<bool>,
    pub sort: Option<String>,
    pub filters: Option<Vec<FilterSpec>>,
}

impl LevelOptions {
    fn build(self, level: &str, default_score: Option<&str>) -> anyhow::Result<LevelSettings> {
        let score = match (self.score, default_score) {
            (Some(score), _) => score,
            (None, Some(score)) => score.into(),
            (None, None) => anyhow::bail!(
                "`{level}.score` must be set to the search engine score used for FDR estimation"
            ),
        };
        let filters = self.filters.unwrap_or_default();
        let parsed_filters = parse_filters(filters.clone())
            .with_context(|| format!("Invalid filter in `{level}.filters`"))?;
        Ok(LevelSettings {
            score,
            higher_better: self.higher_better,
            sort: self.sort,
            filters,
            parsed_filters,
        })
    }
}

#[derive(Deserialize, Default)]
pub struct ProteinOptions {
    pub inference: Option<ProteinInference>,
    pub scoring: Option<ScoringMethod>,
    pub psm_mode: Option<PsmMode>,
    pub score: Option<String>,
    pub set_level_scores: Option<Vec<String>>,
    pub sort: Option<String>,
    pub filters: Option<Vec<FilterSpec>>,
}

impl ProteinOptions {
    fn build(self) -> anyhow::Result<ProteinSettings> {
        let filters = self.filters.unwrap_or_default();
        let parsed_filters =
            parse_filters(filters.clone()).context("Invalid filter in `protein.filters`")?;
        Ok(ProteinSettings {
            inference: self.inference.unwrap_or_default(),
            scoring: self.scoring.unwrap_or_default(),
            psm_mode: self.psm_mode.unwrap_or_default(),
            score: self.score.unwrap_or_else(|| PSM_COMBINED_FDR_SCORE.into()),
            set_level_scores: self
                .set_level_scores
                .unwrap_or_else(|| vec![PSM_COMBINED_FDR_SCORE.into()]),
            sort: self.sort,
            filters,
            parsed_filters,
        })
    }
}

impl Input {
    pub fn from_arguments(matches: ArgMatches) -> anyhow::Result<Self> {
        let path = matches
            .get_one::<String>("parameters")
            .context("`parameters` must be provided")?;
        let mut input = Input::load(path)
            .with_context(|| format!("Failed to read parameters from `{path}`"))?;

        // Handle JSON configuration overrides
        if let Some(output_directory) = matches.get_one::<String>("output_directory") {
            log::trace!("overriding `output_directory` parameter.");
            input.output_directory = Some(output_directory.into());
        }
        if let Some(path) = matches.get_one::<String>("input") {
            log::trace!("overriding `input` parameter.");
            input.input = Some(path.into());
        }
        if let Some(threshold) = matches.get_one::<f64>("fdr-threshold").copied() {
            log::trace!("overriding `fdr_threshold` parameter.");
            input.fdr_threshold = Some(threshold);
        }
        if matches.get_flag("merge-across-files") {
            log::trace!("overriding `merge_across_files` parameter.");
            input.merge_across_files = Some(true);
        }

        ensure!(
            input.input.is_some(),
            "`input` must be set. For more information try '--help'"
        );

        Ok(input)
    }

    pub fn load<S: AsRef<str>>(path: S) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        let input = serde_json::from_reader(std::io::BufReader::new(file))?;
        Ok(input)
    }

    pub fn build(self) -> anyhow::Result<Settings> {
        let input = self
            .input
            .context("`input` must be set. For more information try '--help'")?;

        // Fail on an invalid decoy pattern now rather than after loading the input
        let decoys = self.decoys.unwrap_or_default();
        decoys.build().context("Invalid `decoys` configuration")?;

        let fdr_threshold = self.fdr_threshold.unwrap_or(0.01);
        if !(fdr_threshold > 0.0 && fdr_threshold <= 1.0) {
            log::warn!(
                "`fdr_threshold` of {} is outside of (0, 1], no row will be reported as passing",
                fdr_threshold
            );
        }
        let decoy_ratio = self.decoy_ratio.unwrap_or(1.0);
        if decoy_ratio <= 0.0 {
            log::warn!("`decoy_ratio` of {} should be positive", decoy_ratio);
        }

        let psm = self.psm.unwrap_or_default().build("psm", None)?;
        let peptide = self
            .peptide
            .unwrap_or_default()
            .build("peptide", Some(PSM_COMBINED_FDR_SCORE))?;
        let protein = self.protein.unwrap_or_default().build()?;

        let output_directory = match self.output_directory {
            Some(path) => {
                let path = PathBuf::from(path);
                std::fs::create_dir_all(&path).with_context(|| {
                    format!("Failed to create output directory `{}`", path.display())
                })?;
                path
            }
            None => std::env::current_dir()?,
        };

        Ok(Settings {
            version: clap::crate_version!().into(),
            input,
            merge_across_files: self.merge_across_files.unwrap_or(false),
            decoys,
            fdr_threshold,
            decoy_ratio,
            psm,
            peptide,
            protein,
            output_paths: Vec::new(),
            output_directory,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(json: &str) -> Input {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn defaults() {
        let settings = parse(r#"{"input": "exp.json", "psm": {"score": "mascot_score"}}"#)
            .build()
            .unwrap();
        assert_eq!(settings.fdr_threshold, 0.01);
        assert_eq!(settings.decoy_ratio, 1.0);
        assert!(!settings.merge_across_files);
        assert_eq!(settings.psm.score, "mascot_score");
        assert_eq!(settings.peptide.score, PSM_COMBINED_FDR_SCORE);
        assert_eq!(settings.protein.score, PSM_COMBINED_FDR_SCORE);
        assert_eq!(settings.protein.inference, ProteinInference::Slim);
        assert_eq!(settings.protein.scoring, ScoringMethod::GeometricMean);
        assert_eq!(settings.protein.psm_mode, PsmMode::OnlyBest);
        assert!(settings.psm.parsed_filters.is_empty());
    }

    #[test]
    fn invalid_parameters() {
        // Missing PSM score
        assert!(parse(r#"{"input": "exp.json"}"#).build().is_err());
        assert!(parse(r#"{"psm": {"score": "x"}}"#).build().is_err());

        let bad_filter = r#"{
            "input": "exp.json",
            "psm": {
                "score": "x",
                "filters": [{"key": "charge", "comparison": "contains", "value": 2}]
            }
        }"#;
        assert!(parse(bad_filter).build().is_err());

        let bad_regex = r#"{
            "input": "exp.json",
            "psm": {"score": "x"},
            "decoys": {"strategy": "accession_pattern", "pattern": "(DECOY"}
        }"#;
        assert!(parse(bad_regex).build().is_err());
    }

    #[test]
    fn serialized_settings() {
        let settings = parse(
            r#"{
                "input": "exp.json",
                "psm": {"score": "mascot_score"},
                "protein": {
                    "scoring": "additive",
                    "filters": [{"key": "nr_peptides", "comparison": "greater_equal", "value": 2}]
                }
            }"#,
        )
        .build()
        .unwrap();
        assert_eq!(settings.protein.parsed_filters.len(), 1);

        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["protein"]["scoring"], "additive");
        assert_eq!(json["protein"]["filters"][0]["key"], "nr_peptides");
        assert!(json.get("output_directory").is_none());
    }
}

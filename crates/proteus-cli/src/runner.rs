use crate::input::Settings;
use anyhow::Context;
use log::info;
use proteus_core::{
    compare::{CompareScore, SortRegistry},
    fdr::{FdrEstimator, FdrRow, FdrSummary},
    graph::{GraphInput, IdentGraph},
    rank::{rank_by_score, Rankable},
    report::{peptide_orders, protein_orders, psm_orders, Report},
    score::PROTEIN_SCORE,
};
use serde::Serialize;
use std::time::Instant;

pub struct Runner {
    pub parameters: Settings,
    start: Instant,
}

/// Rows reported at each level, and how many of them pass the FDR threshold
#[derive(Serialize, Default, Debug)]
pub struct Summary {
    pub psms: FdrSummary,
    pub peptides: FdrSummary,
    pub proteins: FdrSummary,
}

#[derive(Serialize)]
struct Results<'a> {
    #[serde(flatten)]
    parameters: &'a Settings,
    summary: &'a Summary,
}

impl Runner {
    pub fn new(parameters: Settings) -> Self {
        Self {
            parameters,
            start: Instant::now(),
        }
    }

    /// Load the identification graph named in the parameters
    pub fn load(&self) -> anyhow::Result<Report> {
        let path = &self.parameters.input;
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open identifications `{path}`"))?;
        let input: GraphInput = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("Failed to parse identifications `{path}`"))?;
        let graph = input
            .build(self.parameters.merge_across_files)
            .with_context(|| format!("Invalid identifications in `{path}`"))?;
        Ok(Report::new(graph))
    }

    fn estimator(&self) -> anyhow::Result<FdrEstimator> {
        Ok(FdrEstimator::new(self.parameters.decoys.build()?)
            .threshold(self.parameters.fdr_threshold)
            .decoy_ratio(self.parameters.decoy_ratio))
    }

    /// Decoys, FDR, ranks: the steps shared by every level
    fn control<T>(
        estimator: &FdrEstimator,
        graph: &IdentGraph,
        rows: &mut [T],
        score: &str,
        higher_better: Option<bool>,
    ) -> FdrSummary
    where
        T: FdrRow + Rankable + Send,
    {
        estimator.assign_decoys(rows, graph);
        let summary = estimator.calculate(rows, score, higher_better);
        rank_by_score(rows, score, higher_better);
        summary
    }

    fn sort<T>(registry: SortRegistry<T>, key: Option<&str>, rows: &mut [T])
    where
        T: CompareScore + Send + 'static,
    {
        if let Some(key) = key {
            registry.sort(key, rows);
        }
    }

    /// Run the whole pipeline on an already loaded report
    pub fn process(&self, report: &mut Report) -> anyhow::Result<Summary> {
        let estimator = self.estimator()?;
        let parameters = &self.parameters;
        let mut summary = Summary::default();

        let psm = &parameters.psm;
        summary.psms = Self::control(
            &estimator,
            &report.graph,
            &mut report.psms,
            &psm.score,
            psm.higher_better,
        );
        report.filter_psms(&psm.parsed_filters);

        let peptide = &parameters.peptide;
        report.assemble_peptides();
        summary.peptides = Self::control(
            &estimator,
            &report.graph,
            &mut report.peptides,
            &peptide.score,
            peptide.higher_better,
        );
        report.filter_peptides(&peptide.parsed_filters);

        let protein = &parameters.protein;
        report.infer_proteins(protein.inference);
        report.score_proteins(&protein.scoring());
        summary.proteins = Self::control(
            &estimator,
            &report.graph,
            &mut report.proteins,
            PROTEIN_SCORE,
            None,
        );
        report.filter_proteins(&protein.parsed_filters);

        Self::sort(psm_orders(), psm.sort.as_deref(), &mut report.psms);
        Self::sort(peptide_orders(), peptide.sort.as_deref(), &mut report.peptides);
        Self::sort(protein_orders(), protein.sort.as_deref(), &mut report.proteins);

        info!(
            "discovered {} PSMs, {} peptides and {} proteins at {}% FDR",
            summary.psms.passing,
            summary.peptides.passing,
            summary.proteins.passing,
            parameters.fdr_threshold * 100.0
        );
        Ok(summary)
    }

    pub fn run(mut self) -> anyhow::Result<Settings> {
        let mut report = self.load()?;
        let summary = self.process(&mut report)?;

        let path = self.write_psms(&report)?;
        self.parameters.output_paths.push(path);
        let path = self.write_peptides(&report)?;
        self.parameters.output_paths.push(path);
        let path = self.write_proteins(&report)?;
        self.parameters.output_paths.push(path);

        let path = self.parameters.output_directory.join("results.json");
        self.parameters
            .output_paths
            .push(path.to_string_lossy().into_owned());

        let results = Results {
            parameters: &self.parameters,
            summary: &summary,
        };
        let bytes = serde_json::to_vec_pretty(&results)?;
        std::fs::write(&path, &bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;
        println!("{}", String::from_utf8_lossy(&bytes));

        info!("finished in {}s", self.start.elapsed().as_secs());
        Ok(self.parameters)
    }
}

use crate::runner::Runner;
use anyhow::Context;
use csv::ByteRecord;
use itertools::Itertools;
use log::info;
use proteus_core::graph::{AccessionIx, FileId, IdentGraph, PeptideIx, PsmSetIx};
use proteus_core::report::{Report, ReportPeptide, ReportProtein, ReportPsm};
use proteus_core::score::ScoreModel;
use rayon::prelude::*;
use std::collections::BTreeSet;

fn push_f64(record: &mut ByteRecord, value: f64) {
    match value.is_finite() {
        true => record.push_field(ryu::Buffer::new().format(value).as_bytes()),
        false if value.is_nan() => record.push_field(b""),
        false => record.push_field(value.to_string().as_bytes()),
    }
}

fn push_rank(record: &mut ByteRecord, rank: Option<u32>) {
    match rank {
        Some(rank) => record.push_field(itoa::Buffer::new().format(rank).as_bytes()),
        None => record.push_field(b""),
    }
}

fn push_count(record: &mut ByteRecord, count: usize) {
    record.push_field(itoa::Buffer::new().format(count).as_bytes());
}

fn push_stats(record: &mut ByteRecord, rank: Option<u32>, decoy: bool, stats: [f64; 3]) {
    push_rank(record, rank);
    let label: &[u8] = match decoy {
        true => b"-1",
        false => b"1",
    };
    record.push_field(label);
    for value in stats {
        push_f64(record, value);
    }
}

/// One column per score name found on any row
fn score_columns<'a, I>(rows: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a [ScoreModel]>,
{
    rows.into_iter()
        .flatten()
        .map(|score| score.name.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn push_scores(record: &mut ByteRecord, columns: &[String], scores: &[ScoreModel]) {
    for column in columns {
        let value = scores
            .iter()
            .find(|score| &score.name == column)
            .map(|score| score.value)
            .unwrap_or(f64::NAN);
        push_f64(record, value);
    }
}

fn accessions<I>(graph: &IdentGraph, accessions: I) -> String
where
    I: IntoIterator<Item = AccessionIx>,
{
    accessions
        .into_iter()
        .map(|ix| graph[ix].accession.as_str())
        .sorted()
        .join(";")
}

fn peptide_accessions(graph: &IdentGraph, peptide: PeptideIx) -> String {
    accessions(graph, graph[peptide].accessions.iter().copied())
}

fn spectra(graph: &IdentGraph, sets: &[PsmSetIx]) -> usize {
    sets.iter()
        .flat_map(|&set| graph.members(set))
        .map(|psm| (psm.file, psm.spectrum.as_str()))
        .collect::<BTreeSet<_>>()
        .len()
}

const STAT_HEADERS: [&str; 5] = ["rank", "label", "fdr", "q_value", "fdr_score"];

impl Runner {
    fn write_tsv(&self, name: &str, headers: ByteRecord, records: Vec<ByteRecord>) -> anyhow::Result<String> {
        let path = self.parameters.output_directory.join(name);
        let mut wtr = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(vec![]);

        wtr.write_byte_record(&headers)?;
        for record in &records {
            wtr.write_byte_record(record)?;
        }
        wtr.flush()?;

        let bytes = wtr.into_inner()?;
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write `{}`", path.display()))?;
        info!("wrote {} rows to {}", records.len(), path.display());
        Ok(path.to_string_lossy().into_owned())
    }

    fn headers<'a, I>(columns: I, scores: &[String]) -> ByteRecord
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut headers = columns.into_iter().collect::<ByteRecord>();
        for score in scores {
            headers.push_field(score.as_bytes());
        }
        for column in STAT_HEADERS {
            headers.push_field(column.as_bytes());
        }
        headers
    }

    fn serialize_psm(&self, row: &ReportPsm, graph: &IdentGraph, scores: &[String]) -> ByteRecord {
        let mut record = ByteRecord::new();
        let members = graph.members(row.set).collect::<Vec<_>>();
        record.push_field(row.sequence.as_bytes());
        record.push_field(peptide_accessions(graph, row.peptide).as_bytes());
        record.push_field(itoa::Buffer::new().format(row.charge).as_bytes());
        record.push_field(
            members
                .iter()
                .map(|psm| psm.file)
                .unique()
                .filter_map(|file| graph.file_name(file))
                .join(";")
                .as_bytes(),
        );
        record.push_field(
            members
                .iter()
                .map(|psm| psm.spectrum.as_str())
                .join(";")
                .as_bytes(),
        );
        push_count(&mut record, members.len());
        push_scores(&mut record, scores, &row.scores);
        push_stats(
            &mut record,
            row.rank,
            row.decoy,
            [row.fdr, row.q_value, row.fdr_score],
        );
        record
    }

    pub fn write_psms(&self, report: &Report) -> anyhow::Result<String> {
        let scores = score_columns(report.psms.iter().map(|row| row.scores.as_slice()));
        let headers = Self::headers(
            ["peptide", "accessions", "charge", "files", "spectra", "nr_psms"],
            &scores,
        );
        let records = report
            .psms
            .par_iter()
            .map(|row| self.serialize_psm(row, &report.graph, &scores))
            .collect::<Vec<_>>();
        self.write_tsv("psms.tsv", headers, records)
    }

    fn serialize_peptide(&self, row: &ReportPeptide, graph: &IdentGraph, scores: &[String]) -> ByteRecord {
        let mut record = ByteRecord::new();
        record.push_field(row.sequence.as_bytes());
        record.push_field(graph[row.peptide].sequence.as_bytes());
        record.push_field(peptide_accessions(graph, row.peptide).as_bytes());
        push_count(&mut record, row.psm_sets.len());
        push_count(&mut record, spectra(graph, &row.psm_sets));
        push_scores(&mut record, scores, &row.scores);
        push_stats(
            &mut record,
            row.rank,
            row.decoy,
            [row.fdr, row.q_value, row.fdr_score],
        );
        record
    }

    pub fn write_peptides(&self, report: &Report) -> anyhow::Result<String> {
        let scores = score_columns(report.peptides.iter().map(|row| row.scores.as_slice()));
        let headers = Self::headers(
            ["peptide", "stripped_peptide", "accessions", "nr_psms", "nr_spectra"],
            &scores,
        );
        let records = report
            .peptides
            .par_iter()
            .map(|row| self.serialize_peptide(row, &report.graph, &scores))
            .collect::<Vec<_>>();
        self.write_tsv("peptides.tsv", headers, records)
    }

    fn serialize_protein(&self, row: &ReportProtein, graph: &IdentGraph, scores: &[String]) -> ByteRecord {
        let mut record = ByteRecord::new();
        record.push_field(accessions(graph, row.accessions.iter().copied()).as_bytes());
        record.push_field(accessions(graph, row.subset_accessions.iter().copied()).as_bytes());
        record.push_field(
            row.accessions
                .iter()
                .flat_map(|&ix| graph[ix].descriptions_in(FileId::ALL))
                .unique()
                .join(";")
                .as_bytes(),
        );
        push_count(&mut record, row.peptides.len());
        push_count(&mut record, row.psm_sets.len());
        push_count(&mut record, spectra(graph, &row.psm_sets));
        push_scores(&mut record, scores, &row.scores);
        push_stats(
            &mut record,
            row.rank,
            row.decoy,
            [row.fdr, row.q_value, row.fdr_score],
        );
        record
    }

    pub fn write_proteins(&self, report: &Report) -> anyhow::Result<String> {
        let scores = score_columns(report.proteins.iter().map(|row| row.scores.as_slice()));
        let headers = Self::headers(
            [
                "accessions",
                "subset_accessions",
                "description",
                "nr_peptides",
                "nr_psms",
                "nr_spectra",
            ],
            &scores,
        );
        let records = report
            .proteins
            .par_iter()
            .map(|row| self.serialize_protein(row, &report.graph, &scores))
            .collect::<Vec<_>>();
        self.write_tsv("proteins.tsv", headers, records)
    }
}

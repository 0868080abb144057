//! Full report pipeline over the workspace fixture, plus filter properties
//! checked against generated rows

use proteus_core::fdr::{DecoyConfig, FdrEstimator};
use proteus_core::filter::{Comparison, Filter, FilterKey, FilterValue};
use proteus_core::graph::{FileId, GraphBuilder, GraphInput, PsmInput};
use proteus_core::inference::ProteinInference;
use proteus_core::rank::rank_by_score;
use proteus_core::report::{protein_orders, Report};
use proteus_core::score::{PROTEIN_SCORE, PSM_COMBINED_FDR_SCORE};
use proteus_core::scoring::{PsmMode, Scoring, ScoringMethod};
use quickcheck_macros::quickcheck;
use std::collections::BTreeMap;

fn load() -> Report {
    let json = std::fs::read_to_string("../../tests/experiment.json").unwrap();
    let input: GraphInput = serde_json::from_str(&json).unwrap();
    Report::new(input.build(false).unwrap())
}

#[test]
fn integration() {
    let mut report = load();
    assert_eq!(report.graph.files.len(), 2);
    assert_eq!(report.psms.len(), 14);

    let estimator = FdrEstimator::new(DecoyConfig::default().build().unwrap());
    assert_eq!(estimator.assign_decoys(&mut report.psms, &report.graph), 3);
    let summary = estimator.calculate(&mut report.psms, "mascot_score", None);
    assert_eq!(summary.targets, 11);
    assert_eq!(summary.decoys, 3);
    assert_eq!(summary.passing, 8);

    // q-values never decrease from best to worst
    for pair in report.psms.windows(2) {
        assert!(pair[0].q_value <= pair[1].q_value);
    }
    assert!(rank_by_score(&mut report.psms, "mascot_score", None));

    let q = Filter::new(
        FilterKey::QValue,
        Comparison::LessEqual,
        FilterValue::Numerical(0.1),
    )
    .unwrap();
    report.filter_psms(&[q]);
    assert_eq!(report.psms.len(), 12);

    report.assemble_peptides();
    estimator.assign_decoys(&mut report.peptides, &report.graph);
    estimator.calculate(&mut report.peptides, PSM_COMBINED_FDR_SCORE, None);
    assert_eq!(report.peptides.len(), 10);

    report.infer_proteins(ProteinInference::Slim);
    assert_eq!(report.proteins.len(), 5);
    let scoring = Scoring::new(ScoringMethod::Additive, PsmMode::OnlyBest, "mascot_score");
    report.score_proteins(&scoring);
    estimator.assign_decoys(&mut report.proteins, &report.graph);
    let summary = estimator.calculate(&mut report.proteins, PROTEIN_SCORE, None);
    assert_eq!(summary.decoys, 1);
    rank_by_score(&mut report.proteins, PROTEIN_SCORE, None);

    let decoys = Filter::new(FilterKey::Decoy, Comparison::Equal, FilterValue::Boolean(false))
        .unwrap();
    report.filter_proteins(&[decoys]);
    assert!(protein_orders().sort("accession", &mut report.proteins));
    let names = report
        .proteins
        .iter()
        .map(|p| p.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        names,
        vec![
            "sp|P00711|LALBA_BOVIN",
            "sp|P00761|TRYP_PIG",
            "sp|P02769|ALBU_BOVIN",
            "sp|Q3SZR3|A1AG_BOVIN"
        ]
    );
    let ranks = report.proteins.iter().map(|p| p.rank).collect::<Vec<_>>();
    assert_eq!(ranks, vec![Some(2), Some(3), Some(1), Some(5)]);
}

#[test]
fn description_union_in_all_files() {
    let report = load();
    let albumin = report.graph.find_accession("sp|P02769|ALBU_BOVIN").unwrap();
    let filter = |file: u32| {
        Filter::new(
            FilterKey::Description,
            Comparison::Regex,
            FilterValue::Literal("^Albumin$".into()),
        )
        .unwrap()
        .in_file(FileId(file))
    };
    assert_eq!(
        report.graph[albumin].descriptions_in(FileId::ALL),
        vec!["Albumin", "Serum albumin"]
    );

    let mut report = report;
    report.assemble_peptides();
    report.infer_proteins(ProteinInference::All);
    let protein = report
        .proteins
        .iter()
        .find(|p| p.accessions.contains(&albumin))
        .unwrap();
    assert!(filter(0).accepts(protein, &report.graph));
    assert!(!filter(1).accepts(protein, &report.graph));
    assert!(filter(2).accepts(protein, &report.graph));
}

#[quickcheck]
fn negation_inverts_numerical_filters(charges: Vec<u8>, threshold: u8, cmp: u8) -> bool {
    let comparison = [
        Comparison::Equal,
        Comparison::Less,
        Comparison::LessEqual,
        Comparison::Greater,
        Comparison::GreaterEqual,
    ][cmp as usize % 5];

    let mut builder = GraphBuilder::default();
    builder.add_file("a.mzid");
    for (i, &charge) in charges.iter().enumerate() {
        builder
            .add_psm(PsmInput {
                sequence: "PEPTIDEK".into(),
                accessions: vec!["P1".into()],
                file: 1,
                spectrum: format!("s{i}"),
                charge: charge as i32 % 6,
                scores: BTreeMap::from([("mascot_score".to_string(), Some(i as f64))]),
                ..Default::default()
            })
            .unwrap();
    }
    let report = Report::new(builder.build());

    let filter = Filter::new(
        FilterKey::Charge,
        comparison,
        FilterValue::Numerical((threshold % 6) as f64),
    )
    .unwrap();
    let negated = filter.clone().negate(true);
    report.psms.iter().all(|row| {
        filter.evaluate(row, &report.graph).map(|b| !b) == negated.evaluate(row, &report.graph)
    })
}

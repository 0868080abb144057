use proteus_cli::input::Input;
use proteus_cli::runner::Runner;
use std::collections::HashMap;
use std::path::Path;

fn read_tsv(path: &Path) -> anyhow::Result<Vec<HashMap<String, String>>> {
    let mut rdr = csv::ReaderBuilder::new().delimiter(b'\t').from_path(path)?;
    let headers = rdr.headers()?.clone();
    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        rows.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect(),
        );
    }
    Ok(rows)
}

#[test]
fn integration() -> anyhow::Result<()> {
    let output = std::env::temp_dir().join("proteus-cli-integration");
    let mut input = Input::load("../../tests/parameters.json")?;
    input.input = Some("../../tests/experiment.json".into());
    input.output_directory = Some(output.to_string_lossy().into_owned());

    let settings = Runner::new(input.build()?).run()?;
    assert_eq!(settings.output_paths.len(), 4);

    // 22.1 and 18.4 are the only PSMs above 10% q-value
    let psms = read_tsv(&output.join("psms.tsv"))?;
    assert_eq!(psms.len(), 12);
    assert_eq!(psms[0]["peptide"], "LVNELTEFAK");
    assert_eq!(psms[0]["rank"], "1");
    assert!(psms.iter().all(|row| row["peptide"] != "KAFETLVNE"));

    let peptides = read_tsv(&output.join("peptides.tsv"))?;
    assert_eq!(peptides.len(), 10);
    let cevfr = peptides
        .iter()
        .find(|row| row["stripped_peptide"] == "CEVFR")
        .expect("shared peptide is reported");
    assert!(cevfr["peptide"].starts_with("C[57.02"));
    assert_eq!(
        cevfr["accessions"],
        "sp|P00711|LALBA_BOVIN;sp|P02769|ALBU_BOVIN"
    );

    let proteins = read_tsv(&output.join("proteins.tsv"))?;
    let accessions = proteins
        .iter()
        .map(|row| row["accessions"].as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        accessions,
        vec![
            "sp|P02769|ALBU_BOVIN",
            "sp|P00711|LALBA_BOVIN",
            "sp|P00761|TRYP_PIG",
            "sp|Q3SZR3|A1AG_BOVIN"
        ]
    );

    let albumin = &proteins[0];
    assert_eq!(albumin["description"], "Albumin;Serum albumin");
    assert_eq!(albumin["nr_peptides"], "4");
    assert_eq!(albumin["nr_psms"], "5");
    assert_eq!(albumin["label"], "1");
    let score = albumin["protein_score"].parse::<f64>()?;
    assert!((score - 205.3).abs() < 1e-6, "{score}");

    // The non-scoring PSM of NKPGVYTK does not count towards trypsin
    let score = proteins[2]["protein_score"].parse::<f64>()?;
    assert!((score - 52.4).abs() < 1e-6, "{score}");

    // One decoy protein scores between trypsin and A1AG
    assert_eq!(proteins[3]["rank"], "5");
    assert_eq!(proteins[3]["q_value"].parse::<f64>()?, 0.25);

    let results: serde_json::Value =
        serde_json::from_slice(&std::fs::read(output.join("results.json"))?)?;
    assert_eq!(results["psm"]["score"], "mascot_score");
    assert_eq!(results["summary"]["psms"]["passing"], 8);
    assert_eq!(results["summary"]["proteins"]["passing"], 3);
    assert_eq!(results["summary"]["proteins"]["decoys"], 1);

    Ok(())
}

use clap::{value_parser, Arg, Command, ValueHint};
use proteus_cli::input::Input;
use proteus_cli::runner::Runner;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::default()
        .filter_level(log::LevelFilter::Error)
        .parse_env(env_logger::Env::default().filter_or("PROTEUS_LOG", "error,proteus=info"))
        .init();

    let matches = Command::new("proteus")
        .version(clap::crate_version!())
        .author("Proteus developers")
        .about("Protein inference, scoring and FDR control for peptide identifications")
        .arg(
            Arg::new("parameters")
                .required(true)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help("Path to configuration parameters (JSON file)")
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("input")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path to the identifications (JSON file). Overrides the input \
                     listed in the configuration file.",
                )
                .value_hint(ValueHint::FilePath),
        )
        .arg(
            Arg::new("output_directory")
                .short('o')
                .long("output_directory")
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .help(
                    "Path where reports will be written. \
                     Overrides the directory specified in the configuration file.",
                )
                .value_hint(ValueHint::DirPath),
        )
        .arg(
            Arg::new("fdr-threshold")
                .long("fdr-threshold")
                .value_parser(value_parser!(f64))
                .help("q-value threshold for reporting rows as passing (default = 0.01)")
                .value_hint(ValueHint::Other),
        )
        .arg(
            Arg::new("merge-across-files")
                .long("merge-across-files")
                .action(clap::ArgAction::SetTrue)
                .help("Merge identifications of the same spectrum across input files"),
        )
        .arg(
            Arg::new("threads")
                .long("threads")
                .value_parser(value_parser!(u16).range(1..))
                .help("Number of worker threads (default = # of CPUs)")
                .value_hint(ValueHint::Other),
        )
        .help_template(
            "{usage-heading} {usage}\n\n\
             {about-with-newline}\n\
             Written by {author-with-newline}Version {version}\n\n\
             {all-args}{after-help}",
        )
        .get_matches();

    let threads = matches
        .get_one::<u16>("threads")
        .copied()
        .map(usize::from)
        .unwrap_or_else(num_cpus::get);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()?;

    let input = Input::from_arguments(matches)?;
    let runner = input.build().map(Runner::new)?;
    runner.run()?;

    Ok(())
}

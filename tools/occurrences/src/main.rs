/// Occurrence tool: resolves a taxon, fetches its GBIF occurrences and runs
/// the cleaning stage. Writes the kept and dropped records as CSV.
use std::fs;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use sdm_core::clean::clean;
use sdm_core::occurrence::gbif::GbifClient;
use sdm_core::occurrence::names::resolve_taxon_key;
use sdm_core::occurrence::{fetch_occurrences, OccurrenceQuery};
use sdm_core::{logging, PipelineConfig};

#[derive(Parser, Debug)]
#[command(name = "occurrences", about = "Fetch and clean GBIF occurrences for one taxon")]
struct Args {
    /// Scientific name to resolve against the GBIF backbone
    #[arg(short, long, conflicts_with = "key")]
    name: Option<String>,

    /// GBIF taxon key (skips name resolution)
    #[arg(short, long)]
    key: Option<u64>,

    /// Maximum number of records to fetch
    #[arg(short, long)]
    max_records: Option<usize>,

    /// Optional pipeline config; its [taxon], [service] and [cleaning] sections apply
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory (created if absent)
    #[arg(short, long, default_value = "output")]
    output: PathBuf,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("Cannot load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    let client = GbifClient::new(config.service.clone()).context("Cannot build GBIF client")?;

    let resolve = |name: &str| {
        resolve_taxon_key(&client, name).with_context(|| format!("Cannot resolve {name:?}"))
    };
    let taxon_key = if let Some(key) = args.key {
        key
    } else if let Some(name) = &args.name {
        resolve(name)?
    } else if let Some(key) = config.taxon.key {
        key
    } else if let Some(name) = &config.taxon.name {
        resolve(name)?
    } else {
        bail!("Pass --name or --key (or set [taxon] in --config)");
    };

    let query = OccurrenceQuery {
        taxon_key,
        max_records: args.max_records.unwrap_or(config.taxon.max_records),
        basis_of_record: config.taxon.basis_of_record.clone(),
        country: config.taxon.country.clone(),
    };
    let occurrences = fetch_occurrences(&client, &query).context("Occurrence search failed")?;
    let report = clean(&occurrences, &config.cleaning).context("Cleaning failed")?;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Cannot create {}", args.output.display()))?;
    let kept_path = args.output.join("occurrences_clean.csv");
    let dropped_path = args.output.join("occurrences_dropped.csv");
    let kept_file = fs::File::create(&kept_path)
        .with_context(|| format!("Write failed: {}", kept_path.display()))?;
    report.write_kept_csv(BufWriter::new(kept_file))?;
    let dropped_file = fs::File::create(&dropped_path)
        .with_context(|| format!("Write failed: {}", dropped_path.display()))?;
    report.write_dropped_csv(BufWriter::new(dropped_file))?;

    eprintln!(
        "Taxon {taxon_key}: {} fetched, {} kept, {} dropped",
        report.input_count,
        report.kept.len(),
        report.dropped.len()
    );
    for (check, n) in &report.failures {
        eprintln!("  {:<18} {n}", check.as_str());
    }
    eprintln!("Wrote {} and {}", kept_path.display(), dropped_path.display());
    Ok(())
}

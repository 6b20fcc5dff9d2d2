/// Full pipeline runner: fetch → clean → rasterize → metrics → climate join,
/// driven by one TOML configuration file.
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use sdm_core::occurrence::gbif::GbifClient;
use sdm_core::{logging, pipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(
    name = "sdm-run",
    about = "Prepare SDM inputs (occurrences, range raster, climate) for one taxon"
)]
struct Args {
    /// Pipeline configuration (TOML)
    #[arg(short, long, default_value = "sdm.toml")]
    config: PathBuf,

    /// Output directory (overrides [output].dir)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Taxon name (overrides [taxon].name and clears [taxon].key)
    #[arg(short, long)]
    name: Option<String>,

    /// Never download climate layers; fail if they are not cached
    #[arg(long)]
    offline: bool,

    /// More log output (-v debug, -vv trace). RUST_LOG wins when set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let mut config = PipelineConfig::load(&args.config)
        .with_context(|| format!("Cannot load config {}", args.config.display()))?;
    if let Some(dir) = args.output {
        config.output.dir = dir;
    }
    if let Some(name) = args.name {
        config.taxon.name = Some(name);
        config.taxon.key = None;
    }
    if args.offline {
        config.climate.download = false;
    }
    if config.taxon.name.is_none() && config.taxon.key.is_none() {
        bail!("No taxon given: set [taxon].name or [taxon].key, or pass --name");
    }

    let client = GbifClient::new(config.service.clone()).context("Cannot build GBIF client")?;
    let output = pipeline::run(&config, &client)?;
    let written = output
        .write_to(&config.output.dir)
        .with_context(|| format!("Write failed: {}", config.output.dir.display()))?;

    let s = output.summary();
    eprintln!(
        "Taxon {}: {} fetched, {} kept, {} dropped",
        s.taxon_key, s.fetched, s.kept, s.dropped
    );
    for (check, n) in &s.failures {
        eprintln!("  {check:<18} {n}");
    }
    eprintln!(
        "Range: {} x {} cells at {:.4}°, polygon {:.0} km², raster {:.0} km² ({:+.2}%)",
        s.raster_cols,
        s.raster_rows,
        s.resolution,
        s.area.polygon_km2,
        s.area.raster_km2,
        s.area.relative_difference * 100.0
    );
    eprintln!("Centroid: {:.4}°N {:.4}°E", s.centroid.lat, s.centroid.lon);
    eprintln!("Climate: {}/{} records with every layer", s.complete_records, s.joined_records);
    for l in &s.layers {
        match l.mean {
            Some(m) => {
                eprintln!("  {:<6} mean {m:.2} {} over {} cells", l.layer, l.unit, l.valued_cells)
            }
            None => eprintln!("  {:<6} no in-range values", l.layer),
        }
    }
    eprintln!("Wrote {} files to {}", written.len(), config.output.dir.display());
    Ok(())
}

/// Climate cache tool: makes sure the WorldClim 2.1 bioclim layers for one
/// resolution are present locally, downloading the archive once if needed.
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use sdm_core::climate::bioclim::{self, BIOCLIM};
use sdm_core::climate::geotiff::read_geotiff;
use sdm_core::climate::{ClimateCache, ClimateResolution};
use sdm_core::logging;

#[derive(Parser, Debug)]
#[command(name = "climate_cache", about = "Populate the local WorldClim bioclim cache")]
struct Args {
    /// Cache root directory
    #[arg(short, long, default_value = "data/worldclim")]
    root: PathBuf,

    /// Resolution in arc-minutes: 10, 5 or 2.5
    #[arg(long, default_value = "10")]
    resolution: f64,

    /// Layers to ensure, e.g. `bio1,bio12` or `1,12` (omit for all 19)
    #[arg(short, long, value_delimiter = ',')]
    layers: Vec<String>,

    /// Only report what is cached; never download
    #[arg(long)]
    check: bool,

    /// Decode each layer and print its grid
    #[arg(long)]
    inspect: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.verbose);

    let res = ClimateResolution::from_arcmin(args.resolution)?;
    let layers: Vec<u8> = if args.layers.is_empty() {
        BIOCLIM.iter().map(|v| v.index).collect()
    } else {
        args.layers
            .iter()
            .map(|s| {
                bioclim::parse(s)
                    .map(|v| v.index)
                    .with_context(|| format!("Unknown bioclim layer {s:?}"))
            })
            .collect::<Result<_>>()?
    };

    let cache = ClimateCache::new(&args.root);
    if args.check {
        let missing = cache.missing(res, &layers);
        eprintln!(
            "{}: {} of {} layers cached in {}",
            res.label(),
            layers.len() - missing.len(),
            layers.len(),
            cache.dir(res).display()
        );
        if !missing.is_empty() {
            eprintln!("Missing: {missing:?}");
        }
        return Ok(());
    }

    let paths = cache
        .ensure(res, &layers, true)
        .with_context(|| format!("Cannot populate {}", cache.dir(res).display()))?;
    for (index, path) in layers.iter().zip(&paths) {
        let var = bioclim::by_index(*index).context("bioclim table lookup")?;
        if args.inspect {
            let band =
                read_geotiff(path).with_context(|| format!("Cannot read {}", path.display()))?;
            let s = band.grid.spec;
            eprintln!(
                "{:<6} {:<38} {} x {} @ {:.5}°  origin ({}, {})  {}",
                var.code(),
                var.name,
                s.cols,
                s.rows,
                s.resolution,
                s.min_x,
                s.min_y,
                band.crs
            );
        } else {
            eprintln!("{:<6} {}", var.code(), path.display());
        }
    }
    Ok(())
}

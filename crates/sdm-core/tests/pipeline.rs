//! End-to-end run of every stage against an in-memory occurrence service, a
//! GeoJSON range on disk and a bioclim cache of small GeoTIFFs.

use std::fs;
use std::path::Path;

use sdm_core::climate::{ClimateCache, ClimateResolution};
use sdm_core::occurrence::names::{NameMatch, NameResolver};
use sdm_core::occurrence::{BasisOfRecord, OccurrenceQuery, OccurrenceSource, RawOccurrence};
use sdm_core::pipeline::{run, RunSummary, Stage};
use sdm_core::{Error, PipelineConfig, Result};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

const LYNX: u64 = 2435240;

struct FakeGbif {
    rows: Vec<RawOccurrence>,
}

impl NameResolver for FakeGbif {
    fn match_name(&self, name: &str) -> Result<NameMatch> {
        let json = format!(
            r#"{{"usageKey": {LYNX}, "scientificName": "{name} (Linnaeus, 1758)", "canonicalName": "{name}",
                "rank": "SPECIES", "status": "ACCEPTED", "confidence": 99, "matchType": "EXACT"}}"#
        );
        Ok(serde_json::from_str(&json)?)
    }
}

impl OccurrenceSource for FakeGbif {
    fn search(&self, query: &OccurrenceQuery) -> Result<Vec<RawOccurrence>> {
        assert_eq!(query.taxon_key, LYNX);
        Ok(self.rows.iter().take(query.max_records).cloned().collect())
    }
}

fn row(key: u64, lat: f64, lon: f64, year: i32, uncertainty: Option<f64>) -> RawOccurrence {
    RawOccurrence {
        key,
        taxon_key: Some(LYNX),
        decimal_latitude: Some(lat),
        decimal_longitude: Some(lon),
        coordinate_uncertainty_in_meters: uncertainty,
        year: Some(year),
        basis_of_record: Some(BasisOfRecord::HumanObservation),
        country_code: Some("DE".into()),
        extra: serde_json::Map::new(),
    }
}

fn service() -> FakeGbif {
    let mut rows: Vec<RawOccurrence> = [
        (47.0, 10.0),
        (47.5, 11.0),
        (48.0, 10.5),
        (48.5, 12.0),
        (47.2, 12.5),
        (48.8, 10.2),
        (47.8, 11.7),
        (48.3, 11.2),
    ]
    .iter()
    .enumerate()
    .map(|(i, &(lat, lon))| row(i as u64 + 1, lat, lon, 2015, Some(30.0)))
    .collect();
    rows.push(row(9, 47.6, 10.8, 1950, Some(30.0)));
    rows.push(row(10, 48.1, 11.9, 2015, Some(50_000.0)));
    let mut unlocated = row(11, 0.0, 0.0, 2015, None);
    unlocated.decimal_latitude = None;
    rows.push(unlocated);
    FakeGbif { rows }
}

/// GTModelType = geographic, GeographicType = EPSG:4326.
const WGS84_GEOKEYS: [u16; 12] = [1, 1, 0, 2, 1024, 0, 1, 2, 2048, 0, 1, 4326];

/// Float32 GeoTIFF, rows north first, geographic WGS84.
fn write_layer(
    path: &Path,
    cols: u32,
    rows: u32,
    west: f64,
    north: f64,
    res: f64,
    value: impl Fn(u32, u32) -> f32,
) {
    let data: Vec<f32> = (0..rows)
        .flat_map(|r| (0..cols).map(move |c| (r, c)))
        .map(|(r, c)| value(r, c))
        .collect();
    let mut enc = TiffEncoder::new(fs::File::create(path).unwrap()).unwrap();
    let mut img = enc.new_image::<colortype::Gray32Float>(cols, rows).unwrap();
    img.encoder().write_tag(Tag::ModelPixelScaleTag, &[res, res, 0.0][..]).unwrap();
    img.encoder().write_tag(Tag::ModelTiepointTag, &[0.0, 0.0, 0.0, west, north, 0.0][..]).unwrap();
    img.encoder().write_tag(Tag::GeoKeyDirectoryTag, &WGS84_GEOKEYS[..]).unwrap();
    img.write_data(&data).unwrap();
}

/// bio1 cools by 0.5 °C per ten-minute row northwards; bio12 is flat 800 mm.
fn seed_climate_cache(root: &Path) {
    let cache = ClimateCache::new(root);
    let res = ClimateResolution::TenMinutes;
    fs::create_dir_all(cache.dir(res)).unwrap();
    let step = res.degrees();
    write_layer(&cache.layer_path(res, 1), 36, 36, 8.0, 51.0, step, |r, _| 2.0 + 0.5 * r as f32);
    write_layer(&cache.layer_path(res, 12), 36, 36, 8.0, 51.0, step, |_, _| 800.0);
}

fn write_range(path: &Path) {
    let geojson = r#"{
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {"binomial": "Lynx lynx"},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[9.0, 46.0], [13.0, 46.0], [13.0, 50.0], [9.0, 50.0], [9.0, 46.0]]]
            }
        }]
    }"#;
    fs::write(path, geojson).unwrap();
}

fn config(dir: &Path) -> PipelineConfig {
    let range = dir.join("lynx.geojson");
    write_range(&range);
    seed_climate_cache(&dir.join("worldclim"));
    let text = format!(
        r#"
        [taxon]
        name = "Lynx lynx"
        max_records = 100

        [range]
        path = "{range}"
        cache_dir = "{cache}"

        [climate]
        cache_dir = "{climate}"
        layers = [1, 12]
        download = false

        [output]
        dir = "{out}"
        "#,
        range = range.display(),
        cache = dir.join("rasters").display(),
        climate = dir.join("worldclim").display(),
        out = dir.join("out").display(),
    );
    PipelineConfig::from_toml_str(&text).unwrap()
}

#[test]
fn full_pipeline_runs_and_writes_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let out = run(&cfg, &service()).unwrap();

    assert_eq!(out.taxon_key, LYNX);
    assert_eq!(out.cleaning.input_count, 10);
    let kept: Vec<u64> = out.cleaning.kept.iter().map(|o| o.key).collect();
    assert_eq!(kept, vec![1, 2, 3, 4, 5, 6, 7, 8]);

    // 4° × 4° at ten arc-minutes.
    assert_eq!((out.raster.spec().cols, out.raster.spec().rows), (24, 24));
    assert_eq!(out.raster.cells_in_range(), 576);
    assert!(out.metrics.area.relative_difference.abs() < 0.01);
    let c = out.metrics.centroid.location;
    assert!(c.lon > 9.0 && c.lon < 13.0 && c.lat > 46.0 && c.lat < 50.0, "{c:?}");

    assert_eq!(out.joined.records.len(), 8);
    assert_eq!(out.joined.complete_count(), 8);
    for (i, rec) in out.joined.records.iter().enumerate() {
        assert_eq!(out.joined.physical(i, "bio12"), Some(800.0), "record {}", rec.occurrence.key);
    }

    assert_eq!(out.joined_rasters.len(), 2);
    for j in &out.joined_rasters {
        assert_eq!(j.valued_cells(), 576, "{}", j.layer);
    }

    let written = out.write_to(&cfg.output.dir).unwrap();
    for name in [
        "occurrences_clean.csv",
        "occurrences_dropped.csv",
        "occurrences_joined.csv",
        "range_raster.json",
        "joined_bio1.json",
        "joined_bio12.json",
        "summary.json",
    ] {
        let p = cfg.output.dir.join(name);
        assert!(p.is_file(), "{name} missing");
        assert!(written.contains(&p));
    }

    let summary_text = fs::read_to_string(cfg.output.dir.join("summary.json")).unwrap();
    let summary: RunSummary = serde_json::from_str(&summary_text).unwrap();
    assert_eq!(summary.kept, 8);
    assert_eq!(summary.dropped, 2);
    assert_eq!(summary.failures.get("recency"), Some(&1));
    assert_eq!(summary.failures.get("precision"), Some(&1));
    assert_eq!(summary.timings.len(), 5);
    assert_eq!(summary.layers[1].mean, Some(800.0));

    let dropped = fs::read_to_string(cfg.output.dir.join("occurrences_dropped.csv")).unwrap();
    assert!(dropped.lines().any(|l| l.starts_with("9,") && l.ends_with(",recency")));
    assert!(dropped.lines().any(|l| l.starts_with("10,") && l.ends_with(",precision")));
}

#[test]
fn cached_raster_is_identical_on_rerun() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    let first = run(&cfg, &service()).unwrap();
    let second = run(&cfg, &service()).unwrap();
    assert_eq!(first.raster.grid.data, second.raster.grid.data);
    assert_eq!(first.raster.spec().cols, second.raster.spec().cols);
    assert_eq!(fs::read_dir(dir.path().join("rasters")).unwrap().count(), 1);
}

#[test]
fn uncached_climate_without_download_fails_in_join() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.climate.cache_dir = dir.path().join("empty");
    let err = run(&cfg, &service()).unwrap_err();
    assert_eq!(err.stage, Stage::Join);
    assert!(matches!(err.source, Error::Config(_)), "{err}");
}

//! Point and raster joins against a [`ClimateGrid`].
//!
//! Occurrences are sampled in the grid's CRS. A range raster is joined cell by
//! cell after the climate layer has been resampled onto the range grid; cells
//! outside the range carry no value.

use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{ClimateGrid, ValueEncoding};
use crate::error::{Error, Result};
use crate::grid::{Grid, GridSpec};
use crate::occurrence::{Occurrence, OccurrenceSet};
use crate::projection::{Crs, Transformer};
use crate::range::RangeRaster;

/// Tolerance on resolution ratios and origin offsets, in cells.
const ALIGN_TOL: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointSampling {
    #[default]
    Nearest,
    Bilinear,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    #[default]
    Nearest,
    Bilinear,
    /// Mean of the finite source cells inside each coarser target cell.
    Average,
}

/// What the point join does when occurrences and grid use different CRSs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrsPolicy {
    #[default]
    Reproject,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerInfo {
    pub name: String,
    pub encoding: ValueEncoding,
}

impl LayerInfo {
    /// CSV column name, e.g. `bio1_degC`.
    pub fn column(&self) -> String {
        format!("{}_{}", self.name, self.encoding.unit)
    }
}

/// An occurrence with one raw climate value per joined layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRecord {
    pub occurrence: Occurrence,
    /// Stored values in layer order; `None` is no-data.
    pub raw: Vec<Option<f32>>,
}

/// Result of the point join: layer descriptions plus joined records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointJoin {
    pub layers: Vec<LayerInfo>,
    pub records: Vec<JoinedRecord>,
}

impl PointJoin {
    pub fn layer_index(&self, name: &str) -> Option<usize> {
        self.layers.iter().position(|l| l.name == name)
    }

    /// Physical value of `layer` for the record at `record`.
    pub fn physical(&self, record: usize, layer: &str) -> Option<f64> {
        let li = self.layer_index(layer)?;
        let raw = self.records.get(record)?.raw.get(li).copied().flatten()?;
        Some(self.layers[li].encoding.physical(raw))
    }

    /// Records with a value for every layer.
    pub fn complete_count(&self) -> usize {
        self.records.iter().filter(|r| r.raw.iter().all(Option::is_some)).count()
    }

    /// Occurrence columns followed by one physical-value column per layer.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        let mut header: Vec<String> = [
            "key",
            "taxon_key",
            "latitude",
            "longitude",
            "coordinate_uncertainty_m",
            "year",
            "basis_of_record",
            "country_code",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        header.extend(self.layers.iter().map(LayerInfo::column));
        wtr.write_record(&header)?;

        let opt = |v: Option<String>| v.unwrap_or_default();
        for rec in &self.records {
            let o = &rec.occurrence;
            let mut row = vec![
                o.key.to_string(),
                o.taxon_key.to_string(),
                o.latitude.to_string(),
                o.longitude.to_string(),
                opt(o.coordinate_uncertainty_m.map(|v| v.to_string())),
                opt(o.year.map(|v| v.to_string())),
                o.basis_of_record.as_str().to_string(),
                o.country_code.clone().unwrap_or_default(),
            ];
            for (layer, raw) in self.layers.iter().zip(&rec.raw) {
                row.push(opt(raw.map(|v| layer.encoding.physical(v).to_string())));
            }
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

/// Sample `layers` (all layers when empty) at every occurrence.
///
/// Points outside the grid extent, on no-data cells, or whose reprojection
/// fails get `None` for every layer.
pub fn point_join(
    set: &OccurrenceSet,
    grid: &ClimateGrid,
    layers: &[String],
    sampling: PointSampling,
    policy: CrsPolicy,
) -> Result<PointJoin> {
    let wgs84 = Crs::wgs84();
    let transformer = if grid.crs == wgs84 {
        None
    } else {
        match policy {
            CrsPolicy::Reject => {
                return Err(Error::CrsMismatch {
                    left: wgs84.to_string(),
                    right: grid.crs.to_string(),
                })
            }
            CrsPolicy::Reproject => Some(Transformer::new(&wgs84, &grid.crs)?),
        }
    };

    let selected: Vec<_> = if layers.is_empty() {
        grid.layers().iter().collect()
    } else {
        layers
            .iter()
            .filter_map(|name| {
                let layer = grid.layer(name);
                if layer.is_none() {
                    warn!(layer = %name, "climate layer not in grid, skipped");
                }
                layer
            })
            .collect()
    };

    let mut failed_projections = 0usize;
    let mut records = Vec::with_capacity(set.len());
    for o in set.iter() {
        let xy = match &transformer {
            None => Some((o.longitude, o.latitude)),
            Some(t) => match t.transform(o.longitude, o.latitude) {
                Ok(p) => Some(p),
                Err(e) => {
                    debug!(key = o.key, error = %e, "occurrence could not be reprojected");
                    failed_projections += 1;
                    None
                }
            },
        };
        let raw = selected
            .iter()
            .map(|l| {
                let (x, y) = xy?;
                match sampling {
                    PointSampling::Nearest => l.grid.sample_nearest(x, y),
                    PointSampling::Bilinear => l.grid.sample_bilinear(x, y),
                }
            })
            .collect();
        records.push(JoinedRecord { occurrence: o.clone(), raw });
    }
    if failed_projections > 0 {
        warn!(
            count = failed_projections,
            crs = %grid.crs,
            "occurrences outside the climate CRS domain"
        );
    }

    let join = PointJoin {
        layers: selected
            .iter()
            .map(|l| LayerInfo { name: l.name.clone(), encoding: l.encoding.clone() })
            .collect(),
        records,
    };
    info!(
        records = join.records.len(),
        layers = join.layers.len(),
        complete = join.complete_count(),
        ?sampling,
        "point join"
    );
    Ok(join)
}

fn near_integer(v: f64) -> Option<i64> {
    let r = v.round();
    ((v - r).abs() <= ALIGN_TOL).then_some(r as i64)
}

/// Check that `target` is a whole-multiple refinement or coarsening of
/// `source` sharing its cell edges. Returns the coarse/fine ratio.
fn check_alignment(source: &GridSpec, target: &GridSpec) -> Result<usize> {
    let (rs, rt) = (source.resolution, target.resolution);
    let ratio = if rt >= rs { rt / rs } else { rs / rt };
    let k = near_integer(ratio).filter(|&k| k >= 1).ok_or_else(|| {
        Error::Alignment(format!("resolution {rt} is not a whole multiple or fraction of {rs}"))
    })?;
    let finer = rs.min(rt);
    for (axis, t0, s0) in [("x", target.min_x, source.min_x), ("y", target.min_y, source.min_y)] {
        if near_integer((t0 - s0) / finer).is_none() {
            return Err(Error::Alignment(format!(
                "{axis} origin {t0} is not on the {finer} lattice of origin {s0}"
            )));
        }
    }
    Ok(k as usize)
}

/// Resample `source` onto `target`. Cells with nothing to sample are NaN.
pub fn resample(source: &Grid<f32>, target: &GridSpec, method: Resampling) -> Result<Grid<f32>> {
    let k = check_alignment(&source.spec, target)?;
    if source.spec == *target {
        return Ok(source.clone());
    }
    let coarser = target.resolution > source.spec.resolution && k > 1;
    let s = &source.spec;
    let mut out = Grid::new(*target, f32::NAN);
    for r in 0..target.rows {
        for c in 0..target.cols {
            let (x, y) = target.cell_center(r, c);
            let v = match method {
                Resampling::Average if coarser => {
                    let b = target.cell_bounds(r, c);
                    let c0 = ((b.min_x - s.min_x) / s.resolution).round() as i64;
                    let r0 = ((b.min_y - s.min_y) / s.resolution).round() as i64;
                    let (mut sum, mut n) = (0.0f64, 0usize);
                    for sr in r0.max(0)..(r0 + k as i64).min(s.rows as i64) {
                        for sc in c0.max(0)..(c0 + k as i64).min(s.cols as i64) {
                            let v = source.get(sr as usize, sc as usize);
                            if v.is_finite() {
                                sum += v as f64;
                                n += 1;
                            }
                        }
                    }
                    (n > 0).then(|| (sum / n as f64) as f32)
                }
                Resampling::Nearest | Resampling::Average => source.sample_nearest(x, y),
                Resampling::Bilinear => source.sample_bilinear(x, y),
            };
            if let Some(v) = v {
                out.set(r, c, v);
            }
        }
    }
    Ok(out)
}

/// One climate layer on the range grid, masked to in-range cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinedRaster {
    pub spec: GridSpec,
    pub crs: Crs,
    pub layer: String,
    pub encoding: ValueEncoding,
    /// Raw values, row-major from the south-west; `None` outside the range
    /// or on no-data.
    pub values: Vec<Option<f32>>,
}

impl JoinedRaster {
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        self.values[self.spec.index(row, col)]
    }

    pub fn physical(&self, row: usize, col: usize) -> Option<f64> {
        self.get(row, col).map(|v| self.encoding.physical(v))
    }

    pub fn valued_cells(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Unweighted mean of the physical values over valued cells.
    pub fn mean_physical(&self) -> Option<f64> {
        let (sum, n) = self
            .values
            .iter()
            .flatten()
            .fold((0.0, 0usize), |(s, n), &v| (s + self.encoding.physical(v), n + 1));
        (n > 0).then(|| sum / n as f64)
    }
}

/// Resample `layer` onto the range grid and keep values only where the range
/// raster is in range.
pub fn raster_join(
    raster: &RangeRaster,
    grid: &ClimateGrid,
    layer: &str,
    method: Resampling,
) -> Result<JoinedRaster> {
    raster.crs.ensure_same(&grid.crs)?;
    let l = grid
        .layer(layer)
        .ok_or_else(|| Error::Config(format!("climate layer {layer} is not loaded")))?;
    let spec = *raster.spec();
    let resampled = resample(&l.grid, &spec, method)?;
    let values: Vec<Option<f32>> = raster
        .grid
        .data
        .iter()
        .zip(&resampled.data)
        .map(|(&inside, &v)| (inside && v.is_finite()).then_some(v))
        .collect();
    let joined = JoinedRaster {
        spec,
        crs: raster.crs.clone(),
        layer: l.name.clone(),
        encoding: l.encoding.clone(),
        values,
    };
    info!(
        layer,
        in_range = raster.cells_in_range(),
        valued = joined.valued_cells(),
        ?method,
        "raster join"
    );
    Ok(joined)
}

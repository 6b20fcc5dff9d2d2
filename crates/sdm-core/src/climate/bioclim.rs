//! The 19 bioclimatic variables and their storage encodings.
//!
//! Integer-typed bioclim rasters store temperatures in tenths of a degree
//! (BIO4 in thousandths); a raw value of 125 means 12.5 °C. Float rasters
//! (WorldClim 2.x) already hold physical values.

use serde::{Deserialize, Serialize};

/// Physical meaning of stored values: `physical = raw × scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueEncoding {
    pub scale: f64,
    pub unit: String,
}

impl ValueEncoding {
    pub fn new(scale: f64, unit: impl Into<String>) -> Self {
        Self { scale, unit: unit.into() }
    }

    pub fn physical(&self, raw: f32) -> f64 {
        raw as f64 * self.scale
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BioclimVar {
    pub index: u8,
    pub name: &'static str,
    pub unit: &'static str,
    /// Scale applied to integer-encoded rasters.
    pub integer_scale: f64,
}

impl BioclimVar {
    /// Short code, `bio1` .. `bio19`.
    pub fn code(&self) -> String {
        format!("bio{}", self.index)
    }

    pub fn encoding(&self, integer_storage: bool) -> ValueEncoding {
        let scale = if integer_storage { self.integer_scale } else { 1.0 };
        ValueEncoding::new(scale, self.unit)
    }
}

const fn var(index: u8, name: &'static str, unit: &'static str, integer_scale: f64) -> BioclimVar {
    BioclimVar { index, name, unit, integer_scale }
}

pub const BIOCLIM: [BioclimVar; 19] = [
    var(1, "Annual Mean Temperature", "degC", 0.1),
    var(2, "Mean Diurnal Range", "degC", 0.1),
    var(3, "Isothermality", "percent", 1.0),
    var(4, "Temperature Seasonality", "degC", 0.001),
    var(5, "Max Temperature of Warmest Month", "degC", 0.1),
    var(6, "Min Temperature of Coldest Month", "degC", 0.1),
    var(7, "Temperature Annual Range", "degC", 0.1),
    var(8, "Mean Temperature of Wettest Quarter", "degC", 0.1),
    var(9, "Mean Temperature of Driest Quarter", "degC", 0.1),
    var(10, "Mean Temperature of Warmest Quarter", "degC", 0.1),
    var(11, "Mean Temperature of Coldest Quarter", "degC", 0.1),
    var(12, "Annual Precipitation", "mm", 1.0),
    var(13, "Precipitation of Wettest Month", "mm", 1.0),
    var(14, "Precipitation of Driest Month", "mm", 1.0),
    var(15, "Precipitation Seasonality", "percent", 1.0),
    var(16, "Precipitation of Wettest Quarter", "mm", 1.0),
    var(17, "Precipitation of Driest Quarter", "mm", 1.0),
    var(18, "Precipitation of Warmest Quarter", "mm", 1.0),
    var(19, "Precipitation of Coldest Quarter", "mm", 1.0),
];

pub fn by_index(index: u8) -> Option<&'static BioclimVar> {
    BIOCLIM.iter().find(|v| v.index == index)
}

/// Accepts `bio1`, `BIO01`, `bio_1` or a bare `1`.
pub fn parse(name: &str) -> Option<&'static BioclimVar> {
    let lower = name.trim().to_ascii_lowercase();
    let digits = lower.strip_prefix("bio").unwrap_or(&lower).trim_start_matches('_');
    digits.parse::<u8>().ok().and_then(by_index)
}

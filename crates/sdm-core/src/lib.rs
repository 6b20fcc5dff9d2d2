//! Species-distribution-model input preparation.
//!
//! Stages, in pipeline order:
//!   [`occurrence`] fetch → [`clean`] → [`range`] rasterize → [`metrics`] →
//!   [`climate`] join. [`pipeline::run`] chains them from a
//!   [`config::PipelineConfig`].

pub mod clean;
pub mod climate;
pub mod config;
pub mod coords;
pub mod error;
pub mod grid;
pub mod logging;
pub mod metrics;
pub mod occurrence;
pub mod pipeline;
pub mod projection;
pub mod range;
pub mod sphere;

pub use config::PipelineConfig;
pub use error::{Error, Result};
pub use pipeline::{run, PipelineOutput, RunSummary, Stage, StageError};

//! # Weft Library
//!
//! Window-based genotype imputation: a sliding window over a phased marker
//! stream, a Li-Stephens haplotype HMM over clustered target markers, and a
//! splice-and-merge output writer.
//!
//! ## Modules
//! - `config`: CLI argument parsing and validation
//! - `data`: markers, samples, haplotype storage, genetic map
//! - `error`: error types and result alias
//! - `io`: emission sources, the sliding window, record writing
//! - `model`: per-window views and the imputation HMM
//! - `pipelines`: workflow orchestration
//! - `utils`: shared utilities

pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod pipelines;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use data::{GeneticMap, Marker, Markers, SampleHapPairs, Samples};
pub use error::{Result, WeftError};
pub use io::{MarkerWindow, VcfReader, WindowWriter};
pub use model::{CurrentData, ImputationData, LsHapBaum, ModelParams};
pub use pipelines::ImputationPipeline;

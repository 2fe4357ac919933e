//! # I/O Module
//!
//! Emission records and sources, the sliding marker window, the VCF input
//! adapter and record writer, and the per-window output writer.

pub mod emission;
pub mod vcf;
pub mod window;
pub mod window_writer;

pub use emission::{EmissionSource, MarkerEmission, MemorySource};
pub use vcf::{read_sample_hap_pairs, VcfReader};
pub use window::MarkerWindow;
pub use window_writer::WindowWriter;

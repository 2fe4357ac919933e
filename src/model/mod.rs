//! # Model Module
//!
//! The per-window imputation model: the current-data view over a window,
//! haplotype sequence coding, reference segments, the assembled imputation
//! inputs, and the Li-Stephens forward-backward engine.

pub mod allele_probs;
pub mod coder;
pub mod current_data;
pub mod gprobs;
pub mod ibd;
pub mod imp_data;
pub mod ls_baum;
pub mod parameters;
pub mod ref_segs;

pub use allele_probs::{AlleleProbs, GenotypeValues, HapAlleleProbs};
pub use current_data::CurrentData;
pub use gprobs::GprobsStatistics;
pub use ibd::{HapPair, IbdSegment};
pub use imp_data::ImputationData;
pub use ls_baum::LsHapBaum;
pub use parameters::ModelParams;
pub use ref_segs::RefHapSegs;

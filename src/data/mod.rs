//! # Data Module
//!
//! In-memory representations of genomic data.
//!
//! ## Design
//! - **Structure of Arrays:** markers and per-marker allele columns are
//!   stored separately for cache-friendly iteration.
//! - **Bit-packed columns:** each marker stores one allele per haplotype in
//!   ceil(log2(nAlleles)) bits.
//! - **Shared immutable views:** markers and sample registries are handed
//!   around behind `Arc` so per-window entities can share them without
//!   copying.
//!
//! ## Sub-modules
//! - `marker`: genomic position and allele definitions
//! - `haplotype`: samples and phased per-haplotype allele storage
//! - `genetic_map`: physical-to-genetic distance interpolation

pub mod genetic_map;
pub mod haplotype;
pub mod marker;

use std::sync::{Arc, Mutex};

/// Zero-cost newtype for chromosome indices
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ChromIdx(pub u16);

impl ChromIdx {
    pub fn new(idx: u16) -> Self {
        Self(idx)
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// Append-only chromosome name interner.
///
/// Emission sources share one instance so that chromosome indices are stable
/// across the reference and target streams of a run.
#[derive(Debug, Default)]
pub struct ChromIds {
    names: Mutex<Vec<Arc<str>>>,
}

impl ChromIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index for `name`, interning it on first use.
    pub fn intern(&self, name: &str) -> (ChromIdx, Arc<str>) {
        let mut names = self.names.lock().expect("chromosome interner poisoned");
        for (i, existing) in names.iter().enumerate() {
            if existing.as_ref() == name {
                return (ChromIdx::new(i as u16), existing.clone());
            }
        }
        let idx = ChromIdx::new(names.len() as u16);
        let name: Arc<str> = name.into();
        names.push(name.clone());
        (idx, name)
    }

    /// Returns the name previously interned at `idx`.
    pub fn name(&self, idx: ChromIdx) -> Option<Arc<str>> {
        let names = self.names.lock().expect("chromosome interner poisoned");
        names.get(idx.as_usize()).cloned()
    }
}

pub use genetic_map::GeneticMap;
pub use haplotype::{AlleleColumn, SampleHapPairs, Samples};
pub use marker::{Allele, Marker, Markers};

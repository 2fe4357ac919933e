//! # Per-Marker Emission Records
//!
//! A tagged variant over the concrete emission kinds produced by input
//! streams. The window iterator and the per-window views only rely on the
//! shared capability set: the marker, its chromosome and position, and a
//! per-haplotype allele accessor.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use crate::data::haplotype::{AlleleColumn, Samples};
use crate::data::marker::Marker;
use crate::data::ChromIdx;
use crate::error::Result;

/// One marker's worth of data from an input stream.
#[derive(Clone, Debug)]
pub enum MarkerEmission {
    /// Phased genotypes: one allele index per haplotype
    Genotypes(GenotypeRecord),
    /// Per-haplotype allele probabilities
    AlleleProbs(AlleleProbRecord),
    /// Per-sample genotype likelihoods (log10-scaled)
    Likelihoods(LikelihoodRecord),
}

#[derive(Clone, Debug)]
pub struct GenotypeRecord {
    pub marker: Marker,
    pub alleles: AlleleColumn,
    pub phased: bool,
}

#[derive(Clone, Debug)]
pub struct AlleleProbRecord {
    pub marker: Marker,
    /// Row-major: probs[hap * nAlleles + allele]
    pub probs: Vec<f32>,
    pub n_haps: usize,
}

#[derive(Clone, Debug)]
pub struct LikelihoodRecord {
    pub marker: Marker,
    /// Row-major: log10_likes[sample * nGenotypes + genotype], genotypes
    /// enumerated with a2 outer, a1 <= a2 inner
    pub log10_likes: Vec<f32>,
    pub n_samples: usize,
}

impl MarkerEmission {
    pub fn marker(&self) -> &Marker {
        match self {
            Self::Genotypes(r) => &r.marker,
            Self::AlleleProbs(r) => &r.marker,
            Self::Likelihoods(r) => &r.marker,
        }
    }

    pub fn chrom(&self) -> ChromIdx {
        self.marker().chrom()
    }

    pub fn pos(&self) -> u32 {
        self.marker().pos()
    }

    pub fn n_haps(&self) -> usize {
        match self {
            Self::Genotypes(r) => r.alleles.n_haps(),
            Self::AlleleProbs(r) => r.n_haps,
            Self::Likelihoods(r) => 2 * r.n_samples,
        }
    }

    /// The allele carried by a haplotype; for probabilistic kinds, the most
    /// probable allele.
    pub fn allele(&self, hap: usize) -> u8 {
        match self {
            Self::Genotypes(r) => r.alleles.get(hap),
            Self::AlleleProbs(r) => {
                let n_alleles = r.marker.n_alleles();
                let row = &r.probs[hap * n_alleles..(hap + 1) * n_alleles];
                arg_max(row)
            }
            Self::Likelihoods(r) => {
                let n_genotypes = r.marker.n_genotypes();
                let sample = hap / 2;
                let row = &r.log10_likes[sample * n_genotypes..(sample + 1) * n_genotypes];
                let (a1, a2) = genotype_alleles(arg_max(row) as usize);
                if hap % 2 == 0 {
                    a1
                } else {
                    a2
                }
            }
        }
    }

    /// Hard-called alleles for every haplotype as a packed column
    pub fn to_allele_column(&self) -> AlleleColumn {
        match self {
            Self::Genotypes(r) => r.alleles.clone(),
            _ => {
                let alleles: Vec<u8> = (0..self.n_haps()).map(|h| self.allele(h)).collect();
                AlleleColumn::from_alleles(&alleles, self.marker().n_alleles())
            }
        }
    }
}

fn arg_max(values: &[f32]) -> u8 {
    let mut best = 0usize;
    for (j, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = j;
        }
    }
    best as u8
}

/// Decompose a genotype index into its allele pair, enumerating with a2
/// outer and a1 <= a2 inner.
fn genotype_alleles(gt: usize) -> (u8, u8) {
    let mut idx = 0usize;
    for a2 in 0u8.. {
        for a1 in 0..=a2 {
            if idx == gt {
                return (a1, a2);
            }
            idx += 1;
        }
    }
    unreachable!()
}

/// A lazy, finite, forward-only source of per-marker emissions.
pub trait EmissionSource {
    /// Samples whose haplotypes the emissions describe
    fn samples(&self) -> &Arc<Samples>;

    /// Backing file, if the source reads one
    fn file(&self) -> Option<&Path>;

    /// The next emission, `None` at end of stream
    fn next_emission(&mut self) -> Result<Option<MarkerEmission>>;

    /// Releases any I/O resources held by the source
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// In-memory emission source used by tests and window replay.
pub struct MemorySource {
    samples: Arc<Samples>,
    emissions: VecDeque<MarkerEmission>,
}

impl MemorySource {
    pub fn new(samples: Arc<Samples>, emissions: Vec<MarkerEmission>) -> Self {
        Self {
            samples,
            emissions: emissions.into(),
        }
    }
}

impl EmissionSource for MemorySource {
    fn samples(&self) -> &Arc<Samples> {
        &self.samples
    }

    fn file(&self) -> Option<&Path> {
        None
    }

    fn next_emission(&mut self) -> Result<Option<MarkerEmission>> {
        Ok(self.emissions.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::marker::Allele;

    fn test_marker(n_alt: usize) -> Marker {
        let alts = (0..n_alt).map(|i| Allele::Base(1 + i as u8)).collect();
        Marker::new(ChromIdx::new(0), "chr1".into(), 100, None, Allele::Base(0), alts)
    }

    #[test]
    fn test_genotype_alleles_enumeration() {
        // genotype order for 3 alleles: (0,0) (0,1) (1,1) (0,2) (1,2) (2,2)
        assert_eq!(genotype_alleles(0), (0, 0));
        assert_eq!(genotype_alleles(1), (0, 1));
        assert_eq!(genotype_alleles(2), (1, 1));
        assert_eq!(genotype_alleles(3), (0, 2));
        assert_eq!(genotype_alleles(5), (2, 2));
    }

    #[test]
    fn test_allele_prob_emission_argmax() {
        let r = AlleleProbRecord {
            marker: test_marker(1),
            probs: vec![0.9, 0.1, 0.2, 0.8],
            n_haps: 2,
        };
        let e = MarkerEmission::AlleleProbs(r);
        assert_eq!(e.allele(0), 0);
        assert_eq!(e.allele(1), 1);
    }

    #[test]
    fn test_likelihood_emission_best_genotype() {
        let r = LikelihoodRecord {
            marker: test_marker(1),
            log10_likes: vec![-3.0, -0.1, -2.0],
            n_samples: 1,
        };
        let e = MarkerEmission::Likelihoods(r);
        // best genotype is het (0,1)
        assert_eq!(e.allele(0), 0);
        assert_eq!(e.allele(1), 1);
    }
}

//! # Posterior Probability Containers
//!
//! Per-haplotype posterior allele probabilities, the combined per-sample
//! view consumed by the record writer, and scaled per-genotype values.

use std::sync::Arc;

use crate::data::haplotype::Samples;
use crate::data::marker::{Marker, Markers};

/// Posterior allele probabilities for one target haplotype at every
/// reference marker, flattened with the markers' cumulative allele index.
#[derive(Clone, Debug)]
pub struct HapAlleleProbs {
    markers: Arc<Markers>,
    hap: usize,
    /// probs[markers.sum_alleles(m) + allele]
    probs: Vec<f32>,
}

impl HapAlleleProbs {
    pub fn new(markers: Arc<Markers>, hap: usize, probs: Vec<f32>) -> Self {
        assert_eq!(probs.len(), markers.total_alleles());
        Self {
            markers,
            hap,
            probs,
        }
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    pub fn hap(&self) -> usize {
        self.hap
    }

    #[inline]
    pub fn allele_prob(&self, marker: usize, allele: usize) -> f32 {
        self.probs[self.markers.sum_alleles(marker) + allele]
    }

    /// The most probable allele at a marker
    pub fn allele(&self, marker: usize) -> u8 {
        let start = self.markers.sum_alleles(marker);
        let n_alleles = self.markers.marker(marker).n_alleles();
        let mut best = 0usize;
        for a in 1..n_alleles {
            if self.probs[start + a] > self.probs[start + best] {
                best = a;
            }
        }
        best as u8
    }
}

/// Phased posterior allele probabilities for all target samples in a
/// window, combined from per-haplotype results in haplotype order.
pub struct AlleleProbs {
    markers: Arc<Markers>,
    samples: Arc<Samples>,
    by_hap: Vec<HapAlleleProbs>,
}

impl AlleleProbs {
    pub fn new(markers: Arc<Markers>, samples: Arc<Samples>, by_hap: Vec<HapAlleleProbs>) -> Self {
        assert_eq!(by_hap.len(), 2 * samples.n_samples());
        for (h, hap_probs) in by_hap.iter().enumerate() {
            assert_eq!(hap_probs.hap(), h, "haplotype results out of order");
        }
        Self {
            markers,
            samples,
            by_hap,
        }
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    pub fn samples(&self) -> &Arc<Samples> {
        &self.samples
    }

    pub fn n_markers(&self) -> usize {
        self.markers.len()
    }

    pub fn n_samples(&self) -> usize {
        self.samples.n_samples()
    }

    pub fn marker(&self, marker: usize) -> &Marker {
        self.markers.marker(marker)
    }

    /// Most probable allele on the sample's first haplotype
    pub fn allele1(&self, marker: usize, sample: usize) -> u8 {
        self.by_hap[2 * sample].allele(marker)
    }

    /// Most probable allele on the sample's second haplotype
    pub fn allele2(&self, marker: usize, sample: usize) -> u8 {
        self.by_hap[2 * sample + 1].allele(marker)
    }

    pub fn al_prob1(&self, marker: usize, sample: usize, allele: usize) -> f32 {
        self.by_hap[2 * sample].allele_prob(marker, allele)
    }

    pub fn al_prob2(&self, marker: usize, sample: usize, allele: usize) -> f32 {
        self.by_hap[2 * sample + 1].allele_prob(marker, allele)
    }

    /// Probability of the ordered genotype (a1 on hap 1, a2 on hap 2)
    pub fn gt_prob(&self, marker: usize, sample: usize, a1: usize, a2: usize) -> f32 {
        self.al_prob1(marker, sample, a1) * self.al_prob2(marker, sample, a2)
    }
}

/// Scaled per-genotype values for all samples at all markers. Genotypes are
/// enumerated with a2 outer and a1 <= a2 inner.
pub struct GenotypeValues {
    markers: Arc<Markers>,
    samples: Arc<Samples>,
    /// per marker: values[genotype * nSamples + sample]
    values: Vec<Vec<f32>>,
}

impl GenotypeValues {
    pub fn new(markers: Arc<Markers>, samples: Arc<Samples>) -> Self {
        let n_samples = samples.n_samples();
        let values = (0..markers.len())
            .map(|m| vec![0f32; markers.marker(m).n_genotypes() * n_samples])
            .collect();
        Self {
            markers,
            samples,
            values,
        }
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    pub fn samples(&self) -> &Arc<Samples> {
        &self.samples
    }

    pub fn n_markers(&self) -> usize {
        self.markers.len()
    }

    pub fn n_samples(&self) -> usize {
        self.samples.n_samples()
    }

    pub fn marker(&self, marker: usize) -> &Marker {
        self.markers.marker(marker)
    }

    #[inline]
    pub fn value(&self, marker: usize, sample: usize, genotype: usize) -> f32 {
        self.values[marker][genotype * self.samples.n_samples() + sample]
    }

    /// Adds to a stored value
    pub fn add(&mut self, marker: usize, sample: usize, genotype: usize, value: f32) {
        self.values[marker][genotype * self.samples.n_samples() + sample] += value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::marker::Allele;
    use crate::data::ChromIdx;

    fn markers(n: usize) -> Arc<Markers> {
        Arc::new(Markers::from_vec(
            (0..n)
                .map(|m| {
                    Marker::new(
                        ChromIdx::new(0),
                        "chr1".into(),
                        (m as u32 + 1) * 100,
                        None,
                        Allele::Base(0),
                        vec![Allele::Base(3)],
                    )
                })
                .collect(),
        ))
    }

    #[test]
    fn test_hap_allele_probs_argmax() {
        let markers = markers(2);
        let probs = vec![0.9, 0.1, 0.2, 0.8];
        let hap = HapAlleleProbs::new(markers, 0, probs);
        assert_eq!(hap.allele(0), 0);
        assert_eq!(hap.allele(1), 1);
        assert!((hap.allele_prob(1, 1) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_combined_gt_prob() {
        let markers = markers(1);
        let samples = Arc::new(Samples::from_ids(["S1"]).unwrap());
        let h0 = HapAlleleProbs::new(markers.clone(), 0, vec![0.9, 0.1]);
        let h1 = HapAlleleProbs::new(markers.clone(), 1, vec![0.25, 0.75]);
        let probs = AlleleProbs::new(markers, samples, vec![h0, h1]);
        assert_eq!(probs.allele1(0, 0), 0);
        assert_eq!(probs.allele2(0, 0), 1);
        assert!((probs.gt_prob(0, 0, 0, 1) - 0.675).abs() < 1e-6);
    }

    #[test]
    fn test_genotype_values_accumulate() {
        let markers = markers(1);
        let samples = Arc::new(Samples::from_ids(["S1", "S2"]).unwrap());
        let mut gv = GenotypeValues::new(markers, samples);
        gv.add(0, 1, 2, 0.5);
        gv.add(0, 1, 2, 0.25);
        assert!((gv.value(0, 1, 2) - 0.75).abs() < 1e-6);
        assert_eq!(gv.value(0, 0, 2), 0.0);
    }
}

//! # Posterior Genotype Statistics
//!
//! Per-marker statistics computed from posterior genotype or allele
//! probabilities: estimated allele frequencies and the squared-correlation
//! imputation quality measures.
//!
//! The squared correlations can be derived with the methods in Appendix 1
//! of Browning BL and Browning SR, Am J Hum Genet 2009;84(2):210-23.

use crate::data::marker::Marker;
use crate::model::allele_probs::{AlleleProbs, GenotypeValues};

pub struct GprobsStatistics {
    marker: Marker,
    n_samples: usize,
    allele_freq: Vec<f32>,
    sum_call: f32,
    sum_square_call: f32,
    sum_expected: f32,
    sum_expected_square: f32,
    sum_square_expected: f32,
    sum_call_expected: f32,
}

impl GprobsStatistics {
    /// Accumulates statistics from scaled posterior genotype probabilities.
    pub fn from_genotype_values(gv: &GenotypeValues, marker: usize) -> Self {
        let n_alleles = gv.marker(marker).n_alleles();
        let mut stats = Self::empty(gv.marker(marker).clone(), gv.n_samples(), n_alleles);
        let mut gt_probs = [0f32; 3];
        let mut al_probs = vec![0f32; n_alleles];
        for sample in 0..gv.n_samples() {
            set_probs_from_gv(gv, marker, sample, &mut gt_probs, &mut al_probs);
            stats.add_sample(&gt_probs, &al_probs);
        }
        stats.finish();
        stats
    }

    /// Accumulates statistics from phased posterior allele probabilities.
    pub fn from_allele_probs(al: &AlleleProbs, marker: usize) -> Self {
        let n_alleles = al.marker(marker).n_alleles();
        let mut stats = Self::empty(al.marker(marker).clone(), al.n_samples(), n_alleles);
        let mut gt_probs = [0f32; 3];
        let mut al_probs = vec![0f32; n_alleles];
        for sample in 0..al.n_samples() {
            set_probs_from_al(al, marker, sample, &mut gt_probs, &mut al_probs);
            stats.add_sample(&gt_probs, &al_probs);
        }
        stats.finish();
        stats
    }

    fn empty(marker: Marker, n_samples: usize, n_alleles: usize) -> Self {
        Self {
            marker,
            n_samples,
            allele_freq: vec![0f32; n_alleles],
            sum_call: 0.0,
            sum_square_call: 0.0,
            sum_expected: 0.0,
            sum_expected_square: 0.0,
            sum_square_expected: 0.0,
            sum_call_expected: 0.0,
        }
    }

    fn add_sample(&mut self, gt_probs: &[f32; 3], al_probs: &[f32]) {
        for (freq, &p) in self.allele_freq.iter_mut().zip(al_probs) {
            *freq += p;
        }
        let call = max_index(gt_probs) as f32;
        let exp = gt_probs[1] + 2.0 * gt_probs[2];
        let exp_square = gt_probs[1] + 4.0 * gt_probs[2];
        self.sum_call += call;
        self.sum_square_call += call * call;
        self.sum_expected += exp;
        self.sum_expected_square += exp_square;
        self.sum_square_expected += exp * exp;
        self.sum_call_expected += call * exp;
    }

    fn finish(&mut self) {
        let total: f32 = self.allele_freq.iter().sum();
        if total > 0.0 {
            for f in &mut self.allele_freq {
                *f /= total;
            }
        }
    }

    pub fn marker(&self) -> &Marker {
        &self.marker
    }

    /// Estimated sample frequency of each allele
    pub fn allele_freq(&self) -> &[f32] {
        &self.allele_freq
    }

    /// Estimated squared correlation between the most probable ALT dose and
    /// the true ALT dose; 0 when either dose is monomorphic.
    pub fn allelic_r2(&self) -> f32 {
        let f = 1.0 / self.n_samples as f32;
        let cov = self.sum_call_expected - self.sum_call * self.sum_expected * f;
        let var_best = self.sum_square_call - self.sum_call * self.sum_call * f;
        let var_exp = self.sum_expected_square - self.sum_expected * self.sum_expected * f;
        let den = var_best * var_exp;
        if den == 0.0 {
            0.0
        } else {
            ((cov * cov) / den).abs()
        }
    }

    /// Estimated squared correlation between the expected ALT dose and the
    /// true ALT dose; 0 when the marker is monomorphic.
    pub fn dose_r2(&self) -> f32 {
        let f = 1.0 / self.n_samples as f32;
        let num = self.sum_square_expected - self.sum_expected * self.sum_expected * f;
        let den = self.sum_expected_square - self.sum_expected * self.sum_expected * f;
        if den == 0.0 {
            0.0
        } else {
            (num / den).abs()
        }
    }

    /// Dose squared correlation with the true-dose variance estimated from
    /// the allele frequency under Hardy-Weinberg equilibrium.
    pub fn hwe_dose_r2(&self) -> f32 {
        let f = 1.0 / self.n_samples as f32;
        let num =
            (self.sum_square_expected - self.sum_expected * self.sum_expected * f) / self.n_samples as f32;
        let alt_freq = self.sum_expected / (2.0 * self.n_samples as f32);
        let den = 2.0 * alt_freq * (1.0 - alt_freq);
        if den == 0.0 {
            0.0
        } else {
            (num / den).abs()
        }
    }
}

/// Reduces per-genotype probabilities to hom-ref/het/alt buckets and allele
/// marginals, both normalized (allele marginals over 2 * sum).
fn set_probs_from_gv(
    gv: &GenotypeValues,
    marker: usize,
    sample: usize,
    gt_probs: &mut [f32; 3],
    al_probs: &mut [f32],
) {
    gt_probs.fill(0.0);
    al_probs.fill(0.0);
    let mut gt = 0usize;
    for a2 in 0..al_probs.len() {
        for a1 in 0..=a2 {
            let gprob = gv.value(marker, sample, gt);
            gt += 1;
            al_probs[a1] += gprob;
            al_probs[a2] += gprob;
            if a2 == 0 {
                gt_probs[0] += gprob;
            } else if a1 == 0 {
                gt_probs[1] += gprob;
            } else {
                gt_probs[2] += gprob;
            }
        }
    }
    normalize(gt_probs, al_probs);
}

fn set_probs_from_al(
    al: &AlleleProbs,
    marker: usize,
    sample: usize,
    gt_probs: &mut [f32; 3],
    al_probs: &mut [f32],
) {
    gt_probs.fill(0.0);
    al_probs.fill(0.0);
    for a2 in 0..al_probs.len() {
        for a1 in 0..=a2 {
            let mut gprob = al.gt_prob(marker, sample, a1, a2);
            if a1 != a2 {
                gprob += al.gt_prob(marker, sample, a2, a1);
            }
            al_probs[a1] += gprob;
            al_probs[a2] += gprob;
            if a2 == 0 {
                gt_probs[0] += gprob;
            } else if a1 == 0 {
                gt_probs[1] += gprob;
            } else {
                gt_probs[2] += gprob;
            }
        }
    }
    normalize(gt_probs, al_probs);
}

fn normalize(gt_probs: &mut [f32; 3], al_probs: &mut [f32]) {
    let sum: f32 = gt_probs.iter().sum();
    if sum > 0.0 {
        for p in gt_probs.iter_mut() {
            *p /= sum;
        }
        for p in al_probs.iter_mut() {
            *p /= 2.0 * sum;
        }
    }
}

fn max_index(values: &[f32; 3]) -> usize {
    let mut best = 0usize;
    for j in 1..values.len() {
        if values[j] > values[best] {
            best = j;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::haplotype::Samples;
    use crate::data::marker::{Allele, Markers};
    use crate::data::ChromIdx;
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;

    fn biallelic_markers() -> Arc<Markers> {
        Arc::new(Markers::from_vec(vec![Marker::new(
            ChromIdx::new(0),
            "chr1".into(),
            100,
            None,
            Allele::Base(0),
            vec![Allele::Base(3)],
        )]))
    }

    fn gv_with_uniform_probs(n_samples: usize, probs: [f32; 3]) -> GenotypeValues {
        let samples =
            Arc::new(Samples::from_ids((0..n_samples).map(|i| format!("S{}", i))).unwrap());
        let mut gv = GenotypeValues::new(biallelic_markers(), samples);
        for s in 0..n_samples {
            for (gt, &p) in probs.iter().enumerate() {
                gv.add(0, s, gt, p);
            }
        }
        gv
    }

    #[test]
    fn test_symmetric_probs_give_half_frequency_and_zero_r2() {
        // every sample (0.25, 0.5, 0.25): expected dose 1, zero variance
        let gv = gv_with_uniform_probs(4, [0.25, 0.5, 0.25]);
        let stats = GprobsStatistics::from_genotype_values(&gv, 0);
        assert_abs_diff_eq!(stats.allele_freq()[1], 0.5, epsilon = 1e-6);
        assert_eq!(stats.dose_r2(), 0.0);
        assert_eq!(stats.hwe_dose_r2(), 0.0);
    }

    #[test]
    fn test_monomorphic_marker_has_zero_r2() {
        let gv = gv_with_uniform_probs(5, [1.0, 0.0, 0.0]);
        let stats = GprobsStatistics::from_genotype_values(&gv, 0);
        assert_abs_diff_eq!(stats.allele_freq()[0], 1.0, epsilon = 1e-6);
        assert_eq!(stats.allelic_r2(), 0.0);
        assert_eq!(stats.dose_r2(), 0.0);
        assert_eq!(stats.hwe_dose_r2(), 0.0);
    }

    #[test]
    fn test_confident_calls_give_high_r2() {
        let samples = Arc::new(Samples::from_ids(["S0", "S1", "S2"]).unwrap());
        let mut gv = GenotypeValues::new(biallelic_markers(), samples);
        // three samples confidently hom-ref, het, hom-alt
        gv.add(0, 0, 0, 0.999);
        gv.add(0, 0, 1, 0.001);
        gv.add(0, 1, 1, 0.998);
        gv.add(0, 1, 0, 0.001);
        gv.add(0, 1, 2, 0.001);
        gv.add(0, 2, 2, 0.999);
        gv.add(0, 2, 1, 0.001);
        let stats = GprobsStatistics::from_genotype_values(&gv, 0);
        assert!(stats.allelic_r2() > 0.99);
        assert!(stats.dose_r2() > 0.99);
        assert_abs_diff_eq!(stats.allele_freq()[1], 0.5, epsilon = 1e-3);
    }
}

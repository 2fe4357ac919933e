//! # Imputation Data
//!
//! The immutable per-window input bundle for the imputation HMM: target
//! markers grouped into clusters of bounded genetic span, compact-coded
//! allele sequences per cluster, per-cluster error and recombination
//! probabilities, and per-marker interpolation weights.

use std::sync::Arc;

use crate::data::genetic_map::GeneticMap;
use crate::data::haplotype::{SampleHapPairs, Samples};
use crate::data::marker::Markers;
use crate::error::{Result, WeftError};
use crate::model::coder::HaplotypeCoder;
use crate::model::current_data::CurrentData;
use crate::model::parameters::ModelParams;
use crate::model::ref_segs::RefHapSegs;

/// Minimum genetic distance between positions, in cM
const MIN_CM_DIST: f64 = 1e-7;

const MAX_ERR_PROB: f32 = 0.5;

pub struct ImputationData {
    ref_hap_pairs: Arc<SampleHapPairs>,
    targ_hap_pairs: SampleHapPairs,
    ref_hap_segs: RefHapSegs,
    /// per cluster: compact-coded allele per reference haplotype
    ref_alleles: Vec<Vec<u32>>,
    /// per cluster: compact-coded allele per target haplotype
    targ_alleles: Vec<Vec<u32>>,
    err_prob: Vec<f32>,
    p_recomb: Vec<f32>,
    weight: Vec<f32>,
    n_clusters: usize,
}

impl ImputationData {
    /// Assembles the window's imputation inputs. The target haplotype pairs
    /// must agree with the current-data view on markers and samples.
    pub fn new(
        params: &ModelParams,
        cd: &CurrentData,
        targ_hap_pairs: SampleHapPairs,
        map: &GeneticMap,
    ) -> Result<Self> {
        if cd.target_markers() != targ_hap_pairs.markers() {
            return Err(WeftError::consistency(
                "target haplotypes do not match the window's target markers",
            ));
        }
        if cd.target_samples().as_ref() != targ_hap_pairs.samples().as_ref() {
            return Err(WeftError::consistency(
                "target haplotypes do not match the window's target samples",
            ));
        }
        let gt_end = cluster_ends(targ_hap_pairs.markers(), map, params.cluster_cm);
        let gt_start = cluster_starts(&gt_end);
        let n_clusters = gt_start.len();

        let coder = HaplotypeCoder::new(cd.restricted_ref_sample_hap_pairs(), &targ_hap_pairs);
        let mut ref_alleles = Vec::with_capacity(n_clusters);
        let mut targ_alleles = Vec::with_capacity(n_clusters);
        for j in 0..n_clusters {
            let (r, t) = coder.run(gt_start[j], gt_end[j]);
            ref_alleles.push(r);
            targ_alleles.push(t);
        }

        let ref_hap_pairs = cd.ref_sample_hap_pairs().clone();
        let ref_hap_segs = ref_hap_segs(
            ref_hap_pairs.clone(),
            &gt_start,
            &gt_end,
            cd.marker_indices(),
        );
        let err_prob = err_probs(params.err_rate, &gt_start, &gt_end);
        let p_recomb = p_recomb(&ref_hap_segs, map, params.ne);
        let weight = interp_weights(&ref_hap_segs, map);

        Ok(Self {
            ref_hap_pairs,
            targ_hap_pairs,
            ref_hap_segs,
            ref_alleles,
            targ_alleles,
            err_prob,
            p_recomb,
            weight,
            n_clusters,
        })
    }

    pub fn ref_hap_pairs(&self) -> &Arc<SampleHapPairs> {
        &self.ref_hap_pairs
    }

    pub fn targ_hap_pairs(&self) -> &SampleHapPairs {
        &self.targ_hap_pairs
    }

    pub fn ref_hap_segs(&self) -> &RefHapSegs {
        &self.ref_hap_segs
    }

    /// Number of target-marker clusters
    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn target_samples(&self) -> &Arc<Samples> {
        self.targ_hap_pairs.samples()
    }

    /// Compact-coded reference allele at a cluster
    #[inline]
    pub fn ref_allele(&self, cluster: usize, hap: usize) -> u32 {
        self.ref_alleles[cluster][hap]
    }

    /// Compact-coded target allele at a cluster
    #[inline]
    pub fn target_allele(&self, cluster: usize, hap: usize) -> u32 {
        self.targ_alleles[cluster][hap]
    }

    /// Allele error probability of a cluster
    #[inline]
    pub fn err_prob(&self, cluster: usize) -> f32 {
        self.err_prob[cluster]
    }

    /// `1 - errProb(cluster)`
    #[inline]
    pub fn no_err_prob(&self, cluster: usize) -> f32 {
        1.0 - self.err_prob[cluster]
    }

    /// Probability of recombination between a cluster and its predecessor;
    /// 0 for cluster 0
    #[inline]
    pub fn p_recomb(&self, cluster: usize) -> f32 {
        self.p_recomb[cluster]
    }

    /// Interpolation weight of a reference marker: NaN outside the clustered
    /// span, 1 inside a cluster, the forward weight strictly between
    /// clusters
    #[inline]
    pub fn weight(&self, marker: usize) -> f32 {
        self.weight[marker]
    }
}

/// Exclusive end index of each cluster: a new cluster starts whenever the
/// genetic distance from the cluster's first marker exceeds `cluster_cm`.
fn cluster_ends(target_markers: &Markers, map: &GeneticMap, cluster_cm: f64) -> Vec<usize> {
    let n_markers = target_markers.len();
    let mut ends = Vec::new();
    let mut start_pos = map.gen_pos(target_markers.marker(0));
    for m in 1..n_markers {
        let pos = map.gen_pos(target_markers.marker(m));
        if pos - start_pos > cluster_cm {
            ends.push(m);
            start_pos = pos;
        }
    }
    ends.push(n_markers);
    ends
}

fn cluster_starts(ends: &[usize]) -> Vec<usize> {
    let mut starts = vec![0; ends.len()];
    starts[1..].copy_from_slice(&ends[..ends.len() - 1]);
    starts
}

fn err_probs(err_rate: f32, gt_start: &[usize], gt_end: &[usize]) -> Vec<f32> {
    gt_start
        .iter()
        .zip(gt_end)
        .map(|(&s, &e)| (err_rate * (e - s) as f32).min(MAX_ERR_PROB))
        .collect()
}

/// Maps cluster bounds from target-marker to reference-marker coordinates
/// and builds the reference segments. A cluster's reference range runs from
/// its first typed marker through its last typed marker; untyped reference
/// markers between clusters belong to no cluster and are interpolated.
fn ref_hap_segs(
    ref_hap_pairs: Arc<SampleHapPairs>,
    gt_start: &[usize],
    gt_end: &[usize],
    marker_indices: &[usize],
) -> RefHapSegs {
    debug_assert_eq!(gt_start.len(), gt_end.len());
    let n = gt_start.len();
    let mut cluster_start = vec![0; n];
    let mut cluster_end = vec![0; n];
    for j in 0..n {
        cluster_start[j] = marker_indices[gt_start[j]];
        cluster_end[j] = marker_indices[gt_end[j] - 1] + 1;
    }
    RefHapSegs::new(ref_hap_pairs, cluster_start, cluster_end)
}

/// Li-Stephens recombination probability between consecutive clusters,
/// measured at the base-pair midpoints of the clusters' reference-marker
/// ranges: `1 - exp(-0.04 * Ne * genDist / nHaps)`.
fn p_recomb(ref_hap_segs: &RefHapSegs, map: &GeneticMap, ne: f32) -> Vec<f32> {
    let ref_markers = ref_hap_segs.ref_hap_pairs().markers();
    let n_haps = ref_hap_segs.ref_hap_pairs().n_haps();
    let chrom = ref_markers.marker(0).chrom_name().to_string();
    let n_clusters = ref_hap_segs.n_clusters();

    let mid_pos: Vec<u32> = (0..n_clusters)
        .map(|j| {
            let start_pos = ref_markers.marker(ref_hap_segs.cluster_start(j)).pos();
            let end_pos = ref_markers.marker(ref_hap_segs.cluster_end(j) - 1).pos();
            (start_pos + end_pos) / 2
        })
        .collect();

    // 0.04 = 4 / (100 cM/M)
    let c = -(0.04 * ne as f64 / n_haps as f64);
    let mut rr = vec![0f32; n_clusters];
    let mut last_gen_pos = map.gen_pos_at(&chrom, mid_pos[0]);
    for j in 1..n_clusters {
        let gen_pos = map.gen_pos_at(&chrom, mid_pos[j]);
        let gen_dist = (gen_pos - last_gen_pos).abs().max(MIN_CM_DIST);
        rr[j] = (-(c * gen_dist).exp_m1()) as f32;
        last_gen_pos = gen_pos;
    }
    rr
}

/// Per-reference-marker interpolation weights: NaN before the first cluster
/// start and from the last cluster start onward, 1 inside a cluster, and a
/// linear decay in cumulative genetic position strictly between clusters.
fn interp_weights(ref_hap_segs: &RefHapSegs, map: &GeneticMap) -> Vec<f32> {
    let ref_markers = ref_hap_segs.ref_hap_pairs().markers();
    let cum_pos = cum_pos(ref_markers, map);
    let n_markers = ref_markers.len();
    let n_clusters = ref_hap_segs.n_clusters();
    let mut wts = vec![f32::NAN; n_markers];
    for j in 0..n_clusters.saturating_sub(1) {
        let start = ref_hap_segs.cluster_start(j);
        let end = ref_hap_segs.cluster_end(j);
        let next_start = ref_hap_segs.cluster_start(j + 1);
        let next_start_pos = cum_pos[next_start];
        let total_length = next_start_pos - cum_pos[end - 1];
        wts[start..end].fill(1.0);
        for m in end..next_start {
            wts[m] = ((next_start_pos - cum_pos[m]) / total_length) as f32;
        }
    }
    let last_start = ref_hap_segs.cluster_start(n_clusters - 1);
    wts[last_start..].fill(f32::NAN);
    wts
}

/// Cumulative genetic position of each reference marker, with consecutive
/// distances floored at `MIN_CM_DIST`.
fn cum_pos(markers: &Markers, map: &GeneticMap) -> Vec<f64> {
    let mut cum_pos = vec![0.0; markers.len()];
    let mut last_gen_pos = map.gen_pos(markers.marker(0));
    for j in 1..markers.len() {
        let gen_pos = map.gen_pos(markers.marker(j));
        let gen_dist = (gen_pos - last_gen_pos).abs().max(MIN_CM_DIST);
        cum_pos[j] = cum_pos[j - 1] + gen_dist;
        last_gen_pos = gen_pos;
    }
    cum_pos
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::haplotype::AlleleColumn;
    use crate::data::marker::{Allele, Marker};
    use crate::data::ChromIdx;
    use crate::io::emission::{GenotypeRecord, MarkerEmission};

    fn test_marker(pos: u32) -> Marker {
        Marker::new(
            ChromIdx::new(0),
            "chr1".into(),
            pos,
            None,
            Allele::Base(0),
            vec![Allele::Base(3)],
        )
    }

    fn window_fixture(
        ref_positions: &[u32],
        targ_positions: &[u32],
    ) -> (CurrentData, SampleHapPairs) {
        let ref_samples = Arc::new(Samples::from_ids(["R1", "R2"]).unwrap());
        let window: Vec<MarkerEmission> = ref_positions
            .iter()
            .enumerate()
            .map(|(m, &pos)| {
                MarkerEmission::Genotypes(GenotypeRecord {
                    marker: test_marker(pos),
                    alleles: AlleleColumn::from_alleles(&[(m % 2) as u8, 1, 0, 0], 2),
                    phased: true,
                })
            })
            .collect();

        let targ_samples = Arc::new(Samples::from_ids(["T1"]).unwrap());
        let targ_markers = Arc::new(Markers::from_vec(
            targ_positions.iter().map(|&p| test_marker(p)).collect(),
        ));
        let targ_columns = targ_positions
            .iter()
            .map(|_| AlleleColumn::from_alleles(&[0, 1], 2))
            .collect();
        let targ =
            SampleHapPairs::new(targ_samples, targ_markers, targ_columns).unwrap();

        let cd = CurrentData::new(&window, ref_samples, 0, 0, true, &targ).unwrap();
        (cd, targ)
    }

    /// Markers 1 Mb apart are 1 cM apart under the constant map.
    #[test]
    fn test_clusters_cover_target_markers() {
        let positions: Vec<u32> = (0..8).map(|i| 1_000_000 * (i + 1)).collect();
        let (cd, targ) = window_fixture(&positions, &positions);
        let params = ModelParams {
            cluster_cm: 1.5,
            ..ModelParams::default()
        };
        let data =
            ImputationData::new(&params, &cd, targ, &GeneticMap::constant()).unwrap();

        // disjoint cover of [0, nTargetMarkers)
        let segs = data.ref_hap_segs();
        let mut covered = 0;
        for j in 0..data.n_clusters() {
            assert_eq!(segs.cluster_start(j), covered);
            assert!(segs.cluster_end(j) > segs.cluster_start(j));
            covered = segs.cluster_end(j);
        }
        assert_eq!(covered, 8);
        assert!(data.n_clusters() > 1);
    }

    #[test]
    fn test_err_prob_scales_with_cluster_size_and_clamps() {
        assert_eq!(err_probs(1e-4, &[0, 3], &[3, 4]), vec![3e-4, 1e-4]);
        // gigantic cluster clamps at 0.5
        assert_eq!(err_probs(0.2, &[0], &[100]), vec![0.5]);
    }

    #[test]
    fn test_p_recomb_in_unit_interval_and_zero_first() {
        let positions: Vec<u32> = (0..6).map(|i| 1_000_000 * (i + 1)).collect();
        let (cd, targ) = window_fixture(&positions, &positions);
        let params = ModelParams {
            cluster_cm: 0.5,
            ne: 10.0,
            ..ModelParams::default()
        };
        let data =
            ImputationData::new(&params, &cd, targ, &GeneticMap::constant()).unwrap();
        assert_eq!(data.p_recomb(0), 0.0);
        for c in 1..data.n_clusters() {
            assert!(data.p_recomb(c) > 0.0 && data.p_recomb(c) < 1.0);
        }
    }

    #[test]
    fn test_weights() {
        // target markers at the ends; untyped reference markers between
        let ref_positions: Vec<u32> = vec![
            1_000_000, 2_000_000, 3_000_000, 4_000_000, 5_000_000,
        ];
        let targ_positions = vec![1_000_000, 5_000_000];
        let (cd, targ) = window_fixture(&ref_positions, &targ_positions);
        let params = ModelParams {
            cluster_cm: 0.5,
            ..ModelParams::default()
        };
        let data =
            ImputationData::new(&params, &cd, targ, &GeneticMap::constant()).unwrap();
        assert_eq!(data.n_clusters(), 2);

        // inside cluster 0 (marker 0): weight 1
        assert_eq!(data.weight(0), 1.0);
        // between clusters: linear decay toward the next cluster start
        assert!((data.weight(1) - 0.75).abs() < 1e-6);
        assert!((data.weight(2) - 0.5).abs() < 1e-6);
        assert!((data.weight(3) - 0.25).abs() < 1e-6);
        // from the last cluster start onward: NaN
        assert!(data.weight(4).is_nan());
    }

    #[test]
    fn test_mismatched_target_markers_rejected() {
        let positions: Vec<u32> = vec![1_000_000, 2_000_000];
        let (cd, _) = window_fixture(&positions, &positions);
        let (_, other_targ) = window_fixture(&positions, &positions[..1]);
        let params = ModelParams::default();
        assert!(matches!(
            ImputationData::new(&params, &cd, other_targ, &GeneticMap::constant()),
            Err(WeftError::Consistency { .. })
        ));
    }
}

//! # Li-Stephens Forward-Backward Engine
//!
//! Estimates posterior allele probabilities at every reference marker for a
//! single target haplotype. HMM states are reference haplotypes, one
//! emission per target-marker cluster; transitions model recombination
//! between cluster midpoints.
//!
//! The forward pass stores at most `ceil(sqrt(1 + 8C) / 2) + 1` columns in
//! low-memory mode. Columns are addressed in a triangular wave: when the
//! backward sweep steps past the oldest retained column, the engine
//! re-materializes the forward recurrence from the last checkpoint, so
//! forward storage stays O(sqrt(C) * n) while recurrence values are exact.
//!
//! Instances are not thread-safe; each worker owns one engine.

use std::sync::Arc;

use crate::model::allele_probs::HapAlleleProbs;
use crate::model::imp_data::ImputationData;

pub struct LsHapBaum {
    imp_data: Arc<ImputationData>,
    /// number of reference haplotypes
    n: usize,
    allele_probs: Vec<f32>,
    fwd_val: Vec<Vec<f32>>,
    bwd_val: Vec<f32>,
    em_bwd_val: Vec<f32>,
    /// cluster whose forward values each retained column holds
    fwd_index_to_cluster: Vec<usize>,
    /// fwd_hap_probs[c][s]: forward sequence probabilities of segment c+1
    fwd_hap_probs: Vec<Vec<f32>>,
    /// bwd_hap_probs[c][s]: backward sequence probabilities of segment c
    bwd_hap_probs: Vec<Vec<f32>>,
    em_bwd_sum: f32,
    window_index: i64,
    array_index: i64,
}

impl LsHapBaum {
    /// Allocates all scratch buffers for the window; `low_mem` selects the
    /// checkpointed forward buffer over one column per cluster.
    pub fn new(imp_data: Arc<ImputationData>, low_mem: bool) -> Self {
        let n = imp_data.ref_hap_pairs().n_haps();
        let n_clusters = imp_data.n_clusters();
        let size = if low_mem {
            ((1.0 + 8.0 * n_clusters as f64).sqrt() / 2.0).ceil() as usize + 1
        } else {
            n_clusters
        };
        let segs = imp_data.ref_hap_segs();
        let fwd_hap_probs = (0..n_clusters).map(|j| vec![0f32; segs.n_seq(j + 1)]).collect();
        let bwd_hap_probs = (0..n_clusters).map(|j| vec![0f32; segs.n_seq(j)]).collect();
        let n_allele_slots = imp_data.ref_hap_pairs().markers().total_alleles();
        Self {
            imp_data,
            n,
            allele_probs: vec![0f32; n_allele_slots],
            fwd_val: vec![vec![0f32; n]; size],
            bwd_val: vec![0f32; n],
            em_bwd_val: vec![0f32; n],
            fwd_index_to_cluster: vec![0; size],
            fwd_hap_probs,
            bwd_hap_probs,
            em_bwd_sum: 0.0,
            window_index: -9999,
            array_index: -9999,
        }
    }

    pub fn imputation_data(&self) -> &Arc<ImputationData> {
        &self.imp_data
    }

    /// Estimates allele probabilities for one target haplotype, conditional
    /// on the HMM and the window's imputation data.
    pub fn impute(&mut self, hap: usize) -> HapAlleleProbs {
        let n_clusters = self.imp_data.n_clusters();
        self.allele_probs.fill(0.0);
        self.set_fwd_values(hap);
        self.set_init_bwd_value(hap);
        self.set_state_probs(n_clusters - 1, self.current_index());
        for m in (0..n_clusters.saturating_sub(1)).rev() {
            self.set_bwd_value(m, hap);
            let fwd_index = self.previous_index(hap);
            self.set_state_probs(m, fwd_index);
        }
        self.set_allele_probs();
        HapAlleleProbs::new(
            self.imp_data.ref_hap_pairs().markers_arc(),
            hap,
            self.allele_probs.clone(),
        )
    }

    fn set_fwd_values(&mut self, hap: usize) {
        let n_clusters = self.imp_data.n_clusters();
        self.window_index = 0;
        self.array_index = -1;
        for m in 0..n_clusters {
            let mut sum = 0f32;
            let prob_rec = self.imp_data.p_recomb(m);
            let prev = self.current_index();
            let next = self.next_index();
            self.fwd_index_to_cluster[next] = m;
            let a = self.imp_data.target_allele(m, hap);
            let (err, no_err) = (self.imp_data.err_prob(m), self.imp_data.no_err_prob(m));
            for h in 0..self.n {
                let em = if a == self.imp_data.ref_allele(m, h) {
                    no_err
                } else {
                    err
                };
                let x = if m == 0 {
                    1.0
                } else {
                    prob_rec / self.n as f32 + (1.0 - prob_rec) * self.fwd_val[prev][h]
                };
                self.fwd_val[next][h] = em * x;
                sum += self.fwd_val[next][h];
            }
            scale(&mut self.fwd_val[next], sum);
        }
    }

    fn set_init_bwd_value(&mut self, hap: usize) {
        let m = self.imp_data.n_clusters() - 1;
        let f = 1f32 / self.n as f32;
        self.em_bwd_sum = 0.0;
        let a = self.imp_data.target_allele(m, hap);
        let (err, no_err) = (self.imp_data.err_prob(m), self.imp_data.no_err_prob(m));
        for h in 0..self.n {
            let em = if a == self.imp_data.ref_allele(m, h) {
                no_err
            } else {
                err
            };
            self.bwd_val[h] = f;
            self.em_bwd_val[h] = f * em;
            self.em_bwd_sum += self.em_bwd_val[h];
        }
    }

    fn set_bwd_value(&mut self, m: usize, hap: usize) {
        let mut bwd_sum = 0f32;
        let prob_rec = self.imp_data.p_recomb(m + 1);
        let common_term = self.em_bwd_sum * prob_rec / self.n as f32;
        for h in 0..self.n {
            self.bwd_val[h] = common_term + (1.0 - prob_rec) * self.em_bwd_val[h];
            bwd_sum += self.bwd_val[h];
        }
        let a = self.imp_data.target_allele(m, hap);
        let (err, no_err) = (self.imp_data.err_prob(m), self.imp_data.no_err_prob(m));
        self.em_bwd_sum = 0.0;
        for h in 0..self.n {
            self.bwd_val[h] /= bwd_sum; // normalize first
            let em = if a == self.imp_data.ref_allele(m, h) {
                no_err
            } else {
                err
            };
            self.em_bwd_val[h] = em * self.bwd_val[h];
            self.em_bwd_sum += self.em_bwd_val[h];
        }
    }

    /// Projects the state probabilities of cluster `m` onto the distinct
    /// sequence indices of the segments on either side of the cluster.
    fn set_state_probs(&mut self, m: usize, fwd_index: usize) {
        let imp = self.imp_data.clone();
        let segs = imp.ref_hap_segs();
        self.fwd_hap_probs[m].fill(0.0);
        self.bwd_hap_probs[m].fill(0.0);
        for h in 0..self.n {
            let state_probs = self.fwd_val[fwd_index][h] * self.bwd_val[h];
            self.fwd_hap_probs[m][segs.seq(m + 1, h) as usize] += state_probs;
            self.bwd_hap_probs[m][segs.seq(m, h) as usize] += state_probs;
        }
        let fwd_sum = sum(&self.fwd_hap_probs[m]);
        scale(&mut self.fwd_hap_probs[m], fwd_sum);
        let bwd_sum = sum(&self.bwd_hap_probs[m]);
        scale(&mut self.bwd_hap_probs[m], bwd_sum);
    }

    fn set_allele_probs(&mut self) {
        let n_clusters = self.imp_data.ref_hap_segs().n_clusters();
        self.set_first_allele_probs();
        for cluster in 1..n_clusters {
            self.set_cluster_allele_probs(cluster);
        }
        self.set_last_allele_probs();
    }

    /// Markers before the first cluster start take the backward sequence
    /// probabilities of segment 0.
    fn set_first_allele_probs(&mut self) {
        let imp = self.imp_data.clone();
        let segs = imp.ref_hap_segs();
        let markers = imp.ref_hap_pairs().markers();
        let segment = 0;
        let ref_marker = segs.cluster_start(segment);
        let n_seq = segs.n_seq(segment);
        let threshold = threshold(n_seq);
        for seq in 0..n_seq {
            let p = self.bwd_hap_probs[segment][seq];
            if p >= threshold {
                for m in 0..ref_marker {
                    let start = markers.sum_alleles(m);
                    let allele = segs.allele(segment, m, seq) as usize;
                    self.allele_probs[start + allele] += p;
                }
            }
        }
    }

    /// Markers of cluster `cluster - 1` take its forward sequence
    /// probabilities; untyped markers before cluster `cluster` blend forward
    /// and backward by the interpolation weight.
    fn set_cluster_allele_probs(&mut self, cluster: usize) {
        debug_assert!(cluster > 0);
        let imp = self.imp_data.clone();
        let segs = imp.ref_hap_segs();
        let markers = imp.ref_hap_pairs().markers();
        let start_ref_marker = segs.cluster_start(cluster - 1);
        let mid_ref_marker = segs.cluster_end(cluster - 1);
        let end_ref_marker = segs.cluster_start(cluster);
        let n_seq = segs.n_seq(cluster);
        let threshold = threshold(n_seq);
        for seq in 0..n_seq {
            let fwd = self.fwd_hap_probs[cluster - 1][seq];
            let bwd = self.bwd_hap_probs[cluster][seq];
            let use_fwd = fwd >= threshold;
            let use_bwd = bwd >= threshold;
            if use_fwd {
                for m in start_ref_marker..mid_ref_marker {
                    let start = markers.sum_alleles(m);
                    let allele = segs.allele(cluster, m - start_ref_marker, seq) as usize;
                    self.allele_probs[start + allele] += fwd;
                }
            }
            if use_fwd || use_bwd {
                for m in mid_ref_marker..end_ref_marker {
                    let start = markers.sum_alleles(m);
                    let allele = segs.allele(cluster, m - start_ref_marker, seq) as usize;
                    let wt = self.imp_data.weight(m);
                    self.allele_probs[start + allele] += wt * fwd;
                    self.allele_probs[start + allele] += (1.0 - wt) * bwd;
                }
            }
        }
    }

    /// Markers from the last cluster start onward take the forward sequence
    /// probabilities of the last segment.
    fn set_last_allele_probs(&mut self) {
        let imp = self.imp_data.clone();
        let segs = imp.ref_hap_segs();
        let markers = imp.ref_hap_pairs().markers();
        let segment = segs.n_clusters();
        let cluster = segment - 1;
        let ref_marker_start = segs.cluster_start(cluster);
        let ref_marker_end = self.imp_data.ref_hap_pairs().n_markers();
        let n_seq = segs.n_seq(segment);
        let threshold = threshold(n_seq);
        for seq in 0..n_seq {
            let p = self.fwd_hap_probs[cluster][seq];
            if p >= threshold {
                for m in ref_marker_start..ref_marker_end {
                    let start = markers.sum_alleles(m);
                    let allele = segs.allele(segment, m - ref_marker_start, seq) as usize;
                    self.allele_probs[start + allele] += p;
                }
            }
        }
    }

    fn next_index(&mut self) -> usize {
        self.array_index += 1;
        if self.array_index == self.fwd_val.len() as i64 {
            self.window_index += 1;
            self.array_index = self.window_index;
        }
        self.array_index as usize
    }

    fn current_index(&self) -> usize {
        self.array_index as usize
    }

    /// The forward column for the previous cluster. When the sweep steps
    /// onto the triangular-wave boundary, forward values from the preceding
    /// checkpoint are recomputed into the tail of the buffer.
    fn previous_index(&mut self, hap: usize) -> usize {
        if self.array_index == self.window_index {
            self.window_index -= 1;
            self.array_index = self.window_index;
            let start = self.fwd_index_to_cluster[self.array_index as usize] + 1;
            let end = start + (self.fwd_val.len() - (self.array_index as usize + 1));
            for m in start..end {
                let mut sum = 0f32;
                let prob_rec = self.imp_data.p_recomb(m);
                let prev = self.current_index();
                let next = self.next_index();
                self.fwd_index_to_cluster[next] = m;
                let a = self.imp_data.target_allele(m, hap);
                let (err, no_err) = (self.imp_data.err_prob(m), self.imp_data.no_err_prob(m));
                for h in 0..self.n {
                    let em = if a == self.imp_data.ref_allele(m, h) {
                        no_err
                    } else {
                        err
                    };
                    // m > 0 on this path
                    let x = prob_rec / self.n as f32 + (1.0 - prob_rec) * self.fwd_val[prev][h];
                    self.fwd_val[next][h] = em * x;
                    sum += self.fwd_val[next][h];
                }
                scale(&mut self.fwd_val[next], sum);
            }
            self.array_index as usize
        } else {
            self.array_index -= 1;
            self.array_index as usize
        }
    }
}

fn threshold(n_seq: usize) -> f32 {
    0.5 / n_seq as f32
}

fn sum(values: &[f32]) -> f32 {
    values.iter().sum()
}

fn scale(values: &mut [f32], divisor: f32) {
    for v in values.iter_mut() {
        *v /= divisor;
    }
}

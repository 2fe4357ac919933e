//! # Reference Haplotype Segments
//!
//! Reference haplotypes over chromosome segments bounded by marker
//! clusters. Each segment maps every reference haplotype to the index of its
//! distinct allele sequence within the segment; alleles are looked up
//! through a representative haplotype per sequence instead of materializing
//! the sequence matrix.
//!
//! There are `nClusters + 1` segments: segment 0 runs from the window start
//! to the end of cluster 0, segment `j` (0 < j < nClusters) from the start
//! of cluster `j-1` to the end of cluster `j`, and segment `nClusters` from
//! the start of the last cluster to the window end. Neighbouring segments
//! overlap by one cluster on each side, which the allele projection step
//! relies on.

use std::collections::HashMap;
use std::sync::Arc;

use rayon::prelude::*;

use crate::data::haplotype::SampleHapPairs;

/// One contiguous reference-marker segment.
#[derive(Clone, Debug)]
pub struct RefHapSeg {
    start: usize,
    end: usize,
    /// reference haplotype -> distinct-sequence index
    hap_to_seq: Vec<u32>,
    /// distinct-sequence index -> representative haplotype
    seq_rep_hap: Vec<u32>,
}

impl RefHapSeg {
    fn new(ref_haps: &SampleHapPairs, start: usize, end: usize) -> Self {
        assert!(start < end && end <= ref_haps.n_markers());
        let n_haps = ref_haps.n_haps();
        let mut vocab: HashMap<Vec<u8>, u32> = HashMap::new();
        let mut hap_to_seq = Vec::with_capacity(n_haps);
        let mut seq_rep_hap: Vec<u32> = Vec::new();
        let mut seq = vec![0u8; end - start];
        for h in 0..n_haps {
            for (i, m) in (start..end).enumerate() {
                seq[i] = ref_haps.allele(m, h);
            }
            let code = match vocab.get(&seq) {
                Some(&code) => code,
                None => {
                    let code = seq_rep_hap.len() as u32;
                    vocab.insert(seq.clone(), code);
                    seq_rep_hap.push(h as u32);
                    code
                }
            };
            hap_to_seq.push(code);
        }
        Self {
            start,
            end,
            hap_to_seq,
            seq_rep_hap,
        }
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn n_seq(&self) -> usize {
        self.seq_rep_hap.len()
    }

    pub fn seq(&self, hap: usize) -> u32 {
        self.hap_to_seq[hap]
    }
}

/// Reference haplotype segments for one window.
pub struct RefHapSegs {
    ref_hap_pairs: Arc<SampleHapPairs>,
    cluster_start: Vec<usize>,
    cluster_end: Vec<usize>,
    segs: Vec<RefHapSeg>,
}

impl RefHapSegs {
    /// Builds the `nClusters + 1` segments in parallel. Cluster bounds are
    /// reference-marker indices and must be non-overlapping, in order, and
    /// within the marker range.
    pub fn new(
        ref_hap_pairs: Arc<SampleHapPairs>,
        cluster_start: Vec<usize>,
        cluster_end: Vec<usize>,
    ) -> Self {
        let n_markers = ref_hap_pairs.n_markers();
        check_clusters(&cluster_start, &cluster_end, n_markers);
        let n_clusters = cluster_start.len();
        let segs: Vec<RefHapSeg> = (0..=n_clusters)
            .into_par_iter()
            .map(|j| {
                let start = if j == 0 { 0 } else { cluster_start[j - 1] };
                let end = if j == n_clusters {
                    n_markers
                } else {
                    cluster_end[j]
                };
                RefHapSeg::new(&ref_hap_pairs, start, end)
            })
            .collect();
        Self {
            ref_hap_pairs,
            cluster_start,
            cluster_end,
            segs,
        }
    }

    pub fn ref_hap_pairs(&self) -> &Arc<SampleHapPairs> {
        &self.ref_hap_pairs
    }

    /// Number of marker clusters; segments are indexed 0..=nClusters
    pub fn n_clusters(&self) -> usize {
        self.cluster_start.len()
    }

    /// First reference-marker index (inclusive) of a cluster
    pub fn cluster_start(&self, cluster: usize) -> usize {
        self.cluster_start[cluster]
    }

    /// Last reference-marker index (exclusive) of a cluster
    pub fn cluster_end(&self, cluster: usize) -> usize {
        self.cluster_end[cluster]
    }

    /// Number of distinct reference allele sequences in a segment;
    /// valid for `segment` in the inclusive range [0, nClusters]
    pub fn n_seq(&self, segment: usize) -> usize {
        self.segs[segment].n_seq()
    }

    /// Number of markers spanned by a segment
    pub fn n_markers(&self, segment: usize) -> usize {
        self.segs[segment].end - self.segs[segment].start
    }

    /// Distinct-sequence index of a reference haplotype in a segment
    pub fn seq(&self, segment: usize, hap: usize) -> u32 {
        self.segs[segment].seq(hap)
    }

    /// Allele of a distinct sequence at a marker offset within a segment
    pub fn allele(&self, segment: usize, marker: usize, seq: usize) -> u8 {
        let seg = &self.segs[segment];
        debug_assert!(marker < seg.end - seg.start);
        let rep_hap = seg.seq_rep_hap[seq] as usize;
        self.ref_hap_pairs.allele(seg.start + marker, rep_hap)
    }
}

fn check_clusters(starts: &[usize], ends: &[usize], n_markers: usize) {
    assert_eq!(starts.len(), ends.len(), "inconsistent cluster bounds");
    assert!(!starts.is_empty(), "no marker clusters");
    assert!(
        *ends.last().unwrap() <= n_markers,
        "cluster end beyond marker range"
    );
    for j in 0..starts.len() {
        assert!(starts[j] < ends[j], "empty marker cluster");
        if j > 0 {
            assert!(ends[j - 1] <= starts[j], "overlapping marker clusters");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::haplotype::{AlleleColumn, Samples};
    use crate::data::marker::{Allele, Marker, Markers};
    use crate::data::ChromIdx;

    /// 4 haps x 5 markers; haps 0 and 2 are identical everywhere
    fn ref_haps() -> Arc<SampleHapPairs> {
        let samples = Arc::new(Samples::from_ids(["R1", "R2"]).unwrap());
        let markers = Arc::new(Markers::from_vec(
            (0..5)
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
        ));
        let rows: [[u8; 4]; 5] = [
            [0, 1, 0, 1],
            [0, 0, 0, 1],
            [1, 0, 1, 0],
            [0, 1, 0, 0],
            [1, 1, 1, 0],
        ];
        let columns = rows
            .iter()
            .map(|r| AlleleColumn::from_alleles(r, 2))
            .collect();
        Arc::new(SampleHapPairs::new(samples, markers, columns).unwrap())
    }

    #[test]
    fn test_segment_bounds() {
        let segs = RefHapSegs::new(ref_haps(), vec![1, 3], vec![2, 4]);
        assert_eq!(segs.n_clusters(), 2);
        // segment 0: [0, 2), segment 1: [1, 4), segment 2: [3, 5)
        assert_eq!(segs.n_markers(0), 2);
        assert_eq!(segs.n_markers(1), 3);
        assert_eq!(segs.n_markers(2), 2);
    }

    #[test]
    fn test_distinct_sequences() {
        let segs = RefHapSegs::new(ref_haps(), vec![0], vec![5]);
        // one cluster spanning everything: segments 0 and 1 both cover [0,5)
        for segment in 0..=1 {
            assert_eq!(segs.n_seq(segment), 3);
            assert_eq!(segs.seq(segment, 0), segs.seq(segment, 2));
            assert_ne!(segs.seq(segment, 0), segs.seq(segment, 1));
        }
    }

    #[test]
    fn test_allele_lookup() {
        let segs = RefHapSegs::new(ref_haps(), vec![1, 3], vec![2, 4]);
        // segment 1 spans [1, 4); hap 3 alleles there are 1, 0, 0
        let seq3 = segs.seq(1, 3) as usize;
        assert_eq!(segs.allele(1, 0, seq3), 1);
        assert_eq!(segs.allele(1, 1, seq3), 0);
        assert_eq!(segs.allele(1, 2, seq3), 0);
    }

    #[test]
    #[should_panic(expected = "overlapping marker clusters")]
    fn test_overlapping_clusters_panic() {
        RefHapSegs::new(ref_haps(), vec![0, 1], vec![2, 3]);
    }
}

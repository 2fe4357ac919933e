//! # Current-Data View
//!
//! A per-window bundle identifying the window's reference markers, target
//! markers, sample sets, and splice indices. The splice indices divide the
//! window into the overlap the previous window already wrote, the region
//! this window is authoritative for, and the overlap the next window will
//! write.
//!
//! Consistency between the window's components is validated here, at window
//! entry; violations indicate a bug in an upstream component and are fatal.

use std::sync::Arc;

use crate::data::haplotype::{SampleHapPairs, Samples};
use crate::data::marker::Markers;
use crate::error::{Result, WeftError};
use crate::io::emission::MarkerEmission;

pub struct CurrentData {
    markers: Arc<Markers>,
    target_markers: Arc<Markers>,
    /// target-marker index -> reference-marker index within the window
    marker_indices: Vec<usize>,
    ref_hap_pairs: Arc<SampleHapPairs>,
    restricted_ref_hap_pairs: SampleHapPairs,
    target_samples: Arc<Samples>,
    prev_splice: usize,
    next_splice: usize,
    next_overlap_start: usize,
    prev_target_splice: usize,
    next_target_splice: usize,
    next_target_overlap: usize,
}

impl CurrentData {
    /// Builds the view for one window.
    ///
    /// `overlap` is the realized overlap with the previous window;
    /// `next_overlap` is the overlap the next advance will realize (already
    /// extended over position ties); `last_window_on_chrom` marks windows
    /// whose output runs to the end of the window.
    pub fn new(
        window: &[MarkerEmission],
        ref_samples: Arc<Samples>,
        overlap: usize,
        next_overlap: usize,
        last_window_on_chrom: bool,
        targ_hap_pairs: &SampleHapPairs,
    ) -> Result<Self> {
        if window.is_empty() {
            return Err(WeftError::state("empty marker window"));
        }
        let n = window.len();
        let n_ref_haps = 2 * ref_samples.n_samples();
        let mut markers = Markers::new();
        for e in window {
            if e.n_haps() != n_ref_haps {
                return Err(WeftError::consistency(format!(
                    "emission at {}:{} has {} haplotypes, expected {}",
                    e.marker().chrom_name(),
                    e.pos(),
                    e.n_haps(),
                    n_ref_haps
                )));
            }
            markers.push(e.marker().clone());
        }
        let markers = Arc::new(markers);

        let marker_indices = marker_indices(&markers, targ_hap_pairs.markers())?;
        let columns = window.iter().map(|e| e.to_allele_column()).collect();
        let ref_hap_pairs = Arc::new(SampleHapPairs::new(
            ref_samples,
            markers.clone(),
            columns,
        )?);
        let restricted_ref_hap_pairs = ref_hap_pairs.restrict(&marker_indices);

        // The authoritative region boundary sits at the overlap midpoint on
        // both sides, so consecutive windows partition the chromosome.
        let prev_splice = overlap / 2;
        let (next_overlap_start, next_splice) = if last_window_on_chrom {
            (n, n)
        } else {
            let next_overlap = next_overlap.min(n);
            (n - next_overlap, n - next_overlap + next_overlap / 2)
        };
        let prev_target_splice = marker_indices.partition_point(|&r| r < prev_splice);
        let next_target_splice = marker_indices.partition_point(|&r| r < next_splice);
        let next_target_overlap = marker_indices.partition_point(|&r| r < next_overlap_start);

        Ok(Self {
            markers,
            target_markers: targ_hap_pairs.markers_arc(),
            marker_indices,
            ref_hap_pairs,
            restricted_ref_hap_pairs,
            target_samples: targ_hap_pairs.samples().clone(),
            prev_splice,
            next_splice,
            next_overlap_start,
            prev_target_splice,
            next_target_splice,
            next_target_overlap,
        })
    }

    /// Reference markers of the window
    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    pub fn markers_arc(&self) -> Arc<Markers> {
        self.markers.clone()
    }

    pub fn n_markers(&self) -> usize {
        self.markers.len()
    }

    /// Target markers of the window, a subsequence of `markers()`
    pub fn target_markers(&self) -> &Markers {
        &self.target_markers
    }

    pub fn n_target_markers(&self) -> usize {
        self.target_markers.len()
    }

    /// target-marker index -> reference-marker index; strictly increasing
    pub fn marker_indices(&self) -> &[usize] {
        &self.marker_indices
    }

    /// Reference haplotype pairs over all window markers
    pub fn ref_sample_hap_pairs(&self) -> &Arc<SampleHapPairs> {
        &self.ref_hap_pairs
    }

    /// Reference haplotype pairs restricted to the target markers
    pub fn restricted_ref_sample_hap_pairs(&self) -> &SampleHapPairs {
        &self.restricted_ref_hap_pairs
    }

    pub fn target_samples(&self) -> &Arc<Samples> {
        &self.target_samples
    }

    /// First reference-marker index this window writes
    pub fn prev_splice(&self) -> usize {
        self.prev_splice
    }

    /// First reference-marker index the next window writes
    pub fn next_splice(&self) -> usize {
        self.next_splice
    }

    /// First reference-marker index of the overlap with the next window
    pub fn next_overlap_start(&self) -> usize {
        self.next_overlap_start
    }

    /// First target-marker index this window writes
    pub fn prev_target_splice(&self) -> usize {
        self.prev_target_splice
    }

    /// First target-marker index the next window writes
    pub fn next_target_splice(&self) -> usize {
        self.next_target_splice
    }

    /// First target-marker index of the overlap with the next window
    pub fn next_target_overlap(&self) -> usize {
        self.next_target_overlap
    }
}

/// Maps each target marker to its reference-marker index; the target markers
/// must be a subsequence of the reference markers.
fn marker_indices(ref_markers: &Markers, target_markers: &Markers) -> Result<Vec<usize>> {
    let mut indices = Vec::with_capacity(target_markers.len());
    let mut r = 0usize;
    for t in 0..target_markers.len() {
        let tm = target_markers.marker(t);
        while r < ref_markers.len() && ref_markers.marker(r) != tm {
            r += 1;
        }
        if r == ref_markers.len() {
            return Err(WeftError::consistency(format!(
                "target marker {}:{} is not a reference marker of the window",
                tm.chrom_name(),
                tm.pos()
            )));
        }
        indices.push(r);
        r += 1;
    }
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::haplotype::AlleleColumn;
    use crate::data::marker::{Allele, Marker};
    use crate::data::ChromIdx;
    use crate::io::emission::GenotypeRecord;

    fn ref_window(positions: &[u32]) -> (Vec<MarkerEmission>, Arc<Samples>) {
        let samples = Arc::new(Samples::from_ids(["R1", "R2"]).unwrap());
        let window = positions
            .iter()
            .map(|&pos| {
                MarkerEmission::Genotypes(GenotypeRecord {
                    marker: test_marker(pos),
                    alleles: AlleleColumn::from_alleles(&[0, 1, 1, 0], 2),
                    phased: true,
                })
            })
            .collect();
        (window, samples)
    }

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

    fn target_haps(positions: &[u32]) -> SampleHapPairs {
        let samples = Arc::new(Samples::from_ids(["T1"]).unwrap());
        let markers = Arc::new(Markers::from_vec(
            positions.iter().map(|&p| test_marker(p)).collect(),
        ));
        let columns = positions
            .iter()
            .map(|_| AlleleColumn::from_alleles(&[0, 1], 2))
            .collect();
        SampleHapPairs::new(samples, markers, columns).unwrap()
    }

    #[test]
    fn test_splice_indices() {
        let (window, samples) = ref_window(&[100, 200, 300, 400, 500, 600]);
        let targ = target_haps(&[200, 400, 600]);
        let cd = CurrentData::new(&window, samples, 2, 2, false, &targ).unwrap();

        assert_eq!(cd.prev_splice(), 1);
        assert_eq!(cd.next_overlap_start(), 4);
        assert_eq!(cd.next_splice(), 5);
        assert_eq!(cd.marker_indices(), &[1, 3, 5]);
        assert_eq!(cd.prev_target_splice(), 0);
        assert_eq!(cd.next_target_splice(), 2);
        assert_eq!(cd.next_target_overlap(), 2);
    }

    #[test]
    fn test_last_window_writes_to_end() {
        let (window, samples) = ref_window(&[100, 200, 300]);
        let targ = target_haps(&[100, 300]);
        let cd = CurrentData::new(&window, samples, 0, 2, true, &targ).unwrap();
        assert_eq!(cd.prev_splice(), 0);
        assert_eq!(cd.next_splice(), 3);
        assert_eq!(cd.next_target_splice(), 2);
    }

    #[test]
    fn test_restricted_ref_hap_pairs() {
        let (window, samples) = ref_window(&[100, 200, 300]);
        let targ = target_haps(&[200]);
        let cd = CurrentData::new(&window, samples, 0, 1, true, &targ).unwrap();
        assert_eq!(cd.restricted_ref_sample_hap_pairs().n_markers(), 1);
        assert_eq!(cd.restricted_ref_sample_hap_pairs().allele(0, 1), 1);
    }

    #[test]
    fn test_target_not_subsequence_is_fatal() {
        let (window, samples) = ref_window(&[100, 200, 300]);
        let targ = target_haps(&[250]);
        assert!(matches!(
            CurrentData::new(&window, samples, 0, 1, true, &targ),
            Err(WeftError::Consistency { .. })
        ));
    }
}

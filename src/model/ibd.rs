//! # IBD Segments
//!
//! Identity-by-descent segments between two target haplotypes, as produced
//! by an external detector in window-local target-marker coordinates. The
//! writer merges segments that cross a window splice; a merged segment's
//! start index is the sentinel -1, marking a start in an earlier window.

use std::sync::Arc;

/// Ordered pair of target haplotype indices
pub type HapPair = (usize, usize);

#[derive(Clone, Debug)]
pub struct IbdSegment {
    hap1: usize,
    hap2: usize,
    chrom: Arc<str>,
    start_pos: u32,
    end_pos: u32,
    score: f32,
    /// target-marker index of the segment start within its window; 0 means
    /// the segment may continue a segment from the previous window, -1 marks
    /// a merged segment that started in an earlier window
    start_index: i32,
    /// target-marker index of the last segment marker within its window
    end_index: i32,
}

impl IbdSegment {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hap1: usize,
        hap2: usize,
        chrom: Arc<str>,
        start_pos: u32,
        end_pos: u32,
        score: f32,
        start_index: i32,
        end_index: i32,
    ) -> Self {
        assert!(start_pos <= end_pos);
        Self {
            hap1,
            hap2,
            chrom,
            start_pos,
            end_pos,
            score,
            start_index,
            end_index,
        }
    }

    pub fn hap_pair(&self) -> HapPair {
        (self.hap1, self.hap2)
    }

    pub fn hap1(&self) -> usize {
        self.hap1
    }

    pub fn hap2(&self) -> usize {
        self.hap2
    }

    pub fn chrom(&self) -> &Arc<str> {
        &self.chrom
    }

    pub fn start_pos(&self) -> u32 {
        self.start_pos
    }

    pub fn end_pos(&self) -> u32 {
        self.end_pos
    }

    pub fn score(&self) -> f32 {
        self.score
    }

    pub fn start_index(&self) -> i32 {
        self.start_index
    }

    pub fn end_index(&self) -> i32 {
        self.end_index
    }

    /// Joins a buffered segment `a` with its continuation `b` from the next
    /// window: earlier start, later end, the larger score.
    pub fn merge(a: &IbdSegment, b: &IbdSegment) -> IbdSegment {
        debug_assert_eq!(a.hap_pair(), b.hap_pair());
        debug_assert_eq!(a.chrom, b.chrom);
        IbdSegment {
            hap1: a.hap1,
            hap2: a.hap2,
            chrom: a.chrom.clone(),
            start_pos: a.start_pos,
            end_pos: b.end_pos,
            score: a.score.max(b.score),
            start_index: -1,
            end_index: b.end_index,
        }
    }

    /// True iff both haplotypes belong to the same sample
    pub fn is_hbd(&self) -> bool {
        self.hap1 / 2 == self.hap2 / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_extremes_and_max_score() {
        let chrom: Arc<str> = "chr1".into();
        let a = IbdSegment::new(0, 3, chrom.clone(), 100, 900, 4.5, 5, 20);
        let b = IbdSegment::new(0, 3, chrom, 700, 1500, 3.0, 0, 7);
        let merged = IbdSegment::merge(&a, &b);
        assert_eq!(merged.start_pos(), 100);
        assert_eq!(merged.end_pos(), 1500);
        assert_eq!(merged.score(), 4.5);
        assert_eq!(merged.start_index(), -1);
        assert_eq!(merged.end_index(), 7);
    }

    #[test]
    fn test_hbd_routing() {
        let chrom: Arc<str> = "chr1".into();
        assert!(IbdSegment::new(4, 5, chrom.clone(), 1, 2, 3.0, 0, 1).is_hbd());
        assert!(!IbdSegment::new(4, 6, chrom, 1, 2, 3.0, 0, 1).is_hbd());
    }
}

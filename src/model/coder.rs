//! # Haplotype Sequence Coder
//!
//! Assigns compact integer codes to allele sequences over a contiguous
//! target-marker range. Reference and target haplotypes draw codes from one
//! vocabulary: two haplotypes share a code iff their allele sequences on the
//! range are identical, and a target sequence absent from the reference
//! receives a fresh code disjoint from all reference codes.

use std::collections::HashMap;

use crate::data::haplotype::SampleHapPairs;

pub struct HaplotypeCoder<'a> {
    ref_haps: &'a SampleHapPairs,
    targ_haps: &'a SampleHapPairs,
}

impl<'a> HaplotypeCoder<'a> {
    /// Both haplotype sets must be aligned on the same target markers.
    pub fn new(ref_haps: &'a SampleHapPairs, targ_haps: &'a SampleHapPairs) -> Self {
        assert_eq!(
            ref_haps.n_markers(),
            targ_haps.n_markers(),
            "coder inputs must share markers"
        );
        Self {
            ref_haps,
            targ_haps,
        }
    }

    /// Codes the marker range [start, end); returns per-haplotype codes for
    /// the reference and the target.
    pub fn run(&self, start: usize, end: usize) -> (Vec<u32>, Vec<u32>) {
        assert!(start < end && end <= self.ref_haps.n_markers());
        let mut vocab: HashMap<Vec<u8>, u32> = HashMap::new();
        let ref_codes = code_haps(self.ref_haps, start, end, &mut vocab);
        let targ_codes = code_haps(self.targ_haps, start, end, &mut vocab);
        (ref_codes, targ_codes)
    }
}

fn code_haps(
    haps: &SampleHapPairs,
    start: usize,
    end: usize,
    vocab: &mut HashMap<Vec<u8>, u32>,
) -> Vec<u32> {
    let mut codes = Vec::with_capacity(haps.n_haps());
    let mut seq = vec![0u8; end - start];
    for h in 0..haps.n_haps() {
        for (i, m) in (start..end).enumerate() {
            seq[i] = haps.allele(m, h);
        }
        let next = vocab.len() as u32;
        let code = *vocab.entry(seq.clone()).or_insert(next);
        codes.push(code);
    }
    codes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::haplotype::{AlleleColumn, Samples};
    use crate::data::marker::{Allele, Marker, Markers};
    use crate::data::ChromIdx;
    use std::sync::Arc;

    fn haps(ids: &[&str], columns: Vec<Vec<u8>>) -> SampleHapPairs {
        let samples = Arc::new(Samples::from_ids(ids.iter().copied()).unwrap());
        let markers = Arc::new(Markers::from_vec(
            (0..columns.len())
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
        let columns = columns
            .into_iter()
            .map(|c| AlleleColumn::from_alleles(&c, 2))
            .collect();
        SampleHapPairs::new(samples, markers, columns).unwrap()
    }

    #[test]
    fn test_shared_vocabulary() {
        // ref haps over 2 markers: (0,0) (1,1) (0,0) (1,0)
        let ref_haps = haps(&["R1", "R2"], vec![vec![0, 1, 0, 1], vec![0, 1, 0, 0]]);
        // targ haps: (1,1) matches ref code, (0,1) is novel
        let targ_haps = haps(&["T1"], vec![vec![1, 0], vec![1, 1]]);

        let coder = HaplotypeCoder::new(&ref_haps, &targ_haps);
        let (ref_codes, targ_codes) = coder.run(0, 2);

        assert_eq!(ref_codes.len(), 4);
        assert_eq!(targ_codes.len(), 2);
        // identical ref sequences share a code
        assert_eq!(ref_codes[0], ref_codes[2]);
        assert_ne!(ref_codes[0], ref_codes[1]);
        // target hap 0 is (1,1): same code as ref hap 1
        assert_eq!(targ_codes[0], ref_codes[1]);
        // target hap 1 is (0,1): absent from the reference, fresh code
        assert!(!ref_codes.contains(&targ_codes[1]));
    }

    #[test]
    fn test_subrange_coding() {
        let ref_haps = haps(&["R1"], vec![vec![0, 1], vec![1, 1]]);
        let targ_haps = haps(&["T1"], vec![vec![1, 0], vec![1, 0]]);
        let coder = HaplotypeCoder::new(&ref_haps, &targ_haps);
        // on marker 1 alone: ref haps are both (1); target (1) and (0)
        let (ref_codes, targ_codes) = coder.run(1, 2);
        assert_eq!(ref_codes, vec![0, 0]);
        assert_eq!(targ_codes[0], 0);
        assert_eq!(targ_codes[1], 1);
    }
}

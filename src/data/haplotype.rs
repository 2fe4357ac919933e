//! # Samples and Phased Haplotype Storage
//!
//! Sample registry plus bit-packed per-marker allele columns. A diploid
//! sample `s` owns haplotypes `2s` and `2s+1`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use bitvec::prelude::*;

use crate::data::marker::Markers;
use crate::error::{Result, WeftError};

/// An ordered list of unique sample identifiers.
#[derive(Debug, Default)]
pub struct Samples {
    ids: Vec<Arc<str>>,
    index: HashMap<Arc<str>, usize>,
}

impl Samples {
    pub fn from_ids<I, S>(ids: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        let mut out = Self::default();
        for id in ids {
            let id: Arc<str> = id.into();
            if out.index.insert(id.clone(), out.ids.len()).is_some() {
                return Err(WeftError::config(format!("duplicate sample id: {}", id)));
            }
            out.ids.push(id);
        }
        Ok(out)
    }

    pub fn n_samples(&self) -> usize {
        self.ids.len()
    }

    pub fn id(&self, sample: usize) -> &str {
        &self.ids[sample]
    }

    pub fn ids(&self) -> &[Arc<str>] {
        &self.ids
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }
}

impl PartialEq for Samples {
    fn eq(&self, other: &Self) -> bool {
        self.ids == other.ids
    }
}

impl Eq for Samples {}

/// Bit-packed alleles for one marker: ceil(log2(nAlleles)) bits per
/// haplotype.
#[derive(Clone, Debug)]
pub struct AlleleColumn {
    bits: BitVec<u64, Lsb0>,
    bits_per_allele: u8,
    n_haps: u32,
}

impl AlleleColumn {
    fn bits_per_allele(n_alleles: usize) -> u8 {
        if n_alleles <= 1 {
            1
        } else {
            (usize::BITS - (n_alleles - 1).leading_zeros()) as u8
        }
    }

    pub fn from_alleles(alleles: &[u8], n_alleles: usize) -> Self {
        let bits_per_allele = Self::bits_per_allele(n_alleles);
        let total_bits = alleles.len() * bits_per_allele as usize;
        let mut bits = bitvec![u64, Lsb0; 0; total_bits];
        for (i, &allele) in alleles.iter().enumerate() {
            let start = i * bits_per_allele as usize;
            for b in 0..bits_per_allele as usize {
                if (allele >> b) & 1 == 1 {
                    bits.set(start + b, true);
                }
            }
        }
        Self {
            bits,
            bits_per_allele,
            n_haps: alleles.len() as u32,
        }
    }

    #[inline]
    pub fn get(&self, hap: usize) -> u8 {
        debug_assert!(hap < self.n_haps as usize);
        let start = hap * self.bits_per_allele as usize;
        let mut allele = 0u8;
        for b in 0..self.bits_per_allele as usize {
            if self.bits[start + b] {
                allele |= 1 << b;
            }
        }
        allele
    }

    pub fn n_haps(&self) -> usize {
        self.n_haps as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..self.n_haps as usize).map(move |h| self.get(h))
    }
}

/// Phased haplotype pairs: for each sample and each marker, two allele
/// indices.
#[derive(Clone, Debug)]
pub struct SampleHapPairs {
    samples: Arc<Samples>,
    markers: Arc<Markers>,
    columns: Vec<AlleleColumn>,
}

impl SampleHapPairs {
    pub fn new(
        samples: Arc<Samples>,
        markers: Arc<Markers>,
        columns: Vec<AlleleColumn>,
    ) -> Result<Self> {
        if columns.len() != markers.len() {
            return Err(WeftError::consistency(format!(
                "{} allele columns for {} markers",
                columns.len(),
                markers.len()
            )));
        }
        let n_haps = 2 * samples.n_samples();
        for (m, col) in columns.iter().enumerate() {
            if col.n_haps() != n_haps {
                return Err(WeftError::consistency(format!(
                    "column at marker {} has {} haplotypes, expected {}",
                    m,
                    col.n_haps(),
                    n_haps
                )));
            }
        }
        Ok(Self {
            samples,
            markers,
            columns,
        })
    }

    pub fn samples(&self) -> &Arc<Samples> {
        &self.samples
    }

    pub fn markers(&self) -> &Markers {
        &self.markers
    }

    pub fn markers_arc(&self) -> Arc<Markers> {
        self.markers.clone()
    }

    pub fn n_samples(&self) -> usize {
        self.samples.n_samples()
    }

    pub fn n_haps(&self) -> usize {
        2 * self.samples.n_samples()
    }

    pub fn n_markers(&self) -> usize {
        self.markers.len()
    }

    #[inline]
    pub fn allele(&self, marker: usize, hap: usize) -> u8 {
        self.columns[marker].get(hap)
    }

    /// First allele of the sample's phased pair
    pub fn allele1(&self, marker: usize, sample: usize) -> u8 {
        self.allele(marker, 2 * sample)
    }

    /// Second allele of the sample's phased pair
    pub fn allele2(&self, marker: usize, sample: usize) -> u8 {
        self.allele(marker, 2 * sample + 1)
    }

    /// New hap pairs restricted to the markers at `indices`, in order
    pub fn restrict(&self, indices: &[usize]) -> Self {
        Self {
            samples: self.samples.clone(),
            markers: Arc::new(self.markers.restrict(indices)),
            columns: indices.iter().map(|&i| self.columns[i].clone()).collect(),
        }
    }

    /// New hap pairs containing this object's markers that also occur in
    /// `markers`. Both marker lists must be ordered by (chromosome index,
    /// position).
    pub fn restrict_to_markers(&self, markers: &Markers) -> Result<Self> {
        let key = |m: &crate::data::marker::Marker| (m.chrom(), m.pos());
        let mut keep = Vec::new();
        let mut r = 0usize;
        for t in 0..self.markers.len() {
            let tm = self.markers.marker(t);
            while r < markers.len() && key(markers.marker(r)) < key(tm) {
                r += 1;
            }
            let mut rr = r;
            while rr < markers.len() && key(markers.marker(rr)) == key(tm) {
                if markers.marker(rr) == tm {
                    keep.push(t);
                    break;
                }
                rr += 1;
            }
        }
        Ok(self.restrict(&keep))
    }

    /// New hap pairs with the listed sample ids removed. Unknown ids are
    /// ignored.
    pub fn exclude_samples(&self, ids: &HashSet<String>) -> Result<Self> {
        if ids.is_empty() {
            return Ok(self.clone());
        }
        let kept: Vec<usize> = (0..self.n_samples())
            .filter(|&s| !ids.contains(self.samples.id(s)))
            .collect();
        if kept.is_empty() {
            return Err(WeftError::config("all samples excluded"));
        }
        let samples = Arc::new(Samples::from_ids(
            kept.iter().map(|&s| self.samples.ids()[s].clone()),
        )?);
        let columns = self
            .columns
            .iter()
            .map(|col| {
                let mut alleles = Vec::with_capacity(2 * kept.len());
                for &s in &kept {
                    alleles.push(col.get(2 * s));
                    alleles.push(col.get(2 * s + 1));
                }
                // 256 alleles is the u8 ceiling; wide enough for any column
                AlleleColumn::from_alleles(&alleles, 256)
            })
            .collect();
        Self::new(samples, self.markers.clone(), columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::marker::{Allele, Marker};
    use crate::data::ChromIdx;

    fn test_markers(n: usize) -> Arc<Markers> {
        let mut markers = Markers::new();
        for m in 0..n {
            markers.push(Marker::new(
                ChromIdx::new(0),
                "chr1".into(),
                (m as u32 + 1) * 100,
                None,
                Allele::Base(0),
                vec![Allele::Base(3)],
            ));
        }
        Arc::new(markers)
    }

    fn test_haps() -> SampleHapPairs {
        let samples = Arc::new(Samples::from_ids(["S1", "S2"]).unwrap());
        let markers = test_markers(3);
        let columns = vec![
            AlleleColumn::from_alleles(&[0, 1, 0, 1], 2),
            AlleleColumn::from_alleles(&[1, 1, 0, 0], 2),
            AlleleColumn::from_alleles(&[0, 0, 1, 1], 2),
        ];
        SampleHapPairs::new(samples, markers, columns).unwrap()
    }

    #[test]
    fn test_packed_column_roundtrip() {
        let alleles = vec![0u8, 1, 2, 3, 4, 5, 6, 7];
        let col = AlleleColumn::from_alleles(&alleles, 8);
        for (h, &a) in alleles.iter().enumerate() {
            assert_eq!(col.get(h), a);
        }
    }

    #[test]
    fn test_hap_accessors() {
        let haps = test_haps();
        assert_eq!(haps.n_haps(), 4);
        assert_eq!(haps.allele1(0, 0), 0);
        assert_eq!(haps.allele2(0, 0), 1);
        assert_eq!(haps.allele(1, 1), 1);
    }

    #[test]
    fn test_restrict() {
        let haps = test_haps();
        let sub = haps.restrict(&[0, 2]);
        assert_eq!(sub.n_markers(), 2);
        assert_eq!(sub.markers().marker(1).pos(), 300);
        assert_eq!(sub.allele(1, 2), 1);
    }

    #[test]
    fn test_exclude_samples() {
        let haps = test_haps();
        let excluded: HashSet<String> = ["S1".to_string()].into_iter().collect();
        let kept = haps.exclude_samples(&excluded).unwrap();
        assert_eq!(kept.n_samples(), 1);
        assert_eq!(kept.samples().id(0), "S2");
        assert_eq!(kept.allele(2, 0), 1);
    }

    #[test]
    fn test_duplicate_sample_ids_rejected() {
        assert!(Samples::from_ids(["S1", "S1"]).is_err());
    }

    #[test]
    fn test_restrict_to_markers() {
        let haps = test_haps();
        let subset = test_markers(3).restrict(&[0, 2]);
        let restricted = haps.restrict_to_markers(&subset).unwrap();
        assert_eq!(restricted.n_markers(), 2);
        assert_eq!(restricted.markers().marker(0).pos(), 100);
        assert_eq!(restricted.markers().marker(1).pos(), 300);
    }
}

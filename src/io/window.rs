//! # Sliding Marker Window
//!
//! A sliding window over an ordered stream of per-marker emissions. Windows
//! overlap by a requested number of markers; the realized overlap may be
//! larger so that markers sharing a base-pair position never straddle a
//! window boundary. A window never spans a chromosome boundary: the first
//! window on a new chromosome starts with overlap 0.
//!
//! Instances are not thread-safe; the pipeline driver owns the window.

use std::path::Path;
use std::sync::Arc;

use crate::data::genetic_map::GeneticMap;
use crate::data::haplotype::Samples;
use crate::error::{Result, WeftError};
use crate::io::emission::{EmissionSource, MarkerEmission};

pub struct MarkerWindow<S: EmissionSource> {
    source: S,
    window: Vec<MarkerEmission>,
    overlap: usize,
    cum_marker_cnt: usize,
    next: Option<MarkerEmission>,
}

impl<S: EmissionSource> MarkerWindow<S> {
    /// Wraps an emission source. The source must produce at least one
    /// emission.
    pub fn new(mut source: S) -> Result<Self> {
        let next = source.next_emission()?;
        if next.is_none() {
            return Err(WeftError::config("emission stream is empty"));
        }
        Ok(Self {
            source,
            window: Vec::new(),
            overlap: 0,
            cum_marker_cnt: 0,
            next,
        })
    }

    /// True iff the current window is the last window for its chromosome:
    /// the lookahead is absent or lies on a different chromosome than the
    /// first record of the current window.
    pub fn last_window_on_chrom(&self) -> bool {
        match (&self.next, self.window.first()) {
            (None, _) => true,
            (Some(next), Some(first)) => next.chrom() != first.chrom(),
            (Some(_), None) => false,
        }
    }

    /// True iff the window can advance (the lookahead is present)
    pub fn can_advance(&self) -> bool {
        self.next.is_some()
    }

    /// Advances the window to hold up to `window_size` markers, seeded with
    /// an overlap of up to `overlap` markers from the current window. The
    /// realized overlap is extended so that markers at a tied base-pair
    /// position stay in one window, and is 0 at a chromosome boundary.
    pub fn advance_by_count(
        &mut self,
        overlap: usize,
        window_size: usize,
    ) -> Result<&[MarkerEmission]> {
        if !self.can_advance() {
            return Err(WeftError::state("window cannot advance"));
        }
        if overlap >= window_size {
            return Err(WeftError::config(format!(
                "overlap ({}) must be less than window size ({})",
                overlap, window_size
            )));
        }
        let overlap = self.actual_overlap(overlap);
        let mut new_window = self.window.split_off(self.window.len() - overlap);
        let chrom = match new_window.first().or(self.next.as_ref()) {
            Some(e) => e.chrom(),
            None => unreachable!("lookahead present"),
        };
        while new_window.len() < window_size
            && self.next.as_ref().is_some_and(|e| e.chrom() == chrom)
        {
            let e = self.take_next()?.unwrap();
            new_window.push(e);
        }
        self.fill_position_ties(&mut new_window)?;
        self.publish(new_window, overlap);
        Ok(&self.window)
    }

    /// Advances the window by genetic distance: markers are appended while
    /// they lie within `cm` centiMorgans of the end of the seeded overlap.
    pub fn advance_by_cm(
        &mut self,
        overlap: usize,
        cm: f64,
        map: &GeneticMap,
    ) -> Result<&[MarkerEmission]> {
        if !self.can_advance() {
            return Err(WeftError::state("window cannot advance"));
        }
        if !(cm >= 0.0) {
            return Err(WeftError::config(format!("invalid window length: {} cM", cm)));
        }
        let overlap = self.actual_overlap(overlap);
        let mut new_window = self.window.split_off(self.window.len() - overlap);
        let chrom = match new_window.first().or(self.next.as_ref()) {
            Some(e) => e.chrom(),
            None => unreachable!("lookahead present"),
        };
        let start_pos = match new_window.last().or(self.next.as_ref()) {
            Some(e) => map.gen_pos(e.marker()),
            None => 0.0,
        };
        let end_pos = start_pos + cm;
        while self
            .next
            .as_ref()
            .is_some_and(|e| e.chrom() == chrom && map.gen_pos(e.marker()) < end_pos)
        {
            let e = self.take_next()?.unwrap();
            new_window.push(e);
        }
        self.fill_position_ties(&mut new_window)?;
        self.publish(new_window, overlap);
        Ok(&self.window)
    }

    fn take_next(&mut self) -> Result<Option<MarkerEmission>> {
        let out = self.next.take();
        self.next = self.source.next_emission()?;
        Ok(out)
    }

    /// Appends lookahead emissions sharing the last marker's (chrom, pos)
    fn fill_position_ties(&mut self, new_window: &mut Vec<MarkerEmission>) -> Result<()> {
        loop {
            let tie = match (new_window.last(), self.next.as_ref()) {
                (Some(last), Some(next)) => {
                    last.chrom() == next.chrom() && last.pos() == next.pos()
                }
                _ => false,
            };
            if !tie {
                return Ok(());
            }
            let e = self.take_next()?.unwrap();
            new_window.push(e);
        }
    }

    fn publish(&mut self, new_window: Vec<MarkerEmission>, overlap: usize) {
        self.window = new_window;
        self.overlap = overlap;
        self.cum_marker_cnt += self.window.len() - overlap;
    }

    /// The overlap the next advance will realize: 0 at a chromosome
    /// boundary, otherwise the requested count capped at the window size and
    /// extended upward while the boundary falls inside a run of
    /// equal-position markers.
    fn actual_overlap(&self, requested: usize) -> usize {
        if self.window.is_empty() || self.last_window_on_chrom() {
            return 0;
        }
        let n = self.window.len();
        let mut overlap = requested.min(n);
        while overlap > 0
            && overlap < n
            && self.window[n - overlap].pos() == self.window[n - overlap - 1].pos()
        {
            overlap += 1;
        }
        overlap
    }

    /// Extends a requested overlap over position ties the same way the next
    /// advance will, so splice points can be pre-computed for the current
    /// window.
    pub fn next_overlap(&self, requested: usize) -> usize {
        self.actual_overlap(requested)
    }

    /// Current window contents
    pub fn window(&self) -> &[MarkerEmission] {
        &self.window
    }

    /// Number of emissions shared with the previous window
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Number of distinct emissions in the union of all windows so far
    pub fn cum_marker_cnt(&self) -> usize {
        self.cum_marker_cnt
    }

    pub fn samples(&self) -> &Arc<Samples> {
        self.source.samples()
    }

    pub fn file(&self) -> Option<&Path> {
        self.source.file()
    }

    pub fn close(&mut self) -> Result<()> {
        self.source.close()
    }
}

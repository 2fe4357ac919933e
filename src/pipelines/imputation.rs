//! # Imputation Pipeline
//!
//! Drives windows to completion:
//! 1. advance the sliding window over the reference emission stream
//! 2. build the per-window view and validate cross-component consistency
//! 3. assemble the imputation inputs (clusters, coded alleles, segments)
//! 4. run the Li-Stephens engine per target haplotype on the worker pool
//! 5. combine per-haplotype results in haplotype order and write records
//!
//! Output is deterministic for fixed inputs: per-haplotype results are
//! collected in haplotype-index order regardless of worker scheduling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::Config;
use crate::data::genetic_map::GeneticMap;
use crate::data::haplotype::SampleHapPairs;
use crate::data::marker::Markers;
use crate::error::{Result, WeftError};
use crate::io::emission::EmissionSource;
use crate::io::window::MarkerWindow;
use crate::io::window_writer::WindowWriter;
use crate::model::allele_probs::{AlleleProbs, HapAlleleProbs};
use crate::model::current_data::CurrentData;
use crate::model::ibd::{HapPair, IbdSegment};
use crate::model::imp_data::ImputationData;
use crate::model::ls_baum::LsHapBaum;
use crate::model::parameters::ModelParams;

/// Produces raw IBD segments for a window. The detector itself is an
/// external collaborator; the pipeline only forwards its output to the
/// writer, which merges segments across window boundaries.
pub trait IbdDetector {
    fn detect(
        &mut self,
        cd: &CurrentData,
        imp_data: &ImputationData,
    ) -> HashMap<HapPair, Vec<IbdSegment>>;
}

/// End-of-run accounting
#[derive(Clone, Copy, Debug, Default)]
pub struct RunSummary {
    pub n_windows: usize,
    /// distinct markers consumed across all windows
    pub n_markers: usize,
    pub n_target_haps: usize,
}

pub struct ImputationPipeline {
    params: ModelParams,
    window_markers: usize,
    overlap_markers: usize,
    impute: bool,
    gprobs: bool,
}

impl ImputationPipeline {
    pub fn new(config: &Config) -> Self {
        Self {
            params: config.model_params(),
            window_markers: config.window,
            overlap_markers: config.overlap,
            impute: config.impute,
            gprobs: config.gprobs,
        }
    }

    /// Runs the window loop to completion. `target` holds the phased target
    /// haplotypes for the whole input; each window operates on the slice of
    /// target markers that fall inside it. A cancellation token, when
    /// provided, is checked at window boundaries only.
    pub fn run<S: EmissionSource>(
        &self,
        ref_source: S,
        target: &SampleHapPairs,
        map: &GeneticMap,
        writer: &mut WindowWriter,
        mut ibd_detector: Option<&mut dyn IbdDetector>,
        cancel: Option<&AtomicBool>,
    ) -> Result<RunSummary> {
        let start = Instant::now();
        let mut window = MarkerWindow::new(ref_source)?;
        let ref_samples = window.samples().clone();
        let mut summary = RunSummary {
            n_target_haps: target.n_haps(),
            ..RunSummary::default()
        };

        while window.can_advance() {
            if let Some(token) = cancel {
                if token.load(Ordering::Relaxed) {
                    info!("cancellation requested; stopping at window boundary");
                    break;
                }
            }
            let window_start = Instant::now();
            window.advance_by_count(self.overlap_markers, self.window_markers)?;
            let last_window = window.last_window_on_chrom();
            let next_overlap = window.next_overlap(self.overlap_markers);

            let markers = window_markers(window.window().iter().map(|e| e.marker().clone()));
            let targ_hap_pairs = target.restrict_to_markers(&markers)?;
            if targ_hap_pairs.n_markers() == 0 {
                return Err(WeftError::consistency(format!(
                    "window {} contains no target markers",
                    summary.n_windows
                )));
            }
            let cd = CurrentData::new(
                window.window(),
                ref_samples.clone(),
                window.overlap(),
                next_overlap,
                last_window,
                &targ_hap_pairs,
            )?;
            let imp_data = Arc::new(ImputationData::new(
                &self.params,
                &cd,
                targ_hap_pairs,
                map,
            )?);

            let al_probs = self.impute_window(&cd, &imp_data);
            writer.print(&cd, &al_probs, self.impute, self.gprobs)?;
            if let Some(detector) = ibd_detector.as_deref_mut() {
                let mut segments = detector.detect(&cd, &imp_data);
                writer.print_ibd(&cd, &mut segments)?;
            }

            summary.n_windows += 1;
            summary.n_markers = window.cum_marker_cnt();
            debug!(
                window = summary.n_windows - 1,
                markers = cd.n_markers(),
                target_markers = cd.n_target_markers(),
                clusters = imp_data.n_clusters(),
                elapsed_ms = window_start.elapsed().as_millis() as u64,
                "window imputed"
            );
        }
        window.close()?;
        info!(
            windows = summary.n_windows,
            markers = summary.n_markers,
            target_haps = summary.n_target_haps,
            elapsed_s = start.elapsed().as_secs_f64(),
            "imputation finished"
        );
        Ok(summary)
    }

    /// Fans the engine out over target haplotypes; each worker owns one
    /// engine instance, and results are collected in haplotype order.
    fn impute_window(&self, cd: &CurrentData, imp_data: &Arc<ImputationData>) -> AlleleProbs {
        let n_haps = imp_data.targ_hap_pairs().n_haps();
        let low_mem = self.params.low_mem;
        let by_hap: Vec<HapAlleleProbs> = (0..n_haps)
            .into_par_iter()
            .map_init(
                || LsHapBaum::new(imp_data.clone(), low_mem),
                |baum, hap| baum.impute(hap),
            )
            .collect();
        AlleleProbs::new(cd.markers_arc(), cd.target_samples().clone(), by_hap)
    }
}

fn window_markers(markers: impl Iterator<Item = crate::data::marker::Marker>) -> Markers {
    let mut out = Markers::new();
    for m in markers {
        out.push(m);
    }
    out
}

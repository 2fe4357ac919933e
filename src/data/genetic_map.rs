//! # Genetic Map Interpolation
//!
//! Converts physical positions (base pairs) to genetic positions
//! (centiMorgans). Positions between anchor points are linearly
//! interpolated; positions outside the anchored range are extrapolated with
//! the slope of the nearest two anchors.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::data::marker::Marker;
use crate::error::{Result, WeftError};

/// Genetic rate used when no map is available: 1 cM per Mb
const DEFAULT_CM_PER_BP: f64 = 1e-6;

/// Sorted anchor rows for one chromosome
#[derive(Clone, Debug, Default)]
struct MapAnchors {
    bp: Vec<u32>,
    cm: Vec<f64>,
}

impl MapAnchors {
    fn gen_pos(&self, pos: u32) -> f64 {
        let n = self.bp.len();
        match n {
            0 => return pos as f64 * DEFAULT_CM_PER_BP,
            1 => return self.cm[0] + (pos as f64 - self.bp[0] as f64) * DEFAULT_CM_PER_BP,
            _ => {}
        }
        // index of the anchor pair to interpolate (or extrapolate) with
        let i = match self.bp.binary_search(&pos) {
            Ok(i) => return self.cm[i],
            Err(0) => 0,
            Err(i) if i >= n => n - 2,
            Err(i) => i - 1,
        };
        let (bp0, bp1) = (self.bp[i] as f64, self.bp[i + 1] as f64);
        let (cm0, cm1) = (self.cm[i], self.cm[i + 1]);
        if bp1 == bp0 {
            return cm0;
        }
        cm0 + (pos as f64 - bp0) * (cm1 - cm0) / (bp1 - bp0)
    }
}

#[derive(Clone, Debug)]
enum MapKind {
    /// Constant-rate fallback (1 cM/Mb) used when no map file is supplied
    Constant,
    /// Anchors loaded from a PLINK-format map file, keyed by chromosome name
    Plink(HashMap<String, MapAnchors>),
}

/// Monotone mapping from (chromosome, base-pair position) to cM.
#[derive(Clone, Debug)]
pub struct GeneticMap {
    kind: MapKind,
}

impl GeneticMap {
    pub fn constant() -> Self {
        Self {
            kind: MapKind::Constant,
        }
    }

    /// Load a PLINK-format genetic map: whitespace-separated rows of
    /// `chrom id cM bp`. Rows for each chromosome must be non-decreasing in
    /// both bp and cM.
    pub fn from_plink(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|_| WeftError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        let reader = BufReader::new(file);
        let mut chroms: HashMap<String, MapAnchors> = HashMap::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line_no = line_no as u64 + 1;
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 4 {
                return Err(WeftError::format(
                    line_no,
                    format!("expected 4 map columns, found {}", fields.len()),
                ));
            }
            let cm: f64 = fields[2]
                .parse()
                .map_err(|_| WeftError::format(line_no, "invalid cM value"))?;
            let bp: u32 = fields[3]
                .parse()
                .map_err(|_| WeftError::format(line_no, "invalid bp position"))?;
            let anchors = chroms.entry(fields[0].to_string()).or_default();
            if let (Some(&last_bp), Some(&last_cm)) = (anchors.bp.last(), anchors.cm.last()) {
                if bp < last_bp || cm < last_cm {
                    return Err(WeftError::format(
                        line_no,
                        "genetic map positions must be non-decreasing",
                    ));
                }
            }
            anchors.bp.push(bp);
            anchors.cm.push(cm);
        }
        if chroms.is_empty() {
            return Err(WeftError::config(format!("empty genetic map: {:?}", path)));
        }
        Ok(Self {
            kind: MapKind::Plink(chroms),
        })
    }

    /// Genetic position in cM of a base-pair position on a chromosome
    pub fn gen_pos_at(&self, chrom: &str, pos: u32) -> f64 {
        match &self.kind {
            MapKind::Constant => pos as f64 * DEFAULT_CM_PER_BP,
            MapKind::Plink(chroms) => match chroms.get(chrom) {
                Some(anchors) => anchors.gen_pos(pos),
                None => pos as f64 * DEFAULT_CM_PER_BP,
            },
        }
    }

    /// Genetic position in cM of a marker
    pub fn gen_pos(&self, marker: &Marker) -> f64 {
        self.gen_pos_at(marker.chrom_name(), marker.pos())
    }
}

//! # Configuration Logic
//!
//! CLI argument parsing and validation using clap derive.

use clap::Parser;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{Result, WeftError};
use crate::model::parameters::ModelParams;

/// weft: window-based genotype imputation
#[derive(Parser, Debug, Clone)]
#[command(name = "weft")]
#[command(version)]
#[command(about = "Window-based genotype imputation with a Li-Stephens haplotype model", long_about = None)]
pub struct Config {
    // ============ Data Parameters ============
    /// Target VCF file with phased GT FORMAT fields (required)
    #[arg(long, value_name = "FILE")]
    pub gt: PathBuf,

    /// Reference panel VCF file with phased genotypes (required)
    #[arg(long = "ref", value_name = "FILE")]
    pub ref_panel: PathBuf,

    /// Output file prefix (required)
    #[arg(long, short, value_name = "PREFIX")]
    pub out: String,

    /// PLINK map file with cM units; constant 1 cM/Mb when absent
    #[arg(long, value_name = "FILE")]
    pub map: Option<PathBuf>,

    /// File with target sample IDs to exclude (one per line)
    #[arg(long, value_name = "FILE")]
    pub excludesamples: Option<PathBuf>,

    /// File with reference sample IDs to exclude (one per line)
    #[arg(long, value_name = "FILE")]
    pub excludefromref: Option<PathBuf>,

    // ============ Imputation Parameters ============
    /// Impute ungenotyped markers
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub impute: bool,

    /// Print the GP FORMAT field
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub gprobs: bool,

    /// Maximum cM in a target-marker cluster
    #[arg(long, default_value = "0.005")]
    pub cluster: f64,

    /// Allele error rate
    #[arg(long, default_value = "0.0001")]
    pub err: f32,

    /// Effective population size
    #[arg(long, default_value = "1000000")]
    pub ne: f32,

    /// Use the checkpointed low-memory forward buffer
    #[arg(long = "low-mem", default_value_t = true, action = clap::ArgAction::Set)]
    pub low_mem: bool,

    // ============ General Parameters ============
    /// Markers per window
    #[arg(long, default_value = "50000")]
    pub window: usize,

    /// Window overlap in markers
    #[arg(long, default_value = "3000")]
    pub overlap: usize,

    /// Number of threads (default: all available cores)
    #[arg(long)]
    pub nthreads: Option<usize>,
}

impl Config {
    /// Parse command line arguments and validate
    pub fn parse_and_validate() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration parameters; all violations are fatal before
    /// the first window.
    pub fn validate(&self) -> Result<()> {
        for path in [Some(&self.gt), Some(&self.ref_panel)].into_iter().flatten() {
            if !path.exists() {
                return Err(WeftError::FileNotFound { path: path.clone() });
            }
        }
        if let Some(map) = &self.map {
            if !map.exists() {
                return Err(WeftError::FileNotFound { path: map.clone() });
            }
        }
        if self.out.is_empty() {
            return Err(WeftError::config("'out' prefix must be non-empty"));
        }
        if self.overlap >= self.window {
            return Err(WeftError::config(
                "the 'overlap' parameter must be less than the 'window' parameter",
            ));
        }
        if self.ne <= 0.0 {
            return Err(WeftError::config(
                "effective population size (ne) must be positive",
            ));
        }
        if !(0.0..=0.5).contains(&self.err) {
            return Err(WeftError::config("allele error rate must be in [0, 0.5]"));
        }
        if self.cluster < 0.0 {
            return Err(WeftError::config("cluster distance must be non-negative"));
        }
        Ok(())
    }

    /// Target sample IDs to drop
    pub fn load_exclude_samples(&self) -> Result<HashSet<String>> {
        load_id_file(self.excludesamples.as_deref())
    }

    /// Reference sample IDs to drop
    pub fn load_exclude_from_ref(&self) -> Result<HashSet<String>> {
        load_id_file(self.excludefromref.as_deref())
    }

    /// Number of worker threads to use
    pub fn nthreads(&self) -> usize {
        self.nthreads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            cluster_cm: self.cluster,
            err_rate: self.err,
            ne: self.ne,
            low_mem: self.low_mem,
        }
    }
}

/// Loads one id per line; blank lines and `#` comments are skipped.
fn load_id_file(path: Option<&Path>) -> Result<HashSet<String>> {
    use std::fs::File;
    use std::io::{BufRead, BufReader};

    let mut ids = HashSet::new();
    if let Some(path) = path {
        let file = File::open(path).map_err(|_| WeftError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        for line in BufReader::new(file).lines() {
            let line = line?;
            let id = line.trim();
            if !id.is_empty() && !id.starts_with('#') {
                ids.insert(id.to_string());
            }
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn base_config() -> (Config, tempfile::NamedTempFile) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = Config {
            gt: file.path().to_path_buf(),
            ref_panel: file.path().to_path_buf(),
            out: "out".to_string(),
            map: None,
            excludesamples: None,
            excludefromref: None,
            impute: true,
            gprobs: true,
            cluster: 0.005,
            err: 1e-4,
            ne: 1e6,
            low_mem: true,
            window: 50_000,
            overlap: 3_000,
            nthreads: None,
        };
        (config, file)
    }

    #[test]
    fn test_valid_config() {
        let (config, _file) = base_config();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overlap_must_be_less_than_window() {
        let (mut config, _file) = base_config();
        config.overlap = config.window;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_input_is_fatal() {
        let (mut config, _file) = base_config();
        config.gt = PathBuf::from("/does/not/exist.vcf");
        assert!(matches!(
            config.validate(),
            Err(WeftError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_load_id_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment\nS1\n\n S2 ").unwrap();
        let ids = load_id_file(Some(file.path())).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("S1") && ids.contains("S2"));
    }
}

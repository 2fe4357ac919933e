//! # Model Parameters
//!
//! Hyperparameters of the imputation model, decoupled from CLI parsing.

/// Analysis parameters consumed by the imputation model.
#[derive(Clone, Copy, Debug)]
pub struct ModelParams {
    /// Maximum genetic span of a target-marker cluster in cM
    pub cluster_cm: f64,
    /// Per-marker allele error rate
    pub err_rate: f32,
    /// Effective population size
    pub ne: f32,
    /// Use the checkpointed forward buffer (O(sqrt(C) * n) memory)
    pub low_mem: bool,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            cluster_cm: 0.005,
            err_rate: 1e-4,
            ne: 1e6,
            low_mem: true,
        }
    }
}

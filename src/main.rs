//! # Application Entry Point
//!
//! Parses the configuration, initializes logging and the worker pool, wires
//! the input sources to the imputation pipeline, and maps fatal errors to a
//! one-line diagnostic with a non-zero exit code.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use weft::config::Config;
use weft::data::genetic_map::GeneticMap;
use weft::data::ChromIds;
use weft::io::emission::EmissionSource;
use weft::io::vcf::{read_sample_hap_pairs, VcfReader};
use weft::io::window_writer::WindowWriter;
use weft::pipelines::imputation::ImputationPipeline;

fn main() {
    if let Err(e) = run() {
        eprintln!("ERROR: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let config = Config::parse_and_validate()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    rayon::ThreadPoolBuilder::new()
        .num_threads(config.nthreads())
        .thread_name(|i| format!("weft-worker-{}", i))
        .build_global()
        .context("failed to create thread pool")?;

    let map = match &config.map {
        Some(path) => GeneticMap::from_plink(path).context("failed to load genetic map")?,
        None => GeneticMap::constant(),
    };

    // one interner so chromosome indices agree between the two streams
    let chrom_ids = Arc::new(ChromIds::new());

    let exclude_target = config.load_exclude_samples()?;
    let mut target_reader = VcfReader::open(&config.gt, &exclude_target, chrom_ids.clone())
        .context("failed to open target VCF")?;
    let target = read_sample_hap_pairs(&mut target_reader).context("failed to read target VCF")?;
    info!(
        samples = target.n_samples(),
        markers = target.n_markers(),
        "target loaded"
    );

    let exclude_ref = config.load_exclude_from_ref()?;
    let ref_source = VcfReader::open(&config.ref_panel, &exclude_ref, chrom_ids)
        .context("failed to open reference VCF")?;
    info!(samples = ref_source.samples().n_samples(), "reference panel opened");

    let mut writer = WindowWriter::new(
        target.samples().clone(),
        &config.out,
        Some(concat!("weft ", env!("CARGO_PKG_VERSION"))),
        config.gprobs,
    )?;
    let pipeline = ImputationPipeline::new(&config);
    let summary = pipeline.run(ref_source, &target, &map, &mut writer, None, None)?;
    writer.close()?;
    info!(
        windows = summary.n_windows,
        markers = summary.n_markers,
        "wrote {}.vcf.gz",
        config.out
    );
    Ok(())
}

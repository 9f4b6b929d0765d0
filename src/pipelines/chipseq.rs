use std::time::Instant;
use log::info;
use crate::config::defs::{FinalOutputs, PipelineError, ReadInputs, RunConfig};
use crate::pipelines::align::qc_and_align;
use crate::pipelines::coverage::coverage_track;
use crate::pipelines::layout::{LibraryLayout, PairedEnd, SingleEnd};
use crate::pipelines::postprocess::postprocess;
use crate::utils::command::ToolRunner;
use crate::utils::file::{ensure_work_dirs, ArtifactPaths};
use crate::utils::system::check_tools;

/// Run function for the ChIP-seq pipeline
///
/// # Arguments
///
/// * `runner` - Executes every external step.
/// * `config` - RunConfig resolved from the command line.
///
/// # Returns
/// Result<FinalOutputs, PipelineError>. The first failing step ends the run.
pub async fn run<R: ToolRunner>(runner: &R, config: &RunConfig) -> Result<FinalOutputs, PipelineError> {
    match &config.reads {
        ReadInputs::Single(reads) => {
            run_layout(runner, config, &SingleEnd { reads: reads.clone() }).await
        }
        ReadInputs::Paired { r1, r2 } => {
            run_layout(runner, config, &PairedEnd { r1: r1.clone(), r2: r2.clone() }).await
        }
    }
}

async fn run_layout<R: ToolRunner, L: LibraryLayout>(
    runner: &R,
    config: &RunConfig,
    layout: &L,
) -> Result<FinalOutputs, PipelineError> {
    check_tools(runner, &layout.required_tools())?;

    let paths = ArtifactPaths::new(&config.work_dir, &config.prefix);
    ensure_work_dirs(&paths)?;
    info!("Running {} pipeline for '{}' in {}", layout.name(), config.prefix, config.work_dir.display());

    let stage_start = Instant::now();
    let raw = qc_and_align(runner, config, layout, &paths).await?;
    info!("QC and alignment done in {} s", stage_start.elapsed().as_secs());

    let stage_start = Instant::now();
    let filtered = postprocess(runner, config, layout, &paths, raw).await?;
    info!("Alignment post-processing done in {} s", stage_start.elapsed().as_secs());

    let stage_start = Instant::now();
    let track = coverage_track(runner, config, &paths, &filtered.bam).await?;
    info!("Coverage track done in {} s", stage_start.elapsed().as_secs());

    Ok(FinalOutputs {
        filtered_bam: filtered.bam,
        bedpe: filtered.bedpe,
        bigwig: track.bigwig,
        trimming_log: paths.log(".trimming.log"),
        align_log: paths.log(".align.log"),
        qc_dir: paths.qc_dir(),
    })
}

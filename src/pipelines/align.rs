use std::path::PathBuf;
use log::info;
use crate::config::defs::{PipelineError, RunConfig, MIN_TRIMMED_LEN};
use crate::pipelines::layout::{LibraryLayout, TrimmedReads};
use crate::utils::command::{cutadapt, fastqc, ToolRunner};
use crate::utils::file::{remove_intermediates, ArtifactPaths};

/// Text alignment produced by the QC and alignment stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAlignment {
    pub sam: PathBuf,
}

/// FastQC over the raw reads, then cutadapt, then bwa.
/// Trimmed reads are deleted once aligned.
///
/// # Arguments
///
/// * `runner` - External step runner.
/// * `config` - Resolved run settings.
/// * `layout` - Single- or paired-end behavior.
/// * `paths` - Artifact naming for this prefix.
///
/// # Returns
/// RawAlignment naming `{prefix}.sam`.
pub async fn qc_and_align<R: ToolRunner, L: LibraryLayout>(
    runner: &R,
    config: &RunConfig,
    layout: &L,
    paths: &ArtifactPaths,
) -> Result<RawAlignment, PipelineError> {
    let inputs = layout.inputs();

    info!("Running FastQC on {} {} file(s)", inputs.len(), layout.name());
    runner.run(&fastqc::step(config, &inputs, &paths.qc_dir())).await?;

    let trimmed = TrimmedReads {
        reads: layout.trimmed_paths(paths),
    };
    info!("Trimming adapters (minimum length {})", MIN_TRIMMED_LEN);
    runner
        .run(&cutadapt::step(config, &inputs, &trimmed.reads, &paths.log(".trimming.log")))
        .await?;

    let sam = paths.artifact(".sam");
    info!("Aligning to {} with bwa {:?}", config.ref_index.display(), config.algorithm);
    layout.align(runner, config, paths, &trimmed, &sam).await?;
    remove_intermediates(&trimmed.reads)?;

    Ok(RawAlignment { sam })
}

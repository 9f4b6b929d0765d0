use std::path::PathBuf;
use log::info;
use crate::config::defs::{PipelineError, RunConfig};
use crate::pipelines::align::RawAlignment;
use crate::pipelines::layout::{log_flagstat, LibraryLayout};
use crate::utils::command::{samtools, ToolRunner};
use crate::utils::file::{remove_intermediates, ArtifactPaths};

/// Final alignment products. `bedpe` is only present for paired-end runs.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredAlignment {
    pub bam: PathBuf,
    pub bedpe: Option<PathBuf>,
}

/// SAM -> sorted BAM -> duplicate handling -> flag filter, plus the paired-interval
/// file where the layout has one. Only the filtered BAM and BEDPE survive.
pub async fn postprocess<R: ToolRunner, L: LibraryLayout>(
    runner: &R,
    config: &RunConfig,
    layout: &L,
    paths: &ArtifactPaths,
    raw: RawAlignment,
) -> Result<FilteredAlignment, PipelineError> {
    let bam = paths.artifact(".bam");
    let sorted = paths.artifact(".sorted.bam");

    runner.run(&samtools::view_to_bam(config, &raw.sam, &bam)).await?;
    runner.run(&samtools::sort(config, &bam, &sorted, false)).await?;
    remove_intermediates(&[raw.sam, bam])?;

    let deduplicated = layout.handle_duplicates(runner, config, paths, &sorted).await?;

    let filtered = paths.artifact(".filtered.bam");
    let (require, exclude) = layout.filter_flags();
    info!("Filtering alignments (require {:?}, exclude {})", require, exclude);
    runner
        .run(&samtools::filter(config, &deduplicated.bam, &filtered, require, exclude))
        .await?;
    log_flagstat(runner, config, paths, &filtered, "flagstat after filtering").await?;

    let bedpe = layout.paired_intervals(runner, config, paths, &filtered).await?;

    let mut intermediates = vec![sorted];
    intermediates.extend(deduplicated.intermediates);
    remove_intermediates(&intermediates)?;

    Ok(FilteredAlignment { bam: filtered, bedpe })
}

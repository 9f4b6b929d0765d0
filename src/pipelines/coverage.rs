use std::path::{Path, PathBuf};
use log::info;
use crate::config::defs::{PipelineError, RunConfig};
use crate::utils::command::bedtools::{bamtobed, BamToBedMode};
use crate::utils::command::{coreutils, ucsc, ToolRunner};
use crate::utils::file::{remove_intermediates, ArtifactPaths};

#[derive(Debug, Clone, PartialEq)]
pub struct CoverageTrack {
    pub bigwig: PathBuf,
}

/// Builds `{prefix}.bw` from the filtered BAM.
///
/// BAM blocks -> BED (split at gaps), chromosome sizes from UCSC, per-base overlap
/// counts as a bedGraph sorted by chromosome then start, then bedGraphToBigWig.
/// Everything but the BigWig is removed afterwards.
///
/// # Arguments
///
/// * `filtered_bam` - Output of the post-processing stage.
///
/// # Returns
/// CoverageTrack naming the BigWig.
pub async fn coverage_track<R: ToolRunner>(
    runner: &R,
    config: &RunConfig,
    paths: &ArtifactPaths,
    filtered_bam: &Path,
) -> Result<CoverageTrack, PipelineError> {
    let bed = paths.artifact(".bed");
    let sorted_bed = paths.artifact(".sorted.bed");
    let chrom_sizes = paths.artifact(".chrom.sizes");
    let unsorted_graph = paths.artifact(".unsorted.bedGraph");
    let bedgraph = paths.artifact(".bedGraph");
    let bigwig = paths.artifact(".bw");

    runner.run(&bamtobed(filtered_bam, &bed, BamToBedMode::Split)).await?;

    info!("Fetching chromosome sizes for {}", config.genome);
    runner.run(&ucsc::fetch_chrom_sizes(&config.genome, &chrom_sizes)).await?;

    runner.run(&coreutils::sort(&bed, &["1,1"], &sorted_bed)).await?;
    runner
        .run(&ucsc::bed_item_overlap_count(&config.genome, &chrom_sizes, &sorted_bed, &unsorted_graph))
        .await?;
    runner.run(&coreutils::sort(&unsorted_graph, &["1,1", "2,2n"], &bedgraph)).await?;

    runner.run(&ucsc::bedgraph_to_bigwig(&bedgraph, &chrom_sizes, &bigwig)).await?;

    remove_intermediates(&[bed, sorted_bed, unsorted_graph, bedgraph, chrom_sizes])?;
    Ok(CoverageTrack { bigwig })
}

// src/pipelines/layout.rs: Single-end and paired-end behavior, chosen once per run.
// Every place the two read layouts differ goes through LibraryLayout;
// the stages themselves never look at the mode.

use std::path::{Path, PathBuf};
use log::info;
use crate::config::defs::{Algorithm, PipelineError, RunConfig, CORE_TOOLS, EXCLUDE_FLAGS, PICARD_TAG, PROPER_PAIR_FLAG};
use crate::utils::bedpe::reduce_bedpe;
use crate::utils::command::bedtools::{bamtobed, BamToBedMode};
use crate::utils::command::{bwa, picard, samtools, ToolRunner};
use crate::utils::file::{append_log_section, remove_intermediates, ArtifactPaths};

const TRIMMED_SUFFIX: &str = "_trimmed.fastq.gz";
const SAI_SUFFIX: &str = ".sai";

/// Reads after adapter trimming, in mate order.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimmedReads {
    pub reads: Vec<PathBuf>,
}

/// Duplicate-handled, coordinate-sorted BAM plus the files that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateHandled {
    pub bam: PathBuf,
    pub intermediates: Vec<PathBuf>,
}

#[allow(async_fn_in_trait)]
pub trait LibraryLayout {
    fn name(&self) -> &'static str;

    /// Raw FASTQ inputs, in mate order.
    fn inputs(&self) -> Vec<PathBuf>;

    fn required_tools(&self) -> Vec<&'static str> {
        CORE_TOOLS.to_vec()
    }

    /// Where cutadapt writes each trimmed input.
    fn trimmed_paths(&self, paths: &ArtifactPaths) -> Vec<PathBuf>;

    /// Aligns trimmed reads into one SAM file. Per-mate intermediates are removed.
    async fn align<R: ToolRunner>(
        &self,
        runner: &R,
        config: &RunConfig,
        paths: &ArtifactPaths,
        trimmed: &TrimmedReads,
        sam: &Path,
    ) -> Result<(), PipelineError>;

    /// Removes or marks duplicates in a coordinate-sorted BAM, logging stats to the alignment log.
    async fn handle_duplicates<R: ToolRunner>(
        &self,
        runner: &R,
        config: &RunConfig,
        paths: &ArtifactPaths,
        sorted_bam: &Path,
    ) -> Result<DuplicateHandled, PipelineError>;

    /// (required flags, excluded flags) for the final `samtools view` filter.
    fn filter_flags(&self) -> (Option<u16>, u16);

    /// Builds the paired-interval file from the filtered BAM, if this layout has one.
    async fn paired_intervals<R: ToolRunner>(
        &self,
        runner: &R,
        config: &RunConfig,
        paths: &ArtifactPaths,
        filtered_bam: &Path,
    ) -> Result<Option<PathBuf>, PipelineError>;
}

pub struct SingleEnd {
    pub reads: PathBuf,
}

pub struct PairedEnd {
    pub r1: PathBuf,
    pub r2: PathBuf,
}

/// Appends `samtools flagstat` output for `bam` to the alignment log.
pub async fn log_flagstat<R: ToolRunner>(
    runner: &R,
    config: &RunConfig,
    paths: &ArtifactPaths,
    bam: &Path,
    title: &str,
) -> Result<(), PipelineError> {
    let output = runner.run(&samtools::flagstat(config, bam)).await?;
    append_log_section(&paths.log(".align.log"), title, &output.stdout)?;
    Ok(())
}

impl LibraryLayout for SingleEnd {
    fn name(&self) -> &'static str {
        "single-end"
    }

    fn inputs(&self) -> Vec<PathBuf> {
        vec![self.reads.clone()]
    }

    fn trimmed_paths(&self, paths: &ArtifactPaths) -> Vec<PathBuf> {
        vec![paths.artifact(TRIMMED_SUFFIX)]
    }

    async fn align<R: ToolRunner>(
        &self,
        runner: &R,
        config: &RunConfig,
        paths: &ArtifactPaths,
        trimmed: &TrimmedReads,
        sam: &Path,
    ) -> Result<(), PipelineError> {
        let reads = trimmed.reads[0].as_path();
        match config.algorithm {
            Algorithm::Fast => {
                runner.run(&bwa::mem(config, &[reads], sam)).await?;
            }
            Algorithm::Sensitive => {
                let sai = paths.artifact(SAI_SUFFIX);
                runner.run(&bwa::aln(config, reads, &sai)).await?;
                runner.run(&bwa::samse(config, &sai, reads, sam)).await?;
                remove_intermediates(&[sai])?;
            }
        }
        Ok(())
    }

    async fn handle_duplicates<R: ToolRunner>(
        &self,
        runner: &R,
        config: &RunConfig,
        paths: &ArtifactPaths,
        sorted_bam: &Path,
    ) -> Result<DuplicateHandled, PipelineError> {
        let dedup = paths.artifact(".dedup.bam");
        runner.run(&samtools::rmdup_single(config, sorted_bam, &dedup)).await?;
        log_flagstat(runner, config, paths, &dedup, "flagstat after duplicate removal").await?;
        Ok(DuplicateHandled {
            intermediates: vec![dedup.clone()],
            bam: dedup,
        })
    }

    fn filter_flags(&self) -> (Option<u16>, u16) {
        (None, EXCLUDE_FLAGS)
    }

    async fn paired_intervals<R: ToolRunner>(
        &self,
        _runner: &R,
        _config: &RunConfig,
        _paths: &ArtifactPaths,
        _filtered_bam: &Path,
    ) -> Result<Option<PathBuf>, PipelineError> {
        Ok(None)
    }
}

impl LibraryLayout for PairedEnd {
    fn name(&self) -> &'static str {
        "paired-end"
    }

    fn inputs(&self) -> Vec<PathBuf> {
        vec![self.r1.clone(), self.r2.clone()]
    }

    fn required_tools(&self) -> Vec<&'static str> {
        let mut tools = CORE_TOOLS.to_vec();
        tools.push(PICARD_TAG);
        tools
    }

    fn trimmed_paths(&self, paths: &ArtifactPaths) -> Vec<PathBuf> {
        vec![
            paths.mate_artifact("R1", TRIMMED_SUFFIX),
            paths.mate_artifact("R2", TRIMMED_SUFFIX),
        ]
    }

    async fn align<R: ToolRunner>(
        &self,
        runner: &R,
        config: &RunConfig,
        paths: &ArtifactPaths,
        trimmed: &TrimmedReads,
        sam: &Path,
    ) -> Result<(), PipelineError> {
        let (r1, r2) = match trimmed.reads.as_slice() {
            [r1, r2] => (r1.as_path(), r2.as_path()),
            other => {
                return Err(PipelineError::InvalidConfig(format!(
                    "Paired-end alignment needs two trimmed files, got {}", other.len()
                )))
            }
        };

        match config.algorithm {
            Algorithm::Fast => {
                runner.run(&bwa::mem(config, &[r1, r2], sam)).await?;
            }
            Algorithm::Sensitive => {
                let sai1 = paths.mate_artifact("R1", SAI_SUFFIX);
                let sai2 = paths.mate_artifact("R2", SAI_SUFFIX);
                runner.run(&bwa::aln(config, r1, &sai1)).await?;
                runner.run(&bwa::aln(config, r2, &sai2)).await?;
                runner.run(&bwa::sampe(config, [sai1.as_path(), sai2.as_path()], [r1, r2], sam)).await?;
                remove_intermediates(&[sai1, sai2])?;
            }
        }
        Ok(())
    }

    async fn handle_duplicates<R: ToolRunner>(
        &self,
        runner: &R,
        config: &RunConfig,
        paths: &ArtifactPaths,
        sorted_bam: &Path,
    ) -> Result<DuplicateHandled, PipelineError> {
        let marked = paths.artifact(".dupmark.bam");
        let metrics = paths.log(".markdup_metrics.txt");
        runner.run(&picard::mark_duplicates(sorted_bam, &marked, &metrics)).await?;
        log_flagstat(runner, config, paths, &marked, "flagstat after MarkDuplicates").await?;
        Ok(DuplicateHandled {
            intermediates: vec![marked.clone()],
            bam: marked,
        })
    }

    fn filter_flags(&self) -> (Option<u16>, u16) {
        (Some(PROPER_PAIR_FLAG), EXCLUDE_FLAGS)
    }

    async fn paired_intervals<R: ToolRunner>(
        &self,
        runner: &R,
        config: &RunConfig,
        paths: &ArtifactPaths,
        filtered_bam: &Path,
    ) -> Result<Option<PathBuf>, PipelineError> {
        let name_sorted = paths.artifact(".namesorted.bam");
        let raw_bedpe = paths.artifact(".raw.bedpe");
        let bedpe = paths.artifact(".bedpe");

        runner.run(&samtools::sort(config, filtered_bam, &name_sorted, true)).await?;
        runner.run(&bamtobed(&name_sorted, &raw_bedpe, BamToBedMode::Bedpe)).await?;
        let (kept, dropped) = reduce_bedpe(&raw_bedpe, &bedpe)?;
        info!("Wrote {} fragments to {} ({} discordant or unplaced pairs dropped)", kept, bedpe.display(), dropped);

        remove_intermediates(&[name_sorted, raw_bedpe])?;
        Ok(Some(bedpe))
    }
}

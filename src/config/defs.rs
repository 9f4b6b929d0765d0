use std::path::PathBuf;
use thiserror::Error;

// External software
pub const FASTQC_TAG: &str = "fastqc";
pub const CUTADAPT_TAG: &str = "cutadapt";
pub const BWA_TAG: &str = "bwa";
pub const SAMTOOLS_TAG: &str = "samtools";
pub const BEDTOOLS_TAG: &str = "bedtools";
pub const PICARD_TAG: &str = "picard";
pub const FETCH_CHROM_SIZES_TAG: &str = "fetchChromSizes";
pub const BED_ITEM_OVERLAP_COUNT_TAG: &str = "bedItemOverlapCount";
pub const BEDGRAPH_TO_BIGWIG_TAG: &str = "bedGraphToBigWig";
pub const SORT_TAG: &str = "sort";

/// Tools every run needs, regardless of read layout.
pub const CORE_TOOLS: &[&str] = &[
    FASTQC_TAG,
    CUTADAPT_TAG,
    BWA_TAG,
    SAMTOOLS_TAG,
    BEDTOOLS_TAG,
    FETCH_CHROM_SIZES_TAG,
    BED_ITEM_OVERLAP_COUNT_TAG,
    BEDGRAPH_TO_BIGWIG_TAG,
    SORT_TAG,
];

/// Tools whose first argument names a sub-command.
pub const SUBCOMMAND_TOOLS: &[&str] = &[BWA_TAG, SAMTOOLS_TAG, BEDTOOLS_TAG, PICARD_TAG];

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamtoolsSubcommand {
    View,
    Sort,
    Rmdup,
    Flagstat,
}

impl SamtoolsSubcommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamtoolsSubcommand::View => "view",
            SamtoolsSubcommand::Sort => "sort",
            SamtoolsSubcommand::Rmdup => "rmdup",
            SamtoolsSubcommand::Flagstat => "flagstat",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BwaSubcommand {
    Mem,
    Aln,
    Samse,
    Sampe,
}

impl BwaSubcommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            BwaSubcommand::Mem => "mem",
            BwaSubcommand::Aln => "aln",
            BwaSubcommand::Samse => "samse",
            BwaSubcommand::Sampe => "sampe",
        }
    }
}

// Static Directories
pub const LOG_DIR: &str = "logs";
pub const FASTQC_DIR: &str = "fastqc";

// Static Parameters
pub const MIN_TRIMMED_LEN: usize = 30;
pub const DEFAULT_THREADS: usize = 1;
pub const DEFAULT_GENOME: &str = "hg38";
pub const DEFAULT_REF_INDEX: &str = "/data/genomes/hg38/bwa/hg38.fa";

// TruSeq universal (5') and indexed (3') adapters
pub const DEFAULT_ADAPTER5: &str = "AATGATACGGCGACCACCGAGATCTACACTCTTTCCCTACACGACGCTCTTCCGATCT";
pub const DEFAULT_ADAPTER3: &str = "AGATCGGAAGAGCACACGTCTGAACTCCAGTCAC";

// unmapped | mate unmapped | secondary | qc fail | duplicate
pub const EXCLUDE_FLAGS: u16 = 0x4 | 0x8 | 0x100 | 0x200 | 0x400;
pub const PROPER_PAIR_FLAG: u16 = 0x2;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Algorithm {
    /// One-pass `bwa mem`.
    #[default]
    Fast,
    /// Seed-based `bwa aln` followed by `samse`/`sampe`.
    Sensitive,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReadInputs {
    Single(PathBuf),
    Paired { r1: PathBuf, r2: PathBuf },
}

impl ReadInputs {
    pub fn paths(&self) -> Vec<PathBuf> {
        match self {
            ReadInputs::Single(reads) => vec![reads.clone()],
            ReadInputs::Paired { r1, r2 } => vec![r1.clone(), r2.clone()],
        }
    }
}

/// Resolved, immutable run settings. Built once and passed by reference to every stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub work_dir: PathBuf,
    pub reads: ReadInputs,
    pub algorithm: Algorithm,
    pub threads: usize,
    pub adapter5: String,
    pub adapter3: String,
    pub ref_index: PathBuf,
    pub prefix: String,
    pub genome: String,
}

/// Output of a single pipeline run that survives cleanup.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalOutputs {
    pub filtered_bam: PathBuf,
    pub bedpe: Option<PathBuf>,
    pub bigwig: PathBuf,
    pub trimming_log: PathBuf,
    pub align_log: PathBuf,
    pub qc_dir: PathBuf,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Required tool '{0}' was not found on PATH")]
    MissingTool(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid input '{path}': {reason}")]
    InvalidInput { path: String, reason: String },

    #[error("{tool} exited with status {}: {stderr}", status_label(.code))]
    ToolFailed {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Failed to spawn {tool}: {error}")]
    ToolSpawn { tool: String, error: String },

    #[error("I/O error: {0}")]
    IOError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn status_label(code: &Option<i32>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string())
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::IOError(e.to_string())
    }
}

impl PipelineError {
    /// Process exit code for this failure. A failed tool hands back its own status.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::MissingTool(_) => 127,
            PipelineError::ToolFailed { code: Some(code), .. } if *code != 0 => *code,
            _ => 1,
        }
    }
}

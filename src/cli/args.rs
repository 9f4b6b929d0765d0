use clap::Parser;
use crate::config::defs::{DEFAULT_ADAPTER3, DEFAULT_ADAPTER5, DEFAULT_GENOME, DEFAULT_REF_INDEX, DEFAULT_THREADS};

#[derive(Parser, Debug, Clone, Default)]
#[command(
    name = "chipseq-pipelines",
    version,
    about = "QC, trim, align, filter and build a BigWig coverage track from ChIP-seq FASTQ files",
    override_usage = "chipseq-pipelines [OPTIONS] <R1.fastq.gz> [R2.fastq.gz]"
)]
pub struct Arguments {

    #[arg(short = 'i', long = "index", default_value = DEFAULT_REF_INDEX, help = "BWA index prefix of the reference genome")]
    pub ref_index: String,

    #[arg(short = 'p', long = "prefix", help = "Output prefix. Derived from the first read file if omitted.")]
    pub prefix: Option<String>,

    #[arg(short = 't', long, default_value_t = DEFAULT_THREADS, value_parser = parse_threads)]
    pub threads: usize,

    #[arg(short = 's', long = "single", action, help = "Single-end reads (default is paired-end)")]
    pub single: bool,

    #[arg(short = 'a', long = "aln", action, help = "Use the seed-based bwa aln algorithm instead of bwa mem")]
    pub sensitive: bool,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(long, default_value = DEFAULT_GENOME, help = "UCSC assembly name used to fetch chromosome sizes")]
    pub genome: String,

    #[arg(long, default_value = DEFAULT_ADAPTER5)]
    pub adapter5: String,

    #[arg(long, default_value = DEFAULT_ADAPTER3)]
    pub adapter3: String,

    #[arg(required = true, num_args = 1..=2, value_name = "READS")]
    pub reads: Vec<String>,
}

fn parse_threads(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("thread count must be at least 1".to_string()),
        Ok(t) => Ok(t),
        Err(e) => Err(format!("invalid thread count '{}': {}", s, e)),
    }
}

/// External tool invocation: the step description, the runner seam, and
/// per-tool argument generators.

use std::env;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use log::debug;
use tokio::process::Command;
use crate::config::defs::{PipelineError, SUBCOMMAND_TOOLS};

// Lines of stderr kept in a ToolFailed error
const STDERR_TAIL_LINES: usize = 20;

/// Where a tool's stdout goes.
#[derive(Debug, Clone, PartialEq)]
pub enum StdoutTarget {
    /// Collected and returned in ToolOutput.
    Capture,
    /// Written to the file, replacing it.
    Truncate(PathBuf),
    /// Appended to the file, e.g. a run log.
    Append(PathBuf),
}

/// One invocation of an external program, with the files it declares it will write.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolStep {
    pub tool: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub stdout: StdoutTarget,
    pub outputs: Vec<PathBuf>,
}

impl ToolStep {
    pub fn new(tool: &str) -> Self {
        ToolStep {
            tool: tool.to_string(),
            args: Vec::new(),
            env: Vec::new(),
            stdout: StdoutTarget::Capture,
            outputs: Vec::new(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Sends stdout to `path` (truncating) and records it as an output.
    pub fn stdout_to(mut self, path: &Path) -> Self {
        self.stdout = StdoutTarget::Truncate(path.to_path_buf());
        self.outputs.push(path.to_path_buf());
        self
    }

    pub fn stdout_append(mut self, path: &Path) -> Self {
        self.stdout = StdoutTarget::Append(path.to_path_buf());
        self
    }

    pub fn output(mut self, path: &Path) -> Self {
        self.outputs.push(path.to_path_buf());
        self
    }

    /// Sub-command name, when the tool has them (`samtools sort` -> `sort`).
    /// Positional arguments of other tools are never reported.
    pub fn subcommand(&self) -> Option<&str> {
        if !SUBCOMMAND_TOOLS.contains(&self.tool.as_str()) {
            return None;
        }
        self.args.first().map(String::as_str).filter(|a| !a.starts_with('-'))
    }

    /// `tool sub` for tools with sub-commands, otherwise the tool name.
    pub fn label(&self) -> String {
        match self.subcommand() {
            Some(sub) => format!("{} {}", self.tool, sub),
            None => self.tool.clone(),
        }
    }

    pub fn command_line(&self) -> String {
        let mut line = self.tool.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        match &self.stdout {
            StdoutTarget::Truncate(path) => line.push_str(&format!(" > {}", path.display())),
            StdoutTarget::Append(path) => line.push_str(&format!(" >> {}", path.display())),
            StdoutTarget::Capture => {}
        }
        line
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ToolOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// The single seam between the pipeline and external programs.
/// Any non-zero exit must come back as `PipelineError::ToolFailed`.
#[allow(async_fn_in_trait)]
pub trait ToolRunner {
    async fn run(&self, step: &ToolStep) -> Result<ToolOutput, PipelineError>;

    /// Full path of `tool` if it can be executed, None otherwise.
    fn resolve(&self, tool: &str) -> Option<PathBuf>;
}

/// Runs steps as real child processes.
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    async fn run(&self, step: &ToolStep) -> Result<ToolOutput, PipelineError> {
        debug!("Running: {}", step.command_line());

        let spawn_err = |e: std::io::Error| PipelineError::ToolSpawn {
            tool: step.tool.clone(),
            error: e.to_string(),
        };

        let stdout = match &step.stdout {
            StdoutTarget::Capture => Stdio::piped(),
            StdoutTarget::Truncate(path) => Stdio::from(File::create(path).map_err(spawn_err)?),
            StdoutTarget::Append(path) => Stdio::from(
                OpenOptions::new().create(true).append(true).open(path).map_err(spawn_err)?,
            ),
        };

        let child = Command::new(&step.tool)
            .args(&step.args)
            .envs(step.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        let output = child.wait_with_output().await.map_err(spawn_err)?;

        if !output.stderr.is_empty() {
            debug!("{} stderr:\n{}", step.tool, String::from_utf8_lossy(&output.stderr).trim_end());
        }

        if !output.status.success() {
            return Err(PipelineError::ToolFailed {
                tool: step.label(),
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr, STDERR_TAIL_LINES),
            });
        }

        Ok(ToolOutput {
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn resolve(&self, tool: &str) -> Option<PathBuf> {
        find_on_path(tool, env::var_os("PATH").as_deref())
    }
}

/// Searches a PATH-style variable for an executable file.
/// A tool given with a directory component is checked directly.
pub fn find_on_path(tool: &str, path_var: Option<&std::ffi::OsStr>) -> Option<PathBuf> {
    let candidate = Path::new(tool);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    env::split_paths(path_var?)
        .map(|dir| dir.join(tool))
        .find(|full| is_executable(full))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn stderr_tail(stderr: &[u8], lines: usize) -> String {
    let text = String::from_utf8_lossy(stderr);
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}


pub mod fastqc {
    use std::path::{Path, PathBuf};
    use crate::config::defs::{RunConfig, FASTQC_TAG};
    use super::ToolStep;

    pub fn step(config: &RunConfig, reads: &[PathBuf], qc_dir: &Path) -> ToolStep {
        let mut step = ToolStep::new(FASTQC_TAG)
            .args(["-t".to_string(), config.threads.to_string(), "-o".to_string()])
            .path_arg(qc_dir);
        for read in reads {
            step = step.path_arg(read);
        }
        step
    }
}

pub mod cutadapt {
    use std::path::{Path, PathBuf};
    use crate::config::defs::{RunConfig, CUTADAPT_TAG, MIN_TRIMMED_LEN};
    use super::ToolStep;

    /// Trims 5' and 3' adapters. With two inputs both mates are trimmed with the same adapters.
    /// The trimming report is appended to `log`.
    pub fn step(config: &RunConfig, inputs: &[PathBuf], outputs: &[PathBuf], log: &Path) -> ToolStep {
        let mut step = ToolStep::new(CUTADAPT_TAG).args([
            "-j".to_string(),
            config.threads.to_string(),
            "-m".to_string(),
            MIN_TRIMMED_LEN.to_string(),
            "-g".to_string(),
            config.adapter5.clone(),
            "-a".to_string(),
            config.adapter3.clone(),
        ]);
        if inputs.len() == 2 {
            step = step.args(["-G".to_string(), config.adapter5.clone(), "-A".to_string(), config.adapter3.clone()]);
        }
        for (flag, out) in ["-o", "-p"].iter().zip(outputs) {
            step = step.arg(*flag).path_arg(out).output(out);
        }
        for input in inputs {
            step = step.path_arg(input);
        }
        step.stdout_append(log)
    }
}

pub mod bwa {
    use std::path::Path;
    use crate::config::defs::{BwaSubcommand, RunConfig, BWA_TAG};
    use super::ToolStep;

    fn base(subcommand: BwaSubcommand) -> ToolStep {
        ToolStep::new(BWA_TAG).arg(subcommand.as_str())
    }

    /// `bwa mem -Y`: supplementary alignments are soft-clipped.
    pub fn mem(config: &RunConfig, reads: &[&Path], sam: &Path) -> ToolStep {
        let mut step = base(BwaSubcommand::Mem)
            .args(["-t".to_string(), config.threads.to_string(), "-Y".to_string()])
            .path_arg(&config.ref_index);
        for read in reads {
            step = step.path_arg(read);
        }
        step.stdout_to(sam)
    }

    pub fn aln(config: &RunConfig, reads: &Path, sai: &Path) -> ToolStep {
        base(BwaSubcommand::Aln)
            .args(["-t".to_string(), config.threads.to_string()])
            .path_arg(&config.ref_index)
            .path_arg(reads)
            .stdout_to(sai)
    }

    pub fn samse(config: &RunConfig, sai: &Path, reads: &Path, sam: &Path) -> ToolStep {
        base(BwaSubcommand::Samse)
            .path_arg(&config.ref_index)
            .path_arg(sai)
            .path_arg(reads)
            .stdout_to(sam)
    }

    pub fn sampe(config: &RunConfig, sais: [&Path; 2], reads: [&Path; 2], sam: &Path) -> ToolStep {
        base(BwaSubcommand::Sampe)
            .path_arg(&config.ref_index)
            .path_arg(sais[0])
            .path_arg(sais[1])
            .path_arg(reads[0])
            .path_arg(reads[1])
            .stdout_to(sam)
    }
}

pub mod samtools {
    use std::path::Path;
    use crate::config::defs::{RunConfig, SamtoolsSubcommand, SAMTOOLS_TAG};
    use super::ToolStep;

    #[derive(Debug)]
    pub struct SamtoolsConfig {
        pub subcommand: SamtoolsSubcommand,
        pub subcommand_fields: Vec<(String, Option<String>)>,
    }

    pub fn arg_generator(config: &RunConfig, samtools_config: &SamtoolsConfig) -> Vec<String> {
        let mut args_vec: Vec<String> = vec![samtools_config.subcommand.as_str().to_string()];

        match samtools_config.subcommand {
            SamtoolsSubcommand::View | SamtoolsSubcommand::Sort | SamtoolsSubcommand::Flagstat => {
                args_vec.push("-@".to_string());
                args_vec.push(config.threads.to_string());
            }
            SamtoolsSubcommand::Rmdup => {}
        }

        for (key, value) in &samtools_config.subcommand_fields {
            args_vec.push(key.clone());
            if let Some(v) = value {
                args_vec.push(v.clone());
            }
        }
        args_vec
    }

    fn step(config: &RunConfig, samtools_config: SamtoolsConfig) -> ToolStep {
        ToolStep::new(SAMTOOLS_TAG).args(arg_generator(config, &samtools_config))
    }

    fn field(key: &str, value: Option<&Path>) -> (String, Option<String>) {
        (key.to_string(), value.map(|p| p.to_string_lossy().into_owned()))
    }

    /// SAM text to unsorted BAM.
    pub fn view_to_bam(config: &RunConfig, sam: &Path, bam: &Path) -> ToolStep {
        step(config, SamtoolsConfig {
            subcommand: SamtoolsSubcommand::View,
            subcommand_fields: vec![field("-b", None), field("-o", Some(bam)), field(&sam.to_string_lossy(), None)],
        })
        .output(bam)
    }

    pub fn sort(config: &RunConfig, input: &Path, output: &Path, by_name: bool) -> ToolStep {
        let mut fields = Vec::new();
        if by_name {
            fields.push(field("-n", None));
        }
        fields.push(field("-o", Some(output)));
        fields.push(field(&input.to_string_lossy(), None));
        step(config, SamtoolsConfig {
            subcommand: SamtoolsSubcommand::Sort,
            subcommand_fields: fields,
        })
        .output(output)
    }

    /// Single-end duplicate removal (`rmdup -s`).
    pub fn rmdup_single(config: &RunConfig, input: &Path, output: &Path) -> ToolStep {
        step(config, SamtoolsConfig {
            subcommand: SamtoolsSubcommand::Rmdup,
            subcommand_fields: vec![field("-s", None), field(&input.to_string_lossy(), None), field(&output.to_string_lossy(), None)],
        })
        .output(output)
    }

    pub fn flagstat(config: &RunConfig, bam: &Path) -> ToolStep {
        step(config, SamtoolsConfig {
            subcommand: SamtoolsSubcommand::Flagstat,
            subcommand_fields: vec![field(&bam.to_string_lossy(), None)],
        })
    }

    /// Keeps records carrying all of `require` and none of `exclude`.
    pub fn filter(config: &RunConfig, input: &Path, output: &Path, require: Option<u16>, exclude: u16) -> ToolStep {
        let mut fields = vec![field("-b", None)];
        if let Some(require) = require {
            fields.push(("-f".to_string(), Some(require.to_string())));
        }
        fields.push(("-F".to_string(), Some(exclude.to_string())));
        fields.push(field("-o", Some(output)));
        fields.push(field(&input.to_string_lossy(), None));
        step(config, SamtoolsConfig {
            subcommand: SamtoolsSubcommand::View,
            subcommand_fields: fields,
        })
        .output(output)
    }
}

pub mod picard {
    use std::path::Path;
    use crate::config::defs::PICARD_TAG;
    use super::ToolStep;

    /// Marks, but keeps, duplicate pairs.
    pub fn mark_duplicates(input: &Path, output: &Path, metrics: &Path) -> ToolStep {
        ToolStep::new(PICARD_TAG)
            .arg("MarkDuplicates")
            .arg(format!("I={}", input.display()))
            .arg(format!("O={}", output.display()))
            .arg(format!("M={}", metrics.display()))
            .arg("REMOVE_DUPLICATES=false")
            .arg("VALIDATION_STRINGENCY=LENIENT")
            .output(output)
            .output(metrics)
    }
}

pub mod bedtools {
    use std::path::Path;
    use crate::config::defs::BEDTOOLS_TAG;
    use super::ToolStep;

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum BamToBedMode {
        /// One interval per aligned block; spliced/gapped reads are split.
        Split,
        /// One line per properly paired fragment. Input must be name-sorted.
        Bedpe,
    }

    pub fn bamtobed(input: &Path, output: &Path, mode: BamToBedMode) -> ToolStep {
        let flag = match mode {
            BamToBedMode::Split => "-split",
            BamToBedMode::Bedpe => "-bedpe",
        };
        ToolStep::new(BEDTOOLS_TAG)
            .args(["bamtobed", flag, "-i"])
            .path_arg(input)
            .stdout_to(output)
    }
}

pub mod ucsc {
    use std::path::Path;
    use crate::config::defs::{BEDGRAPH_TO_BIGWIG_TAG, BED_ITEM_OVERLAP_COUNT_TAG, FETCH_CHROM_SIZES_TAG};
    use super::ToolStep;

    /// Downloads chromosome lengths for `genome` from UCSC.
    pub fn fetch_chrom_sizes(genome: &str, output: &Path) -> ToolStep {
        ToolStep::new(FETCH_CHROM_SIZES_TAG).arg(genome).stdout_to(output)
    }

    /// Input must be sorted by chromosome.
    pub fn bed_item_overlap_count(genome: &str, chrom_sizes: &Path, bed: &Path, output: &Path) -> ToolStep {
        ToolStep::new(BED_ITEM_OVERLAP_COUNT_TAG)
            .arg(genome)
            .arg(format!("-chromSize={}", chrom_sizes.display()))
            .path_arg(bed)
            .stdout_to(output)
    }

    pub fn bedgraph_to_bigwig(bedgraph: &Path, chrom_sizes: &Path, output: &Path) -> ToolStep {
        ToolStep::new(BEDGRAPH_TO_BIGWIG_TAG)
            .path_arg(bedgraph)
            .path_arg(chrom_sizes)
            .path_arg(output)
            .output(output)
    }
}

pub mod coreutils {
    use std::path::Path;
    use crate::config::defs::SORT_TAG;
    use super::ToolStep;

    /// Byte-order sort on the given keys, as the UCSC tools expect.
    pub fn sort(input: &Path, keys: &[&str], output: &Path) -> ToolStep {
        let mut step = ToolStep::new(SORT_TAG).env("LC_ALL", "C");
        for key in keys {
            step = step.arg(format!("-k{}", key));
        }
        step.path_arg(input).stdout_to(output)
    }
}

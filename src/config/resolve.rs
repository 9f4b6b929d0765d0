use std::path::{Path, PathBuf};
use log::info;
use crate::cli::Arguments;
use crate::config::defs::{Algorithm, PipelineError, ReadInputs, RunConfig};
use crate::utils::fastx::{compare_read_ids, expected_mate_name, first_fastq_header, r1r2_base};
use crate::utils::file::extension_remover;

/// Merges parsed arguments with defaults into the run configuration.
/// Read files are checked here, before any tool runs.
///
/// # Arguments
///
/// * `args` - Parsed command line.
/// * `work_dir` - Directory every artifact is written to; relative read paths resolve against it.
///
/// # Returns
/// The immutable RunConfig shared by all stages.
pub fn resolve_config(args: &Arguments, work_dir: &Path) -> Result<RunConfig, PipelineError> {
    let reads = read_inputs(args, work_dir)?;
    validate_reads(&reads)?;

    let prefix = match &args.prefix {
        Some(prefix) => prefix.clone(),
        None => {
            let first = reads.paths().remove(0);
            let derived = derive_prefix(&first, args.single)?;
            info!("No prefix given; using '{}' from {}", derived, first.display());
            derived
        }
    };
    if prefix.is_empty() || prefix.contains('/') {
        return Err(PipelineError::InvalidConfig(format!("Invalid output prefix '{}'", prefix)));
    }

    Ok(RunConfig {
        work_dir: work_dir.to_path_buf(),
        reads,
        algorithm: if args.sensitive { Algorithm::Sensitive } else { Algorithm::Fast },
        threads: args.threads,
        adapter5: args.adapter5.clone(),
        adapter3: args.adapter3.clone(),
        ref_index: PathBuf::from(&args.ref_index),
        prefix,
        genome: args.genome.clone(),
    })
}

fn read_inputs(args: &Arguments, work_dir: &Path) -> Result<ReadInputs, PipelineError> {
    // Every path reaches the tools as a string argument, so it must be valid UTF-8
    let absolute = |read: &String| {
        let path = PathBuf::from(read);
        let path = if path.is_absolute() { path } else { work_dir.join(path) };
        match path.to_str() {
            Some(_) => Ok(path),
            None => Err(PipelineError::InvalidInput {
                path: path.display().to_string(),
                reason: "path is not valid UTF-8".to_string(),
            }),
        }
    };

    match (args.single, args.reads.as_slice()) {
        (true, [reads]) => Ok(ReadInputs::Single(absolute(reads)?)),
        (false, [r1, r2]) => Ok(ReadInputs::Paired { r1: absolute(r1)?, r2: absolute(r2)? }),
        (true, given) => Err(PipelineError::InvalidConfig(format!(
            "Single-end mode takes one read file, {} given", given.len()
        ))),
        (false, given) => Err(PipelineError::InvalidConfig(format!(
            "Paired-end mode takes two read files (R1 and R2), {} given; use -s for single-end", given.len()
        ))),
    }
}

/// Output prefix from the first read file name.
/// Single-end strips the extensions (`sampleA.fastq.gz` -> `sampleA`);
/// paired-end strips from the `_R1` marker on (`sampleB_R1_001.fastq.gz` -> `sampleB`).
/// A name with nothing before the marker (`_R1.fastq`) has no usable prefix and needs `-p`.
pub fn derive_prefix(first_read: &Path, single: bool) -> Result<String, PipelineError> {
    let file_name = first_read
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let derived = if single {
        Some(extension_remover(&file_name).0)
    } else {
        r1r2_base(&file_name).map(|r1r2| r1r2.prefix)
    };

    match derived {
        Some(prefix) if !prefix.is_empty() => Ok(prefix),
        _ => Err(PipelineError::InvalidConfig(format!(
            "Cannot derive an output prefix from '{}'; pass one with -p", file_name
        ))),
    }
}

/// Each file must be a readable FASTQ; paired files must be named and
/// headed as mates of one another.
pub fn validate_reads(reads: &ReadInputs) -> Result<(), PipelineError> {
    match reads {
        ReadInputs::Single(path) => {
            first_fastq_header(path)?;
        }
        ReadInputs::Paired { r1, r2 } => {
            let name = |p: &Path| p.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let (r1_name, r2_name) = (name(r1), name(r2));
            if expected_mate_name(&r1_name).as_deref() != Some(r2_name.as_str()) {
                return Err(PipelineError::InvalidInput {
                    path: r2.display().to_string(),
                    reason: format!("not the R2 mate of '{}' (names must differ only by _R1/_R2)", r1_name),
                });
            }

            let head1 = first_fastq_header(r1)?;
            let head2 = first_fastq_header(r2)?;
            if !compare_read_ids(&head1, &head2) {
                return Err(PipelineError::InvalidInput {
                    path: r2.display().to_string(),
                    reason: format!("first read '{}' does not pair with R1 read '{}'", head2, head1),
                });
            }
        }
    }
    Ok(())
}

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use flate2::read::MultiGzDecoder;
use log::debug;
use crate::config::defs::{FASTQC_DIR, LOG_DIR};

const COMPRESSION_EXTS: &[&str] = &["gz", "bz2"];
const READ_EXTS: &[&str] = &["fastq", "fq", "txt"];

/// Enum to hold either an uncompressed or gzipped file reader
pub enum FileReader {
    Uncompressed(BufReader<File>),
    Gzipped(MultiGzDecoder<File>),
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileReader::Uncompressed(r) => r.read(buf),
            FileReader::Gzipped(r) => r.read(buf),
        }
    }
}

pub fn is_gzipped(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0u8; 2];
    file.read_exact(&mut buffer)?;
    Ok(buffer == [0x1F, 0x8B]) // Gzip magic bytes
}

/// Strips read-file extensions from a file name.
/// Known compression and FASTQ extensions are removed from the end;
/// if none are known, only the last extension is removed.
///
/// # Arguments
///
/// * `file_name` - Bare file name, e.g. `sampleA.fastq.gz`.
///
/// # Returns
/// (stem, removed extensions in file order)
pub fn extension_remover(file_name: &str) -> (String, Vec<String>) {
    let mut stem = file_name;
    let mut extensions = Vec::new();

    while let Some((head, ext)) = stem.rsplit_once('.') {
        let known = COMPRESSION_EXTS.iter().chain(READ_EXTS).any(|e| e.eq_ignore_ascii_case(ext));
        if head.is_empty() || !known {
            break;
        }
        extensions.push(ext.to_string());
        stem = head;
    }

    if extensions.is_empty() {
        if let Some((head, ext)) = stem.rsplit_once('.') {
            if !head.is_empty() {
                extensions.push(ext.to_string());
                stem = head;
            }
        }
    }

    extensions.reverse();
    (stem.to_string(), extensions)
}

/// Builds every artifact path of a run from its prefix.
/// All paths are rooted at the working directory so reruns land on the same names.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPaths {
    work_dir: PathBuf,
    prefix: String,
}

impl ArtifactPaths {
    pub fn new(work_dir: &Path, prefix: &str) -> Self {
        ArtifactPaths {
            work_dir: work_dir.to_path_buf(),
            prefix: prefix.to_string(),
        }
    }

    /// `{work_dir}/{prefix}{suffix}`, e.g. suffix `.sorted.bam`.
    pub fn artifact(&self, suffix: &str) -> PathBuf {
        self.work_dir.join(format!("{}{}", self.prefix, suffix))
    }

    /// `{work_dir}/{prefix}_{mate}{suffix}`, mate being `R1` or `R2`.
    pub fn mate_artifact(&self, mate: &str, suffix: &str) -> PathBuf {
        self.work_dir.join(format!("{}_{}{}", self.prefix, mate, suffix))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.work_dir.join(LOG_DIR)
    }

    pub fn qc_dir(&self) -> PathBuf {
        self.work_dir.join(FASTQC_DIR)
    }

    /// `{work_dir}/logs/{prefix}{suffix}`
    pub fn log(&self, suffix: &str) -> PathBuf {
        self.log_dir().join(format!("{}{}", self.prefix, suffix))
    }
}

/// Creates the log and QC directories. Existing directories are fine.
pub fn ensure_work_dirs(paths: &ArtifactPaths) -> io::Result<()> {
    fs::create_dir_all(paths.log_dir())?;
    fs::create_dir_all(paths.qc_dir())?;
    Ok(())
}

/// Deletes intermediate files once their consumer has finished.
/// Files that are already gone are skipped.
pub fn remove_intermediates(paths: &[PathBuf]) -> io::Result<()> {
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => debug!("Removed intermediate {}", path.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Appends a titled section to a run log.
///
/// # Arguments
///
/// * `log_path` - Log file; created if missing.
/// * `title` - Written as a `## title` line.
/// * `body` - Raw tool output.
pub fn append_log_section(log_path: &Path, title: &str, body: &[u8]) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(log_path)?;
    writeln!(file, "## {}", title)?;
    file.write_all(body)?;
    if !body.ends_with(b"\n") {
        writeln!(file)?;
    }
    Ok(())
}

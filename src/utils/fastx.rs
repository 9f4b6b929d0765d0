use seq_io::fastq::{Reader as FastqReader, Record};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use flate2::read::MultiGzDecoder;
use crate::config::defs::PipelineError;
use crate::utils::file::{is_gzipped, FileReader};

const R1_TAG: &str = "_R1";
const R2_TAG: &str = "_R2";

#[derive(Debug, PartialEq)]
pub struct R1R2Result {
    pub prefix: String,
    pub index: usize,
}

/// Locates the `_R1` marker in a read file name.
/// The marker must be followed by a delimiter (`_`, `.`, `-`) or the end of the name,
/// so `_R10` is not mistaken for a mate tag. The last qualifying marker wins.
///
/// # Arguments
///
/// * `file_name` - Bare file name, no directories.
///
/// # Returns
/// Option<R1R2Result>: prefix before the marker and the marker's byte offset.
pub fn r1r2_base(file_name: &str) -> Option<R1R2Result> {
    file_name
        .match_indices(R1_TAG)
        .filter(|(index, _)| {
            let rest = &file_name[index + R1_TAG.len()..];
            rest.is_empty() || rest.starts_with(['_', '.', '-'])
        })
        .last()
        .map(|(index, _)| R1R2Result {
            prefix: file_name[..index].to_string(),
            index,
        })
}

/// Name the R2 file must carry, given the R1 file name.
pub fn expected_mate_name(r1_name: &str) -> Option<String> {
    let r1r2 = r1r2_base(r1_name)?;
    let mut mate = String::with_capacity(r1_name.len());
    mate.push_str(&r1_name[..r1r2.index]);
    mate.push_str(R2_TAG);
    mate.push_str(&r1_name[r1r2.index + R1_TAG.len()..]);
    Some(mate)
}

/// Opens a FASTQ (plain or gzipped) and returns the header of its first record.
/// Only the first record is read; this is a format sanity check, not full validation.
///
/// # Arguments
///
/// * `path` - Read file to check.
///
/// # Returns
/// Result<String>: full header line of the first record, without the `@`.
pub fn first_fastq_header(path: &Path) -> Result<String, PipelineError> {
    let invalid = |reason: String| PipelineError::InvalidInput {
        path: path.display().to_string(),
        reason,
    };

    let file = File::open(path).map_err(|e| invalid(e.to_string()))?;
    let reader = if is_gzipped(path).map_err(|e| invalid(e.to_string()))? {
        FileReader::Gzipped(MultiGzDecoder::new(file))
    } else {
        FileReader::Uncompressed(BufReader::new(file))
    };

    let mut fastq = FastqReader::new(reader);
    match fastq.next() {
        Some(Ok(record)) => Ok(String::from_utf8_lossy(record.head()).into_owned()),
        Some(Err(e)) => Err(invalid(format!("not a valid FASTQ: {}", e))),
        None => Err(invalid("contains no FASTQ records".to_string())),
    }
}

/// Compares the headers of two FASTQ reads to check they are an R1/R2 pair.
/// Understands Casava 1.8+ (`id 1:N:0:...`) and legacy `/1` `/2` suffixes.
///
/// # Arguments
///
/// * `head1`: &str - Header of read 1
/// * `head2`: &str - Header of read 2
///
/// # Returns
/// bool: true if reads are a matched pair.
pub fn compare_read_ids(head1: &str, head2: &str) -> bool {
    let parts1: Vec<&str> = head1.splitn(2, char::is_whitespace).collect();
    let parts2: Vec<&str> = head2.splitn(2, char::is_whitespace).collect();

    if parts1.len() == 2 && parts2.len() == 2 {
        if parts1[0] != parts2[0] {
            return false;
        }
        let read_num1 = parts1[1].split(':').next().unwrap_or("");
        let read_num2 = parts2[1].split(':').next().unwrap_or("");
        return (read_num1 == "1" && read_num2 == "2") || (read_num1 == "2" && read_num2 == "1");
    }

    let id1 = parts1[0];
    let id2 = parts2[0];
    if let (Some(base1), Some(base2)) = (id1.strip_suffix("/1"), id2.strip_suffix("/2")) {
        return base1 == base2;
    }

    // Some trimmers strip mate suffixes entirely
    id1 == id2
}

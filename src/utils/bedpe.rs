// Functions and definitions for the bedtools BEDPE format
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use anyhow::{anyhow, Result};

/// A fragment reduced to the three columns paired-interval peak callers read.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

/// Parses one `bedtools bamtobed -bedpe` line into a fragment spanning
/// the start of the first mate to the end of the second.
///
/// # Returns
/// Ok(None) when the mates are on different chromosomes or the span is empty.
pub fn parse_bedpe_line(line: &str) -> Result<Option<Fragment>> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 6 {
        return Err(anyhow!("Expected at least 6 BEDPE columns, found {}", fields.len()));
    }
    let chrom1 = fields[0];
    let chrom2 = fields[3];
    // Unaligned mates are written as "." with -1 coordinates
    if chrom1 == "." || chrom2 == "." || chrom1 != chrom2 {
        return Ok(None);
    }
    let start: u64 = fields[1].parse().map_err(|e| anyhow!("Bad start '{}': {}", fields[1], e))?;
    let end: u64 = fields[5].parse().map_err(|e| anyhow!("Bad end '{}': {}", fields[5], e))?;

    if end <= start {
        return Ok(None);
    }
    Ok(Some(Fragment {
        chrom: chrom1.to_string(),
        start,
        end,
    }))
}

/// Rewrites a BEDPE file as `chrom<TAB>start<TAB>end` fragments.
///
/// # Arguments
///
/// * `input` - BEDPE from `bedtools bamtobed -bedpe`.
/// * `output` - Three-column fragment file.
///
/// # Returns
/// (fragments written, lines dropped)
pub fn reduce_bedpe(input: &Path, output: &Path) -> Result<(u64, u64)> {
    let reader = BufReader::new(File::open(input)?);
    let mut writer = BufWriter::new(File::create(output)?);
    let mut kept = 0u64;
    let mut dropped = 0u64;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match parse_bedpe_line(&line).map_err(|e| anyhow!("{} line {}: {}", input.display(), index + 1, e))? {
            Some(fragment) => {
                writeln!(writer, "{}\t{}\t{}", fragment.chrom, fragment.start, fragment.end)?;
                kept += 1;
            }
            None => dropped += 1,
        }
    }
    writer.flush()?;
    Ok((kept, dropped))
}

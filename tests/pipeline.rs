use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use tempfile::TempDir;

use chipseq_pipelines::config::defs::{Algorithm, PipelineError, ReadInputs, RunConfig};
use chipseq_pipelines::pipelines::chipseq;
use chipseq_pipelines::utils::command::{StdoutTarget, ToolOutput, ToolRunner, ToolStep};

const BEDPE_LINES: &str = "chr1\t100\t150\tchr1\t300\t350\tfrag1\t60\t+\t-\n\
                           chr1\t400\t450\tchr2\t10\t60\tfrag2\t60\t+\t-\n";

/// Records every step and fakes its outputs instead of running anything.
#[derive(Default)]
struct MockRunner {
    calls: Mutex<Vec<ToolStep>>,
    fail_on: Option<(&'static str, Option<&'static str>)>,
    missing: Vec<&'static str>,
}

impl MockRunner {
    fn failing_on(tool: &'static str, subcommand: Option<&'static str>) -> Self {
        MockRunner {
            fail_on: Some((tool, subcommand)),
            ..Default::default()
        }
    }

    fn without(tool: &'static str) -> Self {
        MockRunner {
            missing: vec![tool],
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<ToolStep> {
        self.calls.lock().unwrap().clone()
    }

    fn invoked(&self, tool: &str, subcommand: &str) -> bool {
        self.calls().iter().any(|s| s.tool == tool && s.subcommand() == Some(subcommand))
    }
}

impl ToolRunner for MockRunner {
    async fn run(&self, step: &ToolStep) -> Result<ToolOutput, PipelineError> {
        self.calls.lock().unwrap().push(step.clone());

        if let Some((tool, subcommand)) = self.fail_on {
            if step.tool == tool && step.subcommand() == subcommand {
                return Err(PipelineError::ToolFailed {
                    tool: step.label(),
                    code: Some(2),
                    stderr: "mock failure".to_string(),
                });
            }
        }

        if let StdoutTarget::Append(log) = &step.stdout {
            let mut text = fs::read_to_string(log).unwrap_or_default();
            text.push_str("=== Summary ===\n");
            fs::write(log, text)?;
        }

        for output in &step.outputs {
            let body = if step.args.iter().any(|a| a == "-bedpe") { BEDPE_LINES } else { "mock\n" };
            fs::write(output, body)?;
        }

        let stdout = if step.subcommand() == Some("flagstat") {
            b"3 + 0 in total (QC-passed reads + QC-failed reads)\n".to_vec()
        } else {
            Vec::new()
        };
        Ok(ToolOutput { stdout, stderr: Vec::new() })
    }

    fn resolve(&self, tool: &str) -> Option<PathBuf> {
        (!self.missing.iter().any(|m| *m == tool)).then(|| PathBuf::from("/usr/bin").join(tool))
    }
}

struct Fixture {
    _inputs: TempDir,
    work: TempDir,
    config: RunConfig,
}

fn fixture(paired: bool, algorithm: Algorithm) -> Result<Fixture> {
    let inputs = TempDir::new()?;
    let work = TempDir::new()?;
    let reads = if paired {
        let r1 = inputs.path().join("sampleB_R1.fastq.gz");
        let r2 = inputs.path().join("sampleB_R2.fastq.gz");
        fs::write(&r1, "@r/1\nACGT\n+\nIIII\n")?;
        fs::write(&r2, "@r/2\nACGT\n+\nIIII\n")?;
        ReadInputs::Paired { r1, r2 }
    } else {
        let reads = inputs.path().join("sampleA.fastq.gz");
        fs::write(&reads, "@r\nACGT\n+\nIIII\n")?;
        ReadInputs::Single(reads)
    };
    let config = RunConfig {
        work_dir: work.path().to_path_buf(),
        reads,
        algorithm,
        threads: 2,
        adapter5: "AATGATACGG".to_string(),
        adapter3: "AGATCGGAAG".to_string(),
        ref_index: PathBuf::from("/idx/hg38.fa"),
        prefix: if paired { "sampleB" } else { "sampleA" }.to_string(),
        genome: "hg38".to_string(),
    };
    Ok(Fixture { _inputs: inputs, work, config })
}

fn listing(dir: &Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for entry in fs::read_dir(dir)? {
        names.insert(entry?.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

fn set(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn test_single_end_leaves_only_final_outputs() -> Result<()> {
    let fx = fixture(false, Algorithm::Fast)?;
    let runner = MockRunner::default();

    let outputs = chipseq::run(&runner, &fx.config).await?;

    assert_eq!(listing(fx.work.path())?, set(&["fastqc", "logs", "sampleA.bw", "sampleA.filtered.bam"]));
    assert_eq!(listing(&fx.work.path().join("logs"))?, set(&["sampleA.align.log", "sampleA.trimming.log"]));
    assert_eq!(outputs.bedpe, None);
    assert_eq!(outputs.bigwig, fx.work.path().join("sampleA.bw"));
    assert_eq!(outputs.filtered_bam, fx.work.path().join("sampleA.filtered.bam"));
    Ok(())
}

#[tokio::test]
async fn test_paired_end_adds_bedpe() -> Result<()> {
    let fx = fixture(true, Algorithm::Fast)?;
    let runner = MockRunner::default();

    let outputs = chipseq::run(&runner, &fx.config).await?;

    assert_eq!(
        listing(fx.work.path())?,
        set(&["fastqc", "logs", "sampleB.bedpe", "sampleB.bw", "sampleB.filtered.bam"])
    );
    assert_eq!(
        listing(&fx.work.path().join("logs"))?,
        set(&["sampleB.align.log", "sampleB.markdup_metrics.txt", "sampleB.trimming.log"])
    );
    let bedpe = outputs.bedpe.expect("paired run must produce a BEDPE");
    assert_eq!(fs::read_to_string(bedpe)?, "chr1\t100\t350\n");
    Ok(())
}

#[tokio::test]
async fn test_duplicate_handling_differs_by_mode() -> Result<()> {
    let single = fixture(false, Algorithm::Fast)?;
    let single_runner = MockRunner::default();
    chipseq::run(&single_runner, &single.config).await?;
    assert!(single_runner.invoked("samtools", "rmdup"));
    assert!(!single_runner.calls().iter().any(|s| s.tool == "picard"));
    let single_filter = single_runner.calls().into_iter()
        .find(|s| s.subcommand() == Some("view") && s.args.contains(&"-F".to_string()))
        .expect("single-end filter step");
    assert!(!single_filter.args.contains(&"-f".to_string()));

    let paired = fixture(true, Algorithm::Fast)?;
    let paired_runner = MockRunner::default();
    chipseq::run(&paired_runner, &paired.config).await?;
    assert!(paired_runner.invoked("picard", "MarkDuplicates"));
    assert!(!paired_runner.invoked("samtools", "rmdup"));
    let paired_filter = paired_runner.calls().into_iter()
        .find(|s| s.subcommand() == Some("view") && s.args.contains(&"-F".to_string()))
        .expect("paired-end filter step");
    let f = paired_filter.args.iter().position(|a| a == "-f").expect("-f flag");
    assert_eq!(paired_filter.args[f + 1], "2");
    let big_f = paired_filter.args.iter().position(|a| a == "-F").expect("-F flag");
    assert_eq!(paired_filter.args[big_f + 1], "1804");
    Ok(())
}

#[tokio::test]
async fn test_sensitive_paired_alignment_uses_aln_and_sampe() -> Result<()> {
    let fx = fixture(true, Algorithm::Sensitive)?;
    let runner = MockRunner::default();
    chipseq::run(&runner, &fx.config).await?;

    let bwa: Vec<String> = runner.calls().iter()
        .filter(|s| s.tool == "bwa")
        .filter_map(|s| s.subcommand().map(str::to_string))
        .collect();
    assert_eq!(bwa, vec!["aln", "aln", "sampe"]);
    assert!(!listing(fx.work.path())?.iter().any(|n| n.ends_with(".sai")));
    Ok(())
}

#[tokio::test]
async fn test_sensitive_single_alignment_uses_aln_and_samse() -> Result<()> {
    let fx = fixture(false, Algorithm::Sensitive)?;
    let runner = MockRunner::default();
    chipseq::run(&runner, &fx.config).await?;

    let bwa: Vec<ToolStep> = runner.calls().into_iter().filter(|s| s.tool == "bwa").collect();
    let subcommands: Vec<&str> = bwa.iter().filter_map(|s| s.subcommand()).collect();
    assert_eq!(subcommands, vec!["aln", "samse"]);

    let sai = fx.work.path().join("sampleA.sai");
    assert_eq!(bwa[0].stdout, StdoutTarget::Truncate(sai.clone()));
    assert!(bwa[1].args.contains(&sai.to_string_lossy().into_owned()));
    assert_eq!(bwa[1].stdout, StdoutTarget::Truncate(fx.work.path().join("sampleA.sam")));
    assert!(!listing(fx.work.path())?.iter().any(|n| n.ends_with(".sai")));
    Ok(())
}

#[tokio::test]
async fn test_fast_single_alignment_soft_clips_supplementary() -> Result<()> {
    let fx = fixture(false, Algorithm::Fast)?;
    let runner = MockRunner::default();
    chipseq::run(&runner, &fx.config).await?;

    let mem: Vec<ToolStep> = runner.calls().into_iter().filter(|s| s.tool == "bwa").collect();
    assert_eq!(mem.len(), 1);
    assert_eq!(mem[0].subcommand(), Some("mem"));
    assert!(mem[0].args.contains(&"-Y".to_string()));
    assert_eq!(mem[0].stdout, StdoutTarget::Truncate(fx.work.path().join("sampleA.sam")));
    Ok(())
}

#[tokio::test]
async fn test_stage_order() -> Result<()> {
    let fx = fixture(false, Algorithm::Fast)?;
    let runner = MockRunner::default();
    chipseq::run(&runner, &fx.config).await?;

    let order: Vec<String> = runner.calls().iter().map(|s| match (s.tool.as_str(), s.subcommand()) {
        ("bwa" | "samtools" | "bedtools", Some(sub)) => format!("{} {}", s.tool, sub),
        _ => s.tool.clone(),
    }).collect();
    assert_eq!(order, vec![
        "fastqc",
        "cutadapt",
        "bwa mem",
        "samtools view",
        "samtools sort",
        "samtools rmdup",
        "samtools flagstat",
        "samtools view",
        "samtools flagstat",
        "bedtools bamtobed",
        "fetchChromSizes",
        "sort",
        "bedItemOverlapCount",
        "sort",
        "bedGraphToBigWig",
    ]);
    Ok(())
}

#[tokio::test]
async fn test_align_log_records_each_flagstat() -> Result<()> {
    let fx = fixture(true, Algorithm::Fast)?;
    let runner = MockRunner::default();
    let outputs = chipseq::run(&runner, &fx.config).await?;

    let log = fs::read_to_string(&outputs.align_log)?;
    let titles: Vec<&str> = log.lines().filter(|l| l.starts_with("## ")).collect();
    assert_eq!(titles, vec!["## flagstat after MarkDuplicates", "## flagstat after filtering"]);
    assert!(fs::read_to_string(&outputs.trimming_log)?.contains("=== Summary ==="));
    Ok(())
}

#[tokio::test]
async fn test_tool_failure_aborts_remaining_steps() -> Result<()> {
    let fx = fixture(false, Algorithm::Fast)?;
    let runner = MockRunner::failing_on("samtools", Some("sort"));

    let err = chipseq::run(&runner, &fx.config).await.unwrap_err();
    assert_eq!(err.exit_code(), 2);
    assert!(matches!(err, PipelineError::ToolFailed { .. }));

    let last = runner.calls().last().cloned().expect("at least one call");
    assert_eq!(last.subcommand(), Some("sort"));
    assert!(!runner.calls().iter().any(|s| s.tool == "bedGraphToBigWig"));
    assert!(!fx.work.path().join("sampleA.bw").exists());
    Ok(())
}

#[tokio::test]
async fn test_chrom_sizes_failure_stops_coverage_track() -> Result<()> {
    let fx = fixture(false, Algorithm::Fast)?;
    let runner = MockRunner::failing_on("fetchChromSizes", None);

    match chipseq::run(&runner, &fx.config).await {
        Err(PipelineError::ToolFailed { tool, code, .. }) => {
            assert_eq!(tool, "fetchChromSizes");
            assert_eq!(code, Some(2));
        }
        other => panic!("expected ToolFailed, got {:?}", other),
    }

    assert_eq!(runner.calls().last().map(|s| s.tool.clone()).as_deref(), Some("fetchChromSizes"));
    assert!(!runner.calls().iter().any(|s| s.tool == "bedItemOverlapCount" || s.tool == "bedGraphToBigWig"));
    assert!(!fx.work.path().join("sampleA.bw").exists());
    // Earlier outputs stay; cleanup only runs after a stage succeeds
    assert!(fx.work.path().join("sampleA.filtered.bam").exists());
    assert!(fx.work.path().join("sampleA.bed").exists());
    Ok(())
}

#[tokio::test]
async fn test_missing_tool_fails_before_any_step() -> Result<()> {
    let fx = fixture(true, Algorithm::Fast)?;
    let runner = MockRunner::without("picard");

    match chipseq::run(&runner, &fx.config).await {
        Err(PipelineError::MissingTool(tool)) => assert_eq!(tool, "picard"),
        other => panic!("expected MissingTool, got {:?}", other),
    }
    assert!(runner.calls().is_empty());
    assert!(listing(fx.work.path())?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_single_end_does_not_need_picard() -> Result<()> {
    let fx = fixture(false, Algorithm::Fast)?;
    let runner = MockRunner::without("picard");
    chipseq::run(&runner, &fx.config).await?;
    Ok(())
}

#[tokio::test]
async fn test_rerun_reuses_the_same_names() -> Result<()> {
    let fx = fixture(true, Algorithm::Fast)?;
    chipseq::run(&MockRunner::default(), &fx.config).await?;
    let first = listing(fx.work.path())?;
    chipseq::run(&MockRunner::default(), &fx.config).await?;
    assert_eq!(listing(fx.work.path())?, first);
    Ok(())
}

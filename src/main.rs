use std::env;
use std::io::Write;
use std::time::Instant;

use anyhow::Result;
use env_logger::Builder;
use log::{error, info, LevelFilter};

use chipseq_pipelines::cli::{parse, usage};
use chipseq_pipelines::config::resolve::resolve_config;
use chipseq_pipelines::pipelines::chipseq;
use chipseq_pipelines::utils::command::SystemRunner;
use chipseq_pipelines::utils::system::check_thread_count;


#[tokio::main]
async fn main() -> Result<()> {
    let run_start = Instant::now();

    // Usage errors exit 2 and -h exits 0, both before anything touches the disk
    let args = parse();

    let log_level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    Builder::new()
        .filter_level(log_level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {}: {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .init();

    let dir = env::current_dir()?;
    info!("The current directory is {:?}", dir);

    let config = match resolve_config(&args, &dir) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", usage());
            std::process::exit(e.exit_code());
        }
    };
    check_thread_count(config.threads);

    if let Err(e) = chipseq::run(&SystemRunner, &config).await {
        error!("Pipeline failed: {} at {} milliseconds.", e, run_start.elapsed().as_millis());
        eprintln!("{}", usage());
        std::process::exit(e.exit_code());
    }

    println!("ChIP-seq pipeline for '{}' completed successfully: {} milliseconds.", config.prefix, run_start.elapsed().as_millis());
    Ok(())
}

// src/utils/system.rs: System functions

use log::{debug, warn};
use sysinfo::System;
use crate::config::defs::PipelineError;
use crate::utils::command::ToolRunner;


/// Verifies every tool resolves before anything runs.
///
/// # Arguments
///
/// * `runner` - Resolves tool names to executables.
/// * `tools` - Tool names, checked in order.
///
/// # Returns
///
/// Err(MissingTool) naming the first tool that cannot be found.
pub fn check_tools<R: ToolRunner>(runner: &R, tools: &[&str]) -> Result<(), PipelineError> {
    for tool in tools {
        match runner.resolve(tool) {
            Some(path) => debug!("Found {} at {}", tool, path.display()),
            None => return Err(PipelineError::MissingTool(tool.to_string())),
        }
    }
    Ok(())
}


/// Warns when more threads are requested than there are physical cores.
/// The request is still honoured; the tools decide what to do with it.
///
/// # Arguments
///
/// * `threads` - Requested thread count.
///
/// # Returns
///
/// Detected physical core count, or None if it could not be determined.
pub fn check_thread_count(threads: usize) -> Option<usize> {
    let physical_cores = System::physical_core_count();
    match physical_cores {
        Some(cores) if threads > cores => {
            warn!("{} threads requested but only {} physical cores detected", threads, cores);
        }
        Some(cores) => debug!("Using {} of {} physical cores", threads, cores),
        None => debug!("Could not detect physical core count"),
    }
    physical_cores
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::utils::command::{ToolOutput, ToolStep};

    struct OnlyBwa;

    impl ToolRunner for OnlyBwa {
        async fn run(&self, _step: &ToolStep) -> Result<ToolOutput, PipelineError> {
            Ok(ToolOutput::default())
        }

        fn resolve(&self, tool: &str) -> Option<PathBuf> {
            (tool == "bwa").then(|| PathBuf::from("/usr/bin/bwa"))
        }
    }

    #[test]
    fn test_check_tools_names_missing_tool() {
        assert!(check_tools(&OnlyBwa, &["bwa"]).is_ok());
        match check_tools(&OnlyBwa, &["bwa", "samtools", "picard"]) {
            Err(PipelineError::MissingTool(tool)) => assert_eq!(tool, "samtools"),
            other => panic!("expected MissingTool, got {:?}", other),
        }
    }

    #[test]
    fn test_check_thread_count_never_fails() {
        if let Some(cores) = check_thread_count(1) {
            assert!(cores >= 1);
        }
        check_thread_count(100_000);
    }
}

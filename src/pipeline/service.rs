use std::path::PathBuf;
use std::process::Command;

use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{MigratorError, Result};
use crate::pipeline::{rewrite_config_file, IndexingPipeline};

/// Pipeline driven by service manager commands and its config file.
pub struct ServicePipeline {
    stop_command: Vec<String>,
    start_command: Vec<String>,
    config_file: PathBuf,
    reindex_key: String,
}

impl ServicePipeline {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            stop_command: config.stop_command.clone(),
            start_command: config.start_command.clone(),
            config_file: config.config_file.clone(),
            reindex_key: config.reindex_key.clone(),
        }
    }

    fn run(argv: &[String]) -> Result<()> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| MigratorError::Pipeline("empty pipeline command".to_string()))?;

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| MigratorError::Pipeline(format!("Failed to run {}: {}", program, e)))?;

        if !output.status.success() {
            return Err(MigratorError::Pipeline(format!(
                "`{}` exited with {}: {}",
                argv.join(" "),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

impl IndexingPipeline for ServicePipeline {
    fn stop(&self) -> Result<()> {
        info!(command = %self.stop_command.join(" "), "stopping indexing pipeline");
        Self::run(&self.stop_command)
    }

    fn start(&self) -> Result<()> {
        info!(command = %self.start_command.join(" "), "starting indexing pipeline");
        Self::run(&self.start_command)
    }

    fn set_reindex(&self, enabled: bool) -> Result<()> {
        info!(
            file = %self.config_file.display(),
            enabled,
            "rewriting indexing pipeline config"
        );
        let value = if enabled { "true" } else { "false" };
        rewrite_config_file(&self.config_file, &[(self.reindex_key.as_str(), value)])
    }
}

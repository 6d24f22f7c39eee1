//! Implementation of the configuration module.
//!
//! The configuration is the whole of the submitter's input: there are no
//! runtime arguments beyond the `--config` path. The defaults reproduce the
//! original submission exactly; a configuration file only needs to state
//! what differs from it.

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use anyhow::ensure;
use bytesize::ByteSize;
use serde::Deserialize;
use serde::Serialize;

use crate::DEFAULT_CONFIG_FILE;
use crate::job::GresSpec;
use crate::job::OpenMode;
use crate::job::SignalSpec;
use crate::training::TrainingConfig;

/// The default spool directory for generated batch scripts.
const DEFAULT_SCRIPT_DIR: &str = "~/.cache/jobsub";

/// Represents the configuration for the jobsub CLI tool.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub struct Config {
    /// The resource-request side of the job.
    #[serde(default)]
    pub job: JobConfig,
    /// The hyperparameter table for the training program.
    #[serde(default)]
    pub training: TrainingConfig,
    /// How the submission itself is performed.
    #[serde(default)]
    pub submit: SubmitConfig,
}

impl Config {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        self.job.validate()?;
        self.training.validate()?;
        self.submit.validate()?;
        Ok(())
    }

    /// Reads a configuration file from the specified path.
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| {
            format!(
                "failed to read configuration file `{path}`",
                path = path.display()
            )
        })?;
        toml::from_str(&text).with_context(|| {
            format!(
                "failed to parse configuration file `{path}`",
                path = path.display()
            )
        })
    }

    /// Writes the configuration to the specified path.
    pub fn write(&self, path: &Path) -> Result<()> {
        let text = toml::to_string_pretty(self).context("failed to serialize configuration")?;
        std::fs::write(path, text).with_context(|| {
            format!(
                "failed to write configuration file `{path}`",
                path = path.display()
            )
        })
    }

    /// Loads the configuration for a CLI invocation.
    ///
    /// An explicit path must exist; without one, `jobsub.toml` in the working
    /// directory is used when present and the built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::read(path),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    Self::read(default)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }
}

/// Represents the resource-request configuration for the job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields, default)]
pub struct JobConfig {
    /// The job name, used for display and log correlation.
    pub name: String,
    /// The stdout path template; `%u`, `%x`, and `%j` are resolved by Slurm.
    pub output: String,
    /// The stderr path template.
    pub error: String,
    /// The termination-warning signal request.
    pub signal: SignalSpec,
    /// The log-file write mode across requeues.
    pub open_mode: OpenMode,
    /// The partition to schedule into.
    pub partition: String,
    /// The wall-clock time limit in minutes.
    pub time_limit_mins: u64,
    /// The number of nodes requested.
    pub nodes: u64,
    /// The number of tasks per node.
    pub tasks_per_node: u64,
    /// The number of CPUs per task.
    pub cpus_per_task: u64,
    /// The generic-resource request per node.
    pub gres: GresSpec,
    /// The memory requested per CPU.
    pub mem_per_cpu: ByteSize,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            name: "deepspeech".to_string(),
            output: "/checkpoint/%u/jobs/%x-%j.out".to_string(),
            error: "/checkpoint/%u/jobs/%x-%j.err".to_string(),
            signal: SignalSpec::default(),
            open_mode: OpenMode::Append,
            partition: "learnfair".to_string(),
            time_limit_mins: 4320,
            nodes: 1,
            tasks_per_node: 1,
            cpus_per_task: 80,
            gres: GresSpec::default(),
            mem_per_cpu: ByteSize::mib(5120),
        }
    }
}

impl JobConfig {
    /// Validates the resource-request configuration.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.name.is_empty(), "the job name cannot be empty");
        ensure!(!self.output.is_empty(), "the stdout path cannot be empty");
        ensure!(!self.error.is_empty(), "the stderr path cannot be empty");
        ensure!(
            !self.signal.name.is_empty(),
            "the warning signal name cannot be empty"
        );
        ensure!(
            self.signal.lead_time_secs > 0,
            "the warning signal lead time must be greater than zero"
        );
        ensure!(!self.partition.is_empty(), "the partition name cannot be empty");
        ensure!(
            self.time_limit_mins > 0,
            "the time limit must be greater than zero"
        );
        ensure!(self.nodes > 0, "at least 1 node must be requested");
        ensure!(
            self.tasks_per_node > 0,
            "at least 1 task per node must be requested"
        );
        ensure!(
            self.cpus_per_task > 0,
            "at least 1 CPU per task must be requested"
        );
        ensure!(!self.gres.kind.is_empty(), "the resource kind cannot be empty");
        ensure!(self.gres.count > 0, "at least 1 resource must be requested");
        ensure!(
            self.mem_per_cpu.as_u64() > 0,
            "at least some memory per CPU must be requested"
        );
        Ok(())
    }
}

/// Represents the configuration of the submission itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields, default)]
pub struct SubmitConfig {
    /// The scheduler submission program to invoke.
    pub program: String,
    /// The spool directory for generated batch scripts; `~` is expanded.
    ///
    /// Scripts are kept after submission so the submitted artifact remains
    /// inspectable.
    pub script_dir: Option<String>,
    /// Additional command-line arguments to pass to the submission program.
    pub extra_args: Option<Vec<String>>,
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            program: "sbatch".to_string(),
            script_dir: None,
            extra_args: None,
        }
    }
}

impl SubmitConfig {
    /// Validates the submission configuration.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.program.is_empty(),
            "the submission program cannot be empty"
        );
        if let Some(dir) = &self.script_dir {
            ensure!(!dir.is_empty(), "the script directory cannot be empty");
        }
        Ok(())
    }

    /// Resolves the spool directory for generated batch scripts.
    pub fn resolved_script_dir(&self) -> PathBuf {
        let raw = self.script_dir.as_deref().unwrap_or(DEFAULT_SCRIPT_DIR);
        PathBuf::from(shellexpand::tilde(raw).into_owned())
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn default_configuration_validates() {
        Config::default().validate().expect("should validate");
    }

    #[test]
    fn partial_configuration_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [job]
            partition = "dev"

            [training]
            checkpoint = "run-1"
            "#,
        )
        .expect("should parse");

        assert_eq!(config.job.partition, "dev");
        assert_eq!(config.job.cpus_per_task, 80);
        assert_eq!(config.training.checkpoint, "run-1");
        assert_eq!(config.training.batch_size, 256);
        assert_eq!(config.submit.program, "sbatch");
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result: std::result::Result<Config, _> = toml::from_str(
            r#"
            [job]
            partitions = "dev"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn read_round_trips_through_a_file() {
        let dir = tempfile::tempdir().expect("should create a temp dir");
        let path = dir.path().join("jobsub.toml");

        let mut config = Config::default();
        config.job.name = "deepspeech-sgd".to_string();
        config.write(&path).expect("should write");

        let read = Config::read(&path).expect("should read");
        assert_eq!(read.job.name, "deepspeech-sgd");
        assert_eq!(read.job.time_limit_mins, 4320);
    }

    #[test]
    fn explicit_config_path_must_exist() {
        assert!(Config::load(Some(Path::new("/nonexistent/jobsub.toml"))).is_err());
    }

    #[test]
    fn script_dir_expands_tilde() {
        let mut submit = SubmitConfig::default();
        submit.script_dir = Some("~/scripts".to_string());
        let resolved = submit.resolved_script_dir();
        assert!(!resolved.display().to_string().starts_with('~'));
        assert!(resolved.display().to_string().ends_with("/scripts"));
    }
}

//! The immutable job request handed to the scheduler.
//!
//! A [`JobRequest`] is constructed once per submission and never mutated: it
//! carries the resource-request descriptor and the launch command, and knows
//! how to render both as the batch script that `sbatch` accepts. Path
//! templates may embed `%u` (user), `%x` (job name), and `%j` (job id)
//! tokens, which Slurm resolves at allocation time.

use std::fmt::Write as _;

use anyhow::Result;
use bytesize::ByteSize;
use serde::Deserialize;
use serde::Serialize;

use crate::config::Config;
use crate::training::TrainingConfig;

/// The log-file write mode across job requeues.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenMode {
    /// Overwrite the log files on each (re)start.
    Truncate,

    /// Preserve prior log content across requeues.
    #[default]
    Append,
}

impl std::fmt::Display for OpenMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpenMode::Truncate => write!(f, "truncate"),
            OpenMode::Append => write!(f, "append"),
        }
    }
}

/// A termination-warning signal request.
///
/// Slurm delivers the named signal to the job a fixed lead time before hard
/// termination, giving the training program a window to checkpoint and exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields, default)]
pub struct SignalSpec {
    /// The signal name, without the `SIG` prefix.
    pub name: String,
    /// How many seconds before termination the signal is delivered.
    pub lead_time_secs: u64,
}

impl Default for SignalSpec {
    fn default() -> Self {
        Self {
            name: "USR1".to_string(),
            lead_time_secs: 600,
        }
    }
}

impl std::fmt::Display for SignalSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{name}@{lead_time}",
            name = self.name,
            lead_time = self.lead_time_secs
        )
    }
}

/// A generic-resource (GRES) request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields, default)]
pub struct GresSpec {
    /// The resource kind, e.g. `gpu` or `gpu:v100`.
    pub kind: String,
    /// The number of resources requested per node.
    pub count: u64,
}

impl Default for GresSpec {
    fn default() -> Self {
        Self {
            kind: "gpu".to_string(),
            count: 8,
        }
    }
}

impl std::fmt::Display for GresSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{kind}:{count}", kind = self.kind, count = self.count)
    }
}

/// Represents a validated, immutable job request.
///
/// This is the single construction point for submissions: building a request
/// runs all configuration validation, so a malformed descriptor or launch
/// command never reaches the scheduler.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// The job name, for display and log correlation only.
    name: String,
    /// The stdout path template.
    output: String,
    /// The stderr path template.
    error: String,
    /// The termination-warning signal request.
    signal: SignalSpec,
    /// The log-file write mode.
    open_mode: OpenMode,
    /// The partition to schedule into.
    partition: String,
    /// The wall-clock time limit in minutes.
    time_limit_mins: u64,
    /// The number of nodes requested.
    nodes: u64,
    /// The number of tasks per node.
    tasks_per_node: u64,
    /// The number of CPUs per task.
    cpus_per_task: u64,
    /// The generic-resource request.
    gres: GresSpec,
    /// The memory requested per CPU.
    mem_per_cpu: ByteSize,
    /// The validated hyperparameter table.
    training: TrainingConfig,
}

impl JobRequest {
    /// Builds a job request from a configuration, validating it.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let job = &config.job;
        Ok(Self {
            name: job.name.clone(),
            output: job.output.clone(),
            error: job.error.clone(),
            signal: job.signal.clone(),
            open_mode: job.open_mode,
            partition: job.partition.clone(),
            time_limit_mins: job.time_limit_mins,
            nodes: job.nodes,
            tasks_per_node: job.tasks_per_node,
            cpus_per_task: job.cpus_per_task,
            gres: job.gres.clone(),
            mem_per_cpu: job.mem_per_cpu,
            training: config.training.clone(),
        })
    }

    /// The job name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renders the resource-request descriptor as `sbatch` arguments.
    ///
    /// The rendering is deterministic: the same request always produces the
    /// same tokens in the same order.
    pub fn sbatch_args(&self) -> Vec<String> {
        vec![
            format!("--job-name={name}", name = self.name),
            format!("--output={output}", output = self.output),
            format!("--error={error}", error = self.error),
            format!("--signal={signal}", signal = self.signal),
            format!("--open-mode={mode}", mode = self.open_mode),
            format!("--partition={partition}", partition = self.partition),
            format!("--time={mins}", mins = self.time_limit_mins),
            format!("--nodes={nodes}", nodes = self.nodes),
            format!("--ntasks-per-node={tasks}", tasks = self.tasks_per_node),
            format!("--gres={gres}", gres = self.gres),
            format!("--cpus-per-task={cpus}", cpus = self.cpus_per_task),
            // Memory is specified in mebibytes, rounded up to the next one.
            format!(
                "--mem-per-cpu={mib}M",
                mib = (self.mem_per_cpu.as_u64() as f64 / bytesize::MIB as f64).ceil() as u64
            ),
        ]
    }

    /// Renders the launch command for the allocated node.
    pub fn launch_command(&self) -> Result<String> {
        self.training.render()
    }

    /// Renders the batch script submitted to `sbatch`.
    ///
    /// The descriptor travels as `#SBATCH` directive lines so the submitted
    /// artifact is self-contained and inspectable after hand-off.
    pub fn script_contents(&self) -> Result<String> {
        let mut script = String::from("#!/bin/sh\n");
        for arg in self.sbatch_args() {
            writeln!(script, "#SBATCH {arg}")?;
        }
        script.push('\n');
        script.push_str(&self.launch_command()?);
        script.push('\n');
        Ok(script)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn default_descriptor_rendering() {
        let request =
            JobRequest::from_config(&Config::default()).expect("default config should validate");
        assert_eq!(request.sbatch_args(), [
            "--job-name=deepspeech",
            "--output=/checkpoint/%u/jobs/%x-%j.out",
            "--error=/checkpoint/%u/jobs/%x-%j.err",
            "--signal=USR1@600",
            "--open-mode=append",
            "--partition=learnfair",
            "--time=4320",
            "--nodes=1",
            "--ntasks-per-node=1",
            "--gres=gpu:8",
            "--cpus-per-task=80",
            "--mem-per-cpu=5120M",
        ]);
    }

    #[test]
    fn descriptor_is_stable_across_invocations() {
        let request = JobRequest::from_config(&Config::default()).expect("should validate");
        assert_eq!(request.sbatch_args(), request.sbatch_args());
        assert_eq!(
            request.script_contents().expect("should render"),
            request.script_contents().expect("should render")
        );
    }

    #[test]
    fn default_script_rendering() {
        let request = JobRequest::from_config(&Config::default()).expect("should validate");
        assert_eq!(
            request.script_contents().expect("should render"),
            "#!/bin/sh\n\
             #SBATCH --job-name=deepspeech\n\
             #SBATCH --output=/checkpoint/%u/jobs/%x-%j.out\n\
             #SBATCH --error=/checkpoint/%u/jobs/%x-%j.err\n\
             #SBATCH --signal=USR1@600\n\
             #SBATCH --open-mode=append\n\
             #SBATCH --partition=learnfair\n\
             #SBATCH --time=4320\n\
             #SBATCH --nodes=1\n\
             #SBATCH --ntasks-per-node=1\n\
             #SBATCH --gres=gpu:8\n\
             #SBATCH --cpus-per-task=80\n\
             #SBATCH --mem-per-cpu=5120M\n\
             \n\
             python main.py --num-workers 0 --batch-size 256 --train-data-urls \
             train-clean-100 train-clean-360 train-other-500 --num-epochs 200 \
             --window-stride 20 --optimizer adam --learning-rate 3e-4 \
             --log-steps 100 --checkpoint test\n"
        );
    }

    #[test]
    fn changing_one_field_changes_one_token() {
        let mut config = Config::default();
        config.job.gres.count = 16;

        let base = JobRequest::from_config(&Config::default()).expect("should validate");
        let changed = JobRequest::from_config(&config).expect("should validate");

        let base_args = base.sbatch_args();
        let changed_args = changed.sbatch_args();
        assert_eq!(base_args.len(), changed_args.len());
        for (before, after) in base_args.iter().zip(changed_args.iter()) {
            if before.starts_with("--gres=") {
                assert_eq!(after, "--gres=gpu:16");
            } else {
                assert_eq!(before, after);
            }
        }

        // The launch command is unaffected by descriptor changes.
        assert_eq!(
            base.launch_command().expect("should render"),
            changed.launch_command().expect("should render")
        );
    }

    #[test]
    fn zero_nodes_fail_before_submission() {
        let mut config = Config::default();
        config.job.nodes = 0;
        assert!(JobRequest::from_config(&config).is_err());
    }

    #[test]
    fn empty_partition_fails_before_submission() {
        let mut config = Config::default();
        config.job.partition = String::new();
        assert!(JobRequest::from_config(&config).is_err());
    }

    #[test]
    fn missing_hyperparameter_fails_before_submission() {
        let mut config = Config::default();
        config.training.checkpoint = String::new();
        assert!(JobRequest::from_config(&config).is_err());
    }

    #[test]
    fn gres_spec_display() {
        let gres = GresSpec {
            kind: "gpu:v100".to_string(),
            count: 4,
        };
        assert_eq!(gres.to_string(), "gpu:v100:4");
    }

    #[test]
    fn signal_spec_display() {
        assert_eq!(SignalSpec::default().to_string(), "USR1@600");
    }
}

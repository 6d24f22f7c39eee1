//! The hyperparameter table for the external training program.
//!
//! The training program itself (`main.py`) is an opaque external
//! collaborator; this module only reproduces its argument grammar. Flag
//! names and value renderings must match that grammar exactly, as nothing
//! validates the command until the allocated node starts the program.

use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use anyhow::ensure;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

/// The optimizer used by the training program.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Optimizer {
    /// Stochastic gradient descent with momentum.
    Sgd,

    /// The Adam optimizer.
    #[default]
    Adam,
}

impl std::fmt::Display for Optimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Optimizer::Sgd => write!(f, "sgd"),
            Optimizer::Adam => write!(f, "adam"),
        }
    }
}

/// Represents the hyperparameters substituted into the launch command.
///
/// The defaults reproduce the original submission; optional fields are
/// omitted from the rendered command entirely when unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields, default)]
pub struct TrainingConfig {
    /// The interpreter used to launch the training program.
    pub python: String,
    /// The path to the training program, relative to the allocation's working
    /// directory.
    pub program: String,
    /// The number of data-loading worker processes.
    pub num_workers: u64,
    /// The per-step batch size.
    pub batch_size: u64,
    /// The LibriSpeech subsets to train on.
    pub train_data_urls: Vec<String>,
    /// The LibriSpeech subsets to validate on.
    pub val_data_urls: Option<Vec<String>>,
    /// The number of training epochs.
    pub num_epochs: u64,
    /// The spectrogram window length in milliseconds.
    pub window_length: Option<u64>,
    /// The stride between spectrogram windows in milliseconds.
    pub window_stride: u64,
    /// The optimizer to train with.
    pub optimizer: Optimizer,
    /// The learning rate; rendered in scientific notation.
    pub learning_rate: f64,
    /// The momentum for the sgd optimizer.
    pub momentum: Option<f64>,
    /// The number of steps between metric log lines.
    pub log_steps: u64,
    /// The checkpoint tag to resume from and save to.
    pub checkpoint: String,
    /// The dataset cache directory on the compute node.
    pub datadir: Option<PathBuf>,
    /// The directory for tensorboard-style event logs.
    pub logdir: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            python: "python".to_string(),
            program: "main.py".to_string(),
            num_workers: 0,
            batch_size: 256,
            train_data_urls: vec![
                "train-clean-100".to_string(),
                "train-clean-360".to_string(),
                "train-other-500".to_string(),
            ],
            val_data_urls: None,
            num_epochs: 200,
            window_length: None,
            window_stride: 20,
            optimizer: Optimizer::Adam,
            learning_rate: 3e-4,
            momentum: None,
            log_steps: 100,
            checkpoint: "test".to_string(),
            datadir: None,
            logdir: None,
        }
    }
}

impl TrainingConfig {
    /// Validates the hyperparameter table.
    ///
    /// A missing or empty required value is fatal here, before any scheduler
    /// contact, so that a malformed command never reaches the cluster.
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.python.is_empty(), "the interpreter cannot be empty");
        ensure!(
            !self.program.is_empty(),
            "the training program path cannot be empty"
        );
        ensure!(self.batch_size > 0, "batch_size must be greater than zero");
        ensure!(self.num_epochs > 0, "num_epochs must be greater than zero");
        ensure!(
            self.window_stride > 0,
            "window_stride must be greater than zero"
        );
        if let Some(length) = self.window_length {
            ensure!(length > 0, "window_length must be greater than zero");
        }
        ensure!(
            self.learning_rate.is_finite() && self.learning_rate > 0.0,
            "learning_rate must be a positive number"
        );
        ensure!(self.log_steps > 0, "log_steps must be greater than zero");
        ensure!(
            !self.train_data_urls.is_empty(),
            "at least one training data url must be provided"
        );
        ensure!(
            self.train_data_urls.iter().all(|url| !url.is_empty()),
            "training data urls cannot be empty"
        );
        if let Some(urls) = &self.val_data_urls {
            ensure!(
                !urls.is_empty() && urls.iter().all(|url| !url.is_empty()),
                "validation data urls cannot be empty"
            );
        }
        ensure!(
            !self.checkpoint.is_empty(),
            "a checkpoint tag must be provided"
        );

        if self.momentum.is_some() && self.optimizer == Optimizer::Adam {
            warn!("momentum is ignored by the adam optimizer");
        }

        Ok(())
    }

    /// Builds the argument vector for the training program.
    ///
    /// Every configured value appears exactly once and the flag ordering is
    /// fixed, so the rendering is stable across invocations.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        args.push("--num-workers".to_string());
        args.push(self.num_workers.to_string());
        args.push("--batch-size".to_string());
        args.push(self.batch_size.to_string());
        args.push("--train-data-urls".to_string());
        args.extend(self.train_data_urls.iter().cloned());
        if let Some(urls) = &self.val_data_urls {
            args.push("--val-data-urls".to_string());
            args.extend(urls.iter().cloned());
        }
        args.push("--num-epochs".to_string());
        args.push(self.num_epochs.to_string());
        if let Some(length) = self.window_length {
            args.push("--window-length".to_string());
            args.push(length.to_string());
        }
        args.push("--window-stride".to_string());
        args.push(self.window_stride.to_string());
        args.push("--optimizer".to_string());
        args.push(self.optimizer.to_string());
        args.push("--learning-rate".to_string());
        args.push(format!("{lr:e}", lr = self.learning_rate));
        if let Some(momentum) = self.momentum {
            args.push("--momentum".to_string());
            args.push(momentum.to_string());
        }
        args.push("--log-steps".to_string());
        args.push(self.log_steps.to_string());
        args.push("--checkpoint".to_string());
        args.push(self.checkpoint.clone());
        if let Some(datadir) = &self.datadir {
            args.push("--datadir".to_string());
            args.push(datadir.display().to_string());
        }
        if let Some(logdir) = &self.logdir {
            args.push("--logdir".to_string());
            args.push(logdir.display().to_string());
        }

        args
    }

    /// Renders the shell-joined launch command.
    pub fn render(&self) -> Result<String> {
        let mut words = vec![self.python.clone(), self.program.clone()];
        words.extend(self.to_args());
        shlex::try_join(words.iter().map(String::as_str))
            .context("failed to quote the launch command")
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn default_command_rendering() {
        let config = TrainingConfig::default();
        config.validate().expect("default config should validate");
        assert_eq!(
            config.render().expect("should render"),
            "python main.py --num-workers 0 --batch-size 256 --train-data-urls \
             train-clean-100 train-clean-360 train-other-500 --num-epochs 200 \
             --window-stride 20 --optimizer adam --learning-rate 3e-4 \
             --log-steps 100 --checkpoint test"
        );
    }

    #[test]
    fn each_flag_appears_exactly_once() {
        let args = TrainingConfig::default().to_args();
        for flag in [
            "--num-workers",
            "--batch-size",
            "--train-data-urls",
            "--num-epochs",
            "--window-stride",
            "--optimizer",
            "--learning-rate",
            "--log-steps",
            "--checkpoint",
        ] {
            assert_eq!(
                args.iter().filter(|arg| *arg == flag).count(),
                1,
                "`{flag}` should appear exactly once"
            );
        }
    }

    #[test]
    fn flag_value_pairing() {
        let args = TrainingConfig::default().to_args();
        let value_after = |flag: &str| {
            let at = args.iter().position(|arg| arg == flag).expect("flag present");
            args[at + 1].as_str()
        };
        assert_eq!(value_after("--batch-size"), "256");
        assert_eq!(value_after("--num-epochs"), "200");
        assert_eq!(value_after("--learning-rate"), "3e-4");
        assert_eq!(value_after("--train-data-urls"), "train-clean-100");
        assert_eq!(value_after("--checkpoint"), "test");
    }

    #[test]
    fn learning_rate_scientific_notation() {
        let mut config = TrainingConfig::default();
        config.learning_rate = 1e-3;
        let args = config.to_args();
        let at = args
            .iter()
            .position(|arg| arg == "--learning-rate")
            .expect("flag present");
        assert_eq!(args[at + 1], "1e-3");
    }

    #[test]
    fn optional_hyperparameters_render_when_set() {
        let mut config = TrainingConfig::default();
        config.optimizer = Optimizer::Sgd;
        config.momentum = Some(0.9);
        config.val_data_urls = Some(vec!["dev-clean".to_string()]);
        config.datadir = Some(PathBuf::from("/tmp/librispeech"));
        config.validate().expect("should validate");

        let rendered = config.render().expect("should render");
        assert_eq!(
            rendered,
            "python main.py --num-workers 0 --batch-size 256 --train-data-urls \
             train-clean-100 train-clean-360 train-other-500 --val-data-urls \
             dev-clean --num-epochs 200 --window-stride 20 --optimizer sgd \
             --learning-rate 3e-4 --momentum 0.9 --log-steps 100 --checkpoint \
             test --datadir /tmp/librispeech"
        );
    }

    #[test]
    fn missing_checkpoint_fails_validation() {
        let mut config = TrainingConfig::default();
        config.checkpoint = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_train_data_urls_fail_validation() {
        let mut config = TrainingConfig::default();
        config.train_data_urls.clear();
        assert!(config.validate().is_err());

        config.train_data_urls = vec![String::new()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_batch_size_fails_validation() {
        let mut config = TrainingConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn optimizer_parses_from_configuration() {
        let config: TrainingConfig =
            toml::from_str("optimizer = \"sgd\"").expect("should parse");
        assert_eq!(config.optimizer, Optimizer::Sgd);
        assert_eq!(config.optimizer.to_string(), "sgd");
    }
}

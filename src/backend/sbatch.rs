//! The `sbatch` submission backend.
//!
//! The batch script is spooled to disk and handed to `sbatch`; the resource
//! descriptor travels inside the script as `#SBATCH` directives. The backend
//! returns as soon as the scheduler acknowledges the submission with a job
//! id, so the process exit code reflects the submission only, never the
//! eventual fate of the training job.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::Context as _;
use anyhow::Result;
use anyhow::anyhow;
use anyhow::bail;
use async_trait::async_trait;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;
use tracing::trace;

use super::SubmissionBackend;
use super::SubmittedJob;
use crate::config::SubmitConfig;
use crate::job::JobRequest;

/// The prefix of the acknowledgement line printed by `sbatch`.
const SUBMITTED_LINE_PREFIX: &str = "Submitted batch job ";

/// A backend that submits jobs by spawning `sbatch`.
#[derive(Debug)]
pub struct SbatchBackend {
    /// The submission configuration.
    config: SubmitConfig,
}

impl SbatchBackend {
    /// Creates a new `sbatch` backend.
    pub fn new(config: SubmitConfig) -> Self {
        Self { config }
    }

    /// Writes the batch script into the spool directory.
    ///
    /// The script is kept on disk after submission so the submitted artifact
    /// remains inspectable.
    async fn spool_script(&self, request: &JobRequest) -> Result<PathBuf> {
        let script_dir = self.config.resolved_script_dir();
        fs::create_dir_all(&script_dir).await.with_context(|| {
            format!(
                "failed to create script directory `{path}`",
                path = script_dir.display()
            )
        })?;

        let script_file = tempfile::Builder::new()
            .prefix(&format!("{name}-", name = request.name()))
            .suffix(".sbatch")
            .keep(true)
            .tempfile_in(&script_dir)
            .with_context(|| {
                format!(
                    "failed to create a batch script in `{path}`",
                    path = script_dir.display()
                )
            })?;
        let script_path = script_file.into_temp_path().to_path_buf();

        fs::write(&script_path, request.script_contents()?)
            .await
            .with_context(|| {
                format!(
                    "failed to write batch script `{path}`",
                    path = script_path.display()
                )
            })?;
        #[cfg(unix)]
        fs::set_permissions(
            &script_path,
            <std::fs::Permissions as std::os::unix::fs::PermissionsExt>::from_mode(0o770),
        )
        .await?;

        Ok(script_path)
    }
}

#[async_trait]
impl SubmissionBackend for SbatchBackend {
    async fn submit(&self, request: &JobRequest) -> Result<SubmittedJob> {
        let script_path = self.spool_script(request).await?;

        let mut command = Command::new(&self.config.program);
        // Any user-configured extra arguments come first so they cannot be
        // mistaken for the script path.
        if let Some(args) = &self.config.extra_args {
            command.args(args);
        }
        command
            .arg(&script_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(?command, "spawning the submission command");

        let output = command.output().await.with_context(|| {
            format!(
                "failed to spawn `{program}`",
                program = self.config.program
            )
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            trace!(stderr = line, job_name = request.name());
        }

        if !output.status.success() {
            bail!(
                "`{program}` rejected the submission ({status}): {stderr}",
                program = self.config.program,
                status = output.status,
                stderr = stderr.trim(),
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let id = stdout
            .lines()
            .find_map(|line| line.strip_prefix(SUBMITTED_LINE_PREFIX))
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|id| id.parse().ok())
            .ok_or_else(|| {
                anyhow!(
                    "failed to parse a job id from `{program}` output: `{stdout}`",
                    program = self.config.program,
                    stdout = stdout.trim(),
                )
            })?;

        Ok(SubmittedJob { id })
    }
}

//! Implementation of the `submit` subcommand.
//!
//! A single fire-and-forget submission: the job request is validated and
//! rendered, handed to the `sbatch` backend, and the scheduler's
//! acknowledgement is reported. Nothing here waits for the training job
//! itself; its fate is visible only in the log files Slurm writes.

use anyhow::Result;

use crate::backend::SubmissionBackend;
use crate::backend::sbatch::SbatchBackend;
use crate::config::Config;
use crate::job::JobRequest;

/// Handles the `submit` subcommand.
pub async fn submit(config: Config) -> Result<()> {
    let request = JobRequest::from_config(&config)?;

    // An audit copy of what the allocation will run, before any scheduler
    // contact.
    eprintln!("{command}", command = request.launch_command()?);

    let backend = SbatchBackend::new(config.submit.clone());
    let submitted = backend.submit(&request).await?;

    println!(
        "Submitted batch job {id}\nname = {name}",
        id = submitted.id,
        name = request.name()
    );

    Ok(())
}

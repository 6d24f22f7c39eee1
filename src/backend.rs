//! Implementation of job submission backends.
//!
//! The scheduler call is isolated behind [`SubmissionBackend`] so the
//! submission flow can be exercised against a fake in tests. Submission is
//! fire-and-forget: a backend hands the job to the scheduler and reports the
//! acknowledgement; it never waits for, retries, or cancels the job.

use anyhow::Result;
use async_trait::async_trait;

use crate::job::JobRequest;

pub mod sbatch;

/// The scheduler's acknowledgement of a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedJob {
    /// The scheduler-assigned job id.
    pub id: u64,
}

/// A backend that can submit a job request to a scheduler.
#[async_trait]
pub trait SubmissionBackend: std::fmt::Debug + Send + Sync {
    /// Submits the job request, returning the scheduler's acknowledgement.
    async fn submit(&self, request: &JobRequest) -> Result<SubmittedJob>;
}

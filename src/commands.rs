//! Implementation of jobsub CLI commands.

pub mod completions;
pub mod config;
pub mod preview;
pub mod submit;

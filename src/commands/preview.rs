//! Implementation of the `preview` subcommand.

use anyhow::Result;
use clap::Parser;

use crate::config::Config;
use crate::job::JobRequest;

/// Arguments for the `preview` subcommand.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// Print only the launch command, not the whole batch script.
    #[arg(long)]
    command_only: bool,
}

/// Handles the `preview` subcommand.
///
/// Renders the batch script exactly as `submit` would spool it, without
/// contacting the scheduler.
pub fn preview(args: Args, config: Config) -> Result<()> {
    let request = JobRequest::from_config(&config)?;
    if args.command_only {
        println!("{command}", command = request.launch_command()?);
    } else {
        print!("{script}", script = request.script_contents()?);
    }
    Ok(())
}

//! Implementation of the `completions` subcommand.

use std::io;

use anyhow::Result;
use clap::Command;
use clap::Parser;
use clap_complete::Shell;
use clap_complete::generate;

/// Arguments for the `completions` subcommand.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Args {
    /// The shell to generate a completion script for.
    #[arg(value_enum)]
    shell: Shell,
}

/// Handles the `completions` subcommand.
///
/// The completion script is written to stdout so it can be redirected into
/// the shell's completion directory.
pub fn completions(args: Args, cmd: &mut Command) -> Result<()> {
    let name = cmd.get_name().to_string();
    generate(args.shell, cmd, name, &mut io::stdout());
    Ok(())
}

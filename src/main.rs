//! The jobsub command line tool.

use std::io::IsTerminal;
use std::io::stderr;
use std::path::PathBuf;

use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use clap_verbosity_flag::Verbosity;
use colored::Colorize;
use git_testament::git_testament;
use git_testament::render_testament;
use jobsub::commands;
use jobsub::config::Config;
use tracing_log::AsTrace;

git_testament!(TESTAMENT);

/// The subcommands of the jobsub CLI.
#[derive(Subcommand)]
enum Commands {
    /// Submits the configured training job to Slurm.
    Submit,

    /// Prints the generated batch script without contacting the scheduler.
    Preview(commands::preview::Args),

    /// Displays or generates a configuration file.
    Config(commands::config::Args),

    /// Generates shell completions.
    Completions(commands::completions::Args),
}

/// The jobsub command line interface.
#[derive(Parser)]
#[command(author, version = render_testament!(TESTAMENT), propagate_version = true, about, long_about = None)]
struct Cli {
    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Commands,

    /// The path to the configuration file.
    ///
    /// If not provided, `jobsub.toml` in the working directory is used when
    /// present; otherwise the built-in defaults apply.
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// The verbosity flags.
    #[command(flatten)]
    verbose: Verbosity,
}

/// Parses the command line, sets up tracing, and dispatches the subcommand.
pub async fn inner() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_log::LogTracer::init()?;

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_max_level(cli.verbose.log_level_filter().as_trace())
        .with_writer(std::io::stderr)
        .with_ansi(stderr().is_terminal())
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Submit => commands::submit::submit(config).await,
        Commands::Preview(args) => commands::preview::preview(args, config),
        Commands::Config(args) => commands::config::config(args, config),
        Commands::Completions(args) => commands::completions::completions(args, &mut Cli::command()),
    }
}

#[tokio::main]
pub async fn main() {
    if let Err(e) = inner().await {
        eprintln!(
            "{error}: {e:?}",
            error = if std::io::stderr().is_terminal() {
                "error".red().bold()
            } else {
                "error".normal()
            }
        );
        std::process::exit(1);
    }
}

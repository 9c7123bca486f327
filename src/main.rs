use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Generator, Shell, generate};
use colored::Colorize;
use keepsake::errors::{Error, Result};
use keepsake::{KeepsakeContext, commands, output};
use std::io;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(
    name = "keepsake",
    version = keepsake::VERSION,
    about = "Incremental backup engine for large directory trees",
    long_about = "Content-addressed incremental backups with crash-safe archives, \
                  built for game libraries and other large, mostly-static trees"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print per-file detail
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress everything except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an incremental backup of a set
    Backup {
        /// Backup set identifier
        set_id: String,

        /// Root directory to back up (overrides the configured root)
        #[arg(short, long)]
        root: Option<PathBuf>,
    },

    /// Restore a set's archive chain onto a target directory
    Restore {
        /// Backup set identifier
        set_id: String,

        /// Directory to restore into
        target: PathBuf,

        /// Keep local files that are newer than the backup
        #[arg(short, long)]
        merge: bool,

        /// Restore a single archive file instead of the full chain
        #[arg(short, long)]
        archive: Option<PathBuf>,
    },

    /// List archives per set, newest first
    List {
        /// Limit the listing to one set
        set_id: Option<String>,
    },

    /// Verify a set's archives and snapshot without restoring
    Verify {
        /// Backup set identifier
        set_id: String,
    },

    /// Generate shell completion scripts
    Completion {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(e.exit_code());
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    if cli.quiet {
        output::set_verbosity(output::Verbosity::Quiet);
    } else if cli.verbose {
        output::set_verbosity(output::Verbosity::Verbose);
    }

    if let Commands::Completion { shell } = cli.command {
        print_completions(shell, &mut Cli::command());
        return Ok(());
    }

    let ctx = KeepsakeContext::new().map_err(Error::Other)?;

    match cli.command {
        Commands::Backup { set_id, root } => {
            commands::backup::execute(&ctx, &set_id, root.as_deref())?;
        }
        Commands::Restore {
            set_id,
            target,
            merge,
            archive,
        } => {
            commands::restore::execute(&ctx, &set_id, &target, merge, archive.as_deref())?;
        }
        Commands::List { set_id } => {
            commands::list::execute(&ctx, set_id.as_deref())?;
        }
        Commands::Verify { set_id } => {
            commands::verify::execute(&ctx, &set_id)?;
        }
        Commands::Completion { .. } => unreachable!("handled above"),
    }

    Ok(())
}

fn print_completions<G: Generator>(g: G, cmd: &mut clap::Command) {
    generate(g, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use eyre::eyre;
use pcsc::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use ykpgp_openpgp::CardSession;

mod config;
mod reader;
mod render;

use config::RunArgs;

#[derive(Parser)]
#[command(version, about = "Exercise the OpenPGP application on a security key over PC/SC")]
struct Cli {
    /// Optional reader name to use (will auto-detect if not specified)
    #[arg(short, long, global = true)]
    reader: Option<String>,

    /// Debug level output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available readers
    List,

    /// Select the OpenPGP application and run the configured steps
    Run(RunArgs),
}

#[tokio::main]
async fn main() -> eyre::Result<ExitCode> {
    // Parse command line arguments
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose);

    let context = reader::establish()?;

    match cli.command {
        Commands::List => {
            reader::print_readers(&reader::list_readers(&context)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run(args) => run(&context, cli.reader.as_deref(), &args).await,
    }
}

async fn run(context: &Context, reader_name: Option<&str>, args: &RunArgs) -> eyre::Result<ExitCode> {
    let file = config::load(args.config.as_deref())?;
    let run_config = args.resolve(&file)?;

    let readers = reader::list_readers(context)?;
    let reader = reader::select_reader(&readers, reader_name.or(file.reader.as_deref()))?;
    info!("Using reader: {}", reader);

    let (transport, worker) = reader::spawn_card_worker(context, &reader)?;
    let session = CardSession::new(transport);
    let report = session.run(&run_config).await?;

    // Dropping the transport ends the worker loop
    drop(session);
    tokio::task::spawn_blocking(move || worker.join())
        .await?
        .map_err(|_| eyre!("card worker thread panicked"))?;

    render::print_report(&report, args.json)?;

    Ok(if report.is_completed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn setup_logging(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_ansi(true)
        .init();
}

/// `RUST_LOG` directives on top of a default level picked by `--verbose`
fn env_filter(verbose: bool) -> EnvFilter {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

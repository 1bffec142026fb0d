// Main binary for the groundwork workflow runner
use std::io::stderr;

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

mod cmd;
use cmd::run::RunArgs;

// Define the command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about = "Groundwork declarative resource reconciliation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Logging level (trace, debug, info, warn, error)
    #[arg(long, env = "GROUNDWORK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Logging format (text, json)
    #[arg(long, env = "GROUNDWORK_LOG_FORMAT", default_value = "text")]
    log_format: String,
}

// Define the subcommands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute workflows once, from a file or from the cluster
    Run(RunArgs),
    /// Print the catalog of registered modules
    Modules,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    init_logging(&cli);

    // All built-in modules register before any workflow runs.
    groundwork_modules::register_all();

    match cli.command {
        Commands::Run(args) => {
            let cancel = CancellationToken::new();
            spawn_signal_handler(cancel.clone());
            cmd::run::run(args, cancel).await
        }
        Commands::Modules => {
            cmd::modules::run();
            Ok(())
        }
    }
}

fn init_logging(cli: &Cli) {
    let directives = format!(
        "groundwork={level},groundwork_engine={level},groundwork_api={level},groundwork_modules={level},kube=warn,hyper=warn,tower=warn,rustls=warn,reqwest=warn,mio=warn",
        level = cli.log_level
    );
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    match cli.log_format.as_str() {
        "json" => registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(stderr))
            .init(),
        _ => registry()
            .with(filter)
            .with(fmt::layer().with_writer(stderr))
            .init(),
    }
}

/// Cancel the shared token on Ctrl+C or SIGTERM so running workflows stop at
/// their next cooperative point.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut terminate = match signal(SignalKind::terminate()) {
                Ok(terminate) => terminate,
                Err(err) => {
                    tracing::error!(error = %err, "failed to install SIGTERM handler");
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("shutdown signal received, cancelling workflows");
        cancel.cancel();
    });
}

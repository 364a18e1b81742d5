//! Resource Scaler CLI
//!
//! A command-line tool for evaluating cpu/memory triggers against a
//! cluster and inspecting the metric specs they register.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{evaluate, spec, TriggerArgs};
use tracing_subscriber::EnvFilter;

/// Resource Scaler CLI
#[derive(Parser)]
#[command(name = "rsctl")]
#[command(author, version, about = "CLI for the Resource Scaler", long_about = None)]
pub struct Cli {
    /// Path to kubeconfig file (uses default if not specified)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate a trigger once and report whether the workload is active
    Evaluate(TriggerArgs),

    /// Show the HPA metric spec a trigger registers
    Spec(TriggerArgs),
}

async fn run(cli: Cli) -> Result<()> {
    let settings = config::Config::load()?;
    let clients = client::ClusterClients::connect(cli.kubeconfig.as_deref()).await?;

    match cli.command {
        Commands::Evaluate(args) => {
            let namespace = settings.namespace(args.namespace.clone());
            evaluate::evaluate(&clients, &args, namespace, cli.format).await?;
        }
        Commands::Spec(args) => {
            let namespace = settings.namespace(args.namespace.clone());
            spec::show_spec(&clients, &args, namespace, cli.format).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_writer(std::io::stderr)
            .init();
    }

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

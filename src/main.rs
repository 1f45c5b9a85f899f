use anyhow::Result;
use clap::{Parser, Subcommand};
use risk_rag::commands::{
    ReportInput, analyze_report, delete_report, list_reports, serve_mcp, show_health,
};
use risk_rag::config::{get_config_dir, run_interactive_config, show_config};
use risk_rag::database::ReportStatus;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "risk-rag")]
#[command(about = "Retrieval-augmented cancer risk scoring for free-text medical reports")]
#[command(version)]
struct Cli {
    /// Configuration directory (defaults to ~/.risk-rag)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding provider, QA service and scoring settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Analyze a report and print its risk estimate
    Analyze {
        /// Plain-text report file (.txt, .text or .md)
        #[arg(conflicts_with = "text", required_unless_present = "text")]
        file: Option<PathBuf>,
        /// Report text given inline instead of a file
        #[arg(long)]
        text: Option<String>,
        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show service health
    Health {
        /// Also verify the embedding provider is reachable and has the model
        #[arg(long)]
        check_provider: bool,
    },
    /// List recently analyzed reports
    List {
        /// Maximum number of reports to show
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Only show reports with this status (pending, indexed or failed)
        #[arg(long)]
        status: Option<ReportStatus>,
    },
    /// Delete a report and its indexed chunks
    Delete {
        /// Report ID
        id: String,
    },
    /// Start MCP server on stdio
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries command output and MCP messages
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Analyze { file, text, json } => {
            let input = match (file, text) {
                (Some(path), _) => ReportInput::File(path),
                (None, Some(text)) => ReportInput::Text(text),
                (None, None) => anyhow::bail!("Provide a report file or --text"),
            };
            analyze_report(&config_dir, input, json).await?;
        }
        Commands::Health { check_provider } => {
            show_health(&config_dir, check_provider).await?;
        }
        Commands::List { limit, status } => {
            list_reports(&config_dir, limit, status).await?;
        }
        Commands::Delete { id } => {
            delete_report(&config_dir, &id).await?;
        }
        Commands::Serve => {
            serve_mcp(&config_dir).await?;
        }
    }

    Ok(())
}

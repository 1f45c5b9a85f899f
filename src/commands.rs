use anyhow::{Context, Result, anyhow};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::database::sqlite::queries::ReportQueries;
use crate::database::{Database, DocumentStore, ReportStatus};
use crate::embeddings::OllamaClient;
use crate::extract::PlainTextExtractor;
use crate::mcp::{McpServer, register_default_tools};
use crate::pipeline::{AnalysisReport, Pipeline, PipelineError};

/// Characters of report text shown per row by `list`
const LIST_PREVIEW_CHARS: usize = 60;

/// Where the report to analyze comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportInput {
    File(PathBuf),
    Text(String),
}

fn load_config(config_dir: &Path) -> Result<Config> {
    Config::load(config_dir)
        .with_context(|| format!("Failed to load configuration from {}", config_dir.display()))
}

async fn build_pipeline(config: &Config) -> Result<Pipeline> {
    Pipeline::from_config(config)
        .await
        .context("Failed to initialize the risk pipeline")
}

fn spinner(message: &str) -> ProgressBar {
    let bar = if console::user_attended_stderr() {
        ProgressBar::new_spinner().with_style(
            ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
                .expect("style template is valid"),
        )
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn print_analysis(report: &AnalysisReport) {
    let estimate = &report.estimate;
    let score = format!("{:.1}", estimate.score);
    let score = if estimate.score >= 8.0 {
        style(score).red().bold()
    } else if estimate.score >= 5.0 {
        style(score).yellow().bold()
    } else {
        style(score).green().bold()
    };

    println!("Report: {}", estimate.document_id);
    println!("Risk score: {} / 10", score);
    println!("Answer: {}", estimate.answer);
    if let Some(confidence) = estimate.confidence {
        println!("Confidence: {:.2}", confidence);
    }
    println!("Strategy: {}", estimate.strategy);
    println!("Stored chunks: {}", report.stored_chunks);
    println!(
        "Patient: {} (sex {}, dob {})",
        report.patient.name,
        report.patient.sex,
        report.patient.dob.as_deref().unwrap_or("unknown")
    );
    println!();
    println!("{}", style("Context").bold());
    println!("{}", estimate.context_preview);
}

fn describe_failure(e: &PipelineError) -> anyhow::Error {
    match &e.document_id {
        Some(id) => anyhow!("{} (report {}, status {})", e, id, e.status_code()),
        None => anyhow!("{} (status {})", e, e.status_code()),
    }
}

/// Analyze one report and print the risk estimate
#[inline]
pub async fn analyze_report(config_dir: &Path, input: ReportInput, json: bool) -> Result<()> {
    let config = load_config(config_dir)?;
    let pipeline = build_pipeline(&config).await?;

    let bar = spinner("Analyzing report");
    let result = match &input {
        ReportInput::File(path) => {
            info!("Analyzing report file {}", path.display());
            pipeline.analyze_file(path, &PlainTextExtractor).await
        }
        ReportInput::Text(text) => pipeline.analyze(text).await,
    };
    bar.finish_and_clear();

    let report = result.map_err(|e| {
        error!("Analysis failed at {} stage: {}", e.stage, e.source);
        describe_failure(&e)
    })?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialize analysis")?
        );
    } else {
        print_analysis(&report);
    }

    Ok(())
}

/// Print the pipeline health report, optionally probing the embedding provider
#[inline]
pub async fn show_health(config_dir: &Path, check_provider: bool) -> Result<()> {
    let config = load_config(config_dir)?;
    let pipeline = build_pipeline(&config).await?;

    let health = pipeline.health();
    println!(
        "{}",
        serde_json::to_string_pretty(&health).context("Failed to serialize health report")?
    );

    if check_provider {
        let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
        let probe = tokio::task::spawn_blocking(move || client.health_check())
            .await
            .context("Provider health check task failed")?;

        match probe {
            Ok(()) => eprintln!(
                "{}",
                style(format!(
                    "✓ Ollama reachable at {}:{} with model {}",
                    config.ollama.host, config.ollama.port, config.ollama.model
                ))
                .green()
            ),
            Err(e) => {
                eprintln!("{}", style(format!("✗ Ollama check failed: {:#}", e)).red());
                return Err(e.context("Embedding provider is not healthy"));
            }
        }
    }

    Ok(())
}

/// List the most recently submitted reports, optionally only those with `status`
#[inline]
pub async fn list_reports(
    config_dir: &Path,
    limit: u32,
    status: Option<ReportStatus>,
) -> Result<()> {
    let config = load_config(config_dir)?;
    let database = Database::initialize_from_config_dir(config.get_base_dir(), &config.storage)
        .await
        .context("Failed to initialize database")?;

    let reports = match status {
        Some(status) => {
            let mut reports = ReportQueries::list_by_status(database.pool(), status)
                .await
                .context("Failed to list reports by status")?;
            reports.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
            reports
        }
        None => database
            .list_recent(limit)
            .await
            .context("Failed to list reports")?,
    };
    let total = ReportQueries::count(database.pool())
        .await
        .context("Failed to count reports")?;

    if reports.is_empty() {
        match status {
            Some(status) => println!("No {} reports ({} stored in total).", status, total),
            None => {
                println!("No reports have been analyzed yet.");
                println!("Use 'risk-rag analyze <file>' to analyze one.");
            }
        }
        return Ok(());
    }

    println!("Reports ({} shown of {} stored):", reports.len(), total);
    println!();

    for report in &reports {
        let status = if report.is_failed() {
            style(report.status.to_string()).red()
        } else if report.is_indexed() {
            style(report.status.to_string()).green()
        } else {
            style(report.status.to_string()).yellow()
        };

        println!("{} [{}]", style(&report.id).bold(), status);
        println!("   Chunks: {}", report.stored_chunks);
        println!(
            "   Created: {}",
            report.created_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!("   Text: {}", report.preview(LIST_PREVIEW_CHARS));
        if let Some(message) = &report.error_message {
            println!("   ⚠️  Error: {}", message);
        }
        println!();
    }

    let failed = reports.iter().filter(|r| r.is_failed()).count();
    let indexed = reports.iter().filter(|r| r.is_indexed()).count();
    println!("Summary:");
    println!("  Indexed: {}", indexed);
    println!("  Failed: {}", failed);
    println!("  Pending: {}", reports.len() - indexed - failed);

    Ok(())
}

/// Delete a report and all of its index rows
#[inline]
pub async fn delete_report(config_dir: &Path, document_id: &str) -> Result<()> {
    let config = load_config(config_dir)?;
    let pipeline = build_pipeline(&config).await?;

    let deleted = pipeline
        .delete_report(document_id)
        .await
        .with_context(|| format!("Failed to delete report {}", document_id))?;

    if deleted {
        println!("Deleted report {}", document_id);
        Ok(())
    } else {
        Err(anyhow!("Report not found: {}", document_id))
    }
}

/// Start the MCP server on stdio. Stdout carries protocol messages only.
#[inline]
pub async fn serve_mcp(config_dir: &Path) -> Result<()> {
    let config = load_config(config_dir)?;

    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    match tokio::task::spawn_blocking(move || client.health_check()).await {
        Ok(Ok(())) => info!(
            "Ollama connected at {}:{} with model {}",
            config.ollama.host, config.ollama.port, config.ollama.model
        ),
        Ok(Err(e)) => warn!("Ollama may not be ready, analyses will fail: {:#}", e),
        Err(e) => warn!("Ollama health check did not complete: {}", e),
    }

    let pipeline = Arc::new(build_pipeline(&config).await?);

    let server = Arc::new(McpServer::new(
        "risk-rag".to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    ));
    register_default_tools(&server, &pipeline).await;

    info!(
        "MCP server initialized with tools: {}",
        server.tool_names().await.join(", ")
    );

    tokio::select! {
        result = Arc::clone(&server).serve_stdio() => {
            result.context("MCP server failed")?;
            info!("MCP server stopped normally");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt signal, shutting down");
        }
    }

    Ok(())
}

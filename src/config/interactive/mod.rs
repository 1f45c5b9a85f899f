
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Select};
use std::path::Path;

use super::{Config, ConfigError, OllamaConfig, QaConfig};
use crate::embeddings::{ChunkingConfig, ChunkingPolicy};
use crate::pipeline::scoring::ScoringStrategy;

#[inline]
pub fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Risk RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir)?;

    eprintln!("{}", style("Ollama Configuration").bold().yellow());
    eprintln!("Configure the Ollama instance used to embed report chunks.");
    eprintln!();

    configure_ollama(&mut config.ollama)?;

    eprintln!();
    eprintln!("{}", style("Question Answering Service").bold().yellow());
    configure_qa(&mut config.qa)?;

    eprintln!();
    eprintln!("{}", style("Chunking and Scoring").bold().yellow());
    configure_chunking(&mut config.chunking)?;
    config.pipeline.strategy = select_strategy(config.pipeline.strategy)?;

    eprintln!();
    eprintln!("{}", style("Testing configuration...").yellow());

    if test_ollama_connection(&config.ollama)? {
        eprintln!("{}", style("✓ Ollama connection successful!").green());
    } else {
        eprintln!(
            "{}",
            style("⚠ Warning: Could not connect to Ollama").yellow()
        );
        eprintln!("You can continue, but make sure Ollama is running before analyzing reports.");
    }

    eprintln!();
    if Confirm::new()
        .with_prompt("Save configuration?")
        .default(true)
        .interact()?
    {
        config.save().context("Failed to save configuration")?;
        eprintln!("{}", style("✓ Configuration saved successfully!").green());
        eprintln!(
            "Configuration saved to: {}",
            style(config.config_file_path().display()).cyan()
        );
    } else {
        eprintln!("Configuration not saved.");
    }

    Ok(())
}

#[inline]
pub fn show_config(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;

    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!("  Model: {}", style(&config.ollama.model).cyan());
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
    eprintln!(
        "  Embedding Dimension: {}",
        style(config.ollama.embedding_dimension).cyan()
    );
    match config.ollama.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Question Answering:").bold().yellow());
    eprintln!("  Endpoint: {}", style(&config.qa.url).cyan());
    eprintln!("  Timeout: {}s", style(config.qa.timeout_secs).cyan());

    eprintln!();
    eprintln!("{}", style("Pipeline:").bold().yellow());
    eprintln!("  Chunking: {}", style(config.chunking.policy).cyan());
    eprintln!("  Chunk Size: {}", style(config.chunking.chunk_size).cyan());
    eprintln!("  Top K: {}", style(config.pipeline.top_k).cyan());
    eprintln!("  Strategy: {}", style(config.pipeline.strategy).cyan());
    eprintln!("  Question: {}", style(&config.pipeline.risk_question).dim());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Result<Config> {
    let exists = config_dir.join("config.toml").exists();

    Config::load(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("Existing configuration is invalid. Using defaults.").yellow()
            );
            Ok(Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            })
        },
        |config| {
            if exists {
                eprintln!("{}", style("Found existing configuration.").green());
            } else {
                eprintln!(
                    "{}",
                    style("No existing configuration found. Using defaults.").yellow()
                );
            }
            Ok(config)
        },
    )
}

fn configure_ollama(ollama: &mut OllamaConfig) -> Result<()> {
    let protocols = &["http", "https"];
    let default_index = protocols
        .iter()
        .position(|&p| p == ollama.protocol)
        .unwrap_or(0);

    let protocol_index = Select::new()
        .with_prompt("Ollama protocol")
        .default(default_index)
        .items(protocols)
        .interact()?;

    let protocol = protocols[protocol_index].to_string();

    let host: String = Input::new()
        .with_prompt("Ollama host")
        .default(ollama.host.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            let temp_config = OllamaConfig {
                protocol: protocol.clone(),
                host: input.clone(),
                ..OllamaConfig::default()
            };
            temp_config.validate()
        })
        .interact_text()?;

    let port: u16 = Input::new()
        .with_prompt("Ollama port")
        .default(ollama.port)
        .validate_with(|input: &u16| -> Result<(), &str> {
            if *input == 0 {
                Err("Port must be greater than 0")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let model: String = Input::new()
        .with_prompt("Embedding model")
        .default(ollama.model.clone())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Model name cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    let embedding_dimension: u32 = Input::new()
        .with_prompt("Embedding dimension of the model")
        .default(ollama.embedding_dimension)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (64..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 64 and 4096")
            }
        })
        .interact_text()?;

    let batch_size: u32 = Input::new()
        .with_prompt("Batch size for embedding generation")
        .default(ollama.batch_size)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if *input == 0 {
                Err("Batch size must be greater than 0")
            } else if *input > 1000 {
                Err("Batch size must be 1000 or less")
            } else {
                Ok(())
            }
        })
        .interact_text()?;

    ollama.set_protocol(protocol)?;
    ollama.set_host(host)?;
    ollama.set_port(port)?;
    ollama.set_model(model)?;
    ollama.set_embedding_dimension(embedding_dimension)?;
    ollama.set_batch_size(batch_size)?;

    Ok(())
}

fn configure_qa(qa: &mut QaConfig) -> Result<()> {
    let url: String = Input::new()
        .with_prompt("Question answering endpoint")
        .default(qa.url.clone())
        .validate_with(|input: &String| -> Result<(), ConfigError> {
            QaConfig {
                url: input.clone(),
                ..qa.clone()
            }
            .endpoint()
            .map(|_| ())
        })
        .interact_text()?;

    qa.set_url(url)?;
    Ok(())
}

fn configure_chunking(chunking: &mut ChunkingConfig) -> Result<()> {
    let policies = [ChunkingPolicy::CharacterWindow, ChunkingPolicy::Words];
    let labels = &["character windows", "words"];
    let default_index = policies
        .iter()
        .position(|p| *p == chunking.policy)
        .unwrap_or(0);

    let policy_index = Select::new()
        .with_prompt("Chunking policy")
        .default(default_index)
        .items(labels)
        .interact()?;
    chunking.policy = policies[policy_index];

    if chunking.policy == ChunkingPolicy::CharacterWindow {
        chunking.chunk_size = Input::new()
            .with_prompt("Characters per chunk")
            .default(chunking.chunk_size)
            .validate_with(|input: &usize| -> Result<(), &str> {
                if (1..=8192).contains(input) {
                    Ok(())
                } else {
                    Err("Chunk size must be between 1 and 8192")
                }
            })
            .interact_text()?;
    }

    Ok(())
}

fn select_strategy(current: ScoringStrategy) -> Result<ScoringStrategy> {
    let strategies = [ScoringStrategy::QuestionAnswering, ScoringStrategy::Keyword];
    let labels = &["question answering service", "keyword matching"];
    let default_index = strategies
        .iter()
        .position(|s| *s == current)
        .unwrap_or(0);

    let index = Select::new()
        .with_prompt("Scoring strategy")
        .default(default_index)
        .items(labels)
        .interact()?;

    Ok(strategies[index])
}

fn test_ollama_connection(ollama: &OllamaConfig) -> Result<bool> {
    let url = ollama
        .ollama_url()?
        .join("/api/version")
        .context("Failed to build version URL")?;

    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(std::time::Duration::from_secs(5)))
        .build()
        .into();

    match agent.get(url.as_str()).call() {
        Ok(_) => Ok(true),
        Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => Ok(true),
        Err(_) => Ok(false),
    }
}

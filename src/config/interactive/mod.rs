
use anyhow::{Context, Result};
use console::style;
use dialoguer::{Confirm, Input, Password, Select};
use std::path::Path;

use super::{
    CompletionConfig, Config, EmbeddingConfig, IngestionConfig, RetrievalConfig, VectorBackend,
    VectorStoreConfig,
};
use crate::database::{ChromaStore, VectorStore};

#[inline]
pub async fn run_interactive_config(config_dir: &Path) -> Result<()> {
    eprintln!("{}", style("🔧 Course RAG Configuration Setup").bold().cyan());
    eprintln!();

    let mut config = load_existing_config(config_dir);

    eprintln!("{}", style("Embedding Provider").bold().yellow());
    configure_embedding(&mut config.embedding)?;

    eprintln!();
    eprintln!("{}", style("Vector Store").bold().yellow());
    configure_vector_store(&mut config.vector_store)?;

    eprintln!();
    eprintln!("{}", style("Completion Model").bold().yellow());
    configure_completion(&mut config.completion)?;

    eprintln!();
    eprintln!("{}", style("Ingestion").bold().yellow());
    configure_ingestion(&mut config.ingestion)?;

    eprintln!();
    eprintln!("{}", style("Retrieval").bold().yellow());
    configure_retrieval(&mut config.retrieval)?;

    if config.vector_store.backend == VectorBackend::Chroma {
        eprintln!();
        eprintln!("{}", style("Testing configuration...").yellow());

        if check_chroma_connection(&config.vector_store).await {
            eprintln!("{}", style("✓ Chroma connection successful!").green());
        } else {
            eprintln!(
                "{}",
                style("⚠ Warning: Could not connect to Chroma").yellow()
            );
            eprintln!("You can continue, but make sure Chroma is running before ingesting.");
        }
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

    eprintln!("{}", style("Embedding:").bold().yellow());
    eprintln!("  URL: {}", style(&config.embedding.base_url).cyan());
    eprintln!("  Model: {}", style(&config.embedding.model).cyan());
    eprintln!("  Dimension: {}", style(config.embedding.dimension).cyan());
    eprintln!("  Task Type: {}", style(&config.embedding.task_type).cyan());
    eprintln!(
        "  Retry Attempts: {}",
        style(config.embedding.retry_attempts).cyan()
    );
    eprintln!(
        "  API Key: {}",
        style(mask_secret(config.embedding.api_key.as_deref())).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Vector Store:").bold().yellow());
    eprintln!("  Backend: {}", style(config.vector_store.backend).cyan());
    match config.vector_store.backend {
        VectorBackend::Chroma => {
            eprintln!("  URL: {}", style(&config.vector_store.base_url).cyan());
            eprintln!("  Tenant: {}", style(&config.vector_store.tenant).cyan());
            eprintln!("  Database: {}", style(&config.vector_store.database).cyan());
            eprintln!(
                "  Auth Token: {}",
                style(mask_secret(config.vector_store.auth_token.as_deref())).cyan()
            );
        }
        VectorBackend::LanceDb => {
            eprintln!(
                "  Path: {}",
                style(config.vector_database_path().display()).cyan()
            );
        }
    }

    eprintln!();
    eprintln!("{}", style("Completion:").bold().yellow());
    eprintln!("  URL: {}", style(&config.completion.base_url).cyan());
    eprintln!("  Model: {}", style(&config.completion.model).cyan());
    eprintln!(
        "  Temperature: {}",
        style(config.completion.temperature).cyan()
    );
    eprintln!(
        "  API Key: {}",
        style(mask_secret(config.completion.api_key.as_deref())).cyan()
    );

    eprintln!();
    eprintln!("{}", style("Ingestion & Retrieval:").bold().yellow());
    eprintln!(
        "  Max Chunk Length: {}",
        style(config.ingestion.max_chunk_length).cyan()
    );
    eprintln!("  Batch Size: {}", style(config.ingestion.batch_size).cyan());
    eprintln!("  Top K: {}", style(config.retrieval.top_k).cyan());

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

fn load_existing_config(config_dir: &Path) -> Config {
    Config::load_file(config_dir).map_or_else(
        |_| {
            eprintln!(
                "{}",
                style("No existing configuration found. Using defaults.").yellow()
            );
            Config {
                base_dir: config_dir.to_path_buf(),
                ..Config::default()
            }
        },
        |config| {
            eprintln!("{}", style("Found existing configuration.").green());
            config
        },
    )
}

/// Show only the last four characters of a secret
pub(crate) fn mask_secret(secret: Option<&str>) -> String {
    match secret {
        None => "(not set)".to_string(),
        Some(value) => {
            let chars: Vec<char> = value.chars().collect();
            if chars.len() <= 4 {
                "****".to_string()
            } else {
                let tail: String = chars[chars.len() - 4..].iter().collect();
                format!("****{}", tail)
            }
        }
    }
}

fn prompt_url(prompt: &str, current: &str) -> Result<String> {
    let url: String = Input::new()
        .with_prompt(prompt)
        .default(current.to_string())
        .validate_with(|input: &String| -> Result<(), String> {
            match url::Url::parse(input.trim()) {
                Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(()),
                _ => Err(format!("'{}' is not an http(s) URL", input)),
            }
        })
        .interact_text()?;
    Ok(url.trim().to_string())
}

fn prompt_non_empty(prompt: &str, current: &str) -> Result<String> {
    let value: String = Input::new()
        .with_prompt(prompt)
        .default(current.to_string())
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.trim().is_empty() {
                Err("Value cannot be empty")
            } else {
                Ok(())
            }
        })
        .interact_text()?;
    Ok(value.trim().to_string())
}

/// Keep the current secret when the prompt is left blank
fn prompt_secret(prompt: &str, current: Option<String>) -> Result<Option<String>> {
    let entered = Password::new()
        .with_prompt(format!("{} (leave blank to keep current)", prompt))
        .allow_empty_password(true)
        .interact()?;
    if entered.trim().is_empty() {
        Ok(current)
    } else {
        Ok(Some(entered.trim().to_string()))
    }
}

fn configure_embedding(embedding: &mut EmbeddingConfig) -> Result<()> {
    embedding.base_url = prompt_url("Embedding API URL", &embedding.base_url)?;
    embedding.model = prompt_non_empty("Embedding model", &embedding.model)?;

    embedding.dimension = Input::new()
        .with_prompt("Embedding dimension")
        .default(embedding.dimension)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (64..=4096).contains(input) {
                Ok(())
            } else {
                Err("Dimension must be between 64 and 4096")
            }
        })
        .interact_text()?;

    embedding.retry_attempts = Input::new()
        .with_prompt("Attempts per embedding call")
        .default(embedding.retry_attempts)
        .validate_with(|input: &u32| -> Result<(), &str> {
            if (1..=10).contains(input) {
                Ok(())
            } else {
                Err("Attempts must be between 1 and 10")
            }
        })
        .interact_text()?;

    embedding.api_key = prompt_secret("Nomic API key", embedding.api_key.take())?;
    Ok(())
}

fn configure_vector_store(store: &mut VectorStoreConfig) -> Result<()> {
    let backends = &["chroma", "lancedb"];
    let default_index = match store.backend {
        VectorBackend::Chroma => 0,
        VectorBackend::LanceDb => 1,
    };

    let index = Select::new()
        .with_prompt("Vector store backend")
        .default(default_index)
        .items(backends)
        .interact()?;

    store.backend = if index == 1 {
        VectorBackend::LanceDb
    } else {
        VectorBackend::Chroma
    };

    if store.backend == VectorBackend::Chroma {
        store.base_url = prompt_url("Chroma URL", &store.base_url)?;
        store.tenant = prompt_non_empty("Chroma tenant", &store.tenant)?;
        store.database = prompt_non_empty("Chroma database", &store.database)?;
        store.auth_token = prompt_secret("Chroma auth token", store.auth_token.take())?;
    }

    Ok(())
}

fn configure_completion(completion: &mut CompletionConfig) -> Result<()> {
    completion.base_url = prompt_url("Chat completion API URL", &completion.base_url)?;
    completion.model = prompt_non_empty("Completion model", &completion.model)?;

    completion.temperature = Input::new()
        .with_prompt("Sampling temperature")
        .default(completion.temperature)
        .validate_with(|input: &f32| -> Result<(), &str> {
            if (0.0..=2.0).contains(input) {
                Ok(())
            } else {
                Err("Temperature must be between 0 and 2")
            }
        })
        .interact_text()?;

    completion.api_key = prompt_secret("Groq API key", completion.api_key.take())?;
    Ok(())
}

fn configure_ingestion(ingestion: &mut IngestionConfig) -> Result<()> {
    ingestion.max_chunk_length = Input::new()
        .with_prompt("Maximum chunk length (characters)")
        .default(ingestion.max_chunk_length)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (50..=8000).contains(input) {
                Ok(())
            } else {
                Err("Chunk length must be between 50 and 8000")
            }
        })
        .interact_text()?;

    ingestion.batch_size = Input::new()
        .with_prompt("Chunks per batch")
        .default(ingestion.batch_size)
        .validate_with(|input: &usize| -> Result<(), &str> {
            if (1..=100).contains(input) {
                Ok(())
            } else {
                Err("Batch size must be between 1 and 100")
            }
        })
        .interact_text()?;

    Ok(())
}

fn configure_retrieval(retrieval: &mut RetrievalConfig) -> Result<()> {
    retrieval.top_k = Input::new()
        .with_prompt("Chunks retrieved per question")
        .default(retrieval.top_k)
        .validate_with(|input: &usize| validate_top_k(*input))
        .interact_text()?;

    Ok(())
}

pub(crate) fn validate_top_k(top_k: usize) -> Result<(), &'static str> {
    RetrievalConfig { top_k }
        .validate()
        .map_err(|_| "Chunks per question must be between 1 and 50")
}

pub(crate) async fn check_chroma_connection(store: &VectorStoreConfig) -> bool {
    match ChromaStore::new(store) {
        Ok(chroma) => chroma.heartbeat().await.is_ok(),
        Err(_) => false,
    }
}

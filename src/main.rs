//! # relay
//!
//! Command-line entry point. `relay serve` runs the HTTP server; the other
//! commands perform one operation against the hosted services and print the
//! result.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `relay serve` | Start the HTTP server |
//! | `relay query "<text>"` | Retrieve + generate with defaults |
//! | `relay retrieve "<query>"` | Print scored chunks |
//! | `relay generate "<query>"` | Retrieve + generate with overrides |
//! | `relay upload <file>` | Upload a document |
//! | `relay status <id>` | Show a document's status |
//! | `relay sync <connection-id>` | Trigger a connection sync |
//!
//! `RAGIE_API_KEY` and `OPENAI_API_KEY` must be set (a `.env` file in the
//! working directory is honored).

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ragrelay::compose::Composer;
use ragrelay::config::{self, Config, Credentials};
use ragrelay::documents::DocumentClient;
use ragrelay::models::{DocumentMetadata, DocumentUpload, GenerationRequest, RetrievalRequest};
use ragrelay::server;
use ragrelay::traits::DocumentStore;

/// Retrieval-augmented generation relay in front of Ragie and OpenAI.
#[derive(Parser)]
#[command(name = "relay", version)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Answer a question using default retrieval settings.
    Query {
        text: String,
    },

    /// Retrieve scored chunks for a query.
    Retrieve {
        query: String,

        /// Filter as a JSON object, e.g. '{"scope": {"$eq": "billing"}}'.
        #[arg(long, value_parser = parse_json_object)]
        filter: Option<Map<String, Value>>,

        /// Disable upstream reranking.
        #[arg(long)]
        no_rerank: bool,
    },

    /// Retrieve, then generate an answer.
    Generate {
        query: String,

        #[arg(long, value_parser = parse_json_object)]
        filter: Option<Map<String, Value>>,

        #[arg(long)]
        no_rerank: bool,

        /// Model name. Defaults to `[generation].model`.
        #[arg(long)]
        model: Option<String>,

        /// System prompt used verbatim instead of the default template.
        #[arg(long)]
        system_prompt: Option<String>,
    },

    /// Upload a document for indexing.
    Upload {
        file: PathBuf,

        /// Metadata as a JSON object.
        #[arg(long, value_parser = parse_json_object)]
        metadata: Option<Map<String, Value>>,

        /// Processing mode. Defaults to `[retrieval].upload_mode`.
        #[arg(long)]
        mode: Option<String>,
    },

    /// Show the processing status of a document.
    Status {
        id: String,
    },

    /// Trigger a sync of a data-source connection.
    Sync {
        connection_id: String,
    },
}

fn parse_json_object(s: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(s) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("expected a JSON object".to_string()),
        Err(e) => Err(format!("invalid JSON: {}", e)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    let credentials = Credentials::from_env().context("missing upstream credentials")?;

    match cli.command {
        Commands::Serve => {
            server::run_server(&cfg, &credentials).await?;
        }
        Commands::Query { text } => {
            let composer = Composer::from_config(&cfg, &credentials);
            let answer = composer.query(&text).await?;
            println!("{}", answer.response);
        }
        Commands::Retrieve {
            query,
            filter,
            no_rerank,
        } => {
            let composer = Composer::from_config(&cfg, &credentials);
            let request = RetrievalRequest {
                query,
                filter,
                rerank: no_rerank.then_some(false),
            };
            let retrieved = composer.retrieve(&request).await?;
            if retrieved.is_empty() {
                println!("No chunks found.");
            }
            for (i, chunk) in retrieved.scored_chunks.iter().enumerate() {
                println!("{}. [{:.3}] document {}", i + 1, chunk.score, chunk.document_id);
                println!("{}", chunk.text);
                println!();
            }
        }
        Commands::Generate {
            query,
            filter,
            no_rerank,
            model,
            system_prompt,
        } => {
            let composer = Composer::from_config(&cfg, &credentials);
            let request = GenerationRequest {
                query,
                filter,
                rerank: no_rerank.then_some(false),
                model,
                system_prompt,
            };
            let answer = composer.generate(&request).await?;
            println!("{}", answer.response);
        }
        Commands::Upload {
            file,
            metadata,
            mode,
        } => {
            let documents = DocumentClient::new(&cfg.retrieval, credentials.ragie_api_key.clone());
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .with_context(|| format!("not a file path: {}", file.display()))?;
            let metadata = metadata
                .map(|m| serde_json::from_value::<DocumentMetadata>(Value::Object(m)))
                .transpose()?;
            let upload = DocumentUpload {
                path: file,
                file_name,
                content_type: None,
                metadata,
                mode: mode.unwrap_or_else(|| cfg.retrieval.upload_mode.clone()),
            };
            let created = documents.upload(&upload).await?;
            println!("id:     {}", created.id);
            println!("status: {}", created.status);
        }
        Commands::Status { id } => {
            let documents = DocumentClient::new(&cfg.retrieval, credentials.ragie_api_key.clone());
            let doc = documents.status(&id).await?;
            println!("id:          {}", doc.id);
            println!("name:        {}", doc.name);
            println!("status:      {}", doc.status);
            println!("chunk_count: {}", doc.chunk_count);
            println!("created_at:  {}", doc.created_at.to_rfc3339());
            println!("updated_at:  {}", doc.updated_at.to_rfc3339());
            if let Some(ref external_id) = doc.external_id {
                println!("external_id: {}", external_id);
            }
            println!("metadata:    {}", serde_json::to_string(&doc.metadata)?);
        }
        Commands::Sync { connection_id } => {
            let documents = DocumentClient::new(&cfg.retrieval, credentials.ragie_api_key.clone());
            let synced = documents.sync(&connection_id).await?;
            println!("{}", synced.message);
        }
    }

    Ok(())
}

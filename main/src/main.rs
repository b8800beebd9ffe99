use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use common::{
    storage::{db::SurrealDbClient, types::document::Document},
    utils::{config::get_config, embedding::EmbeddingProvider},
};
use ingestion_pipeline::{
    chunker::ChunkingConfig,
    extraction::{ocr::TesseractCli, pdf::PdfiumRasterizer},
    EmbeddingIndexer, IngestionPipeline,
};
use retrieval_pipeline::{
    answer::llm::{ChatModel, GenerationOptions, OpenAiChat},
    AnswerOptions, AnswerSynthesizer, HybridRetriever,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(
    name = "main",
    about = "Document ingestion, hybrid retrieval and grounded question answering"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a file and run the ingestion pipeline over it
    Ingest {
        file: PathBuf,
        #[arg(long)]
        title: Option<String>,
    },
    /// Embed segments that lack a vector under the current model
    Index {
        #[arg(long)]
        document: Option<String>,
    },
    /// Hybrid (lexical + semantic) search over indexed segments
    Search {
        query: String,
        #[arg(long)]
        document: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Ask a question and receive a citation-annotated answer
    Ask {
        question: String,
        #[arg(long)]
        document: Option<String>,
        #[arg(long, default_value_t = 16)]
        k: usize,
        #[arg(long, default_value_t = 3000)]
        max_context_tokens: usize,
    },
    /// List recently registered documents
    Documents {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Delete a document together with its segments and vectors
    Delete { document: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.apply_migrations().await?;

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));
    let provider = Arc::new(EmbeddingProvider::from_config(
        &config,
        Some(Arc::clone(&openai_client)),
    )?);
    db.ensure_vector_index(provider.dimension()).await?;
    info!(
        embedding_backend = provider.backend_label(),
        dimension = provider.dimension(),
        "embedding provider initialized"
    );

    match cli.command {
        Command::Ingest { file, title } => {
            let document = Document::register_file(&db, &file, title).await?;
            let pipeline = IngestionPipeline::new(
                Arc::clone(&db),
                Arc::clone(&provider),
                Arc::new(TesseractCli::new(config.ocr_language.clone())),
                Arc::new(PdfiumRasterizer::new()),
                ChunkingConfig::from_app_config(&config),
                config.embedding_batch_size,
            );
            let report = pipeline.process_document(&document.id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Index { document } => {
            let indexer = EmbeddingIndexer::new(
                Arc::clone(&db),
                Arc::clone(&provider),
                config.embedding_batch_size,
            );
            let report = indexer.index(document.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Search {
            query,
            document,
            limit,
        } => {
            let retriever = HybridRetriever::new(Arc::clone(&db), Arc::clone(&provider));
            let items = retriever.search(&query, document.as_deref(), limit).await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        Command::Ask {
            question,
            document,
            k,
            max_context_tokens,
        } => {
            let chat: Arc<dyn ChatModel> = Arc::new(OpenAiChat::new(
                Arc::clone(&openai_client),
                config.chat_model.clone(),
            ));
            let synthesizer = AnswerSynthesizer::new(Arc::clone(&db), Arc::clone(&provider), chat);
            let options = AnswerOptions {
                k,
                max_context_tokens,
                scope: document,
                generation: GenerationOptions {
                    timeout: Duration::from_millis(config.llm_timeout_ms),
                    ..GenerationOptions::default()
                },
            };
            let response = synthesizer.answer(&question, &options).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Documents { limit } => {
            let documents = Document::list_recent(&db, limit).await?;
            println!("{}", serde_json::to_string_pretty(&documents)?);
        }
        Command::Delete { document } => {
            Document::delete_cascade(&db, &document).await?;
            println!("deleted document {document}");
        }
    }

    Ok(())
}

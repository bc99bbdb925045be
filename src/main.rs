use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use log::{error, info};
use std::io;
use std::path::{Path, PathBuf};

use pdf_rag::chunking::RecursiveCharacterSplitter;
use pdf_rag::config::Settings;
use pdf_rag::database::EpsillaClient;
use pdf_rag::document::Document;
use pdf_rag::groq::GroqClient;
use pdf_rag::huggingface::HuggingFaceEmbedder;
use pdf_rag::rag::RagEngine;

/// Question answering over a PDF with Hugging Face embeddings, Epsilla and Groq
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load, split, embed and store a document (text or PDF)
    Ingest {
        /// Path to the document to process
        file_path: PathBuf,
        /// Drop and recreate the collection first instead of appending
        #[arg(long)]
        reset: bool,
    },
    /// Answer a single question from the stored collection
    Ask {
        /// The question to answer
        question: String,
        /// Ingest this document before answering
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Interactive question loop over the stored collection
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    // Fails before any stage runs when an API key is missing
    let settings = Settings::from_env().context("Invalid configuration")?;

    let splitter = RecursiveCharacterSplitter::new(
        settings.chunking.chunk_size,
        settings.chunking.chunk_overlap,
    )?;
    let embedder = HuggingFaceEmbedder::new(settings.huggingface.clone())?;
    let epsilla = EpsillaClient::new(settings.epsilla.clone())
        .context("Failed to initialize Epsilla client")?;
    let groq = GroqClient::new(settings.groq.clone())?;

    let rag_engine = RagEngine::new(embedder, epsilla, groq, splitter, settings.top_k);

    match args.command {
        Command::Ingest { file_path, reset } => {
            if reset {
                rag_engine.reset().await?;
            }
            ingest(&rag_engine, &file_path).await?;
        }
        Command::Ask { question, file } => {
            if let Some(file_path) = file {
                ingest(&rag_engine, &file_path).await?;
            }
            let answer = rag_engine
                .answer(&question)
                .await
                .context("Failed to answer question")?;
            println!("{}", answer.text);
            for source in &answer.sources {
                info!(
                    "source: {} page {} chunk {}",
                    source.chunk.document_id, source.chunk.page_number, source.chunk.chunk_index
                );
            }
        }
        Command::Chat => {
            let stdin = io::stdin();
            rag_engine
                .run_query_loop(stdin.lock(), io::stdout())
                .await
                .context("Error in query loop")?;
        }
    }

    Ok(())
}

async fn ingest(
    rag_engine: &RagEngine<HuggingFaceEmbedder, EpsillaClient, GroqClient>,
    file_path: &Path,
) -> Result<()> {
    info!("Processing file: {}", file_path.display());

    if !file_path.exists() {
        error!("File not found: {}", file_path.display());
        return Err(anyhow::anyhow!("File not found: {}", file_path.display()));
    }

    let document = Document::from_file(file_path).context("Failed to process document")?;
    info!("Document type: {}", document.mime_type);

    let report = rag_engine
        .ingest(&document)
        .await
        .context("Failed to process file")?;
    info!(
        "Indexed {}: {} pages, {} chunks, {} records",
        document.document_id, report.pages, report.chunks, report.records
    );

    Ok(())
}

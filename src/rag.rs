use crate::chunking::{estimate_token_count, RecursiveCharacterSplitter};
use crate::database::{IndexRecord, RetrievedChunk, VectorStore};
use crate::document::Document;
use crate::embeddings::{validate_embeddings, Embedder};
use crate::groq::ChatModel;
use anyhow::{Context, Result};
use log::{debug, info};
use std::io::{BufRead, Write};

/// Outcome of indexing one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub pages: usize,
    pub chunks: usize,
    pub records: usize,
}

/// An answer together with the chunks it was grounded on
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<RetrievedChunk>,
}

/// Fill the fixed question-answering template with the question and the
/// retrieved chunks, joined by blank lines
pub fn build_prompt(question: &str, chunks: &[RetrievedChunk]) -> String {
    let context = chunks
        .iter()
        .map(|c| c.chunk.text.trim())
        .collect::<Vec<&str>>()
        .join("\n\n");

    format!(
        "You are an assistant for question-answering tasks. \
         Use the following pieces of retrieved context to answer the question. \
         If you don't know the answer, just say that you don't know. \
         Use three sentences maximum and keep the answer concise.\n\
         Question: {}\nContext: {}\nAnswer:",
        question.trim(),
        context
    )
}

/// RAG (Retrieval-Augmented Generation) engine
pub struct RagEngine<E, S, L> {
    embedder: E,
    store: S,
    llm: L,
    splitter: RecursiveCharacterSplitter,
    top_k: usize,
}

impl<E, S, L> RagEngine<E, S, L>
where
    E: Embedder,
    S: VectorStore,
    L: ChatModel,
{
    /// Create a new RAG engine
    pub fn new(
        embedder: E,
        store: S,
        llm: L,
        splitter: RecursiveCharacterSplitter,
        top_k: usize,
    ) -> Self {
        RagEngine {
            embedder,
            store,
            llm,
            splitter,
            top_k: top_k.max(1),
        }
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn llm(&self) -> &L {
        &self.llm
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Drop and recreate the collection before the next ingestion
    pub async fn reset(&self) -> Result<()> {
        self.store
            .reset_collection(self.embedder.dimension())
            .await
            .context("Failed to reset collection")
    }

    /// Process a document: chunk it, generate embeddings, and store them.
    /// Every call appends; ingesting the same document twice stores it twice.
    pub async fn ingest(&self, document: &Document) -> Result<IngestReport> {
        let chunks = self.splitter.split_document(document);
        info!(
            "Split {} ({} pages) into {} chunks",
            document.document_id,
            document.pages.len(),
            chunks.len()
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        info!("Generating embeddings for {} chunks...", texts.len());
        let embeddings = self
            .embedder
            .embed_documents(&texts)
            .await
            .context("Failed to embed chunks")?;
        validate_embeddings(&embeddings, chunks.len(), self.embedder.dimension())?;

        self.store
            .ensure_collection(self.embedder.dimension())
            .await
            .context("Failed to prepare collection")?;

        let records: Vec<IndexRecord> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexRecord {
                id: chunk.chunk_index as u64,
                chunk,
                embedding,
            })
            .collect();

        let written = self
            .store
            .add_records(&records)
            .await
            .context("Failed to store chunks")?;
        info!("Stored {} records", written);

        Ok(IngestReport {
            pages: document.pages.len(),
            chunks: records.len(),
            records: written,
        })
    }

    /// Retrieve at most `top_k` chunks relevant to the question
    pub async fn retrieve(&self, question: &str) -> Result<Vec<RetrievedChunk>> {
        let query = self
            .embedder
            .embed_query(question)
            .await
            .context("Failed to embed question")?;

        let mut chunks = self
            .store
            .search(&query, self.top_k)
            .await
            .context("Failed to search collection")?;
        chunks.truncate(self.top_k);
        debug!("Retrieved {} chunks", chunks.len());

        Ok(chunks)
    }

    /// Answer a question from the retrieved context
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let sources = self.retrieve(question).await?;
        if sources.is_empty() {
            info!("No relevant information found in the document.");
        }

        let prompt = build_prompt(question, &sources);
        debug!("Prompt is ~{} tokens", estimate_token_count(&prompt));

        let text = self
            .llm
            .complete(&prompt)
            .await
            .context("Failed to generate answer")?;

        Ok(Answer { text, sources })
    }

    /// Run the interactive query loop until `exit` or end of input
    pub async fn run_query_loop<R, W>(&self, mut input: R, mut output: W) -> Result<()>
    where
        R: BufRead,
        W: Write,
    {
        writeln!(output, "Ready to answer questions. Type 'exit' to quit.")?;
        let mut buffer = String::new();

        loop {
            write!(output, "\nYour question: ")?;
            output.flush()?;

            buffer.clear();
            if input.read_line(&mut buffer)? == 0 {
                break;
            }

            let question = buffer.trim();
            if question.is_empty() {
                continue;
            }
            if question.eq_ignore_ascii_case("exit") {
                writeln!(output, "Goodbye!")?;
                break;
            }

            let answer = self.answer(question).await?;
            writeln!(output, "\n{}", answer.text)?;
        }

        Ok(())
    }
}

use anyhow::Result;
use std::io::Cursor;
use std::sync::Mutex;

use pdf_rag::chunking::{RecursiveCharacterSplitter, TextChunk};
use pdf_rag::database::{IndexRecord, RetrievedChunk, VectorStore};
use pdf_rag::document::Document;
use pdf_rag::embeddings::{Embedder, Embedding};
use pdf_rag::groq::ChatModel;
use pdf_rag::rag::RagEngine;

const DIM: usize = 16;

/// Bag-of-words hashed into a small vector
struct HashingEmbedder {
    drop_last: bool,
}

impl HashingEmbedder {
    fn new() -> Self {
        HashingEmbedder { drop_last: false }
    }

    fn vector(text: &str) -> Embedding {
        let mut values = vec![0.0f32; DIM];
        for word in text.split_whitespace() {
            let word = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if word.is_empty() {
                continue;
            }
            let bucket = word.bytes().map(|b| b as usize).sum::<usize>() % DIM;
            values[bucket] += 1.0;
        }
        Embedding::new(values)
    }
}

impl Embedder for HashingEmbedder {
    fn dimension(&self) -> usize {
        DIM
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut out: Vec<Embedding> = texts.iter().map(|t| Self::vector(t)).collect();
        if self.drop_last {
            out.pop();
        }
        Ok(out)
    }
}

#[derive(Default)]
struct MemoryStore {
    dimension: Mutex<Option<usize>>,
    records: Mutex<Vec<IndexRecord>>,
}

impl MemoryStore {
    fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    fn texts(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.chunk.text.clone())
            .collect()
    }
}

impl VectorStore for MemoryStore {
    async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        let mut current = self.dimension.lock().unwrap();
        if let Some(existing) = *current {
            anyhow::ensure!(existing == dimension, "dimension mismatch");
        }
        *current = Some(dimension);
        Ok(())
    }

    async fn reset_collection(&self, dimension: usize) -> Result<()> {
        self.records.lock().unwrap().clear();
        *self.dimension.lock().unwrap() = Some(dimension);
        Ok(())
    }

    async fn add_records(&self, records: &[IndexRecord]) -> Result<usize> {
        let dimension = self.dimension.lock().unwrap().unwrap_or(DIM);
        for record in records {
            anyhow::ensure!(record.embedding.dimension() == dimension, "bad dimension");
        }
        self.records.lock().unwrap().extend_from_slice(records);
        Ok(records.len())
    }

    async fn search(&self, query: &Embedding, limit: usize) -> Result<Vec<RetrievedChunk>> {
        let records = self.records.lock().unwrap();
        let mut scored: Vec<(f32, &IndexRecord)> = records
            .iter()
            .map(|r| (query.cosine_similarity(&r.embedding), r))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, r)| RetrievedChunk {
                chunk: r.chunk.clone(),
                distance: Some(1.0 - score),
            })
            .collect())
    }
}

/// Answers by quoting the context it was given
#[derive(Default)]
struct EchoModel {
    prompts: Mutex<Vec<String>>,
}

impl ChatModel for EchoModel {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let context = prompt
            .split("Context: ")
            .nth(1)
            .and_then(|rest| rest.split("\nAnswer:").next())
            .unwrap_or_default();
        let first_line = context.lines().next().unwrap_or_default();
        Ok(format!("This document is about: {}", first_line))
    }
}

fn employment_document() -> Document {
    let page_one = [
        "EMPLOYMENT AGREEMENT",
        "This agreement governs the termination of employment between the employer and the employee.",
        "Either party may end the employment relationship with thirty days written notice.",
    ]
    .join("\n\n");
    let page_two = "Severance pay is owed upon termination of employment without cause. ".repeat(40);
    let page_three = "Annual leave accrues at two days per month of service. ".repeat(30);

    Document::from_pages("employment.pdf", [page_one, page_two, page_three])
}

fn engine(embedder: HashingEmbedder) -> RagEngine<HashingEmbedder, MemoryStore, EchoModel> {
    let splitter = RecursiveCharacterSplitter::new(256, 64).unwrap();
    RagEngine::new(embedder, MemoryStore::default(), EchoModel::default(), splitter, 3)
}

#[tokio::test]
async fn ingest_stores_one_record_per_chunk() {
    let engine = engine(HashingEmbedder::new());
    let document = employment_document();

    let report = engine.ingest(&document).await.unwrap();

    assert_eq!(report.pages, 3);
    assert!(report.chunks > 3);
    assert_eq!(report.records, report.chunks);
    assert_eq!(engine.store().len(), report.chunks);

    let records = engine.store().records.lock().unwrap();
    for (idx, record) in records.iter().enumerate() {
        assert_eq!(record.embedding.dimension(), DIM);
        assert_eq!(record.id, idx as u64);
        assert!(record.chunk.char_len() <= 256);
        assert_eq!(record.chunk.document_id, "employment.pdf");
    }
}

#[test]
fn chunks_from_one_page_overlap_exactly() {
    let splitter = RecursiveCharacterSplitter::new(256, 64).unwrap();
    let chunks = splitter.split_document(&employment_document());

    let same_page: Vec<(&TextChunk, &TextChunk)> = chunks
        .windows(2)
        .filter(|w| w[0].page_number == w[1].page_number)
        .map(|w| (&w[0], &w[1]))
        .collect();
    assert!(!same_page.is_empty());

    for (prev, next) in same_page {
        let prev_chars: Vec<char> = prev.text.chars().collect();
        let tail: String = prev_chars[prev_chars.len() - 64..].iter().collect();
        let head: String = next.text.chars().take(64).collect();
        assert_eq!(tail, head);
    }
}

#[tokio::test]
async fn ingesting_twice_duplicates_records() {
    let engine = engine(HashingEmbedder::new());
    let document = employment_document();

    let first = engine.ingest(&document).await.unwrap();
    let second = engine.ingest(&document).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(engine.store().len(), first.records * 2);
}

#[tokio::test]
async fn reset_clears_previous_records() {
    let engine = engine(HashingEmbedder::new());
    let document = employment_document();

    let report = engine.ingest(&document).await.unwrap();
    engine.reset().await.unwrap();
    assert_eq!(engine.store().len(), 0);

    engine.ingest(&document).await.unwrap();
    assert_eq!(engine.store().len(), report.records);
}

#[tokio::test]
async fn retrieve_returns_at_most_top_k_stored_chunks() {
    let engine = engine(HashingEmbedder::new());
    engine.ingest(&employment_document()).await.unwrap();
    let stored = engine.store().texts();

    let chunks = engine.retrieve("severance pay").await.unwrap();

    assert!(!chunks.is_empty());
    assert!(chunks.len() <= engine.top_k());
    for retrieved in &chunks {
        assert!(stored.contains(&retrieved.chunk.text));
    }
    assert!(chunks[0].chunk.text.contains("Severance"));
}

#[tokio::test]
async fn retrieve_on_empty_collection_is_empty() {
    let engine = engine(HashingEmbedder::new());
    let chunks = engine.retrieve("anything").await.unwrap();
    assert!(chunks.is_empty());

    let answer = engine.answer("anything").await.unwrap();
    assert!(answer.sources.is_empty());
}

#[tokio::test]
async fn answer_mentions_employment() {
    let engine = engine(HashingEmbedder::new());
    engine.ingest(&employment_document()).await.unwrap();

    let answer = engine
        .answer("what is this document about?")
        .await
        .unwrap();

    assert!(answer.text.to_lowercase().contains("employ"));
    assert!(!answer.sources.is_empty());

    let prompts = engine_prompts(&engine);
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("Question: what is this document about?"));
}

#[tokio::test]
async fn embedder_count_mismatch_fails_ingest() {
    let engine = engine(HashingEmbedder { drop_last: true });
    let err = engine.ingest(&employment_document()).await.unwrap_err();

    assert!(format!("{:#}", err).contains("embeddings"));
    assert_eq!(engine.store().len(), 0);
}

#[tokio::test]
async fn query_loop_answers_until_exit() {
    let engine = engine(HashingEmbedder::new());
    engine.ingest(&employment_document()).await.unwrap();

    let input = Cursor::new("\nwhat is the notice period?\nexit\nignored\n");
    let mut output = Vec::new();
    engine.run_query_loop(input, &mut output).await.unwrap();

    let transcript = String::from_utf8(output).unwrap();
    assert!(transcript.contains("This document is about:"));
    assert!(transcript.trim_end().ends_with("Goodbye!"));
    assert_eq!(engine_prompts(&engine).len(), 1);
}

fn engine_prompts(engine: &RagEngine<HashingEmbedder, MemoryStore, EchoModel>) -> Vec<String> {
    engine.llm().prompts.lock().unwrap().clone()
}

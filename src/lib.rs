pub mod chunking;
pub mod config;
pub mod database;
pub mod document;
pub mod embeddings;
pub mod groq;
pub mod huggingface;
pub mod rag;

#[cfg(test)]
mod test_server;

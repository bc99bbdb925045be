use anyhow::{Context, Result};
use log::{debug, info, warn};
use mime_guess::from_path;
use pdf_extract::extract_text_by_pages;
use std::fs;
use std::path::Path;

/// A single page of extracted text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number inside the source document
    pub number: usize,
    /// Normalized text of the page
    pub text: String,
}

/// Represents a loaded document as an ordered sequence of pages
#[derive(Debug, Clone)]
pub struct Document {
    /// The document's file name (used as document ID)
    pub document_id: String,
    /// The document's MIME type
    pub mime_type: String,
    /// Pages in source order
    pub pages: Vec<Page>,
}

impl Document {
    /// Load a document from a file path. PDFs yield one page per PDF page,
    /// plain text files yield a single page.
    pub fn from_file<P: AsRef<Path>>(file_path: P) -> Result<Self> {
        let path = file_path.as_ref();
        let file_name = path
            .file_name()
            .context("Invalid file name")?
            .to_str()
            .context("Invalid file name encoding")?
            .to_string();

        let mime = from_path(path).first_or_octet_stream();
        let mime_type = mime.to_string();
        debug!("Detected MIME type: {}", mime_type);

        let pages = read_document_pages(path, &mime_type)?;

        Ok(Document {
            document_id: file_name,
            mime_type,
            pages,
        })
    }

    /// Build a document from in-memory page texts, numbering pages from 1.
    pub fn from_pages<I, S>(document_id: &str, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(idx, text)| Page {
                number: idx + 1,
                text: text.into(),
            })
            .collect();

        Document {
            document_id: document_id.to_string(),
            mime_type: "text/plain".to_string(),
            pages,
        }
    }
}

/// Read the pages of a document based on its MIME type
pub fn read_document_pages<P: AsRef<Path>>(file_path: P, mime_type: &str) -> Result<Vec<Page>> {
    let path = file_path.as_ref();

    match mime_type {
        mime if mime.starts_with("application/pdf") => {
            info!("Processing PDF document: {}", path.display());
            let raw_pages = extract_text_by_pages(path)
                .with_context(|| format!("Failed to extract text from PDF: {}", path.display()))?;

            let pages: Vec<Page> = raw_pages
                .iter()
                .enumerate()
                .map(|(idx, text)| Page {
                    number: idx + 1,
                    text: normalize_whitespace(text),
                })
                .collect();

            if pages.iter().all(|p| p.text.is_empty()) {
                warn!("Extracted PDF content is empty or contains only whitespace");
            }
            debug!("Extracted {} pages", pages.len());

            Ok(pages)
        }

        mime if mime.starts_with("text/") => {
            info!("Processing text document: {}", path.display());
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read text file: {}", path.display()))?;
            Ok(vec![Page {
                number: 1,
                text: normalize_whitespace(&content),
            }])
        }

        _ => Err(anyhow::anyhow!(
            "Unsupported document format: {}. Only text and PDF files are supported.",
            mime_type
        )),
    }
}

/// Normalize whitespace in text (collapse repeated spaces, cap blank lines at one)
fn normalize_whitespace(text: &str) -> String {
    let result = text.replace('\r', "");

    let mut prev_char = ' ';
    let mut newline_count = 0;
    let mut normalized = String::with_capacity(result.len());

    for c in result.chars() {
        if c == '\n' {
            newline_count += 1;
        } else {
            if newline_count > 0 {
                // Add at most two newlines (paragraph break)
                if newline_count >= 2 {
                    normalized.push_str("\n\n");
                } else {
                    normalized.push('\n');
                }
                newline_count = 0;
                prev_char = '\n';
            }

            if !(c == ' ' && (prev_char == ' ' || prev_char == '\n')) {
                normalized.push(c);
            }

            prev_char = c;
        }
    }

    normalized.trim().to_string()
}

use crate::chunking::TextChunk;
use crate::config::{self, ProcessEnv, VarSource};
use crate::embeddings::Embedding;
use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

pub const DEFAULT_URL: &str = "http://localhost:8888";
pub const DEFAULT_DB_PATH: &str = "/data/rag_db";
pub const DEFAULT_DB_NAME: &str = "rag_db";
pub const DEFAULT_COLLECTION: &str = "documents";

const TEXT_FIELD: &str = "text";
const VECTOR_FIELD: &str = "embeddings";
const STATUS_OK: u16 = 200;
const STATUS_CONFLICT: u16 = 409;

/// A chunk and its vector, ready to be persisted
#[derive(Debug, Clone)]
pub struct IndexRecord {
    pub id: u64,
    pub chunk: TextChunk,
    pub embedding: Embedding,
}

/// A stored chunk returned by a similarity query
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk: TextChunk,
    /// Distance reported by the store, when it reports one
    pub distance: Option<f32>,
}

/// Vector index holding (chunk, vector, metadata) records in one collection
#[allow(async_fn_in_trait)]
pub trait VectorStore {
    /// Make sure the collection exists with vectors of `dimension`
    async fn ensure_collection(&self, dimension: usize) -> Result<()>;

    /// Drop the collection (if present) and create it empty
    async fn reset_collection(&self, dimension: usize) -> Result<()>;

    /// Append records; returns how many were written. Nothing is deduplicated.
    async fn add_records(&self, records: &[IndexRecord]) -> Result<usize>;

    /// Return at most `limit` records nearest to `query`, closest first
    async fn search(&self, query: &Embedding, limit: usize) -> Result<Vec<RetrievedChunk>>;
}

/// Configuration for Epsilla
#[derive(Debug, Clone)]
pub struct EpsillaConfig {
    pub url: String,
    pub db_path: String,
    pub db_name: String,
    pub collection: String,
    pub timeout: Option<Duration>,
}

impl EpsillaConfig {
    /// Create a new configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(&ProcessEnv)
    }

    pub fn from_vars(vars: &impl VarSource) -> Result<Self> {
        let url = config::or_default(vars, "EPSILLA_URL", DEFAULT_URL);
        anyhow::ensure!(
            url.starts_with("http://") || url.starts_with("https://"),
            "EPSILLA_URL must be an http(s) URL"
        );

        Ok(EpsillaConfig {
            url: url.trim_end_matches('/').to_string(),
            db_path: config::or_default(vars, "EPSILLA_DB_PATH", DEFAULT_DB_PATH),
            db_name: config::or_default(vars, "EPSILLA_DB_NAME", DEFAULT_DB_NAME),
            collection: get_collection_name(&config::or_default(
                vars,
                "EPSILLA_COLLECTION",
                DEFAULT_COLLECTION,
            )),
            timeout: config::http_timeout(vars)?,
        })
    }
}

/// Client for an Epsilla vector database reached over its REST API
pub struct EpsillaClient {
    config: EpsillaConfig,
    client: reqwest::Client,
}

impl EpsillaClient {
    /// Create a new Epsilla client. No request is made until the first call.
    pub fn new(config: EpsillaConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .context("failed to build Epsilla HTTP client")?;

        Ok(EpsillaClient { config, client })
    }

    pub fn config(&self) -> &EpsillaConfig {
        &self.config
    }

    fn db_url(&self, path: &str) -> String {
        format!("{}/api/{}/{}", self.config.url, self.config.db_name, path)
    }

    /// Load (or create) the configured database on the server.
    /// A database that is already loaded is not an error.
    pub async fn load_db(&self) -> Result<()> {
        let url = format!("{}/api/load", self.config.url);
        let body = json!({
            "name": self.config.db_name,
            "path": self.config.db_path,
        });

        let status = self
            .send("load database", self.client.post(&url).json(&body), &[STATUS_CONFLICT])
            .await?
            .status_code;

        if status == STATUS_CONFLICT {
            debug!("Database {} already loaded", self.config.db_name);
        } else {
            info!(
                "Loaded database {} from {}",
                self.config.db_name, self.config.db_path
            );
        }
        Ok(())
    }

    /// Names of the tables in the configured database
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let url = self.db_url("schema/tables/show");
        let response = self.send("list tables", self.client.get(&url), &[]).await?;

        Ok(response
            .result
            .as_ref()
            .and_then(Value::as_array)
            .map(|tables| {
                tables
                    .iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Check if the configured collection exists
    pub async fn collection_exists(&self) -> Result<bool> {
        let tables = self.list_tables().await?;
        Ok(tables.iter().any(|t| t == &self.config.collection))
    }

    /// Create the configured collection
    pub async fn create_table(&self, dimension: usize) -> Result<()> {
        let url = self.db_url("schema/tables");
        let body = table_schema(&self.config.collection, dimension);

        self.send(
            &format!("create table {}", self.config.collection),
            self.client.post(&url).json(&body),
            &[],
        )
        .await?;

        info!(
            "Created collection {} ({} dimensions)",
            self.config.collection, dimension
        );
        Ok(())
    }

    /// Drop the configured collection
    pub async fn drop_table(&self) -> Result<()> {
        let url = self.db_url(&format!("schema/tables/{}", self.config.collection));

        self.send(
            &format!("drop table {}", self.config.collection),
            self.client.delete(&url),
            &[],
        )
        .await?;

        info!("Dropped collection {}", self.config.collection);
        Ok(())
    }

    /// Insert records into the configured collection
    pub async fn insert(&self, records: &[IndexRecord]) -> Result<()> {
        let url = self.db_url("data/insert");
        let body = InsertRequest {
            table: &self.config.collection,
            data: records.iter().map(StoredRecord::from_record).collect(),
        };

        self.send(
            &format!("insert into {}", self.config.collection),
            self.client.post(&url).json(&body),
            &[],
        )
        .await?;
        Ok(())
    }

    /// Nearest-neighbour query against the configured collection
    pub async fn query(&self, vector: &Embedding, limit: usize) -> Result<Vec<RetrievedChunk>> {
        let url = self.db_url("data/query");
        let body = QueryRequest {
            table: &self.config.collection,
            query_field: VECTOR_FIELD,
            query_vector: &vector.values,
            response: &["id", TEXT_FIELD, "source", "page"],
            limit,
            with_distance: true,
        };

        let response = self
            .send(
                &format!("query {}", self.config.collection),
                self.client.post(&url).json(&body),
                &[],
            )
            .await?;

        parse_query_result(response.result.unwrap_or(Value::Null), limit)
    }

    /// Send a request and check both the HTTP status and the `statusCode`
    /// carried in the body. Codes listed in `accepted` pass as well.
    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
        accepted: &[u16],
    ) -> Result<EpsillaResponse> {
        let response = request.send().await.with_context(|| {
            format!(
                "Failed to {}: Epsilla unreachable at {}",
                operation, self.config.url
            )
        })?;

        let http_status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read Epsilla response to {}", operation))?;
        debug!("Epsilla {} -> {} {}", operation, http_status, text);

        let body: EpsillaResponse = serde_json::from_str(&text).with_context(|| {
            format!(
                "Failed to {}: unexpected Epsilla response ({}): {}",
                operation, http_status, text
            )
        })?;

        let http_ok = http_status.is_success() || accepted.contains(&http_status.as_u16());
        let body_ok = body.status_code == STATUS_OK || accepted.contains(&body.status_code);
        anyhow::ensure!(
            http_ok && body_ok,
            "Failed to {}: Epsilla returned {} ({}): {}",
            operation,
            http_status,
            body.status_code,
            body.message
        );

        Ok(body)
    }
}

impl VectorStore for EpsillaClient {
    async fn ensure_collection(&self, dimension: usize) -> Result<()> {
        self.load_db().await?;
        if self.collection_exists().await? {
            info!("Using existing collection: {}", self.config.collection);
            return Ok(());
        }
        self.create_table(dimension).await
    }

    async fn reset_collection(&self, dimension: usize) -> Result<()> {
        self.load_db().await?;
        if self.collection_exists().await? {
            self.drop_table().await?;
        }
        self.create_table(dimension).await
    }

    async fn add_records(&self, records: &[IndexRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        self.insert(records).await?;
        Ok(records.len())
    }

    async fn search(&self, query: &Embedding, limit: usize) -> Result<Vec<RetrievedChunk>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.load_db().await?;
        self.query(query, limit).await
    }
}

#[derive(Deserialize, Debug)]
struct EpsillaResponse {
    #[serde(rename = "statusCode")]
    status_code: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    result: Option<Value>,
}

#[derive(Serialize)]
struct InsertRequest<'a> {
    table: &'a str,
    data: Vec<StoredRecord<'a>>,
}

#[derive(Serialize, Debug)]
struct StoredRecord<'a> {
    id: u64,
    text: &'a str,
    source: &'a str,
    page: usize,
    embeddings: &'a [f32],
}

impl<'a> StoredRecord<'a> {
    fn from_record(record: &'a IndexRecord) -> Self {
        StoredRecord {
            id: record.id,
            text: &record.chunk.text,
            source: &record.chunk.document_id,
            page: record.chunk.page_number,
            embeddings: &record.embedding.values,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    table: &'a str,
    query_field: &'a str,
    query_vector: &'a [f32],
    response: &'a [&'a str],
    limit: usize,
    with_distance: bool,
}

/// Table layout: no primary key, so repeated inserts keep every copy
fn table_schema(collection: &str, dimension: usize) -> Value {
    json!({
        "name": collection,
        "fields": [
            { "name": "id", "dataType": "INT" },
            { "name": TEXT_FIELD, "dataType": "STRING" },
            { "name": "source", "dataType": "STRING" },
            { "name": "page", "dataType": "INT" },
            { "name": VECTOR_FIELD, "dataType": "VECTOR_FLOAT", "dimensions": dimension },
        ]
    })
}

/// Convert the `result` array of a query into chunks, keeping server order
fn parse_query_result(result: Value, limit: usize) -> Result<Vec<RetrievedChunk>> {
    let rows = match result {
        Value::Null => return Ok(Vec::new()),
        Value::Array(rows) => rows,
        other => anyhow::bail!("Unexpected Epsilla query result: {}", other),
    };

    let chunks = rows
        .into_iter()
        .filter_map(|row| {
            let text = row.get(TEXT_FIELD)?.as_str()?.to_string();
            let document_id = row
                .get("source")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let page_number = row.get("page").and_then(Value::as_u64).unwrap_or(0) as usize;
            let chunk_index = row.get("id").and_then(Value::as_u64).unwrap_or(0) as usize;
            let distance = row
                .get("@distance")
                .and_then(Value::as_f64)
                .map(|d| d as f32);

            Some(RetrievedChunk {
                chunk: TextChunk {
                    text,
                    document_id,
                    page_number,
                    chunk_index,
                    start_position: 0,
                },
                distance,
            })
        })
        .take(limit)
        .collect();

    Ok(chunks)
}

/// Epsilla table names: replace non-alphanumeric characters with
/// underscores and convert to lowercase
fn get_collection_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_lowercase()
}

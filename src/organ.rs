//! UMA Organ Interface for soma_frames
//!
//! Exposes movie frame ingestion and retrieval through the Universal Module
//! Architecture (UMA) stimulus/response pattern.
//!
//! ## Available Operations
//!
//! 1. `movie.ingest` - Extract 1 fps frames from a video and index them
//! 2. `movie.query` - Retrieve frames by text prompt, one movie or all
//! 3. `movie.list` - Known movie collections with frame counts
//! 4. `frames.capabilities` - Capability card query
//! 5. `metrics` - Request counters
//!
//! ## Example
//!
//! ```rust,no_run
//! use soma_frames::organ::{FramesOrgan, Organ, Stimulus};
//! use soma_frames::session::{FrameSession, SessionConfig};
//! use serde_json::json;
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Arc::new(FrameSession::open(SessionConfig::default())?);
//! let organ = FramesOrgan::new(session);
//!
//! let response = organ.stimulate(Stimulus {
//!     op: "movie.query".to_string(),
//!     input: json!({"prompt": "a man with a hat", "n_results": 3}),
//!     context: HashMap::new(),
//! }).await?;
//! println!("{}", response.output);
//! # Ok(())
//! # }
//! ```

use crate::error::FramesError;
use crate::metrics::{Metrics, Timer};
use crate::query::{QueryTarget, ResultCount};
use crate::session::FrameSession;
use crate::validation::validate_input;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// UMA Stimulus - input to organ operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stimulus {
    pub op: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub context: HashMap<String, String>,
}

/// UMA Response - output from organ operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    pub output: Value,
    pub latency_ms: u64,
    pub cost: Option<f64>,
}

/// Organ trait - all SOMA organs implement this
#[async_trait]
pub trait Organ: Send + Sync {
    async fn stimulate(&self, stimulus: Stimulus) -> Result<Response, OrganError>;
    fn describe(&self) -> OrganCard;
}

/// Organ-level errors
#[derive(Debug, Error)]
pub enum OrganError {
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error(transparent)]
    Frames(#[from] FramesError),
}

impl OrganError {
    fn kind(&self) -> &'static str {
        match self {
            OrganError::UnsupportedOperation(_) => "UnsupportedOperation",
            OrganError::InvalidInput(_) => "InvalidInput",
            OrganError::SerializationError(_) => "SerializationError",
            OrganError::Frames(e) => e.kind(),
        }
    }
}

/// Organ capability card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganCard {
    pub name: String,
    pub version: String,
    pub description: String,
    pub division: String,
    pub subsystem: String,
    pub tags: Vec<String>,
    pub execution_modes: Vec<String>,
    pub functions: Vec<FunctionCard>,
}

/// Function capability card
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCard {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub examples: Vec<String>,
    pub idempotent: bool,
    pub side_effects: Vec<String>,
    pub input_schema: Option<Value>,
    pub output_schema: Value,
}

pub const OPERATIONS: &[&str] = &[
    "movie.ingest",
    "movie.query",
    "movie.list",
    "frames.capabilities",
    "metrics",
];

/// Movie frame retrieval organ
pub struct FramesOrgan {
    session: Arc<FrameSession>,
    metrics: Arc<Metrics>,
}

impl FramesOrgan {
    pub fn new(session: Arc<FrameSession>) -> Self {
        Self::with_metrics(session, Metrics::new())
    }

    pub fn with_metrics(session: Arc<FrameSession>, metrics: Arc<Metrics>) -> Self {
        Self { session, metrics }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    pub fn session(&self) -> &FrameSession {
        &self.session
    }

    fn check_input(&self, op: &str, input: &Value) -> Result<(), OrganError> {
        let card = self.describe();
        let schema = card
            .functions
            .iter()
            .find(|f| f.name == op)
            .and_then(|f| f.input_schema.as_ref());
        if let Some(schema) = schema {
            validate_input(input, schema).map_err(|e| OrganError::InvalidInput(e.to_string()))?;
        }
        Ok(())
    }

    /// Handle movie.ingest operation
    async fn handle_ingest(&self, input: Value) -> Result<Value, OrganError> {
        let title = required_str(&input, "title")?;
        let video_path = required_str(&input, "video_path")?;

        let report = self.session.ingest(title, video_path).await?;
        self.metrics.record_frames(report.frames_added);
        Ok(serde_json::to_value(&report)?)
    }

    /// Handle movie.query operation
    async fn handle_query(&self, input: Value) -> Result<Value, OrganError> {
        let prompt = required_str(&input, "prompt")?;
        let count = match input.get("n_results").and_then(Value::as_u64) {
            Some(n) => ResultCount::new(n as usize)?,
            None => ResultCount::default(),
        };

        let collection = input.get("collection").and_then(Value::as_str);
        let mode = input
            .get("mode")
            .and_then(Value::as_str)
            .unwrap_or(if collection.is_some() { "single" } else { "all" });

        let target = match (mode, collection) {
            ("single", Some(name)) => QueryTarget::Collection(name.to_string()),
            ("single", None) => {
                return Err(OrganError::InvalidInput(
                    "mode 'single' needs a collection".to_string(),
                ))
            }
            _ => QueryTarget::All,
        };

        let groups = self.session.query(prompt, count, &target).await?;
        Ok(json!({
            "prompt": prompt,
            "n_results": count.get(),
            "mode": mode,
            "groups": serde_json::to_value(&groups)?,
        }))
    }

    /// Handle movie.list operation
    async fn handle_list(&self) -> Result<Value, OrganError> {
        let movies = self.session.list_movies().await?;
        Ok(json!({ "movies": serde_json::to_value(&movies)? }))
    }

    /// Handle frames.capabilities operation
    fn handle_capabilities(&self) -> Result<Value, OrganError> {
        Ok(serde_json::to_value(self.describe())?)
    }

    async fn dispatch(&self, stimulus: Stimulus) -> Result<Value, OrganError> {
        self.check_input(&stimulus.op, &stimulus.input)?;
        match stimulus.op.as_str() {
            "movie.ingest" => self.handle_ingest(stimulus.input).await,
            "movie.query" => self.handle_query(stimulus.input).await,
            "movie.list" => self.handle_list().await,
            "frames.capabilities" => self.handle_capabilities(),
            "metrics" => Ok(json!(self.metrics.snapshot())),
            other => Err(OrganError::UnsupportedOperation(other.to_string())),
        }
    }
}

fn required_str<'a>(input: &'a Value, field: &str) -> Result<&'a str, OrganError> {
    input[field]
        .as_str()
        .ok_or_else(|| OrganError::InvalidInput(format!("Missing {}", field)))
}

#[async_trait]
impl Organ for FramesOrgan {
    async fn stimulate(&self, stimulus: Stimulus) -> Result<Response, OrganError> {
        let timer = Timer::new();
        let op = stimulus.op.clone();
        debug!("Stimulus: op={}", op);

        let result = self.dispatch(stimulus).await;
        let latency = timer.elapsed_ms();
        self.metrics.record_request(&op, result.is_ok(), latency);

        let response = match result {
            Ok(output) => Response {
                ok: true,
                output,
                latency_ms: latency,
                cost: None,
            },
            Err(e) => {
                warn!("{} failed: {}", op, e);
                let mut output = json!({
                    "error": e.to_string(),
                    "kind": e.kind(),
                    "op": op,
                });
                if matches!(e, OrganError::UnsupportedOperation(_)) {
                    output["available_operations"] = json!(OPERATIONS);
                }
                Response {
                    ok: false,
                    output,
                    latency_ms: latency,
                    cost: None,
                }
            }
        };
        Ok(response)
    }

    fn describe(&self) -> OrganCard {
        OrganCard {
            name: "soma_frames".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "Movie frame retrieval organ: samples videos at 1 fps, embeds frames and answers text queries".to_string(),
            division: "media".to_string(),
            subsystem: "retrieval".to_string(),
            tags: vec![
                "media".to_string(),
                "video".to_string(),
                "frames".to_string(),
                "embeddings".to_string(),
                "search".to_string(),
                "ffmpeg".to_string(),
            ],
            execution_modes: vec!["embedded".to_string(), "server".to_string()],
            functions: vec![
                FunctionCard {
                    name: "movie.ingest".to_string(),
                    description: "Extract one frame per second from a video and index the frames under the movie's collection".to_string(),
                    tags: vec!["video".to_string(), "frames".to_string(), "indexing".to_string()],
                    examples: vec![
                        "Index a trailer so its scenes can be searched by text".to_string(),
                        "Append a second cut of a movie to its existing collection".to_string(),
                    ],
                    idempotent: false,
                    side_effects: vec![
                        "invokes ffmpeg".to_string(),
                        "writes scratch frames".to_string(),
                        "creates or extends a collection".to_string(),
                    ],
                    input_schema: Some(json!({
                        "type": "object",
                        "properties": {
                            "title": { "type": "string", "minLength": 1, "description": "Movie title" },
                            "video_path": { "type": "string", "minLength": 1, "description": "Path to mp4/mov/avi/mkv file" }
                        },
                        "required": ["title", "video_path"]
                    })),
                    output_schema: json!({
                        "type": "object",
                        "properties": {
                            "collection": { "type": "string" },
                            "movie": { "type": "string" },
                            "frames_added": { "type": "integer" },
                            "created_collection": { "type": "boolean" },
                            "ingested_at": { "type": "string" }
                        }
                    }),
                },
                FunctionCard {
                    name: "movie.query".to_string(),
                    description: "Find the frames closest to a text prompt in one movie or in every movie".to_string(),
                    tags: vec!["search".to_string(), "frames".to_string(), "text".to_string()],
                    examples: vec![
                        "Find 'a man with a hat' in one movie".to_string(),
                        "Compare the best 'sunset' frames across all movies".to_string(),
                    ],
                    idempotent: true,
                    side_effects: vec![],
                    input_schema: Some(json!({
                        "type": "object",
                        "properties": {
                            "prompt": { "type": "string", "minLength": 1, "description": "Text prompt" },
                            "n_results": { "type": "integer", "minimum": 1, "maximum": 10, "description": "Results per movie (default: 3)" },
                            "mode": { "type": "string", "enum": ["single", "all"], "description": "One collection or all (default: all unless collection is set)" },
                            "collection": { "type": "string", "description": "Collection name for single mode" }
                        },
                        "required": ["prompt"]
                    })),
                    output_schema: json!({
                        "type": "object",
                        "properties": {
                            "prompt": { "type": "string" },
                            "n_results": { "type": "integer" },
                            "mode": { "type": "string" },
                            "groups": { "type": "array" }
                        }
                    }),
                },
                FunctionCard {
                    name: "movie.list".to_string(),
                    description: "List movie collections with display titles and frame counts".to_string(),
                    tags: vec!["collections".to_string(), "discovery".to_string()],
                    examples: vec!["Show which movies can be searched".to_string()],
                    idempotent: true,
                    side_effects: vec![],
                    input_schema: None,
                    output_schema: json!({
                        "type": "object",
                        "properties": {
                            "movies": { "type": "array" }
                        }
                    }),
                },
                FunctionCard {
                    name: "frames.capabilities".to_string(),
                    description: "Return organ capability card with all available functions and metadata".to_string(),
                    tags: vec!["metadata".to_string(), "discovery".to_string(), "mcp".to_string()],
                    examples: vec!["Discover available frame retrieval operations".to_string()],
                    idempotent: true,
                    side_effects: vec![],
                    input_schema: None,
                    output_schema: json!({
                        "type": "object",
                        "properties": {
                            "name": { "type": "string" },
                            "version": { "type": "string" },
                            "functions": { "type": "array" }
                        }
                    }),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionConfig;

    fn organ() -> FramesOrgan {
        let session = FrameSession::open(SessionConfig {
            dimensions: 8,
            ..SessionConfig::default()
        })
        .unwrap();
        FramesOrgan::new(Arc::new(session))
    }

    fn stimulus(op: &str, input: Value) -> Stimulus {
        Stimulus {
            op: op.to_string(),
            input,
            context: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_organ_capabilities() {
        let response = organ()
            .stimulate(stimulus("frames.capabilities", json!({})))
            .await
            .unwrap();
        assert!(response.ok);
        assert_eq!(response.output["name"], "soma_frames");
    }

    #[tokio::test]
    async fn test_unsupported_operation() {
        let response = organ()
            .stimulate(stimulus("invalid.operation", json!({})))
            .await
            .unwrap();
        assert!(!response.ok);
        assert_eq!(response.output["kind"], "UnsupportedOperation");
        assert!(response.output["available_operations"].as_array().is_some());
    }

    #[tokio::test]
    async fn test_single_mode_requires_collection() {
        let response = organ()
            .stimulate(stimulus("movie.query", json!({"prompt": "x", "mode": "single"})))
            .await
            .unwrap();
        assert!(!response.ok);
        assert_eq!(response.output["kind"], "InvalidInput");
    }

    #[tokio::test]
    async fn test_query_unknown_collection_reports_not_found() {
        let response = organ()
            .stimulate(stimulus("movie.query", json!({"prompt": "x", "collection": "movie_nope"})))
            .await
            .unwrap();
        assert!(!response.ok);
        assert_eq!(response.output["kind"], "NotFound");
    }

    #[tokio::test]
    async fn test_failures_are_counted() {
        let organ = organ();
        organ.stimulate(stimulus("movie.ingest", json!({}))).await.unwrap();
        organ.stimulate(stimulus("movie.list", json!({}))).await.unwrap();

        let snap = organ.metrics().snapshot();
        assert_eq!(snap.total_requests, 2);
        assert_eq!(snap.failed_requests, 1);
        assert_eq!(snap.operations.movie_ingest, 1);
        assert_eq!(snap.operations.movie_list, 1);
    }

    #[test]
    fn test_organ_card() {
        let card = organ().describe();
        assert_eq!(card.name, "soma_frames");
        assert_eq!(card.subsystem, "retrieval");
        let names: Vec<&str> = card.functions.iter().map(|f| f.name.as_str()).collect();
        for op in ["movie.ingest", "movie.query", "movie.list", "frames.capabilities"] {
            assert!(names.contains(&op), "missing {}", op);
        }
    }
}

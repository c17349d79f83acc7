//! UMA Client for remote embeddings
//!
//! Talks to an embedding organ (a CLIP-style image/text model) over a Unix
//! Domain Socket using the same stimulus/response frames as `soma_frames`.

use crate::embedding::{check_dimensions, EmbeddingFunction};
use crate::error::{FramesError, Result};
use crate::organ::{Response, Stimulus};
use crate::wire::{read_frame, write_frame};
use async_trait::async_trait;
use image::DynamicImage;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tokio::net::UnixStream;
use tracing::{debug, info, warn};

pub const DEFAULT_EMBED_SOCKET: &str = "/tmp/soma_clip.sock";

/// Embedding function served by a remote organ.
pub struct RemoteEmbedding {
    socket_path: String,
    timeout: Duration,
    dimensions: usize,
    /// Set once a health ping succeeds; failures are never cached.
    available: Mutex<bool>,
}

impl RemoteEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self::with_socket(DEFAULT_EMBED_SOCKET, dimensions)
    }

    pub fn with_socket(socket_path: &str, dimensions: usize) -> Self {
        Self {
            socket_path: socket_path.to_string(),
            timeout: Duration::from_millis(5000),
            dimensions,
            available: Mutex::new(false),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn socket_path(&self) -> &str {
        &self.socket_path
    }

    /// Check if the embedding organ answers a health ping.
    ///
    /// A healthy answer is remembered; an unreachable organ is pinged again
    /// on the next call so a late-starting organ is picked up.
    pub async fn is_available(&self) -> bool {
        if self.cached_availability() {
            return true;
        }

        let available = if !Path::new(&self.socket_path).exists() {
            debug!("embedding socket not found: {}", self.socket_path);
            false
        } else {
            match self.send("health", json!({})).await {
                Ok(output) => {
                    let model = output.get("model").and_then(|m| m.as_str()).unwrap_or("unknown");
                    info!("🧠 Embedding organ available: {}", model);
                    true
                }
                Err(e) => {
                    warn!("Embedding organ not available: {}", e);
                    false
                }
            }
        };

        if available {
            self.set_available(true);
        }
        available
    }

    fn cached_availability(&self) -> bool {
        self.available.lock().map(|c| *c).unwrap_or(false)
    }

    fn set_available(&self, available: bool) {
        if let Ok(mut cached) = self.available.lock() {
            *cached = available;
        }
    }

    /// Send a request, forgetting the cached health state if the organ went away.
    async fn request(&self, op: &str, input: Value) -> Result<Value> {
        self.ensure_available().await?;
        let result = self.send(op, input).await;
        if result.is_err() && !Path::new(&self.socket_path).exists() {
            self.set_available(false);
        }
        result
    }

    async fn ensure_available(&self) -> Result<()> {
        if self.is_available().await {
            Ok(())
        } else {
            Err(FramesError::BackendUnavailable(format!(
                "embedding organ unreachable at {}",
                self.socket_path
            )))
        }
    }

    /// Send one stimulus and return the response `output` on success.
    async fn send(&self, op: &str, input: Value) -> Result<Value> {
        let unavailable = |msg: String| FramesError::BackendUnavailable(msg);

        let mut stream = tokio::time::timeout(self.timeout, UnixStream::connect(&self.socket_path))
            .await
            .map_err(|_| unavailable("Connection timeout".into()))?
            .map_err(|e| unavailable(format!("Connect failed: {}", e)))?;

        let stimulus = Stimulus {
            op: op.to_string(),
            input,
            context: HashMap::new(),
        };
        write_frame(&mut stream, &stimulus)
            .await
            .map_err(|e| unavailable(format!("Write failed: {}", e)))?;

        let response: Option<Response> = tokio::time::timeout(self.timeout, read_frame(&mut stream))
            .await
            .map_err(|_| unavailable("Read timeout".into()))?
            .map_err(|e| unavailable(format!("Read failed: {}", e)))?;
        let response = response.ok_or_else(|| unavailable("Connection closed".into()))?;

        if !response.ok {
            let error_msg = response
                .output
                .get("error")
                .and_then(|e| e.as_str())
                .unwrap_or("Unknown error");
            return Err(unavailable(format!("{} failed: {}", op, error_msg)));
        }

        Ok(response.output)
    }

    fn parse_embedding(&self, output: Value) -> Result<Vec<f32>> {
        let embedding: Vec<f32> = output
            .get("embedding")
            .cloned()
            .map(serde_json::from_value)
            .transpose()?
            .ok_or_else(|| FramesError::BackendUnavailable("No embedding in response".into()))?;
        check_dimensions(&embedding, self.dimensions)?;
        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingFunction for RemoteEmbedding {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let output = self.request("embed.text", json!({ "text": text })).await?;
        self.parse_embedding(output)
    }

    async fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let rgb = image.to_rgb8();
        let input = json!({
            "data": rgb.as_raw(),
            "width": rgb.width(),
            "height": rgb.height(),
        });
        let output = self.request("embed.image", input).await?;
        self.parse_embedding(output)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "remote-clip"
    }
}

//! Backend session
//!
//! A [`FrameSession`] is built once per process and owns the backend that
//! the registry, indexer and query engine borrow for each request.

use crate::embed_client::{RemoteEmbedding, DEFAULT_EMBED_SOCKET};
use crate::embedding::{EmbeddingFunction, HashEmbedding};
use crate::error::{FramesError, Result};
use crate::indexer::{FrameIndexer, IngestReport};
use crate::loader::{ImageLoader, LoaderConfig};
use crate::query::{CollectionResults, QueryEngine, QueryTarget, ResultCount};
use crate::registry::CollectionRegistry;
use crate::slug::{display_title, MovieSlug};
use crate::store::{MemoryBackend, VectorBackend};
use crate::video::{ExtractorConfig, FrameExtractor};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    Hash,
    Remote,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub embedder: EmbedderKind,
    pub embed_socket: String,
    pub dimensions: usize,
    /// JSON snapshot for the store; `None` keeps everything in memory.
    pub store_path: Option<PathBuf>,
    /// Parent for per-request scratch directories; system temp dir if unset.
    pub scratch_dir: Option<PathBuf>,
    pub extractor: ExtractorConfig,
    pub loader: LoaderConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            embedder: EmbedderKind::Hash,
            embed_socket: DEFAULT_EMBED_SOCKET.to_string(),
            dimensions: 512, // CLIP ViT-B/32 width
            store_path: None,
            scratch_dir: None,
            extractor: ExtractorConfig::default(),
            loader: LoaderConfig::default(),
        }
    }
}

/// Listing entry for one movie collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovieSummary {
    pub collection: String,
    pub title: String,
    pub frames: usize,
}

pub struct FrameSession {
    backend: Arc<dyn VectorBackend>,
    extractor: ExtractorConfig,
    scratch_dir: Option<PathBuf>,
}

impl FrameSession {
    /// Build the embedding function and store described by `config`.
    pub fn open(config: SessionConfig) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingFunction> = match config.embedder {
            EmbedderKind::Hash => Arc::new(HashEmbedding::new(config.dimensions)),
            EmbedderKind::Remote => {
                Arc::new(RemoteEmbedding::with_socket(&config.embed_socket, config.dimensions))
            }
        };
        let loader = ImageLoader::new(config.loader.clone());

        let backend: Arc<dyn VectorBackend> = match &config.store_path {
            Some(path) => Arc::new(MemoryBackend::open(path, embedder.clone(), loader)?),
            None => Arc::new(MemoryBackend::new(embedder.clone(), loader)),
        };

        info!(
            "🔧 Session ready: embedder={} ({} dims), store={}",
            embedder.name(),
            embedder.dimensions(),
            config
                .store_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "memory".to_string())
        );

        Ok(Self::with_backend(backend, config.extractor).with_scratch_dir(config.scratch_dir))
    }

    /// Session over an existing backend.
    pub fn with_backend(backend: Arc<dyn VectorBackend>, extractor: ExtractorConfig) -> Self {
        Self {
            backend,
            extractor,
            scratch_dir: None,
        }
    }

    pub fn with_scratch_dir(mut self, scratch_dir: Option<PathBuf>) -> Self {
        self.scratch_dir = scratch_dir;
        self
    }

    pub fn backend(&self) -> &dyn VectorBackend {
        self.backend.as_ref()
    }

    pub fn registry(&self) -> CollectionRegistry<'_> {
        CollectionRegistry::new(self.backend())
    }

    pub fn indexer(&self) -> FrameIndexer<'_> {
        FrameIndexer::new(self.backend())
    }

    pub fn query_engine(&self) -> QueryEngine<'_> {
        QueryEngine::new(self.backend())
    }

    fn scratch(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("soma_frames_");
        let dir = match &self.scratch_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }

    /// Extract, register and index one movie.
    ///
    /// Frames live in a scratch directory that is removed when this call
    /// returns, whether it succeeded or not.
    pub async fn ingest(&self, title: &str, video: impl AsRef<Path>) -> Result<IngestReport> {
        // Reject a blank title before spending time decoding.
        MovieSlug::from_title(title)?;

        let video = video.as_ref().to_path_buf();
        let scratch = self.scratch()?;
        let frame_dir = scratch.path().join("frames");

        let extractor = FrameExtractor::new(self.extractor.clone());
        let frames = {
            let frame_dir = frame_dir.clone();
            tokio::task::spawn_blocking(move || extractor.extract(&video, &frame_dir))
                .await
                .map_err(|e| FramesError::Decode(format!("frame extraction panicked: {}", e)))??
        };

        self.index_frames(title, &frames).await
    }

    /// Register and index frames that are already on disk, in temporal order.
    ///
    /// A collection created by this call is removed again if indexing fails,
    /// so a failed first ingest never leaves an empty movie behind.
    pub async fn index_frames(&self, title: &str, frames: &[PathBuf]) -> Result<IngestReport> {
        let collection = self.registry().get_or_create(title).await?;
        debug!("Indexing {} frame(s) into {}", frames.len(), collection.name());

        match self.indexer().index(&collection, title, frames).await {
            Ok(report) => Ok(report),
            Err(e) => {
                if collection.created {
                    self.discard_empty(collection.name()).await;
                }
                Err(e)
            }
        }
    }

    /// Drop a collection if nothing was stored in it (another ingest may have
    /// appended since it was created).
    async fn discard_empty(&self, name: &str) {
        let empty = matches!(self.backend.get_collection(name).await, Ok(info) if info.count == 0);
        if !empty {
            return;
        }
        match self.backend.delete_collection(name).await {
            Ok(()) => debug!("Rolled back empty collection {}", name),
            Err(e) => warn!("Failed to remove empty collection {}: {}", name, e),
        }
    }

    pub async fn query(
        &self,
        prompt: &str,
        count: ResultCount,
        target: &QueryTarget,
    ) -> Result<Vec<CollectionResults>> {
        self.query_engine().query(prompt, count, target).await
    }

    /// Every movie collection with its frame count, in listing order.
    pub async fn list_movies(&self) -> Result<Vec<MovieSummary>> {
        let registry = self.registry();
        let mut movies = Vec::new();
        for name in registry.list().await? {
            let info = registry.get(&name).await?;
            movies.push(MovieSummary {
                title: display_title(&name),
                collection: name,
                frames: info.count,
            });
        }
        Ok(movies)
    }
}

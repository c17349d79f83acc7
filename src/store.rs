//! Collection store for frame embeddings
//!
//! [`VectorBackend`] is the contract the registry, indexer and query engine
//! consume. [`MemoryBackend`] keeps collections in process, searches them
//! by brute-force cosine similarity and can mirror its state to a JSON
//! snapshot so separate CLI invocations see the same collections.

use crate::embedding::{check_dimensions, cosine_similarity, EmbeddingConfig, EmbeddingFunction};
use crate::error::{FramesError, Result};
use crate::loader::{ImageLoader, LoaderConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// Metadata stored with each frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub movie: String,
    pub frame: usize,
}

/// One frame submitted for indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    pub id: Uuid,
    pub image_path: PathBuf,
    pub metadata: FrameMetadata,
}

/// Settings a collection is created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionConfig {
    pub embedding: EmbeddingConfig,
    pub loader: LoaderConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionInfo {
    pub name: String,
    pub config: CollectionConfig,
    pub count: usize,
}

/// A nearest-neighbour match, best first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryHit {
    pub id: Uuid,
    pub score: f32,
    pub metadata: FrameMetadata,
}

#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Collection names in creation order.
    async fn list_collections(&self) -> Result<Vec<String>>;

    async fn get_collection(&self, name: &str) -> Result<CollectionInfo>;

    /// Fails with `CollectionExists` if the name is taken.
    async fn create_collection(&self, name: &str, config: CollectionConfig) -> Result<CollectionInfo>;

    /// Fails with `NotFound` if there is no such collection.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Embed and store every record, or none of them.
    async fn add(&self, collection: &str, records: Vec<FrameRecord>) -> Result<usize>;

    /// Up to `n_results` frames ranked by similarity to `prompt`.
    async fn query_text(&self, collection: &str, prompt: &str, n_results: usize) -> Result<Vec<QueryHit>>;

    /// Configuration new collections should be created with.
    fn default_config(&self) -> CollectionConfig;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredFrame {
    id: Uuid,
    image_path: PathBuf,
    metadata: FrameMetadata,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCollection {
    name: String,
    config: CollectionConfig,
    frames: Vec<StoredFrame>,
}

impl StoredCollection {
    fn info(&self) -> CollectionInfo {
        CollectionInfo {
            name: self.name.clone(),
            config: self.config.clone(),
            count: self.frames.len(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    collections: Vec<StoredCollection>,
}

impl StoreState {
    fn find(&self, name: &str) -> Option<&StoredCollection> {
        self.collections.iter().find(|c| c.name == name)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut StoredCollection> {
        self.collections.iter_mut().find(|c| c.name == name)
    }
}

pub struct MemoryBackend {
    embedder: Arc<dyn EmbeddingFunction>,
    loader: ImageLoader,
    state: RwLock<StoreState>,
    snapshot: Option<PathBuf>,
}

impl MemoryBackend {
    /// Ephemeral store; everything is lost when it is dropped.
    pub fn new(embedder: Arc<dyn EmbeddingFunction>, loader: ImageLoader) -> Self {
        Self {
            embedder,
            loader,
            state: RwLock::new(StoreState::default()),
            snapshot: None,
        }
    }

    /// Store mirrored to `path`, loading existing collections if the file exists.
    pub fn open(
        path: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingFunction>,
        loader: ImageLoader,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let bytes = std::fs::read(&path)?;
            let state: StoreState = serde_json::from_slice(&bytes)?;
            info!(
                "📚 Loaded {} collection(s) from {}",
                state.collections.len(),
                path.display()
            );
            state
        } else {
            StoreState::default()
        };

        Ok(Self {
            embedder,
            loader,
            state: RwLock::new(state),
            snapshot: Some(path),
        })
    }

    pub fn snapshot_path(&self) -> Option<&Path> {
        self.snapshot.as_deref()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreState>> {
        self.state
            .read()
            .map_err(|_| FramesError::BackendUnavailable("store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .write()
            .map_err(|_| FramesError::BackendUnavailable("store lock poisoned".into()))
    }

    /// Write the snapshot through a temp file so a crash never leaves it truncated.
    fn persist(&self, state: &StoreState) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer(&mut tmp, state)?;
        tmp.persist(path).map_err(|e| FramesError::Io(e.error))?;
        debug!("Snapshot written to {}", path.display());
        Ok(())
    }

    fn check_config(&self, collection: &StoredCollection) -> Result<()> {
        let expected = self.embedder.config();
        if collection.config.embedding != expected {
            return Err(FramesError::BackendUnavailable(format!(
                "collection {} uses embedding {:?}, store is running {:?}",
                collection.name, collection.config.embedding, expected
            )));
        }
        Ok(())
    }

    async fn embed_frames(&self, records: &[FrameRecord]) -> Result<Vec<Vec<f32>>> {
        let loader = self.loader.clone();
        let paths: Vec<PathBuf> = records.iter().map(|r| r.image_path.clone()).collect();
        let images = tokio::task::spawn_blocking(move || loader.load_batch(&paths))
            .await
            .map_err(|e| FramesError::BackendUnavailable(format!("frame loader panicked: {}", e)))??;

        let dims = self.embedder.dimensions();
        let mut embeddings = Vec::with_capacity(images.len());
        for image in &images {
            let embedding = self.embedder.embed_image(image).await?;
            check_dimensions(&embedding, dims)?;
            embeddings.push(embedding);
        }
        Ok(embeddings)
    }
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    async fn list_collections(&self) -> Result<Vec<String>> {
        Ok(self.read()?.collections.iter().map(|c| c.name.clone()).collect())
    }

    async fn get_collection(&self, name: &str) -> Result<CollectionInfo> {
        self.read()?
            .find(name)
            .map(StoredCollection::info)
            .ok_or_else(|| FramesError::NotFound(name.to_string()))
    }

    async fn create_collection(&self, name: &str, config: CollectionConfig) -> Result<CollectionInfo> {
        let mut state = self.write()?;
        if state.find(name).is_some() {
            return Err(FramesError::CollectionExists(name.to_string()));
        }

        let collection = StoredCollection {
            name: name.to_string(),
            config,
            frames: Vec::new(),
        };
        let info = collection.info();
        state.collections.push(collection);

        if let Err(e) = self.persist(&state) {
            state.collections.pop();
            return Err(e);
        }

        info!("🗂️ Created collection {}", name);
        Ok(info)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut state = self.write()?;
        let index = state
            .collections
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| FramesError::NotFound(name.to_string()))?;
        let removed = state.collections.remove(index);

        if let Err(e) = self.persist(&state) {
            state.collections.insert(index, removed);
            return Err(e);
        }

        info!("🗑️ Deleted collection {}", name);
        Ok(())
    }

    async fn add(&self, collection: &str, records: Vec<FrameRecord>) -> Result<usize> {
        {
            let state = self.read()?;
            let target = state
                .find(collection)
                .ok_or_else(|| FramesError::NotFound(collection.to_string()))?;
            self.check_config(target)?;
        }

        let mut seen = HashSet::with_capacity(records.len());
        if let Some(dup) = records.iter().find(|r| !seen.insert(r.id)) {
            return Err(FramesError::InvalidInput(format!("duplicate frame id {}", dup.id)));
        }

        // Embeddings are computed before taking the write lock.
        let embeddings = self.embed_frames(&records).await?;

        let mut state = self.write()?;
        let target = state
            .find_mut(collection)
            .ok_or_else(|| FramesError::NotFound(collection.to_string()))?;
        if let Some(clash) = target.frames.iter().find(|f| seen.contains(&f.id)) {
            return Err(FramesError::InvalidInput(format!("frame id {} already stored", clash.id)));
        }

        let before = target.frames.len();
        let added = records.len();
        target.frames.extend(records.into_iter().zip(embeddings).map(|(record, embedding)| {
            StoredFrame {
                id: record.id,
                image_path: record.image_path,
                metadata: record.metadata,
                embedding,
            }
        }));

        if let Err(e) = self.persist(&state) {
            if let Some(target) = state.find_mut(collection) {
                target.frames.truncate(before);
            }
            return Err(e);
        }

        debug!("Added {} frames to {}", added, collection);
        Ok(added)
    }

    async fn query_text(&self, collection: &str, prompt: &str, n_results: usize) -> Result<Vec<QueryHit>> {
        {
            let state = self.read()?;
            let target = state
                .find(collection)
                .ok_or_else(|| FramesError::NotFound(collection.to_string()))?;
            self.check_config(target)?;
        }

        let query = self.embedder.embed_text(prompt).await?;
        check_dimensions(&query, self.embedder.dimensions())?;

        let state = self.read()?;
        let target = state
            .find(collection)
            .ok_or_else(|| FramesError::NotFound(collection.to_string()))?;

        let mut hits: Vec<QueryHit> = target
            .frames
            .iter()
            .map(|frame| QueryHit {
                id: frame.id,
                score: cosine_similarity(&query, &frame.embedding),
                metadata: frame.metadata.clone(),
            })
            .collect();
        // Stable sort keeps insertion order among equal scores.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(n_results);
        Ok(hits)
    }

    fn default_config(&self) -> CollectionConfig {
        CollectionConfig {
            embedding: self.embedder.config(),
            loader: self.loader.config().clone(),
        }
    }
}

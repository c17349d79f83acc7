//! Frame registration

use crate::error::{FramesError, Result};
use crate::registry::CollectionHandle;
use crate::store::{FrameMetadata, FrameRecord, VectorBackend};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

/// Outcome of one successful ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub collection: String,
    pub movie: String,
    pub frames_added: usize,
    pub created_collection: bool,
    pub ingested_at: DateTime<Utc>,
}

/// Pair each frame with a fresh id and `{movie, frame}` metadata.
///
/// `frames` must already be in temporal order; the position becomes the
/// frame number.
pub fn build_records(movie: &str, frames: &[PathBuf]) -> Vec<FrameRecord> {
    frames
        .iter()
        .enumerate()
        .map(|(i, path)| FrameRecord {
            id: Uuid::new_v4(),
            image_path: path.clone(),
            metadata: FrameMetadata {
                movie: movie.to_string(),
                frame: i,
            },
        })
        .collect()
}

pub struct FrameIndexer<'a> {
    backend: &'a dyn VectorBackend,
}

impl<'a> FrameIndexer<'a> {
    pub fn new(backend: &'a dyn VectorBackend) -> Self {
        Self { backend }
    }

    /// Submit all frames to the collection as a single batch.
    pub async fn index(
        &self,
        collection: &CollectionHandle,
        movie: &str,
        frames: &[PathBuf],
    ) -> Result<IngestReport> {
        if frames.is_empty() {
            return Err(FramesError::Ingestion(format!(
                "no frames extracted for '{}'",
                movie
            )));
        }

        let records = build_records(movie, frames);
        let frames_added = self
            .backend
            .add(collection.name(), records)
            .await
            .map_err(|e| FramesError::Ingestion(format!("{}: {}", collection.name(), e)))?;

        info!("✅ {} frames added for movie '{}'", frames_added, movie);

        Ok(IngestReport {
            collection: collection.name().to_string(),
            movie: movie.to_string(),
            frames_added,
            created_collection: collection.created,
            ingested_at: Utc::now(),
        })
    }
}

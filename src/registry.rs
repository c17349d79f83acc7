//! Movie title to collection mapping

use crate::error::{FramesError, Result};
use crate::slug::MovieSlug;
use crate::store::{CollectionInfo, VectorBackend};
use tracing::{debug, info};

/// Handle to a movie's collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionHandle {
    pub slug: MovieSlug,
    pub info: CollectionInfo,
    /// True when this call created the collection.
    pub created: bool,
}

impl CollectionHandle {
    pub fn name(&self) -> &str {
        self.slug.as_str()
    }
}

pub struct CollectionRegistry<'a> {
    backend: &'a dyn VectorBackend,
}

impl<'a> CollectionRegistry<'a> {
    pub fn new(backend: &'a dyn VectorBackend) -> Self {
        Self { backend }
    }

    /// Return the collection for `title`, creating it on first use.
    ///
    /// Titles with the same slug resolve to the same collection.
    pub async fn get_or_create(&self, title: &str) -> Result<CollectionHandle> {
        let slug = MovieSlug::from_title(title)?;
        let existing = self.backend.list_collections().await?;

        if existing.iter().any(|name| name == slug.as_str()) {
            debug!("Reusing collection {}", slug);
            let info = self.backend.get_collection(slug.as_str()).await?;
            return Ok(CollectionHandle { slug, info, created: false });
        }

        let config = self.backend.default_config();
        match self.backend.create_collection(slug.as_str(), config).await {
            Ok(info) => {
                info!("🎬 Registered movie '{}' as {}", title, slug);
                Ok(CollectionHandle { slug, info, created: true })
            }
            // Another session created it between our listing and create.
            Err(FramesError::CollectionExists(_)) => {
                let info = self.backend.get_collection(slug.as_str()).await?;
                Ok(CollectionHandle { slug, info, created: false })
            }
            Err(e) => Err(e),
        }
    }

    /// Look up an existing collection by its name.
    pub async fn get(&self, name: &str) -> Result<CollectionInfo> {
        self.backend.get_collection(name).await
    }

    pub async fn list(&self) -> Result<Vec<String>> {
        self.backend.list_collections().await
    }
}

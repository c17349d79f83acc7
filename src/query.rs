//! Natural-language frame retrieval

use crate::error::{FramesError, Result};
use crate::slug::display_title;
use crate::store::{QueryHit, VectorBackend};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

pub const MIN_RESULTS: usize = 1;
pub const MAX_RESULTS: usize = 10;
pub const DEFAULT_RESULTS: usize = 3;

/// Number of frames returned per collection, 1..=10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct ResultCount(usize);

impl ResultCount {
    pub fn new(n: usize) -> Result<Self> {
        if !(MIN_RESULTS..=MAX_RESULTS).contains(&n) {
            return Err(FramesError::InvalidInput(format!(
                "result count must be between {} and {}, got {}",
                MIN_RESULTS, MAX_RESULTS, n
            )));
        }
        Ok(Self(n))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for ResultCount {
    fn default() -> Self {
        Self(DEFAULT_RESULTS)
    }
}

impl TryFrom<usize> for ResultCount {
    type Error = FramesError;

    fn try_from(n: usize) -> Result<Self> {
        Self::new(n)
    }
}

impl From<ResultCount> for usize {
    fn from(count: ResultCount) -> usize {
        count.0
    }
}

impl fmt::Display for ResultCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTarget {
    /// One collection, by name.
    Collection(String),
    /// Every collection the backend lists.
    All,
}

/// One ranked frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResultItem {
    pub collection: String,
    pub frame: usize,
    pub movie: String,
    /// Zero-based position in the result list.
    pub rank: usize,
    pub score: f32,
}

/// Results for a single collection.
#[derive(Debug, Serialize)]
pub struct CollectionResults {
    pub collection: String,
    pub title: String,
    #[serde(serialize_with = "serialize_outcome")]
    pub outcome: Result<Vec<QueryResultItem>>,
}

impl CollectionResults {
    pub fn items(&self) -> Option<&[QueryResultItem]> {
        self.outcome.as_ref().ok().map(Vec::as_slice)
    }
}

fn serialize_outcome<S>(outcome: &Result<Vec<QueryResultItem>>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeMap;
    let mut map = serializer.serialize_map(Some(2))?;
    match outcome {
        Ok(items) => {
            map.serialize_entry("ok", &true)?;
            map.serialize_entry("items", items)?;
        }
        Err(e) => {
            map.serialize_entry("ok", &false)?;
            map.serialize_entry("error", &format!("{}: {}", e.kind(), e))?;
        }
    }
    map.end()
}

fn to_items(collection: &str, hits: Vec<QueryHit>) -> Vec<QueryResultItem> {
    hits.into_iter()
        .enumerate()
        .map(|(rank, hit)| QueryResultItem {
            collection: collection.to_string(),
            frame: hit.metadata.frame,
            movie: hit.metadata.movie,
            rank,
            score: hit.score,
        })
        .collect()
}

pub struct QueryEngine<'a> {
    backend: &'a dyn VectorBackend,
}

impl<'a> QueryEngine<'a> {
    pub fn new(backend: &'a dyn VectorBackend) -> Self {
        Self { backend }
    }

    /// Dispatch on `target`. Single-collection errors propagate; in
    /// compare-all mode each group carries its own outcome.
    pub async fn query(
        &self,
        prompt: &str,
        count: ResultCount,
        target: &QueryTarget,
    ) -> Result<Vec<CollectionResults>> {
        match target {
            QueryTarget::Collection(name) => {
                let items = self.query_collection(prompt, count, name).await?;
                Ok(vec![CollectionResults {
                    collection: name.clone(),
                    title: display_title(name),
                    outcome: Ok(items),
                }])
            }
            QueryTarget::All => self.query_all(prompt, count).await,
        }
    }

    /// Top `count` frames of one collection, best first.
    pub async fn query_collection(
        &self,
        prompt: &str,
        count: ResultCount,
        collection: &str,
    ) -> Result<Vec<QueryResultItem>> {
        check_prompt(prompt)?;
        // Resolve first so a missing collection is reported as such.
        self.backend.get_collection(collection).await?;

        let hits = self.backend.query_text(collection, prompt, count.get()).await?;
        debug!("{} hit(s) in {}", hits.len(), collection);
        Ok(to_items(collection, hits))
    }

    /// One result group per listed collection, in listing order.
    pub async fn query_all(&self, prompt: &str, count: ResultCount) -> Result<Vec<CollectionResults>> {
        check_prompt(prompt)?;
        let names = self.backend.list_collections().await?;

        let mut groups = Vec::with_capacity(names.len());
        for name in names {
            let outcome = self.query_collection(prompt, count, &name).await;
            if let Err(e) = &outcome {
                warn!("Query against {} failed: {}", name, e);
            }
            groups.push(CollectionResults {
                title: display_title(&name),
                collection: name,
                outcome,
            });
        }
        Ok(groups)
    }
}

fn check_prompt(prompt: &str) -> Result<()> {
    if prompt.trim().is_empty() {
        return Err(FramesError::InvalidInput("query prompt is empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedding;
    use crate::loader::ImageLoader;
    use crate::store::MemoryBackend;
    use std::sync::Arc;

    fn backend() -> MemoryBackend {
        MemoryBackend::new(Arc::new(HashEmbedding::new(8)), ImageLoader::default())
    }

    #[test]
    fn test_result_count_bounds() {
        assert!(ResultCount::new(0).is_err());
        assert!(ResultCount::new(11).is_err());
        assert_eq!(ResultCount::new(1).unwrap().get(), 1);
        assert_eq!(ResultCount::new(10).unwrap().get(), 10);
        assert_eq!(ResultCount::default().get(), 3);
    }

    #[test]
    fn test_result_count_deserialize_validates() {
        let ok: ResultCount = serde_json::from_str("5").unwrap();
        assert_eq!(ok.get(), 5);
        assert!(serde_json::from_str::<ResultCount>("42").is_err());
    }

    #[tokio::test]
    async fn test_compare_all_on_empty_backend() {
        let store = backend();
        let groups = QueryEngine::new(&store)
            .query_all("a man with a hat", ResultCount::default())
            .await
            .unwrap();
        assert!(groups.is_empty());
    }

    #[tokio::test]
    async fn test_missing_collection_is_not_found() {
        let store = backend();
        let err = QueryEngine::new(&store)
            .query("a hat", ResultCount::default(), &QueryTarget::Collection("movie_nope".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, FramesError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let store = backend();
        let err = QueryEngine::new(&store)
            .query_all("   ", ResultCount::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FramesError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_empty_collection_returns_no_items() {
        let store = backend();
        store.create_collection("movie_blank", store.default_config()).await.unwrap();

        let items = QueryEngine::new(&store)
            .query_collection("sky", ResultCount::default(), "movie_blank")
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_failed_group_serializes_error() {
        let group = CollectionResults {
            collection: "movie_x".into(),
            title: "X".into(),
            outcome: Err(FramesError::BackendUnavailable("down".into())),
        };
        let value = serde_json::to_value(&group).unwrap();

        assert_eq!(value["outcome"]["ok"], false);
        assert!(value["outcome"]["error"].as_str().unwrap().starts_with("BackendUnavailable"));
        assert!(group.items().is_none());
    }
}

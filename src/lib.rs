//! soma_frames - movie frame retrieval for SOMA platform
//!
//! Samples uploaded movies at 1 frame per second via the system `ffmpeg`
//! binary, embeds the frames into a shared image/text space and answers
//! natural-language queries against one movie or all of them.

pub mod embed_client;
pub mod embedding;
pub mod error;
pub mod ffmpeg;
pub mod indexer;
pub mod loader;
pub mod metrics;
pub mod organ;
pub mod query;
pub mod registry;
pub mod session;
pub mod slug;
pub mod store;
pub mod validation;
pub mod video;
pub mod wire;

pub use embed_client::RemoteEmbedding;
pub use embedding::{EmbeddingConfig, EmbeddingFunction, HashEmbedding};
pub use error::{FramesError, Result};
pub use ffmpeg::{FfmpegCommand, FfmpegError};
pub use indexer::{FrameIndexer, IngestReport};
pub use loader::{ImageLoader, LoaderConfig};
pub use organ::{FramesOrgan, Organ, Response, Stimulus};
pub use query::{CollectionResults, QueryEngine, QueryResultItem, QueryTarget, ResultCount};
pub use registry::{CollectionHandle, CollectionRegistry};
pub use session::{EmbedderKind, FrameSession, MovieSummary, SessionConfig};
pub use slug::MovieSlug;
pub use store::{CollectionConfig, FrameMetadata, FrameRecord, MemoryBackend, QueryHit, VectorBackend};
pub use video::{ExtractorConfig, FrameExtractor, FramePattern};

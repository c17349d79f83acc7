use thiserror::Error;

#[derive(Error, Debug)]
pub enum FramesError {
    #[error("Decode failed: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    #[error("Collection not found: {0}")]
    NotFound(String),

    #[error("Collection already exists: {0}")]
    CollectionExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] crate::ffmpeg::FfmpegError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FramesError {
    /// Short, stable name used in organ responses and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            FramesError::Decode(_) => "DecodeError",
            FramesError::Io(_) => "IOError",
            FramesError::BackendUnavailable(_) => "BackendUnavailable",
            FramesError::Ingestion(_) => "IngestionError",
            FramesError::NotFound(_) => "NotFound",
            FramesError::CollectionExists(_) => "CollectionExists",
            FramesError::InvalidInput(_) => "InvalidInput",
            FramesError::Ffmpeg(_) => "FfmpegError",
            FramesError::Serialization(_) => "SerializationError",
        }
    }
}

pub type Result<T> = std::result::Result<T, FramesError>;

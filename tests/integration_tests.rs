//! Integration tests for ingestion and retrieval

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use serde_json::json;
use soma_frames::ffmpeg::{is_ffmpeg_installed, FfmpegCommand};
use soma_frames::organ::{FramesOrgan, Organ, Stimulus};
use soma_frames::store::{CollectionConfig, CollectionInfo, FrameRecord, QueryHit};
use soma_frames::{
    ExtractorConfig, FrameExtractor, FrameSession, FramesError, HashEmbedding, ImageLoader,
    LoaderConfig, MemoryBackend, QueryTarget, Result, ResultCount, SessionConfig, VectorBackend,
};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn test_session() -> FrameSession {
    FrameSession::open(SessionConfig {
        dimensions: 16,
        loader: LoaderConfig { size: 16 },
        ..SessionConfig::default()
    })
    .unwrap()
}

/// Write `count` synthetic 1-second-apart frames named like the extractor's output.
fn synthetic_frames(dir: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("frame_{:04}.jpg", i));
            let mut img = RgbImage::new(32, 32);
            for (x, y, px) in img.enumerate_pixels_mut() {
                let v = ((x + y) as usize * (i + 1) % 256) as u8;
                *px = Rgb([v, 255 - v, (i * 50 % 256) as u8]);
            }
            img.save(&path).unwrap();
            path
        })
        .collect()
}

async fn stored_frames(session: &FrameSession, collection: &str) -> Vec<QueryHit> {
    let count = session.backend().get_collection(collection).await.unwrap().count;
    session
        .backend()
        .query_text(collection, "everything", count)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_round_trip_test_film() {
    let dir = TempDir::new().unwrap();
    let frames = synthetic_frames(dir.path(), 5);
    let session = test_session();

    let report = session.index_frames("Test Film", &frames).await.unwrap();
    assert_eq!(report.collection, "movie_test_film");
    assert_eq!(report.frames_added, 5);
    assert!(report.created_collection);

    let stored = stored_frames(&session, "movie_test_film").await;
    let numbers: BTreeSet<usize> = stored.iter().map(|h| h.metadata.frame).collect();
    assert_eq!(numbers, (0..5).collect::<BTreeSet<_>>());

    let target = QueryTarget::Collection("movie_test_film".to_string());
    let groups = session
        .query("a man with a hat", ResultCount::new(3).unwrap(), &target)
        .await
        .unwrap();
    assert_eq!(groups.len(), 1);
    let items = groups[0].items().unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|i| i.movie == "Test Film"));
    assert_eq!(items.iter().map(|i| i.rank).collect::<Vec<_>>(), vec![0, 1, 2]);
    assert!(items.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn test_reingest_appends_to_same_collection() {
    let dir = TempDir::new().unwrap();
    let frames = synthetic_frames(dir.path(), 3);
    let session = test_session();

    session.index_frames("Test Film", &frames).await.unwrap();
    let second = session.index_frames("Test Film", &frames).await.unwrap();

    assert!(!second.created_collection);
    let movies = session.list_movies().await.unwrap();
    assert_eq!(movies.len(), 1);
    assert_eq!(movies[0].frames, 6);

    // Each batch numbers its frames from zero.
    let stored = stored_frames(&session, "movie_test_film").await;
    let mut numbers: Vec<usize> = stored.iter().map(|h| h.metadata.frame).collect();
    numbers.sort();
    assert_eq!(numbers, vec![0, 0, 1, 1, 2, 2]);
}

#[tokio::test]
async fn test_compare_all_groups_capped_per_movie() {
    let dir_a = TempDir::new().unwrap();
    let dir_b = TempDir::new().unwrap();
    let session = test_session();

    session.index_frames("Heat", &synthetic_frames(dir_a.path(), 5)).await.unwrap();
    session.index_frames("Ronin", &synthetic_frames(dir_b.path(), 2)).await.unwrap();

    let groups = session
        .query("car chase", ResultCount::new(3).unwrap(), &QueryTarget::All)
        .await
        .unwrap();

    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].collection, "movie_heat");
    assert_eq!(groups[0].title, "Heat");
    assert_eq!(groups[0].items().unwrap().len(), 3);
    assert_eq!(groups[1].collection, "movie_ronin");
    assert_eq!(groups[1].items().unwrap().len(), 2);
    assert!(groups[1].items().unwrap().iter().all(|i| i.movie == "Ronin"));
}

#[tokio::test]
async fn test_compare_all_on_empty_store() {
    let groups = test_session()
        .query("anything", ResultCount::default(), &QueryTarget::All)
        .await
        .unwrap();
    assert!(groups.is_empty());
}

#[tokio::test]
async fn test_named_query_missing_collection() {
    let target = QueryTarget::Collection("movie_missing".to_string());
    let err = test_session()
        .query("anything", ResultCount::default(), &target)
        .await
        .unwrap_err();
    assert!(matches!(err, FramesError::NotFound(_)));
}

/// Backend whose searches fail for one collection.
struct FlakyBackend {
    inner: MemoryBackend,
    broken: String,
}

#[async_trait]
impl VectorBackend for FlakyBackend {
    async fn list_collections(&self) -> Result<Vec<String>> {
        self.inner.list_collections().await
    }

    async fn get_collection(&self, name: &str) -> Result<CollectionInfo> {
        self.inner.get_collection(name).await
    }

    async fn create_collection(&self, name: &str, config: CollectionConfig) -> Result<CollectionInfo> {
        self.inner.create_collection(name, config).await
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.inner.delete_collection(name).await
    }

    async fn add(&self, collection: &str, records: Vec<FrameRecord>) -> Result<usize> {
        self.inner.add(collection, records).await
    }

    async fn query_text(&self, collection: &str, prompt: &str, n_results: usize) -> Result<Vec<QueryHit>> {
        if collection == self.broken {
            return Err(FramesError::BackendUnavailable("shard offline".to_string()));
        }
        self.inner.query_text(collection, prompt, n_results).await
    }

    fn default_config(&self) -> CollectionConfig {
        self.inner.default_config()
    }
}

#[tokio::test]
async fn test_compare_all_isolates_failing_collection() {
    let backend = FlakyBackend {
        inner: MemoryBackend::new(
            Arc::new(HashEmbedding::new(16)),
            ImageLoader::new(LoaderConfig { size: 16 }),
        ),
        broken: "movie_alien".to_string(),
    };
    let session = FrameSession::with_backend(Arc::new(backend), ExtractorConfig::default());
    let dir = TempDir::new().unwrap();
    let frames = synthetic_frames(dir.path(), 2);

    session.index_frames("Alien", &frames).await.unwrap();
    session.index_frames("Aliens", &frames).await.unwrap();

    let groups = session
        .query("xenomorph", ResultCount::new(2).unwrap(), &QueryTarget::All)
        .await
        .unwrap();

    assert_eq!(groups.len(), 2);
    assert!(matches!(groups[0].outcome, Err(FramesError::BackendUnavailable(_))));
    assert_eq!(groups[1].items().unwrap().len(), 2);
}

#[tokio::test]
async fn test_failed_first_ingest_leaves_no_collection() {
    let session = test_session();
    let missing = vec![PathBuf::from("/nonexistent/frame_0000.jpg")];

    let err = session.index_frames("Ghost", &missing).await.unwrap_err();
    assert!(matches!(err, FramesError::Ingestion(_)));

    assert!(session.backend().list_collections().await.unwrap().is_empty());
    assert!(session.list_movies().await.unwrap().is_empty());
    let groups = session
        .query("a ghost", ResultCount::default(), &QueryTarget::All)
        .await
        .unwrap();
    assert!(groups.is_empty());
}

#[tokio::test]
async fn test_failed_reingest_keeps_existing_collection() {
    let session = test_session();
    let dir = TempDir::new().unwrap();
    session.index_frames("Heat", &synthetic_frames(dir.path(), 2)).await.unwrap();

    let missing = vec![PathBuf::from("/nonexistent/frame_0000.jpg")];
    assert!(session.index_frames("Heat", &missing).await.is_err());

    let movies = session.list_movies().await.unwrap();
    assert_eq!(movies.len(), 1);
    assert_eq!(movies[0].frames, 2);
}

#[tokio::test]
async fn test_snapshot_shared_between_sessions() {
    let dir = TempDir::new().unwrap();
    let frames = synthetic_frames(dir.path(), 2);
    let config = SessionConfig {
        dimensions: 16,
        loader: LoaderConfig { size: 16 },
        store_path: Some(dir.path().join("frames.json")),
        ..SessionConfig::default()
    };

    FrameSession::open(config.clone())
        .unwrap()
        .index_frames("Test Film", &frames)
        .await
        .unwrap();

    let movies = FrameSession::open(config).unwrap().list_movies().await.unwrap();
    assert_eq!(movies.len(), 1);
    assert_eq!(movies[0].frames, 2);
}

#[tokio::test]
async fn test_organ_ingest_validation_and_query() {
    let dir = TempDir::new().unwrap();
    let frames = synthetic_frames(dir.path(), 4);
    let session = Arc::new(test_session());
    session.index_frames("Test Film", &frames).await.unwrap();
    let organ = FramesOrgan::new(session);

    let stimulus = |op: &str, input: serde_json::Value| Stimulus {
        op: op.to_string(),
        input,
        context: HashMap::new(),
    };

    let missing = organ.stimulate(stimulus("movie.ingest", json!({"title": "X"}))).await.unwrap();
    assert!(!missing.ok);
    assert_eq!(missing.output["kind"], "InvalidInput");

    let too_many = organ
        .stimulate(stimulus("movie.query", json!({"prompt": "x", "n_results": 11})))
        .await
        .unwrap();
    assert!(!too_many.ok);

    let listed = organ.stimulate(stimulus("movie.list", json!({}))).await.unwrap();
    assert!(listed.ok);
    assert_eq!(listed.output["movies"][0]["collection"], "movie_test_film");
    assert_eq!(listed.output["movies"][0]["frames"], 4);

    let found = organ
        .stimulate(stimulus(
            "movie.query",
            json!({"prompt": "a hat", "n_results": 2, "collection": "movie_test_film"}),
        ))
        .await
        .unwrap();
    assert!(found.ok);
    assert_eq!(found.output["mode"], "single");
    let items = found.output["groups"][0]["outcome"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["movie"], "Test Film");
}

/// Encode a synthetic clip of `seconds` with ffmpeg's test source.
fn synthetic_video(dir: &Path, seconds: f32) -> PathBuf {
    let path = dir.join("clip.mp4");
    FfmpegCommand::new()
        .overwrite()
        .quiet()
        .args(&[
            "-f",
            "lavfi",
            "-i",
            &format!("testsrc=duration={}:size=64x64:rate=10", seconds),
            "-pix_fmt",
            "yuv420p",
        ])
        .output(&path)
        .execute()
        .unwrap();
    path
}

#[test]
fn test_extraction_one_frame_per_second() {
    if !is_ffmpeg_installed() {
        eprintln!("ffmpeg not installed, skipping");
        return;
    }
    // One frame per started second: whole durations give D, fractional ceil(D).
    for (seconds, expected) in [(3.0, 3), (4.5, 5), (0.5, 1)] {
        let dir = TempDir::new().unwrap();
        let video = synthetic_video(dir.path(), seconds);

        let out = dir.path().join("frames");
        let frames = FrameExtractor::default().extract(&video, &out).unwrap();

        assert_eq!(frames.len(), expected, "{}s clip", seconds);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(
                frame.file_name().unwrap().to_string_lossy(),
                format!("frame_{:04}.jpg", i)
            );
        }

        // Same input, same output
        let again = FrameExtractor::default().extract(&video, &out).unwrap();
        assert_eq!(again, frames);
    }
}

#[test]
fn test_extraction_rejects_corrupt_video() {
    if !is_ffmpeg_installed() {
        eprintln!("ffmpeg not installed, skipping");
        return;
    }
    let dir = TempDir::new().unwrap();
    let video = dir.path().join("broken.mkv");
    std::fs::write(&video, vec![0x42u8; 4096]).unwrap();

    let err = FrameExtractor::default()
        .extract(&video, dir.path().join("frames"))
        .unwrap_err();
    assert!(matches!(err, FramesError::Decode(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_ingest_video_end_to_end() {
    if !is_ffmpeg_installed() {
        eprintln!("ffmpeg not installed, skipping");
        return;
    }
    let dir = TempDir::new().unwrap();
    let video = synthetic_video(dir.path(), 3.0);
    let scratch = dir.path().join("scratch");
    let session = test_session().with_scratch_dir(Some(scratch.clone()));

    let report = session.ingest("Test Film", &video).await.unwrap();
    assert_eq!(report.frames_added, 3);
    assert_eq!(report.collection, "movie_test_film");

    // Scratch frames are gone once ingestion returns.
    assert_eq!(std::fs::read_dir(&scratch).unwrap().count(), 0);
}

//! Frame extraction via FFmpeg

use crate::error::{FramesError, Result};
use crate::ffmpeg::{FfmpegCommand, FfmpegError};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Container extensions accepted for upload.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["mp4", "mov", "avi", "mkv"];

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub fps: u32,
    /// printf-style pattern handed to ffmpeg; must contain one `%0Nd`.
    pub pattern: String,
    pub start_number: u32,
    pub program: OsString,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            fps: 1, // 1 frame per second
            pattern: "frame_%04d.jpg".to_string(),
            start_number: 0,
            program: OsString::from("ffmpeg"),
        }
    }
}

pub struct FrameExtractor {
    config: ExtractorConfig,
}

impl FrameExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Sample `video` at the configured rate into `output_dir`.
    ///
    /// Returns the produced frames sorted by file name, which is also their
    /// temporal order.
    pub fn extract(
        &self,
        video: impl AsRef<Path>,
        output_dir: impl AsRef<Path>,
    ) -> Result<Vec<PathBuf>> {
        let video = video.as_ref();
        let output_dir = output_dir.as_ref();

        let pattern = FramePattern::parse(&self.config.pattern)?;
        if self.config.fps == 0 {
            return Err(FramesError::InvalidInput("fps must be at least 1".into()));
        }

        check_video(video)?;
        prepare_output_dir(output_dir)?;
        let stale = pattern.clear(output_dir)?;
        if stale > 0 {
            debug!("Removed {} stale frame(s) from {}", stale, output_dir.display());
        }

        info!("🎞️ Extracting {} frame(s)/s from {}", self.config.fps, video.display());

        let result = FfmpegCommand::with_program(self.config.program.clone())
            .overwrite()
            .quiet()
            .input(video)
            .video_filter(&sample_filter(self.config.fps))
            .args(&["-vsync", "passthrough"])
            .args(&["-start_number", &self.config.start_number.to_string()])
            .output(output_dir.join(&self.config.pattern))
            .execute();

        match result {
            Ok(_) => {}
            Err(FfmpegError::ExecutionFailed { stderr, .. }) => {
                return Err(FramesError::Decode(format!("{}: {}", video.display(), stderr)));
            }
            Err(e) => return Err(e.into()),
        }

        let frames = pattern.list(output_dir)?;
        debug!("Extracted {} frames into {}", frames.len(), output_dir.display());
        Ok(frames)
    }
}

impl Default for FrameExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

/// Reject inputs that are missing or are clearly not a video container.
///
/// Files `infer` cannot identify are left for the decoder to judge.
pub fn check_video(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(FramesError::InvalidInput(format!(
            "video file not found: {}",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match extension {
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) => {}
        _ => {
            return Err(FramesError::InvalidInput(format!(
                "unsupported video extension: {} (expected one of {:?})",
                path.display(),
                SUPPORTED_EXTENSIONS
            )));
        }
    }

    if let Some(kind) = infer::get_from_path(path)? {
        if kind.matcher_type() != infer::MatcherType::Video {
            return Err(FramesError::Decode(format!(
                "{} looks like {} rather than a video",
                path.display(),
                kind.mime_type()
            )));
        }
    }

    Ok(())
}

/// Keep the first decoded frame of every `1/fps` second slot.
///
/// A `D`-second video yields `ceil(D)` frames at 1 fps (`D` when `D` is
/// whole). The `fps` filter pads or drops at end of stream depending on
/// its rounding mode, which made the count decoder-dependent.
pub fn sample_filter(fps: u32) -> String {
    format!(
        "select='isnan(prev_selected_t)+gt(floor(t*{fps}),floor(prev_selected_t*{fps}))'",
        fps = fps
    )
}

/// Split form of a `prefix%0Nd.suffix` output pattern, used to recognise
/// the extractor's own files in a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePattern {
    prefix: String,
    suffix: String,
}

impl FramePattern {
    pub fn parse(pattern: &str) -> Result<Self> {
        let invalid = || {
            FramesError::InvalidInput(format!(
                "frame pattern must contain one %0Nd conversion: {}",
                pattern
            ))
        };
        let (prefix, rest) = pattern.split_once('%').ok_or_else(invalid)?;
        let width_len = rest.find(|c: char| !c.is_ascii_digit()).ok_or_else(invalid)?;
        let suffix = rest[width_len..].strip_prefix('d').ok_or_else(invalid)?;
        if suffix.contains('%') || prefix.contains('/') || suffix.contains('/') {
            return Err(invalid());
        }
        Ok(Self {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        })
    }

    pub fn matches(&self, file_name: &str) -> bool {
        file_name
            .strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_suffix(&self.suffix))
            .map_or(false, |index| !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()))
    }

    /// Frame files in `dir`, sorted by file name.
    pub fn list(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        Ok(list_frames(dir)?
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map_or(false, |n| self.matches(n))
            })
            .collect())
    }

    /// Delete frame files left in `dir` by an earlier run.
    fn clear(&self, dir: &Path) -> Result<usize> {
        let stale = self.list(dir)?;
        for path in &stale {
            fs::remove_file(path)?;
        }
        Ok(stale.len())
    }
}

/// Create `dir` if needed and make sure we can write into it.
fn prepare_output_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    // Dropped (and deleted) immediately.
    tempfile::NamedTempFile::new_in(dir)?;
    Ok(())
}

/// Regular files in `dir`, sorted by file name.
pub fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            frames.push(entry.path());
        }
    }
    frames.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(frames)
}

//! Frame image loading

use crate::error::{FramesError, Result};
use image::imageops::FilterType;
use image::DynamicImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Square edge the frame is resized to before embedding.
    pub size: u32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            size: 336, // CLIP ViT-H/14 input
        }
    }
}

/// Turns frame paths into images ready for an embedding function.
#[derive(Debug, Clone, Default)]
pub struct ImageLoader {
    config: LoaderConfig,
}

impl ImageLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn load(&self, path: &Path) -> Result<DynamicImage> {
        let image = image::open(path)
            .map_err(|e| FramesError::Decode(format!("{}: {}", path.display(), e)))?;
        Ok(image.resize_exact(self.config.size, self.config.size, FilterType::Triangle))
    }

    /// Load every path in parallel, keeping input order. Fails on the first
    /// unreadable frame.
    pub fn load_batch(&self, paths: &[PathBuf]) -> Result<Vec<DynamicImage>> {
        paths.par_iter().map(|p| self.load(p)).collect()
    }
}

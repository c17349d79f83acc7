//! Embedding functions shared by images and text
//!
//! Frames and prompts must land in the same vector space, so a single
//! [`EmbeddingFunction`] embeds both. Available implementations:
//!
//! - [`HashEmbedding`]: deterministic placeholder, not semantic
//! - [`crate::embed_client::RemoteEmbedding`]: CLIP-style model behind a UDS organ

use crate::error::{FramesError, Result};
use async_trait::async_trait;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};

#[async_trait]
pub trait EmbeddingFunction: Send + Sync {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>>;

    fn dimensions(&self) -> usize;

    /// Provider name recorded in collection configuration.
    fn name(&self) -> &str;

    fn config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            name: self.name().to_string(),
            dimensions: self.dimensions(),
        }
    }
}

/// Embedding settings a collection was created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub name: String,
    pub dimensions: usize,
}

/// Hash-based embedding (placeholder, not semantic)
///
/// Text folds bytes into buckets; images use a grayscale thumbnail. Both are
/// L2-normalised. Only useful for tests and wiring checks.
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimensions: usize,
}

impl HashEmbedding {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }
}

impl Default for HashEmbedding {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingFunction for HashEmbedding {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut embedding = vec![0.0; self.dimensions];
        for (i, byte) in text.as_bytes().iter().enumerate() {
            embedding[i % self.dimensions] += (*byte as f32) / 255.0;
        }
        Ok(normalize(embedding))
    }

    async fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let side = (self.dimensions as f64).sqrt().ceil() as u32;
        let thumb = image
            .resize_exact(side, side, FilterType::Triangle)
            .to_luma8();

        let mut embedding = vec![0.0; self.dimensions];
        for (i, pixel) in thumb.pixels().enumerate() {
            embedding[i % self.dimensions] += (pixel.0[0] as f32) / 255.0;
        }
        Ok(normalize(embedding))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "hash"
    }
}

fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for val in &mut v {
            *val /= norm;
        }
    }
    v
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Verify a vector returned by a provider has the advertised size.
pub fn check_dimensions(embedding: &[f32], expected: usize) -> Result<()> {
    if embedding.len() != expected {
        return Err(FramesError::BackendUnavailable(format!(
            "embedding has {} dimensions, expected {}",
            embedding.len(),
            expected
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[tokio::test]
    async fn test_hash_text_is_deterministic_and_normalized() {
        let embedder = HashEmbedding::new(32);
        let a = embedder.embed_text("a man with a hat").await.unwrap();
        let b = embedder.embed_text("a man with a hat").await.unwrap();

        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hash_image_dimensions() {
        let embedder = HashEmbedding::new(50);
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(20, 10, Rgb([200, 10, 10])));

        let v = embedder.embed_image(&image).await.unwrap();
        assert_eq!(v.len(), 50);
    }

    #[tokio::test]
    async fn test_similar_images_score_higher() {
        let embedder = HashEmbedding::new(16);
        let mut left = RgbImage::new(8, 8);
        let mut right = RgbImage::new(8, 8);
        for (x, _, px) in left.enumerate_pixels_mut() {
            *px = if x < 4 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) };
        }
        for (x, _, px) in right.enumerate_pixels_mut() {
            *px = if x >= 4 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) };
        }
        let left = DynamicImage::ImageRgb8(left);
        let right = DynamicImage::ImageRgb8(right);

        let l = embedder.embed_image(&left).await.unwrap();
        let l2 = embedder.embed_image(&left).await.unwrap();
        let r = embedder.embed_image(&right).await.unwrap();

        assert!(cosine_similarity(&l, &l2) > cosine_similarity(&l, &r));
    }

    #[test]
    fn test_cosine_similarity_edges() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_check_dimensions() {
        assert!(check_dimensions(&[0.0; 4], 4).is_ok());
        assert!(check_dimensions(&[0.0; 3], 4).is_err());
    }
}

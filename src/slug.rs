//! Movie identity
//!
//! A movie is identified by the slug of its title. Titles that differ only
//! by case, or by spaces versus underscores, map to the same slug and
//! therefore share one collection.

use crate::error::{FramesError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const COLLECTION_PREFIX: &str = "movie_";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovieSlug(String);

impl MovieSlug {
    /// Derive the collection name for a title: lowercase, spaces to
    /// underscores, `movie_` prefix.
    pub fn from_title(title: &str) -> Result<Self> {
        if title.trim().is_empty() {
            return Err(FramesError::InvalidInput("movie title is empty".to_string()));
        }
        Ok(Self(format!(
            "{}{}",
            COLLECTION_PREFIX,
            title.to_lowercase().replace(' ', "_")
        )))
    }

    /// Wrap an existing collection name, e.g. one returned by a backend listing.
    pub fn from_collection_name(name: &str) -> Result<Self> {
        if !name.starts_with(COLLECTION_PREFIX) || name.len() == COLLECTION_PREFIX.len() {
            return Err(FramesError::InvalidInput(format!(
                "not a movie collection name: {}",
                name
            )));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Human readable title recovered from the slug ("movie_test_film" -> "Test Film").
    ///
    /// Lossy: the original casing is not stored in the name.
    pub fn display_title(&self) -> String {
        display_title(&self.0)
    }
}

impl fmt::Display for MovieSlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MovieSlug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Display form of any collection name, prefixed or not.
pub fn display_title(collection_name: &str) -> String {
    let bare = collection_name
        .strip_prefix(COLLECTION_PREFIX)
        .unwrap_or(collection_name);

    bare.split('_')
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

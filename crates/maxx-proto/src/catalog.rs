//! Catalog result model and the provider seam.

use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::error::CatalogError;

/// Rating label carried by the sentinel entry.
pub const NOT_FOUND_RATING: &str = "-1/10";
/// Title carried by the sentinel entry.
pub const NOT_FOUND_TITLE: &str = "Not Found";
/// Banner reference used when there is nothing to show.
pub const PLACEHOLDER_BANNER: &str = "placeholder://banner";

/// One browsable movie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub title: String,
    /// Locator of the detail page (quality list lives there).
    pub detail_ref: String,
    pub year: u32,
    pub rating: String,
    #[serde(default)]
    pub genres: Vec<String>,
    pub banner_ref: String,
}

impl CatalogEntry {
    /// Synthetic entry shown instead of an empty carousel.
    pub fn not_found() -> Self {
        Self {
            title: NOT_FOUND_TITLE.to_string(),
            detail_ref: String::new(),
            year: 0,
            rating: NOT_FOUND_RATING.to_string(),
            genres: Vec::new(),
            banner_ref: PLACEHOLDER_BANNER.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.detail_ref.is_empty() && self.rating == NOT_FOUND_RATING
    }
}

/// One downloadable variant of a movie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityOption {
    /// e.g. `1080p.BluRay`
    pub label: String,
    pub link: String,
}

impl QualityOption {
    pub fn new(label: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            link: link.into(),
        }
    }
}

/// Pass-through filter tokens for a catalog search.  No validation happens on
/// this side; the catalog interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    pub quality: String,
    pub genre: String,
    pub rating: String,
    pub order: String,
    pub year: String,
    pub language: String,
}

impl Default for SearchFilters {
    fn default() -> Self {
        Self {
            quality: "all".to_string(),
            genre: "all".to_string(),
            rating: "0".to_string(),
            order: "latest".to_string(),
            year: "0".to_string(),
            language: "en".to_string(),
        }
    }
}

/// Source of catalog entries and quality lists.
///
/// Implementations perform blocking-in-spirit network calls; callers must
/// never await them on the render path.
pub trait CatalogProvider: Send + Sync {
    fn search(
        &self,
        query: &str,
        filters: &SearchFilters,
    ) -> impl Future<Output = Result<Vec<CatalogEntry>, CatalogError>> + Send;

    fn list_qualities(
        &self,
        detail_ref: &str,
    ) -> impl Future<Output = Result<Vec<QualityOption>, CatalogError>> + Send;
}

/// Replace an empty result with the sentinel so selection always has
/// something to index.
pub fn normalize_entries(entries: Vec<CatalogEntry>) -> Vec<CatalogEntry> {
    if entries.is_empty() {
        vec![CatalogEntry::not_found()]
    } else {
        entries
    }
}

/// Wrap `index` into `[0, len)`.  Returns 0 for an empty list.
pub fn wrap_index(index: i64, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    index.rem_euclid(len as i64) as usize
}

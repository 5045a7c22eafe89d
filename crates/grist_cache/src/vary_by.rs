//! The inputs a section's fingerprint varies by.

use grist_common::{ContentHash, HashBuilder, SectionId};
use serde::Serialize;

use crate::content_item::ContentItem;
use crate::error::CacheError;
use crate::hasher::ContentHasher;

/// Domain tag mixed into every section fingerprint. Bump when the
/// fingerprint composition changes.
const FINGERPRINT_DOMAIN: &str = "grist-section-v1";

/// Content items and settings that parameterize a section.
///
/// Settings are captured as `serde_json::Value`, whose object map keeps keys
/// sorted, so two structurally equal settings values fingerprint the same
/// regardless of field declaration order. Serialization failures are held
/// until [`fingerprint`](Self::fingerprint) so the builder stays chainable.
#[derive(Clone, Debug, Default)]
pub struct VaryBy {
    items: Vec<ContentItem>,
    settings: Vec<(String, Result<serde_json::Value, String>)>,
}

impl VaryBy {
    /// Creates an empty vary-by set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one content item.
    pub fn item(mut self, item: ContentItem) -> Self {
        self.items.push(item);
        self
    }

    /// Adds content items in order.
    pub fn items(mut self, items: impl IntoIterator<Item = ContentItem>) -> Self {
        self.items.extend(items);
        self
    }

    /// Adds a named settings value.
    pub fn setting<T: Serialize + ?Sized>(mut self, name: &str, value: &T) -> Self {
        let value = serde_json::to_value(value).map_err(|e| e.to_string());
        self.settings.push((name.to_string(), value));
        self
    }

    /// The content items, in insertion order.
    pub fn content_items(&self) -> &[ContentItem] {
        &self.items
    }

    /// Returns `true` if neither items nor settings were added.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.settings.is_empty()
    }

    /// Computes the fingerprint of `id` combined with this vary-by set.
    ///
    /// Each item contributes its relative path, its pivots and its content
    /// hash. Fails if an item cannot be hashed or a setting could not be
    /// serialized.
    pub fn fingerprint(
        &self,
        id: &SectionId,
        hasher: &ContentHasher,
    ) -> Result<ContentHash, CacheError> {
        let mut builder = HashBuilder::new(FINGERPRINT_DOMAIN);
        builder.str_field(&id.to_string());

        builder.field(&(self.items.len() as u64).to_le_bytes());
        for item in &self.items {
            let hash = item.content_hash(hasher)?;
            builder
                .str_field(item.relative_path())
                .str_field(&item.pivots().to_string())
                .hash_field(&hash);
        }

        builder.field(&(self.settings.len() as u64).to_le_bytes());
        for (name, value) in &self.settings {
            let value = value.as_ref().map_err(|reason| CacheError::Serialization {
                reason: format!("vary-by setting '{name}': {reason}"),
            })?;
            let canonical =
                serde_json::to_string(value).map_err(|e| CacheError::Serialization {
                    reason: e.to_string(),
                })?;
            builder.str_field(name).str_field(&canonical);
        }

        Ok(builder.finish())
    }
}

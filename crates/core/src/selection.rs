//! Garment selection identity and the composite handoff record.

use serde::{Deserialize, Serialize};

/// Separator between item ids inside a selection signature.
const SIGNATURE_SEPARATOR: &str = ",";

/// A source garment the user can pick for an outfit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GarmentItem {
    pub id: String,
    /// Displayable URL of the garment photo.
    pub image_url: String,
    #[serde(default)]
    pub category_id: Option<String>,
}

impl GarmentItem {
    pub fn new(id: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            image_url: image_url.into(),
            category_id: None,
        }
    }

    pub fn with_category(mut self, category_id: impl Into<String>) -> Self {
        self.category_id = Some(category_id.into());
        self
    }
}

/// Deterministic identity of an ordered selection: the item ids joined
/// with `,`.
///
/// Order matters; the grid places items in selection order, so two
/// orderings produce different composites.
pub fn selection_signature(items: &[GarmentItem]) -> String {
    items
        .iter()
        .map(|item| item.id.as_str())
        .collect::<Vec<_>>()
        .join(SIGNATURE_SEPARATOR)
}

/// An uploaded grid composite, valid only for the selection it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeResult {
    pub selection_signature: String,
    /// Path of the composite inside the composite bucket.
    pub storage_key: String,
    /// Displayable URL of the composite.
    pub public_url: String,
}

impl CompositeResult {
    /// Whether this composite may be consumed for `signature`.
    pub fn matches(&self, signature: &str) -> bool {
        self.selection_signature == signature
    }
}

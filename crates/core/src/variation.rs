//! Candidate outputs of a job and the current selection.
//!
//! Variations carry a stable [`VariationId`] so a front-end can keep a
//! selection handle across re-renders; positional selection is kept for
//! callers that address variations by index.

use serde::Serialize;
use uuid::Uuid;

/// Stable client-side handle for a variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VariationId(Uuid);

impl VariationId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for VariationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// One candidate output image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    pub id: VariationId,
    pub image_url: String,
    pub selected: bool,
}

/// Holds the variations for the current job and which one is selected.
///
/// Invariant: `selected_index()` is `None` or a valid index, and exactly
/// the variation at that index has `selected == true`.
#[derive(Debug, Clone, Default)]
pub struct VariationStore {
    variations: Vec<Variation>,
    selected: Option<usize>,
    current_texture: Option<String>,
}

impl VariationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list with one entry per URL and select the first.
    ///
    /// An empty list leaves the store untouched.
    pub fn set_initial_variations(&mut self, urls: &[String]) {
        let Some(first) = urls.first() else {
            return;
        };
        self.variations = urls
            .iter()
            .enumerate()
            .map(|(index, url)| Variation {
                id: VariationId::generate(),
                image_url: url.clone(),
                selected: index == 0,
            })
            .collect();
        self.selected = Some(0);
        self.current_texture = Some(first.clone());
    }

    /// Select by position. Out-of-range indices are ignored.
    ///
    /// Returns whether the selection changed state.
    pub fn select_variation(&mut self, index: usize) -> bool {
        if index >= self.variations.len() {
            return false;
        }
        for (i, variation) in self.variations.iter_mut().enumerate() {
            variation.selected = i == index;
        }
        self.selected = Some(index);
        self.current_texture = Some(self.variations[index].image_url.clone());
        true
    }

    /// Select by stable id. Unknown ids are ignored.
    pub fn select_by_id(&mut self, id: VariationId) -> bool {
        match self.variations.iter().position(|v| v.id == id) {
            Some(index) => self.select_variation(index),
            None => false,
        }
    }

    /// Clear variations and selection before a new submission.
    ///
    /// The current texture is kept so the last output stays visible while
    /// the next job runs.
    pub fn reset(&mut self) {
        self.variations.clear();
        self.selected = None;
    }

    pub fn variations(&self) -> &[Variation] {
        &self.variations
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    pub fn selected(&self) -> Option<&Variation> {
        self.selected.and_then(|i| self.variations.get(i))
    }

    /// URL of the texture currently on display, if any was produced.
    pub fn current_texture(&self) -> Option<&str> {
        self.current_texture.as_deref()
    }

    pub fn len(&self) -> usize {
        self.variations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variations.is_empty()
    }
}

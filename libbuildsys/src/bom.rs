//! The shared build-materials manifest.

use std::sync::{Arc, Mutex, PoisonError};

/// A single entry in the build-materials manifest, describing one piece of
/// software used or produced during the build.
#[derive(Debug, Clone, PartialEq)]
pub struct BomEntry {
    pub name: String,
    pub version: String,
    pub metadata: toml::Table,
}

/// Cloneable handle to the manifest shared by all buildpack components that
/// participate in a build.
///
/// The manifest is append-only: components add their own entries and never
/// clear or reorder entries added by others. Appends are safe from multiple
/// threads.
#[derive(Debug, Clone, Default)]
pub struct Bom {
    entries: Arc<Mutex<Vec<BomEntry>>>,
}

impl Bom {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: BomEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// A point-in-time copy of all entries, in append order.
    #[must_use]
    pub fn entries(&self) -> Vec<BomEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

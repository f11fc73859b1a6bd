//! Index declarations for repository collections.

use serde::{Deserialize, Serialize};

/// A single-field index to provision on a collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexDescriptor {
    /// The document key to index.
    pub field: String,
    /// Whether the index rejects two documents with the same value.
    #[serde(default)]
    pub unique: bool,
}

impl IndexDescriptor {
    pub fn new(field: impl Into<String>, unique: bool) -> Self {
        Self { field: field.into(), unique }
    }

    /// Shorthand for a non-unique index on `field`.
    pub fn field(field: impl Into<String>) -> Self {
        Self::new(field, false)
    }

    /// Shorthand for a unique index on `field`.
    pub fn unique(field: impl Into<String>) -> Self {
        Self::new(field, true)
    }

    /// Name of the index as the store reports it (`<field>_1`).
    pub fn name(&self) -> String {
        format!("{}_1", self.field)
    }
}

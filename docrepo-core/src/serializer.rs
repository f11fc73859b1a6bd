//! Conversion between domain objects and stored documents.
//!
//! The repository never serializes on its own: it is handed a [`Serializer`] at
//! construction and only touches the reserved identifier key of what that
//! serializer produces.

use bson::{Bson, de::deserialize_from_bson, ser::serialize_to_bson};
use std::fmt::Debug;

use crate::{
    document::Document,
    error::{RepositoryError, RepositoryResult},
};

/// Converts domain objects to documents and back.
///
/// Implementations must round-trip every field of the domain type.
pub trait Serializer: Send + Sync + Debug + 'static {
    /// Converts an object into the document that will be stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be represented as a document.
    fn serialize<D: Document>(&self, object: &D) -> RepositoryResult<bson::Document>;

    /// Rebuilds an object from a stored document.
    ///
    /// # Errors
    ///
    /// Returns an error if the document does not match the shape of `D`.
    fn deserialize<D: Document>(&self, document: bson::Document) -> RepositoryResult<D>;
}

/// Serde-driven serializer mapping objects straight to BSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct BsonSerializer;

impl Serializer for BsonSerializer {
    fn serialize<D: Document>(&self, object: &D) -> RepositoryResult<bson::Document> {
        match serialize_to_bson(object)? {
            Bson::Document(document) => Ok(document),
            other => Err(RepositoryError::InvalidDocument(format!(
                "{} serialized to {:?}, expected a document",
                D::type_name(),
                other.element_type(),
            ))),
        }
    }

    fn deserialize<D: Document>(&self, document: bson::Document) -> RepositoryResult<D> {
        Ok(deserialize_from_bson(Bson::Document(document))?)
    }
}

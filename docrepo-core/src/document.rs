//! Core traits for domain objects stored through a repository.
//!
//! A domain type implements [`Document`] once, either by hand or with
//! `#[derive(Document)]`. The implementation is the static registration the
//! repository consults for the collection name and the indexes to provision.

use bson::Bson;
use serde::{Serialize, de::DeserializeOwned};
use std::fmt::{Debug, Display};

use crate::index::IndexDescriptor;

/// Document key under which the caller-supplied identifier is stored.
///
/// This key never collides with a field of the domain object: it is stamped
/// on every write and stripped before every read.
pub const RESERVED_ID_KEY: &str = "_id";

/// Identifier assigned by the caller to a domain object.
///
/// Implemented for any type that converts into BSON and can be printed,
/// e.g. `String`, `i64`, [`bson::Uuid`] or [`bson::oid::ObjectId`].
pub trait Identifier: Into<Bson> + Clone + Display + Debug + Send + Sync + 'static {}

impl<T> Identifier for T where T: Into<Bson> + Clone + Display + Debug + Send + Sync + 'static {}

/// Core trait that all domain objects handled by a repository must implement.
///
/// # Example
///
/// ```ignore
/// use docrepo::document::Document;
/// use docrepo::index::IndexDescriptor;
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// pub struct Widget {
///     pub name: String,
/// }
///
/// impl Document for Widget {
///     type Id = String;
///
///     fn type_name() -> &'static str {
///         "Widget"
///     }
///
///     fn indexes() -> Vec<IndexDescriptor> {
///         vec![IndexDescriptor::new("name", false)]
///     }
/// }
/// ```
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Type of the identifier the caller supplies for objects of this type.
    type Id: Identifier;

    /// Returns the name of the domain type.
    ///
    /// The lowercased name is the default collection name.
    fn type_name() -> &'static str;

    /// Returns the indexes that must exist on the collection holding this type.
    fn indexes() -> Vec<IndexDescriptor> {
        Vec::new()
    }
}

/// Builds the filter matching the document stored under `id`.
pub fn id_filter<I: Identifier>(id: &I) -> bson::Document {
    let mut filter = bson::Document::new();
    filter.insert(RESERVED_ID_KEY, id.clone().into());
    filter
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize)]
    struct Probe;

    impl Document for Probe {
        type Id = i64;

        fn type_name() -> &'static str {
            "Probe"
        }
    }

    #[test]
    fn test_indexes_default_to_empty() {
        assert!(Probe::indexes().is_empty());
    }

    #[test]
    fn test_id_filter_uses_reserved_key() {
        assert_eq!(id_filter(&"w1".to_string()), doc! { "_id": "w1" });
        assert_eq!(id_filter(&42_i64), doc! { "_id": 42_i64 });
    }
}

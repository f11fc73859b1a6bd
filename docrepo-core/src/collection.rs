//! Collection handle abstraction.
//!
//! A [`CollectionHandle`] is the narrow surface of a document store collection
//! the repository relies on. Filters, updates and options are native documents
//! handed to the store unmodified; implementations must not reinterpret them.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{error::RepositoryResult, index::IndexDescriptor, query::FindOptions};

/// Operations on a single collection of a document store.
///
/// Implementers should map store failures to
/// [`RepositoryError::Backend`](crate::error::RepositoryError::Backend), unique
/// index violations to
/// [`RepositoryError::DuplicateKey`](crate::error::RepositoryError::DuplicateKey)
/// and index build failures to
/// [`RepositoryError::Index`](crate::error::RepositoryError::Index).
#[async_trait]
pub trait CollectionHandle: Send + Sync + Debug + 'static {
    /// Returns the name of the collection.
    fn name(&self) -> &str;

    /// Returns the first document matching `filter`, honouring `sort`, `skip` and `projection`.
    async fn find_one(
        &self,
        filter: bson::Document,
        options: FindOptions,
    ) -> RepositoryResult<Option<bson::Document>>;

    /// Returns every document matching `filter`.
    async fn find(
        &self,
        filter: bson::Document,
        options: FindOptions,
    ) -> RepositoryResult<Vec<bson::Document>>;

    /// Inserts a new document. Fails if its `_id` is already taken.
    async fn insert_one(&self, document: bson::Document) -> RepositoryResult<()>;

    /// Applies `update` to the first document matching `filter`.
    ///
    /// Returns the number of matched documents (0 or 1).
    async fn update_one(
        &self,
        filter: bson::Document,
        update: bson::Document,
    ) -> RepositoryResult<u64>;

    /// Deletes the first document matching `filter`, returning how many were removed.
    async fn delete_one(&self, filter: bson::Document) -> RepositoryResult<u64>;

    /// Deletes every document matching `filter`, returning how many were removed.
    async fn delete_many(&self, filter: bson::Document) -> RepositoryResult<u64>;

    /// Counts the documents matching `filter`.
    async fn count(&self, filter: bson::Document) -> RepositoryResult<u64>;

    /// Creates an index. Creating an index that already exists with the same options succeeds.
    async fn create_index(&self, index: &IndexDescriptor) -> RepositoryResult<()>;
}

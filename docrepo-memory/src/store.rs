//! In-process document store.
//!
//! [`InMemoryServer`] plays the role of a database server: it owns every
//! database and collection, and hands out [`InMemoryClient`]s through the
//! [`Connector`] trait. Clones of a server share the same data, so several
//! repositories (or a test and the repository under test) observe each
//! other's writes.

use async_trait::async_trait;
use bson::{Bson, oid::ObjectId};
use mea::rwlock::RwLock;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use docrepo_core::{
    backend::{Connector, StoreClient},
    collection::CollectionHandle,
    document::RESERVED_ID_KEY,
    error::{RepositoryError, RepositoryResult},
    index::IndexDescriptor,
    options::ConnectionOptions,
    query::FindOptions,
};

use crate::evaluator::{Comparable, FilterEvaluator, apply_update, compare_by, lookup, project};

/// URL scheme accepted by [`InMemoryServer`].
pub const MEMORY_SCHEME: &str = "memory://";

/// `(database, collection)`
type Namespace = (String, String);

/// Value an index sees for a document that lacks the indexed field.
static MISSING: Bson = Bson::Null;

#[derive(Debug, Default)]
struct CollectionData {
    /// Documents in insertion order.
    documents: Vec<bson::Document>,
    indexes: Vec<IndexDescriptor>,
}

#[derive(Debug)]
struct ServerState {
    collections: RwLock<HashMap<Namespace, CollectionData>>,
    connections_opened: AtomicU64,
    connections_closed: AtomicU64,
    operations: AtomicU64,
}

/// Counters describing how a server has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub connections_opened: u64,
    pub connections_closed: u64,
    /// Collection operations issued by all clients, including failed ones.
    pub operations: u64,
}

/// Shared in-process document store.
///
/// # Example
///
/// ```ignore
/// use docrepo::prelude::*;
/// use docrepo::memory::InMemoryServer;
///
/// let server = InMemoryServer::new();
/// let mut widgets = Repository::<_, Widget>::new(
///     server.clone(),
///     ConnectionOptions::new("memory://local", "test"),
/// );
///
/// widgets.connect().await?;
/// assert_eq!(server.stats().connections_opened, 1);
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryServer {
    state: Arc<ServerState>,
}

impl InMemoryServer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(ServerState {
                collections: RwLock::new(HashMap::new()),
                connections_opened: AtomicU64::new(0),
                connections_closed: AtomicU64::new(0),
                operations: AtomicU64::new(0),
            }),
        }
    }

    pub fn stats(&self) -> ServerStats {
        ServerStats {
            connections_opened: self.state.connections_opened.load(Ordering::SeqCst),
            connections_closed: self.state.connections_closed.load(Ordering::SeqCst),
            operations: self.state.operations.load(Ordering::SeqCst),
        }
    }

    /// Raw documents stored in a collection, in insertion order.
    pub async fn documents(&self, database: &str, collection: &str) -> Vec<bson::Document> {
        self.state
            .collections
            .read()
            .await
            .get(&(database.to_string(), collection.to_string()))
            .map(|data| data.documents.clone())
            .unwrap_or_default()
    }

    /// Secondary indexes created on a collection.
    pub async fn indexes(&self, database: &str, collection: &str) -> Vec<IndexDescriptor> {
        self.state
            .collections
            .read()
            .await
            .get(&(database.to_string(), collection.to_string()))
            .map(|data| data.indexes.clone())
            .unwrap_or_default()
    }

    /// Names of the collections that exist in `database`, sorted.
    pub async fn collection_names(&self, database: &str) -> Vec<String> {
        let mut names = self.state
            .collections
            .read()
            .await
            .keys()
            .filter(|(db, _)| db == database)
            .map(|(_, name)| name.clone())
            .collect::<Vec<_>>();

        names.sort();
        names
    }
}

impl Default for InMemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for InMemoryServer {
    type Client = InMemoryClient;

    async fn connect(&self, options: &ConnectionOptions) -> RepositoryResult<InMemoryClient> {
        if !options.url.starts_with(MEMORY_SCHEME) {
            return Err(RepositoryError::Initialization(format!(
                "unsupported connection url {}: expected the {} scheme",
                options.url,
                MEMORY_SCHEME,
            )));
        }

        self.state.connections_opened.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(url = %options.url, database = %options.database, "opened in-memory client");

        Ok(InMemoryClient {
            state: self.state.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

/// A connection to an [`InMemoryServer`].
#[derive(Debug)]
pub struct InMemoryClient {
    state: Arc<ServerState>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl StoreClient for InMemoryClient {
    type Collection = InMemoryCollection;

    fn collection(&self, database: &str, name: &str) -> InMemoryCollection {
        InMemoryCollection {
            state: self.state.clone(),
            closed: self.closed.clone(),
            namespace: (database.to_string(), name.to_string()),
        }
    }

    async fn close(self) -> RepositoryResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.connections_closed.fetch_add(1, Ordering::SeqCst);
            tracing::debug!("closed in-memory client");
        }

        Ok(())
    }
}

/// Handle on one collection of an [`InMemoryServer`].
///
/// Every operation fails with a backend error once the client it was derived
/// from has been closed.
#[derive(Debug, Clone)]
pub struct InMemoryCollection {
    state: Arc<ServerState>,
    closed: Arc<AtomicBool>,
    namespace: Namespace,
}

impl InMemoryCollection {
    fn begin(&self) -> RepositoryResult<()> {
        self.state.operations.fetch_add(1, Ordering::SeqCst);

        if self.closed.load(Ordering::SeqCst) {
            return Err(RepositoryError::Backend("client is closed".into()));
        }

        Ok(())
    }

    fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace.0, self.namespace.1)
    }

    /// Positions of the documents matching `filter`.
    fn matching(data: &CollectionData, filter: &bson::Document) -> RepositoryResult<Vec<usize>> {
        let mut positions = Vec::new();

        for (position, document) in data.documents.iter().enumerate() {
            if FilterEvaluator::new(document).matches(filter)? {
                positions.push(position);
            }
        }

        Ok(positions)
    }

    fn select(
        data: &CollectionData,
        filter: &bson::Document,
        options: &FindOptions,
    ) -> RepositoryResult<Vec<bson::Document>> {
        let mut selected = Self::matching(data, filter)?
            .into_iter()
            .map(|position| &data.documents[position])
            .collect::<Vec<_>>();

        if let Some(sort) = &options.sort {
            selected.sort_by(|a, b| compare_by(sort, a, b));
        }

        let skip = options.skip.unwrap_or(0) as usize;
        let limit = match options.limit {
            None | Some(0) => usize::MAX,
            Some(limit) => limit.unsigned_abs() as usize,
        };

        Ok(
            selected
                .into_iter()
                .skip(skip)
                .take(limit)
                .map(|document| match &options.projection {
                    Some(projection) => project(document.clone(), projection),
                    None => document.clone(),
                })
                .collect()
        )
    }

    /// Rejects `candidate` if it collides with another document on `_id` or on
    /// a unique index. `replacing` is the position of the document being updated.
    fn check_unique(
        &self,
        data: &CollectionData,
        candidate: &bson::Document,
        replacing: Option<usize>,
    ) -> RepositoryResult<()> {
        let primary = IndexDescriptor::unique(RESERVED_ID_KEY);
        let unique = std::iter::once(&primary).chain(data.indexes.iter().filter(|index| index.unique));

        for index in unique {
            let value = lookup(candidate, &index.field).unwrap_or(&MISSING);
            let wanted = Comparable::from(value);

            let clash = data.documents
                .iter()
                .enumerate()
                .filter(|(position, _)| Some(*position) != replacing)
                .any(|(_, existing)| {
                    Comparable::from(lookup(existing, &index.field).unwrap_or(&MISSING)) == wanted
                });

            if clash {
                let index_name = if index.field == RESERVED_ID_KEY {
                    "_id_".to_string()
                } else {
                    index.name()
                };

                return Err(RepositoryError::DuplicateKey(format!(
                    "E11000 duplicate key error collection: {} index: {} dup key: {{ {}: {} }}",
                    self.qualified_name(),
                    index_name,
                    index.field,
                    value,
                )));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl CollectionHandle for InMemoryCollection {
    fn name(&self) -> &str {
        &self.namespace.1
    }

    async fn find_one(
        &self,
        filter: bson::Document,
        mut options: FindOptions,
    ) -> RepositoryResult<Option<bson::Document>> {
        self.begin()?;
        options.limit = Some(1);

        let collections = self.state.collections.read().await;

        match collections.get(&self.namespace) {
            Some(data) => Ok(Self::select(data, &filter, &options)?.into_iter().next()),
            None => Ok(None),
        }
    }

    async fn find(
        &self,
        filter: bson::Document,
        options: FindOptions,
    ) -> RepositoryResult<Vec<bson::Document>> {
        self.begin()?;

        let collections = self.state.collections.read().await;

        match collections.get(&self.namespace) {
            Some(data) => Self::select(data, &filter, &options),
            None => Ok(vec![]),
        }
    }

    async fn insert_one(&self, document: bson::Document) -> RepositoryResult<()> {
        self.begin()?;

        let document = if document.contains_key(RESERVED_ID_KEY) {
            document
        } else {
            let mut stamped = bson::Document::new();
            stamped.insert(RESERVED_ID_KEY, ObjectId::new());
            for (key, value) in document {
                stamped.insert(key, value);
            }
            stamped
        };

        let mut collections = self.state.collections.write().await;
        let data = collections.entry(self.namespace.clone()).or_default();

        self.check_unique(data, &document, None)?;
        data.documents.push(document);

        Ok(())
    }

    async fn update_one(
        &self,
        filter: bson::Document,
        update: bson::Document,
    ) -> RepositoryResult<u64> {
        self.begin()?;

        let mut collections = self.state.collections.write().await;
        let Some(data) = collections.get_mut(&self.namespace) else {
            return Ok(0);
        };
        let Some(position) = Self::matching(data, &filter)?.into_iter().next() else {
            return Ok(0);
        };

        let mut updated = data.documents[position].clone();
        apply_update(&mut updated, &update)?;
        self.check_unique(data, &updated, Some(position))?;
        data.documents[position] = updated;

        Ok(1)
    }

    async fn delete_one(&self, filter: bson::Document) -> RepositoryResult<u64> {
        self.begin()?;

        let mut collections = self.state.collections.write().await;
        let Some(data) = collections.get_mut(&self.namespace) else {
            return Ok(0);
        };

        match Self::matching(data, &filter)?.into_iter().next() {
            Some(position) => {
                data.documents.remove(position);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete_many(&self, filter: bson::Document) -> RepositoryResult<u64> {
        self.begin()?;

        let mut collections = self.state.collections.write().await;
        let Some(data) = collections.get_mut(&self.namespace) else {
            return Ok(0);
        };

        let positions = Self::matching(data, &filter)?;
        for position in positions.iter().rev() {
            data.documents.remove(*position);
        }

        Ok(positions.len() as u64)
    }

    async fn count(&self, filter: bson::Document) -> RepositoryResult<u64> {
        self.begin()?;

        let collections = self.state.collections.read().await;

        match collections.get(&self.namespace) {
            Some(data) => Ok(Self::matching(data, &filter)?.len() as u64),
            None => Ok(0),
        }
    }

    async fn create_index(&self, index: &IndexDescriptor) -> RepositoryResult<()> {
        self.begin()?;

        if index.field == RESERVED_ID_KEY {
            return Ok(());
        }

        let mut collections = self.state.collections.write().await;
        let data = collections.entry(self.namespace.clone()).or_default();

        if let Some(existing) = data.indexes.iter().find(|existing| existing.field == index.field) {
            if existing.unique == index.unique {
                return Ok(());
            }

            return Err(RepositoryError::Index(format!(
                "an index on {} already exists in {} with different options",
                index.field,
                self.qualified_name(),
            )));
        }

        if index.unique {
            let values = data.documents
                .iter()
                .map(|document| lookup(document, &index.field).unwrap_or(&MISSING))
                .collect::<Vec<_>>();

            for (position, value) in values.iter().enumerate() {
                let wanted = Comparable::from(*value);

                if values[position + 1..].iter().any(|other| Comparable::from(*other) == wanted) {
                    return Err(RepositoryError::Index(format!(
                        "cannot build unique index {} on {}: duplicate key {{ {}: {} }}",
                        index.name(),
                        self.qualified_name(),
                        index.field,
                        value,
                    )));
                }
            }
        }

        tracing::debug!(
            collection = %self.qualified_name(),
            field = %index.field,
            unique = index.unique,
            "created index"
        );
        data.indexes.push(index.clone());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    async fn open(server: &InMemoryServer) -> InMemoryClient {
        server
            .connect(&ConnectionOptions::new("memory://local", "test"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_rejects_foreign_scheme() {
        let server = InMemoryServer::new();

        let err = server
            .connect(&ConnectionOptions::new("mongodb://localhost:27017", "test"))
            .await
            .unwrap_err();

        assert!(matches!(err, RepositoryError::Initialization(_)));
        assert_eq!(server.stats().connections_opened, 0);
    }

    #[tokio::test]
    async fn test_clones_share_data() {
        let server = InMemoryServer::new();
        let other = server.clone();

        let collection = open(&server).await.collection("test", "widgets");
        collection.insert_one(doc! { "_id": "w1", "name": "a" }).await.unwrap();

        assert_eq!(other.documents("test", "widgets").await.len(), 1);
        assert_eq!(other.collection_names("test").await, vec!["widgets".to_string()]);
        assert!(other.collection_names("other").await.is_empty());
    }

    #[tokio::test]
    async fn test_insert_generates_object_id() {
        let server = InMemoryServer::new();
        let collection = open(&server).await.collection("test", "widgets");

        collection.insert_one(doc! { "name": "a" }).await.unwrap();

        let stored = server.documents("test", "widgets").await;
        assert!(matches!(stored[0].get("_id"), Some(Bson::ObjectId(_))));
    }

    #[tokio::test]
    async fn test_duplicate_id_is_rejected() {
        let server = InMemoryServer::new();
        let collection = open(&server).await.collection("test", "widgets");

        collection.insert_one(doc! { "_id": "w1" }).await.unwrap();
        let err = collection.insert_one(doc! { "_id": "w1" }).await.unwrap_err();

        assert!(matches!(err, RepositoryError::DuplicateKey(msg) if msg.contains("_id_")));
    }

    #[tokio::test]
    async fn test_find_honours_options() {
        let server = InMemoryServer::new();
        let collection = open(&server).await.collection("test", "widgets");

        for (id, rank) in [("a", 3), ("b", 1), ("c", 2), ("d", 4)] {
            collection
                .insert_one(doc! { "_id": id, "rank": rank, "kind": "w" })
                .await
                .unwrap();
        }

        let found = collection
            .find(
                doc! { "rank": { "$lt": 4 } },
                FindOptions::new()
                    .sort(doc! { "rank": -1 })
                    .skip(1)
                    .limit(5)
                    .projection(doc! { "rank": 1 }),
            )
            .await
            .unwrap();

        assert_eq!(found, vec![doc! { "_id": "c", "rank": 2 }, doc! { "_id": "b", "rank": 1 }]);

        let first = collection
            .find_one(doc! {}, FindOptions::new().sort(doc! { "rank": 1 }))
            .await
            .unwrap();
        assert_eq!(first.unwrap().get_str("_id").unwrap(), "b");
    }

    #[tokio::test]
    async fn test_update_and_delete_report_counts() {
        let server = InMemoryServer::new();
        let collection = open(&server).await.collection("test", "widgets");

        collection.insert_one(doc! { "_id": "w1", "n": 1 }).await.unwrap();
        collection.insert_one(doc! { "_id": "w2", "n": 1 }).await.unwrap();

        assert_eq!(collection.update_one(doc! { "n": 1 }, doc! { "$set": { "n": 2 } }).await.unwrap(), 1);
        assert_eq!(collection.update_one(doc! { "n": 9 }, doc! { "$set": { "n": 2 } }).await.unwrap(), 0);
        assert_eq!(collection.count(doc! { "n": 2 }).await.unwrap(), 1);

        assert_eq!(collection.delete_one(doc! { "_id": "missing" }).await.unwrap(), 0);
        assert_eq!(collection.delete_many(doc! { "n": 9 }).await.unwrap(), 0);
        assert_eq!(collection.delete_many(doc! { "n": 1 }).await.unwrap(), 1);
        assert_eq!(collection.count(doc! { "n": 2 }).await.unwrap(), 1);
        assert_eq!(collection.delete_many(doc! {}).await.unwrap(), 1);
        assert_eq!(collection.count(doc! {}).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unique_index_enforced_on_insert_and_update() {
        let server = InMemoryServer::new();
        let collection = open(&server).await.collection("test", "widgets");

        collection.create_index(&IndexDescriptor::unique("name")).await.unwrap();
        collection.insert_one(doc! { "_id": "w1", "name": "a" }).await.unwrap();
        collection.insert_one(doc! { "_id": "w2", "name": "b" }).await.unwrap();

        let err = collection.insert_one(doc! { "_id": "w3", "name": "a" }).await.unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateKey(msg) if msg.contains("name_1")));

        let err = collection
            .update_one(doc! { "_id": "w2" }, doc! { "$set": { "name": "a" } })
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateKey(_)));

        // Rewriting a document with its own value is not a collision.
        collection
            .update_one(doc! { "_id": "w1" }, doc! { "$set": { "name": "a" } })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_unique_index_build_fails_on_existing_duplicates() {
        let server = InMemoryServer::new();
        let collection = open(&server).await.collection("test", "widgets");

        collection.insert_one(doc! { "_id": "w1", "name": "a" }).await.unwrap();
        collection.insert_one(doc! { "_id": "w2", "name": "a" }).await.unwrap();

        let err = collection.create_index(&IndexDescriptor::unique("name")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Index(_)));

        collection.create_index(&IndexDescriptor::field("name")).await.unwrap();
        collection.create_index(&IndexDescriptor::field("name")).await.unwrap();
        assert_eq!(server.indexes("test", "widgets").await, vec![IndexDescriptor::field("name")]);

        let err = collection.create_index(&IndexDescriptor::unique("name")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Index(_)));
    }

    #[tokio::test]
    async fn test_closed_client_rejects_operations() {
        let server = InMemoryServer::new();
        let client = open(&server).await;
        let collection = client.collection("test", "widgets");

        client.close().await.unwrap();

        let err = collection.count(doc! {}).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Backend(msg) if msg == "client is closed"));

        let stats = server.stats();
        assert_eq!(stats.connections_opened, 1);
        assert_eq!(stats.connections_closed, 1);
        assert_eq!(stats.operations, 1);
    }
}

//! Typed, identifier-keyed repository over a document store collection.
//!
//! A [`Repository`] is bound to one [`Document`] type and one collection. It
//! owns at most one client connection, established by [`Repository::connect`]
//! and released by [`Repository::disconnect`]. CRUD operations issued before
//! `connect()` completes fail with [`RepositoryError::NotReady`] without
//! touching the store.
//!
//! # Example
//!
//! ```ignore
//! use docrepo::{prelude::*, memory::InMemoryServer};
//!
//! let mut widgets: Repository<_, Widget> = Repository::new(
//!     InMemoryServer::new(),
//!     ConnectionOptions::new("memory://local", "test"),
//! );
//! widgets.connect().await?;
//!
//! widgets.insert("w1", Widget { name: "A".into() }).await?;
//! let widget = widgets.find_by_uid("w1").await?;
//!
//! widgets.disconnect().await?;
//! ```
//!
//! # Known limitations
//!
//! - Index provisioning during `connect()` is not transactional. If one index
//!   fails, the indexes created by the same batch stay in place.
//! - After `disconnect()` the collection handle is kept. Operations issued
//!   afterwards reach the closed client and fail with whatever error the
//!   client reports rather than with `NotReady`.
//! - Updating an existing identifier merges fields with `$set`. A field the
//!   serializer omits, such as an `Option` skipped when `None`, keeps its
//!   previously stored value.

use bson::doc;
use futures::future::join_all;
use std::{fmt, marker::PhantomData};

use crate::{
    backend::{Connector, StoreClient},
    collection::CollectionHandle,
    document::{Document, RESERVED_ID_KEY, id_filter},
    error::{RepositoryError, RepositoryResult},
    index::IndexDescriptor,
    options::ConnectionOptions,
    query::{FindOptions, IntoFilter},
    serializer::{BsonSerializer, Serializer},
};

type ClientOf<C> = <C as Connector>::Client;
type CollectionOf<C> = <ClientOf<C> as StoreClient>::Collection;

enum ConnectionState<C: Connector> {
    /// `connect()` has not succeeded yet.
    Disconnected,
    Connected {
        client: ClientOf<C>,
        collection: CollectionOf<C>,
    },
    /// `disconnect()` ran; the handle is stale.
    Closed {
        collection: CollectionOf<C>,
    },
}

/// Typed repository for objects of type `D` stored through connector `C`.
///
/// `connect()` and `disconnect()` take `&mut self` while every CRUD operation
/// takes `&self`, so the connection state can only change while no operation
/// is in flight.
pub struct Repository<C: Connector, D: Document, S: Serializer = BsonSerializer> {
    connector: C,
    options: ConnectionOptions,
    collection_name: String,
    serializer: S,
    state: ConnectionState<C>,
    _marker: PhantomData<fn() -> D>,
}

impl<C: Connector, D: Document> Repository<C, D, BsonSerializer> {
    /// Creates a repository using the default serde/BSON serializer.
    pub fn new(connector: C, options: ConnectionOptions) -> Self {
        Self::with_serializer(connector, options, BsonSerializer)
    }
}

impl<C: Connector, D: Document, S: Serializer> Repository<C, D, S> {
    /// Creates a repository with an explicit serializer.
    ///
    /// The collection name is resolved here and never changes afterwards.
    pub fn with_serializer(connector: C, options: ConnectionOptions, serializer: S) -> Self {
        let collection_name = options.collection_name(D::type_name());

        Self {
            connector,
            options,
            collection_name,
            serializer,
            state: ConnectionState::Disconnected,
            _marker: PhantomData,
        }
    }

    /// Returns the name of the bound domain type.
    pub fn name(&self) -> &'static str {
        D::type_name()
    }

    /// Returns the collection this repository reads and writes.
    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Returns the options the repository was created with.
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Returns the connector used to open the client.
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Returns `true` once `connect()` has succeeded and until `disconnect()` runs.
    pub fn is_ready(&self) -> bool {
        matches!(self.state, ConnectionState::Connected { .. })
    }

    /// Connects to the store, opens the collection and provisions the indexes of `D`.
    ///
    /// Calling this on a connected repository does nothing. Indexes are created
    /// concurrently and every creation is awaited before the outcome is decided.
    ///
    /// # Errors
    ///
    /// - [`RepositoryError::Closed`] if the repository was disconnected before.
    /// - Any connection error from the connector.
    /// - The first index creation error. The client is closed again and the
    ///   repository stays not ready, but indexes that were created remain.
    pub async fn connect(&mut self) -> RepositoryResult<()> {
        match self.state {
            ConnectionState::Connected { .. } => return Ok(()),
            ConnectionState::Closed { .. } => return Err(RepositoryError::Closed),
            ConnectionState::Disconnected => {}
        }

        tracing::info!(
            database = %self.options.database,
            collection = %self.collection_name,
            "connecting repository for {}",
            D::type_name()
        );

        let client = self.connector.connect(&self.options).await?;
        let collection = client.collection(&self.options.database, &self.collection_name);

        if let Err(err) = provision_indexes(&collection, &D::indexes()).await {
            tracing::warn!(
                collection = %self.collection_name,
                error = %err,
                "index provisioning failed, closing connection"
            );

            if let Err(close_err) = client.close().await {
                tracing::warn!(error = %close_err, "failed to close connection after index failure");
            }

            return Err(err);
        }

        self.state = ConnectionState::Connected { client, collection };

        Ok(())
    }

    /// Closes the connection.
    ///
    /// Does nothing if the repository is not connected.
    pub async fn disconnect(&mut self) -> RepositoryResult<()> {
        match std::mem::replace(&mut self.state, ConnectionState::Disconnected) {
            ConnectionState::Connected { client, collection } => {
                tracing::info!(collection = %self.collection_name, "disconnecting repository");

                self.state = ConnectionState::Closed { collection };
                client.close().await
            }
            state => {
                self.state = state;
                Ok(())
            }
        }
    }

    /// Fetches the object stored under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::NotFound`] naming the type and identifier if
    /// no document has that identifier.
    pub async fn find_by_uid(&self, id: impl Into<D::Id>) -> RepositoryResult<D> {
        let id = id.into();

        self.find_one(id_filter(&id), None)
            .await?
            .ok_or_else(|| {
                RepositoryError::NotFound(format!(
                    "{} with identifier #{} not found",
                    D::type_name(),
                    id,
                ))
            })
    }

    /// Fetches the first object matching `filter`, or `None` if nothing matches.
    pub async fn find_one(
        &self,
        filter: impl IntoFilter,
        options: impl Into<Option<FindOptions>>,
    ) -> RepositoryResult<Option<D>> {
        let collection = self.collection()?;

        collection
            .find_one(filter.into_filter()?, options.into().unwrap_or_default())
            .await?
            .map(|document| self.restore(document))
            .transpose()
    }

    /// Fetches every object matching `filter`, in the order the store returns them.
    pub async fn find_all(
        &self,
        filter: impl IntoFilter,
        options: impl Into<Option<FindOptions>>,
    ) -> RepositoryResult<Vec<D>> {
        let collection = self.collection()?;

        collection
            .find(filter.into_filter()?, options.into().unwrap_or_default())
            .await?
            .into_iter()
            .map(|document| self.restore(document))
            .collect()
    }

    /// Stores `object` under `id`, creating or updating the document, and hands `object` back.
    ///
    /// If a concurrent writer creates the same identifier between the lookup
    /// and the create, the failed create is logged and ignored: the last writer
    /// wins and the caller still gets its object back. Update failures are
    /// returned.
    pub async fn insert(&self, id: impl Into<D::Id>, object: D) -> RepositoryResult<D> {
        let id = id.into();
        let collection = self.collection()?;
        let filter = id_filter(&id);

        let existing = collection
            .find_one(filter.clone(), FindOptions::default())
            .await?;

        let mut document = self.serializer.serialize(&object)?;
        document.remove(RESERVED_ID_KEY);

        match existing {
            None => {
                let mut stamped = filter;
                for (key, value) in document {
                    stamped.insert(key, value);
                }

                if let Err(err) = collection.insert_one(stamped).await {
                    tracing::warn!(
                        collection = collection.name(),
                        id = %id,
                        error = %err,
                        "create failed, assuming a concurrent insert of the same identifier"
                    );
                }
            }
            Some(_) => {
                collection
                    .update_one(filter, doc! { "$set": document })
                    .await?;
            }
        }

        Ok(object)
    }

    /// Counts the documents matching `filter`.
    pub async fn count(&self, filter: impl IntoFilter) -> RepositoryResult<u64> {
        let collection = self.collection()?;

        collection.count(filter.into_filter()?).await
    }

    /// Deletes the document stored under `id`. Missing identifiers are not an error.
    pub async fn delete(&self, id: impl Into<D::Id>) -> RepositoryResult<()> {
        let collection = self.collection()?;

        collection.delete_one(id_filter(&id.into())).await?;

        Ok(())
    }

    /// Deletes every document matching `filter`; an empty filter deletes everything.
    pub async fn delete_all(&self, filter: impl IntoFilter) -> RepositoryResult<()> {
        let collection = self.collection()?;

        let deleted = collection.delete_many(filter.into_filter()?).await?;
        tracing::debug!(collection = collection.name(), deleted, "deleted documents");

        Ok(())
    }

    /// Creates a single index on the collection.
    pub async fn create_index(&self, index: &IndexDescriptor) -> RepositoryResult<()> {
        provision_indexes(self.collection()?, std::slice::from_ref(index)).await
    }

    /// Creates several indexes concurrently.
    ///
    /// Every creation is awaited; the first error is returned and indexes
    /// created by the same call are kept.
    pub async fn create_indexes(&self, indexes: &[IndexDescriptor]) -> RepositoryResult<()> {
        provision_indexes(self.collection()?, indexes).await
    }

    fn collection(&self) -> RepositoryResult<&CollectionOf<C>> {
        match &self.state {
            ConnectionState::Connected { collection, .. } => Ok(collection),
            ConnectionState::Closed { collection } => Ok(collection),
            ConnectionState::Disconnected => Err(RepositoryError::NotReady),
        }
    }

    fn restore(&self, mut document: bson::Document) -> RepositoryResult<D> {
        document.remove(RESERVED_ID_KEY);
        self.serializer.deserialize(document)
    }
}

impl<C: Connector, D: Document, S: Serializer> fmt::Debug for Repository<C, D, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("type", &D::type_name())
            .field("database", &self.options.database)
            .field("collection", &self.collection_name)
            .field("ready", &self.is_ready())
            .field("serializer", &self.serializer)
            .finish_non_exhaustive()
    }
}

async fn provision_indexes<H: CollectionHandle>(
    collection: &H,
    indexes: &[IndexDescriptor],
) -> RepositoryResult<()> {
    let results = join_all(indexes.iter().map(|index| async move {
        tracing::debug!(
            collection = collection.name(),
            field = %index.field,
            unique = index.unique,
            "creating index"
        );
        collection.create_index(index).await
    }))
    .await;

    results.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    };

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        name: String,
    }

    impl Document for Widget {
        type Id = String;

        fn type_name() -> &'static str {
            "Widget"
        }

        fn indexes() -> Vec<IndexDescriptor> {
            vec![IndexDescriptor::field("name"), IndexDescriptor::unique("serial")]
        }
    }

    /// Records every call made against the store.
    #[derive(Debug, Default)]
    struct Recorder {
        connects: AtomicUsize,
        closes: AtomicUsize,
        operations: AtomicUsize,
        closed: AtomicBool,
        fail_insert: AtomicBool,
        fail_update: AtomicBool,
        failing_index: Mutex<Option<String>>,
        indexes: Mutex<Vec<String>>,
        documents: Mutex<Vec<bson::Document>>,
    }

    #[derive(Debug, Clone, Default)]
    struct MockConnector {
        recorder: Arc<Recorder>,
    }

    #[derive(Debug)]
    struct MockClient {
        recorder: Arc<Recorder>,
    }

    #[derive(Debug)]
    struct MockCollection {
        name: String,
        recorder: Arc<Recorder>,
    }

    impl MockCollection {
        fn touch(&self) -> RepositoryResult<()> {
            self.recorder.operations.fetch_add(1, Ordering::SeqCst);

            if self.recorder.closed.load(Ordering::SeqCst) {
                return Err(RepositoryError::Backend("client is closed".into()));
            }

            Ok(())
        }

        fn position(&self, filter: &bson::Document) -> Option<usize> {
            let id = filter.get(RESERVED_ID_KEY)?;

            self.recorder
                .documents
                .lock()
                .unwrap()
                .iter()
                .position(|document| document.get(RESERVED_ID_KEY) == Some(id))
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Client = MockClient;

        async fn connect(&self, _options: &ConnectionOptions) -> RepositoryResult<MockClient> {
            self.recorder.connects.fetch_add(1, Ordering::SeqCst);
            self.recorder.closed.store(false, Ordering::SeqCst);

            Ok(MockClient { recorder: self.recorder.clone() })
        }
    }

    #[async_trait]
    impl StoreClient for MockClient {
        type Collection = MockCollection;

        fn collection(&self, _database: &str, name: &str) -> MockCollection {
            MockCollection { name: name.to_string(), recorder: self.recorder.clone() }
        }

        async fn close(self) -> RepositoryResult<()> {
            self.recorder.closes.fetch_add(1, Ordering::SeqCst);
            self.recorder.closed.store(true, Ordering::SeqCst);

            Ok(())
        }
    }

    #[async_trait]
    impl CollectionHandle for MockCollection {
        fn name(&self) -> &str {
            &self.name
        }

        async fn find_one(
            &self,
            filter: bson::Document,
            _options: FindOptions,
        ) -> RepositoryResult<Option<bson::Document>> {
            self.touch()?;

            Ok(self
                .position(&filter)
                .map(|index| self.recorder.documents.lock().unwrap()[index].clone()))
        }

        async fn find(
            &self,
            _filter: bson::Document,
            _options: FindOptions,
        ) -> RepositoryResult<Vec<bson::Document>> {
            self.touch()?;

            Ok(self.recorder.documents.lock().unwrap().clone())
        }

        async fn insert_one(&self, document: bson::Document) -> RepositoryResult<()> {
            self.touch()?;

            if self.recorder.fail_insert.load(Ordering::SeqCst) {
                return Err(RepositoryError::DuplicateKey("_id".into()));
            }

            self.recorder.documents.lock().unwrap().push(document);

            Ok(())
        }

        async fn update_one(
            &self,
            filter: bson::Document,
            update: bson::Document,
        ) -> RepositoryResult<u64> {
            self.touch()?;

            if self.recorder.fail_update.load(Ordering::SeqCst) {
                return Err(RepositoryError::Backend("write conflict".into()));
            }

            let Some(index) = self.position(&filter) else {
                return Ok(0);
            };
            let fields = update.get_document("$set").unwrap().clone();

            let mut documents = self.recorder.documents.lock().unwrap();
            for (key, value) in fields {
                documents[index].insert(key, value);
            }

            Ok(1)
        }

        async fn delete_one(&self, filter: bson::Document) -> RepositoryResult<u64> {
            self.touch()?;

            match self.position(&filter) {
                Some(index) => {
                    self.recorder.documents.lock().unwrap().remove(index);
                    Ok(1)
                }
                None => Ok(0),
            }
        }

        async fn delete_many(&self, _filter: bson::Document) -> RepositoryResult<u64> {
            self.touch()?;

            let mut documents = self.recorder.documents.lock().unwrap();
            let deleted = documents.len() as u64;
            documents.clear();

            Ok(deleted)
        }

        async fn count(&self, _filter: bson::Document) -> RepositoryResult<u64> {
            self.touch()?;

            Ok(self.recorder.documents.lock().unwrap().len() as u64)
        }

        async fn create_index(&self, index: &IndexDescriptor) -> RepositoryResult<()> {
            self.touch()?;

            if self.recorder.failing_index.lock().unwrap().as_deref() == Some(index.field.as_str()) {
                return Err(RepositoryError::Index(format!("cannot index {}", index.field)));
            }

            self.recorder.indexes.lock().unwrap().push(index.field.clone());

            Ok(())
        }
    }

    fn repository() -> (Repository<MockConnector, Widget>, Arc<Recorder>) {
        let connector = MockConnector::default();
        let recorder = connector.recorder.clone();

        (
            Repository::new(connector, ConnectionOptions::new("mock://local", "test")),
            recorder,
        )
    }

    fn widget(name: &str) -> Widget {
        Widget { name: name.to_string() }
    }

    #[test]
    fn test_collection_name_defaults_to_type_name() {
        let (repository, _) = repository();

        assert_eq!(repository.collection_name(), "widget");
        assert_eq!(repository.name(), "Widget");
        assert!(!repository.is_ready());
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (mut repository, recorder) = repository();

        repository.connect().await.unwrap();
        repository.connect().await.unwrap();

        assert!(repository.is_ready());
        assert_eq!(recorder.connects.load(Ordering::SeqCst), 1);

        let mut indexes = recorder.indexes.lock().unwrap().clone();
        indexes.sort();
        assert_eq!(indexes, vec!["name", "serial"]);
    }

    #[tokio::test]
    async fn test_operations_before_connect_are_not_ready() {
        let (repository, recorder) = repository();

        assert!(matches!(repository.find_by_uid("w1").await, Err(RepositoryError::NotReady)));
        assert!(matches!(repository.find_one(doc! {}, None).await, Err(RepositoryError::NotReady)));
        assert!(matches!(repository.find_all(doc! {}, None).await, Err(RepositoryError::NotReady)));
        assert!(matches!(repository.insert("w1", widget("A")).await, Err(RepositoryError::NotReady)));
        assert!(matches!(repository.count(doc! {}).await, Err(RepositoryError::NotReady)));
        assert!(matches!(repository.delete("w1").await, Err(RepositoryError::NotReady)));
        assert!(matches!(repository.delete_all(doc! {}).await, Err(RepositoryError::NotReady)));
        assert!(matches!(
            repository.create_index(&IndexDescriptor::field("name")).await,
            Err(RepositoryError::NotReady),
        ));

        assert_eq!(recorder.operations.load(Ordering::SeqCst), 0);
        assert_eq!(recorder.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_insert_creates_stamped_document() {
        let (mut repository, recorder) = repository();
        repository.connect().await.unwrap();

        let stored = repository.insert("w1", widget("A")).await.unwrap();

        assert_eq!(stored, widget("A"));
        assert_eq!(
            recorder.documents.lock().unwrap().clone(),
            vec![doc! { "_id": "w1", "name": "A" }],
        );
    }

    #[tokio::test]
    async fn test_insert_updates_existing_document() {
        let (mut repository, recorder) = repository();
        repository.connect().await.unwrap();

        repository.insert("w1", widget("A")).await.unwrap();
        let stored = repository.insert("w1", widget("B")).await.unwrap();

        assert_eq!(stored, widget("B"));
        assert_eq!(
            recorder.documents.lock().unwrap().clone(),
            vec![doc! { "_id": "w1", "name": "B" }],
        );
        assert_eq!(repository.find_by_uid("w1").await.unwrap(), widget("B"));
    }

    #[tokio::test]
    async fn test_failed_create_is_ignored() {
        let (mut repository, recorder) = repository();
        repository.connect().await.unwrap();
        recorder.fail_insert.store(true, Ordering::SeqCst);

        let stored = repository.insert("w1", widget("A")).await.unwrap();

        assert_eq!(stored, widget("A"));
        assert!(recorder.documents.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_update_propagates() {
        let (mut repository, recorder) = repository();
        repository.connect().await.unwrap();
        repository.insert("w1", widget("A")).await.unwrap();
        recorder.fail_update.store(true, Ordering::SeqCst);

        let err = repository.insert("w1", widget("B")).await.unwrap_err();

        assert!(matches!(err, RepositoryError::Backend(_)));
    }

    #[tokio::test]
    async fn test_find_by_uid_not_found_names_identifier() {
        let (mut repository, _) = repository();
        repository.connect().await.unwrap();

        let err = repository.find_by_uid("missing").await.unwrap_err();

        assert!(matches!(&err, RepositoryError::NotFound(msg) if msg.contains("#missing") && msg.contains("Widget")));
    }

    #[tokio::test]
    async fn test_find_one_without_match_is_none() {
        let (mut repository, _) = repository();
        repository.connect().await.unwrap();

        assert_eq!(repository.find_one(doc! { "_id": "nope" }, None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_missing_identifier_succeeds() {
        let (mut repository, _) = repository();
        repository.connect().await.unwrap();

        repository.delete("missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_index_failure_leaves_repository_not_ready() {
        let (mut repository, recorder) = repository();
        *recorder.failing_index.lock().unwrap() = Some("serial".into());

        let err = repository.connect().await.unwrap_err();

        assert!(matches!(err, RepositoryError::Index(_)));
        assert!(!repository.is_ready());
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.indexes.lock().unwrap().clone(), vec!["name"]);
        assert!(matches!(repository.count(doc! {}).await, Err(RepositoryError::NotReady)));

        *recorder.failing_index.lock().unwrap() = None;
        repository.connect().await.unwrap();
        assert!(repository.is_ready());
    }

    #[tokio::test]
    async fn test_disconnect_keeps_stale_handle() {
        let (mut repository, recorder) = repository();

        repository.disconnect().await.unwrap();
        assert_eq!(recorder.closes.load(Ordering::SeqCst), 0);

        repository.connect().await.unwrap();
        repository.disconnect().await.unwrap();
        repository.disconnect().await.unwrap();

        assert_eq!(recorder.closes.load(Ordering::SeqCst), 1);
        assert!(!repository.is_ready());
        assert!(matches!(repository.count(doc! {}).await, Err(RepositoryError::Backend(_))));
        assert!(matches!(repository.connect().await, Err(RepositoryError::Closed)));
    }
}

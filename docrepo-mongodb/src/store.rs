use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Document, doc};
use mongodb::{
    Client, Collection, IndexModel,
    error::{Error as DriverError, ErrorKind, WriteFailure},
    options::IndexOptions,
};

use docrepo_core::{
    backend::{Connector, StoreClient},
    collection::CollectionHandle,
    error::{RepositoryError, RepositoryResult},
    index::IndexDescriptor,
    options::ConnectionOptions,
    query::FindOptions,
};

use crate::options::{client_options, find_one_options, find_options};

/// Server error code reported for unique index violations.
const DUPLICATE_KEY_CODE: i32 = 11000;

fn is_duplicate_key(err: &DriverError) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == DUPLICATE_KEY_CODE,
        _ => false,
    }
}

fn write_error(err: DriverError) -> RepositoryError {
    if is_duplicate_key(&err) {
        RepositoryError::DuplicateKey(err.to_string())
    } else {
        RepositoryError::Backend(err.to_string())
    }
}

/// Opens [`MongoClient`]s for repositories.
///
/// `connect()` pings the deployment so that an unreachable or rejecting
/// server is reported when the repository connects rather than on its first
/// operation.
#[derive(Debug, Clone, Default)]
pub struct MongoConnector;

impl MongoConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for MongoConnector {
    type Client = MongoClient;

    async fn connect(&self, options: &ConnectionOptions) -> RepositoryResult<MongoClient> {
        let client = Client::with_options(client_options(options).await?)
            .map_err(|e| RepositoryError::Initialization(e.to_string()))?;

        if let Err(err) = client
            .database(&options.database)
            .run_command(doc! { "ping": 1 })
            .await
        {
            client.shutdown().await;
            return Err(RepositoryError::Initialization(err.to_string()));
        }

        tracing::debug!(database = %options.database, "connected to mongodb");

        Ok(MongoClient::new(client))
    }
}

/// A connection to a MongoDB deployment.
#[derive(Debug)]
pub struct MongoClient {
    client: Client,
}

impl MongoClient {
    /// Wraps an already configured driver client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StoreClient for MongoClient {
    type Collection = MongoCollection;

    fn collection(&self, database: &str, name: &str) -> MongoCollection {
        MongoCollection {
            inner: self.client
                .database(database)
                .collection::<Document>(name),
        }
    }

    async fn close(self) -> RepositoryResult<()> {
        self.client.shutdown().await;

        Ok(())
    }
}

/// Handle on a MongoDB collection of raw documents.
#[derive(Debug, Clone)]
pub struct MongoCollection {
    inner: Collection<Document>,
}

#[async_trait]
impl CollectionHandle for MongoCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn find_one(
        &self,
        filter: Document,
        options: FindOptions,
    ) -> RepositoryResult<Option<Document>> {
        self.inner
            .find_one(filter)
            .with_options(find_one_options(options))
            .await
            .map_err(|e| RepositoryError::Backend(e.to_string()))
    }

    async fn find(
        &self,
        filter: Document,
        options: FindOptions,
    ) -> RepositoryResult<Vec<Document>> {
        self.inner
            .find(filter)
            .with_options(find_options(options))
            .await
            .map_err(|e| RepositoryError::Backend(e.to_string()))?
            .try_collect::<Vec<Document>>()
            .await
            .map_err(|e| RepositoryError::Backend(e.to_string()))
    }

    async fn insert_one(&self, document: Document) -> RepositoryResult<()> {
        self.inner
            .insert_one(document)
            .await
            .map_err(write_error)?;

        Ok(())
    }

    async fn update_one(&self, filter: Document, update: Document) -> RepositoryResult<u64> {
        Ok(
            self.inner
                .update_one(filter, update)
                .await
                .map_err(write_error)?
                .matched_count
        )
    }

    async fn delete_one(&self, filter: Document) -> RepositoryResult<u64> {
        Ok(
            self.inner
                .delete_one(filter)
                .await
                .map_err(|e| RepositoryError::Backend(e.to_string()))?
                .deleted_count
        )
    }

    async fn delete_many(&self, filter: Document) -> RepositoryResult<u64> {
        Ok(
            self.inner
                .delete_many(filter)
                .await
                .map_err(|e| RepositoryError::Backend(e.to_string()))?
                .deleted_count
        )
    }

    async fn count(&self, filter: Document) -> RepositoryResult<u64> {
        self.inner
            .count_documents(filter)
            .await
            .map_err(|e| RepositoryError::Backend(e.to_string()))
    }

    async fn create_index(&self, index: &IndexDescriptor) -> RepositoryResult<()> {
        let field = index.field.as_str();

        self.inner
            .create_index(
                IndexModel::builder()
                .keys(doc! { field: 1 })
                .options(
                    IndexOptions::builder()
                    .unique(index.unique)
                    .build()
                )
                .build()
            )
            .await
            .map_err(|e| RepositoryError::Index(e.to_string()))?;

        tracing::debug!(collection = self.inner.name(), field, unique = index.unique, "created index");

        Ok(())
    }
}

//! Document store client abstraction.
//!
//! A repository never talks to a database driver directly. It is given a
//! [`Connector`], asks it for a [`StoreClient`] when `connect()` runs, and
//! derives a [`CollectionHandle`](crate::collection::CollectionHandle) from that
//! client. Implementations live in sibling crates (in-memory, MongoDB).
//!
//! # Example
//!
//! ```ignore
//! use docrepo::backend::{Connector, StoreClient};
//! use docrepo::options::ConnectionOptions;
//!
//! let client = connector
//!     .connect(&ConnectionOptions::new("mongodb://localhost:27017", "sensors"))
//!     .await?;
//! let collection = client.collection("sensors", "dataobject");
//! // ...
//! client.close().await?;
//! ```

use async_trait::async_trait;
use std::fmt::Debug;

use crate::{collection::CollectionHandle, error::RepositoryResult, options::ConnectionOptions};

/// Factory for store clients.
///
/// A connector holds whatever a client needs beyond [`ConnectionOptions`]
/// (a shared in-process dataset, a runtime handle, ...). It is kept by the
/// repository for its whole lifetime and used once per successful `connect()`.
#[async_trait]
pub trait Connector: Send + Sync + Debug + 'static {
    type Client: StoreClient;

    /// Opens a connection to the store.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Initialization`](crate::error::RepositoryError::Initialization)
    /// if the endpoint is unreachable, rejected or misconfigured.
    async fn connect(&self, options: &ConnectionOptions) -> RepositoryResult<Self::Client>;
}

/// An open connection to a document store.
///
/// All implementations must be usable from multiple async tasks.
#[async_trait]
pub trait StoreClient: Send + Sync + Debug + Sized + 'static {
    type Collection: CollectionHandle;

    /// Returns a handle on `name` in `database`, creating the collection lazily if needed.
    fn collection(&self, database: &str, name: &str) -> Self::Collection;

    /// Closes the connection and releases its resources.
    ///
    /// Collection handles derived from this client stay in memory but every
    /// further operation on them fails.
    async fn close(self) -> RepositoryResult<()>;
}

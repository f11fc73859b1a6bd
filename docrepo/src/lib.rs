//! Typed object repositories over a document database.
//!
//! This crate is the entry point of the docrepo project. It re-exports the
//! core types and the available store clients.
//!
//! A [`Repository`](repository::Repository) binds one domain type to one
//! collection. It connects explicitly, provisions the indexes the type
//! declares, and offers identifier-keyed CRUD plus native filter queries.
//!
//! # Quick Start
//!
//! ```ignore
//! use docrepo::{prelude::*, memory::InMemoryServer};
//! use docrepo::bson::doc;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Document)]
//! pub struct Widget {
//!     #[document(index(unique))]
//!     pub name: String,
//!     pub weight: f64,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), RepositoryError> {
//!     let mut widgets = Repository::<_, Widget>::new(
//!         InMemoryServer::new(),
//!         ConnectionOptions::new("memory://local", "inventory"),
//!     );
//!     widgets.connect().await?;
//!
//!     widgets.insert("w1", Widget { name: "Alpha".into(), weight: 1.5 }).await?;
//!
//!     let widget = widgets.find_by_uid("w1").await?;
//!     let heavy = widgets
//!         .find_all(Filter::gt("weight", 1.0), FindOptions::new().sort(doc! { "weight": -1 }))
//!         .await?;
//!
//!     widgets.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Lifecycle
//!
//! Applications holding several repositories register them with a
//! [`LifecycleManager`](lifecycle::LifecycleManager), which connects them all on
//! `build()`, finds them by type name, and disconnects them on `destroy()`.
//!
//! # Store clients
//!
//! - [`memory`] - In-process store for development and testing
//! - `mongodb` - MongoDB through the official driver (requires the `mongodb` feature)

#[allow(unused_extern_crates)]
extern crate self as docrepo;

pub mod prelude;

pub use docrepo_core::{
    backend, collection, document, error, index, lifecycle, options, query, repository, serializer,
};

pub use async_trait::async_trait;

// Re-export BSON types for convenience
pub use bson;

/// In-memory store client.
pub mod memory {
    pub use docrepo_memory::{InMemoryClient, InMemoryCollection, InMemoryServer, MEMORY_SCHEME, ServerStats};
}

/// MongoDB store client.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use docrepo_mongodb::{MongoClient, MongoCollection, MongoConnector};
}

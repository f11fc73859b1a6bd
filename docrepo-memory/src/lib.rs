//! In-memory document store for docrepo.
//!
//! This crate provides [`InMemoryServer`], an in-process stand-in for a
//! document database server that implements the `Connector` trait. It is the
//! store used by the test suites and is suitable for development and for
//! applications that do not need persistence.
//!
//! # Features
//!
//! - **Shared state** - Clones of a server see the same databases and collections
//! - **Native filters** - Filters, sorts, projections and `$set`/`$unset` updates use MongoDB syntax
//! - **Unique indexes** - Enforced on insert and update, checked when the index is built
//! - **Usage counters** - [`ServerStats`] reports connections and operations
//!
//! # Quick Start
//!
//! ```ignore
//! use docrepo::prelude::*;
//! use docrepo::memory::InMemoryServer;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, Document)]
//! #[document(id = String)]
//! pub struct Widget {
//!     pub uid: String,
//!     #[document(index(unique))]
//!     pub name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut widgets = Repository::<_, Widget>::new(
//!         InMemoryServer::new(),
//!         ConnectionOptions::new("memory://local", "test"),
//!     );
//!     widgets.connect().await?;
//!
//!     let widget = Widget { uid: "w1".into(), name: "Alpha".into() };
//!     widgets.insert("w1", widget).await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_memory;

pub mod store;
pub(crate) mod evaluator;

pub use store::{InMemoryClient, InMemoryCollection, InMemoryServer, MEMORY_SCHEME, ServerStats};

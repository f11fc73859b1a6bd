//! Convenient re-exports of commonly used types from docrepo.
//!
//! ```ignore
//! use docrepo::prelude::*;
//! ```
//!
//! This provides access to:
//! - The repository, its options and its lifecycle manager
//! - The `Document` trait and its derive macro
//! - Filter construction and lookup options
//! - Store client traits
//! - Error types

pub use docrepo_core::{
    repository::Repository,
    document::{Document, Identifier, RESERVED_ID_KEY},
    index::IndexDescriptor,
    options::{ConnectionOptions, Credential, TopologyOptions},
    query::{Expr, FieldOp, Filter, FindOptions, IntoFilter, QueryVisitor},
    serializer::{BsonSerializer, Serializer},
    lifecycle::{Lifecycle, LifecycleManager, Stage},
    backend::{Connector, StoreClient},
    collection::CollectionHandle,
    error::{RepositoryError, RepositoryResult},
};

pub use docrepo_macros::Document;

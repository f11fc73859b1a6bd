//! Core of the docrepo project: a typed object repository over a document database.
//!
//! This crate provides:
//!
//! - **Repository** ([`repository`]) - Typed, identifier-keyed CRUD with connection lifecycle and index provisioning
//! - **Document traits** ([`document`]) - The static registration every domain type provides
//! - **Index declarations** ([`index`]) - Field indexes, optionally unique
//! - **Serialization** ([`serializer`]) - Object/document conversion injected into repositories
//! - **Store client abstraction** ([`backend`], [`collection`]) - Traits implemented by document store clients
//! - **Filters** ([`query`]) - Native filter pass-through plus a typed filter builder
//! - **Configuration** ([`options`]) - Connection options loadable from TOML or JSON
//! - **Lifecycle** ([`lifecycle`]) - One-shot build/destroy signals for a set of services
//! - **Error handling** ([`error`]) - Error and result types
//!
//! # Example
//!
//! ```ignore
//! use docrepo::prelude::*;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize)]
//! pub struct Widget {
//!     pub name: String,
//! }
//!
//! impl Document for Widget {
//!     type Id = String;
//!
//!     fn type_name() -> &'static str {
//!         "Widget"
//!     }
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_core;

pub mod backend;
pub mod collection;
pub mod document;
pub mod error;
pub mod index;
pub mod lifecycle;
pub mod options;
pub mod query;
pub mod repository;
pub mod serializer;

//! MongoDB client for docrepo.
//!
//! This crate provides [`MongoConnector`], the `Connector` implementation that
//! binds repositories to a MongoDB deployment through the official async driver.
//!
//! To use it, enable the `mongodb` feature of the facade crate:
//!
//! ```toml
//! [dependencies]
//! docrepo = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Features
//!
//! - **Native filters** - Filters, sorts and projections are handed to the server unmodified
//! - **Credentials and topology** - Overlaid on top of whatever the connection URL specifies
//! - **Index provisioning** - Single-field indexes, optionally unique
//! - **Duplicate key reporting** - Unique index violations surface as `RepositoryError::DuplicateKey`
//!
//! # Example
//!
//! ```ignore
//! use docrepo::{prelude::*, mongodb::MongoConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut frames = Repository::<_, DataFrame>::new(
//!         MongoConnector::new(),
//!         ConnectionOptions::new("mongodb://localhost:27017", "sensors"),
//!     );
//!     frames.connect().await?;
//!
//!     Ok(())
//! }
//! ```

#[allow(unused_extern_crates)]
extern crate self as docrepo_mongodb;

pub mod store;
pub(crate) mod options;

pub use store::{MongoClient, MongoCollection, MongoConnector};

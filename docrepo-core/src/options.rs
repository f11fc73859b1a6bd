//! Connection options for a repository.
//!
//! Options can be built in code or loaded from a TOML or JSON configuration:
//!
//! ```ignore
//! let options = ConnectionOptions::from_toml_str(r#"
//!     url = "mongodb://mongo:27017"
//!     database = "sensors"
//!
//!     [credential]
//!     username = "reader"
//!     password = "secret"
//!
//!     [topology]
//!     direct_connection = true
//! "#)?;
//! ```
//!
//! Credential and topology fields are handed to the client untouched. Fields
//! left unset keep whatever the connection URL specifies.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RepositoryError, RepositoryResult};

/// Everything a repository needs to reach its collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionOptions {
    /// Connection endpoint, e.g. `mongodb://localhost:27017`.
    pub url: String,
    /// Logical database name.
    pub database: String,
    /// Collection name. Defaults to the lowercased type name of the domain object.
    #[serde(default)]
    pub collection: Option<String>,
    /// Authentication credential.
    #[serde(default)]
    pub credential: Option<Credential>,
    /// Topology and pool settings.
    #[serde(default)]
    pub topology: TopologyOptions,
}

impl ConnectionOptions {
    pub fn new(url: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            database: database.into(),
            collection: None,
            credential: None,
            topology: TopologyOptions::default(),
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_topology(mut self, topology: TopologyOptions) -> Self {
        self.topology = topology;
        self
    }

    /// Parses options from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Configuration`] if the document is malformed,
    /// contains unknown keys or fails validation.
    pub fn from_toml_str(input: &str) -> RepositoryResult<Self> {
        let options: Self = toml::from_str(input)?;
        options.validate()?;
        Ok(options)
    }

    /// Parses options from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Configuration`] if the document is malformed,
    /// contains unknown keys or fails validation.
    pub fn from_json_str(input: &str) -> RepositoryResult<Self> {
        let options: Self = serde_json::from_str(input)
            .map_err(|e| RepositoryError::Configuration(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    /// Checks that the required fields are present.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Configuration`] naming the first empty field.
    pub fn validate(&self) -> RepositoryResult<()> {
        if self.url.trim().is_empty() {
            return Err(RepositoryError::Configuration("url must not be empty".into()));
        }
        if self.database.trim().is_empty() {
            return Err(RepositoryError::Configuration("database must not be empty".into()));
        }
        if matches!(&self.collection, Some(name) if name.trim().is_empty()) {
            return Err(RepositoryError::Configuration("collection must not be empty when set".into()));
        }

        Ok(())
    }

    /// Resolves the collection name for a domain type called `type_name`.
    ///
    /// A blank `collection` counts as unset.
    pub fn collection_name(&self, type_name: &str) -> String {
        self.collection
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| type_name.to_lowercase())
    }
}

/// Authentication credential passed through to the client.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Credential {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Database holding the user definition.
    #[serde(default)]
    pub source: Option<String>,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("source", &self.source)
            .finish()
    }
}

/// Topology and pool settings passed through to the client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TopologyOptions {
    pub app_name: Option<String>,
    pub replica_set: Option<String>,
    pub direct_connection: Option<bool>,
    pub connect_timeout_ms: Option<u64>,
    pub server_selection_timeout_ms: Option<u64>,
    pub max_pool_size: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_defaults_to_lowercased_type_name() {
        let options = ConnectionOptions::new("memory://local", "test");

        assert_eq!(options.collection_name("DataFrame"), "dataframe");
        assert_eq!(
            options.with_collection("frames").collection_name("DataFrame"),
            "frames",
        );
    }

    #[test]
    fn test_blank_collection_falls_back_to_type_name() {
        let options = ConnectionOptions::new("memory://local", "test");

        assert_eq!(options.clone().with_collection("").collection_name("DataFrame"), "dataframe");
        assert_eq!(options.with_collection("  ").collection_name("DataFrame"), "dataframe");
    }

    #[test]
    fn test_from_toml_str() {
        let options = ConnectionOptions::from_toml_str(
            r#"
            url = "mongodb://mongo:27017"
            database = "test"
            collection = "objects"

            [credential]
            username = "user"
            password = "pass"
            source = "admin"

            [topology]
            direct_connection = true
            max_pool_size = 4
            "#,
        )
        .unwrap();

        assert_eq!(options.url, "mongodb://mongo:27017");
        assert_eq!(options.collection.as_deref(), Some("objects"));
        assert_eq!(
            options.credential,
            Some(Credential::new("user", "pass").with_source("admin")),
        );
        assert_eq!(options.topology.direct_connection, Some(true));
        assert_eq!(options.topology.max_pool_size, Some(4));
        assert_eq!(options.topology.app_name, None);
    }

    #[test]
    fn test_from_json_str() {
        let options = ConnectionOptions::from_json_str(
            r#"{ "url": "memory://local", "database": "test" }"#,
        )
        .unwrap();

        assert_eq!(options, ConnectionOptions::new("memory://local", "test"));
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = ConnectionOptions::from_toml_str(
            r#"
            url = "mongodb://mongo:27017"
            database = "test"
            dbURL = "mongodb://other:27017"
            "#,
        )
        .unwrap_err();

        assert!(matches!(err, RepositoryError::Configuration(_)));
    }

    #[test]
    fn test_empty_database_is_rejected() {
        let err = ConnectionOptions::from_json_str(r#"{ "url": "memory://local", "database": "" }"#)
            .unwrap_err();

        assert!(matches!(err, RepositoryError::Configuration(msg) if msg.contains("database")));
    }

    #[test]
    fn test_credential_debug_redacts_password() {
        let rendered = format!("{:?}", Credential::new("user", "hunter2"));

        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("user"));
    }
}

//! Conversion from repository options to MongoDB driver options.

use std::time::Duration;

use mongodb::options::{
    ClientOptions,
    Credential as DriverCredential,
    FindOneOptions,
    FindOptions as DriverFindOptions,
};

use docrepo_core::{
    error::{RepositoryError, RepositoryResult},
    options::ConnectionOptions,
    query::FindOptions,
};

/// Parses the connection URL and overlays the credential and topology settings.
///
/// Settings left unset in `options` keep the value the URL carries.
pub(crate) async fn client_options(options: &ConnectionOptions) -> RepositoryResult<ClientOptions> {
    let mut client_options = ClientOptions::parse(&options.url)
        .await
        .map_err(|e| RepositoryError::Initialization(e.to_string()))?;

    if let Some(credential) = &options.credential {
        let mut driver_credential = client_options
            .credential
            .take()
            .unwrap_or_else(DriverCredential::default);

        if let Some(username) = &credential.username {
            driver_credential.username = Some(username.clone());
        }
        if let Some(password) = &credential.password {
            driver_credential.password = Some(password.clone());
        }
        if let Some(source) = &credential.source {
            driver_credential.source = Some(source.clone());
        }

        client_options.credential = Some(driver_credential);
    }

    let topology = &options.topology;

    if let Some(app_name) = &topology.app_name {
        client_options.app_name = Some(app_name.clone());
    }
    if let Some(replica_set) = &topology.replica_set {
        client_options.repl_set_name = Some(replica_set.clone());
    }
    if let Some(direct_connection) = topology.direct_connection {
        client_options.direct_connection = Some(direct_connection);
    }
    if let Some(timeout) = topology.connect_timeout_ms {
        client_options.connect_timeout = Some(Duration::from_millis(timeout));
    }
    if let Some(timeout) = topology.server_selection_timeout_ms {
        client_options.server_selection_timeout = Some(Duration::from_millis(timeout));
    }
    if let Some(max_pool_size) = topology.max_pool_size {
        client_options.max_pool_size = Some(max_pool_size);
    }

    Ok(client_options)
}

pub(crate) fn find_options(options: FindOptions) -> DriverFindOptions {
    let mut find_options = DriverFindOptions::default();

    find_options.sort = options.sort;
    find_options.projection = options.projection;
    find_options.skip = options.skip;
    find_options.limit = options.limit;

    find_options
}

pub(crate) fn find_one_options(options: FindOptions) -> FindOneOptions {
    let mut find_options = FindOneOptions::default();

    find_options.sort = options.sort;
    find_options.projection = options.projection;
    find_options.skip = options.skip;

    find_options
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use docrepo_core::options::{Credential, TopologyOptions};

    #[tokio::test]
    async fn test_overlays_credential_and_topology() {
        let options = ConnectionOptions::new("mongodb://localhost:27017/?appName=from-url", "test")
            .with_credential(Credential::new("reader", "secret").with_source("admin"))
            .with_topology(TopologyOptions {
                replica_set: Some("rs0".into()),
                direct_connection: Some(true),
                connect_timeout_ms: Some(1500),
                max_pool_size: Some(4),
                ..TopologyOptions::default()
            });

        let client_options = client_options(&options).await.unwrap();
        let credential = client_options.credential.clone().unwrap();

        assert_eq!(credential.username.as_deref(), Some("reader"));
        assert_eq!(credential.password.as_deref(), Some("secret"));
        assert_eq!(credential.source.as_deref(), Some("admin"));
        assert_eq!(client_options.app_name.as_deref(), Some("from-url"));
        assert_eq!(client_options.repl_set_name.as_deref(), Some("rs0"));
        assert_eq!(client_options.direct_connection, Some(true));
        assert_eq!(client_options.connect_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(client_options.max_pool_size, Some(4));
    }

    #[tokio::test]
    async fn test_rejects_malformed_url() {
        let err = client_options(&ConnectionOptions::new("memory://local", "test"))
            .await
            .unwrap_err();

        assert!(matches!(err, RepositoryError::Initialization(_)));
    }

    #[test]
    fn test_find_one_options_drop_limit() {
        let options = FindOptions::new()
            .sort(doc! { "name": 1 })
            .skip(2)
            .limit(10);

        let find_one = find_one_options(options.clone());
        let find = find_options(options);

        assert_eq!(find_one.sort, Some(doc! { "name": 1 }));
        assert_eq!(find_one.skip, Some(2));
        assert_eq!(find.limit, Some(10));
    }
}

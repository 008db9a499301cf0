//! Connection management for the export store
//!
//! Builds a MongoDB driver client from [`ConnectionConfig`], verifies it with
//! a ping and hands out [`MongoStore`] instances bound to the configured
//! collection. The pool is limited to a single connection so that the
//! request-charge probe after every page runs on the connection that served
//! the page.

use std::time::Duration;

use mongodb::bson::doc;
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::error::{ConnectionError, Result};
use crate::store::MongoStore;

/// Owns the driver client for one export run
pub struct ConnectionManager {
    config: ConnectionConfig,
    client: Option<Client>,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            client: None,
        }
    }

    /// Parse the URI, build the client and ping the target database
    pub async fn connect(&mut self) -> Result<()> {
        let options = self.client_options().await?;
        let client = Client::with_options(options)
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;

        info!("Connecting to {}", sanitize_uri(&self.config.uri));
        client
            .database(&self.config.database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ConnectionError::PingFailed(e.to_string()))?;
        debug!("Ping to database {} succeeded", self.config.database);

        self.client = Some(client);
        Ok(())
    }

    /// Shut the client down; a no-op when not connected
    pub async fn disconnect(&mut self) {
        if let Some(client) = self.client.take() {
            client.shutdown().await;
            debug!("Disconnected");
        }
    }

    /// Handle to the configured database
    pub fn database(&self) -> Result<Database> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| ConnectionError::ConnectionFailed("not connected".into()))?;
        Ok(client.database(&self.config.database))
    }

    /// Query store over the configured collection
    pub fn store(&self) -> Result<MongoStore> {
        Ok(MongoStore::new(self.database()?, self.config.collection.clone()))
    }

    async fn client_options(&self) -> Result<ClientOptions> {
        let mut options = ClientOptions::parse(&self.config.uri)
            .await
            .map_err(|e| ConnectionError::InvalidUri(e.to_string()))?;

        let timeout = Duration::from_secs(self.config.timeout);
        options.app_name = Some(self.app_name());
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);
        options.max_pool_size = Some(1);
        options.min_pool_size = None;

        Ok(options)
    }

    /// Configured application name, or `ru-export@<hostname>`
    fn app_name(&self) -> String {
        if let Some(name) = self.config.app_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        format!("ru-export@{host}")
    }
}

/// Hide credentials in a connection string for display
pub fn sanitize_uri(uri: &str) -> String {
    if let Some(proto_end) = uri.find("://") {
        if let Some(at) = uri.rfind('@') {
            if at > proto_end {
                return format!("{}***{}", &uri[..proto_end + 3], &uri[at..]);
            }
        }
        return uri.to_string();
    }
    if uri.contains('@') {
        "***".to_string()
    } else {
        uri.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(uri: &str) -> ConnectionConfig {
        ConnectionConfig {
            uri: uri.to_string(),
            database: "sales".to_string(),
            collection: "orders".to_string(),
            ..ConnectionConfig::default()
        }
    }

    #[test]
    fn test_sanitize_uri_with_credentials() {
        let sanitized =
            sanitize_uri("mongodb://user:p@ss@acct.mongo.cosmos.azure.com:10255/?ssl=true");
        assert_eq!(sanitized, "mongodb://***@acct.mongo.cosmos.azure.com:10255/?ssl=true");
        assert!(!sanitized.contains("p@ss"));
    }

    #[test]
    fn test_sanitize_uri_without_credentials() {
        assert_eq!(sanitize_uri("mongodb://localhost:27017"), "mongodb://localhost:27017");
    }

    #[test]
    fn test_app_name_prefers_config() {
        let mut cfg = config("mongodb://localhost:27017");
        cfg.app_name = Some("nightly-export".to_string());
        assert_eq!(ConnectionManager::new(cfg).app_name(), "nightly-export");
    }

    #[test]
    fn test_app_name_falls_back_to_hostname() {
        let manager = ConnectionManager::new(config("mongodb://localhost:27017"));
        assert!(manager.app_name().starts_with("ru-export@"));
    }

    #[tokio::test]
    async fn test_client_options_single_connection() {
        let manager = ConnectionManager::new(config("mongodb://localhost:27017"));
        let options = manager.client_options().await.unwrap();
        assert_eq!(options.max_pool_size, Some(1));
        assert_eq!(options.connect_timeout, Some(Duration::from_secs(manager.config.timeout)));
    }

    #[tokio::test]
    async fn test_invalid_uri_is_connection_error() {
        let mut manager = ConnectionManager::new(config("not a uri"));
        let err = manager.connect().await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::ExportError::Connection(ConnectionError::InvalidUri(_))
        ));
    }

    #[test]
    fn test_store_requires_connection() {
        let manager = ConnectionManager::new(config("mongodb://localhost:27017"));
        assert!(matches!(
            manager.store(),
            Err(crate::error::ExportError::Connection(ConnectionError::ConnectionFailed(_)))
        ));
    }
}

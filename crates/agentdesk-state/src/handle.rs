//! SurrealDB Handle - Connection and Sequences
//!
//! One handle is shared (via `Arc`) by the three SurrealDB-backed stores.
//! Supports in-memory and credentialed server (WebSocket) connections.

use crate::error::{StateError, StorageError};
use crate::migrations;
use crate::schema::SequenceRow;
use crate::storage_traits::StorageResult;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{debug, info, instrument};

const DEFAULT_NAMESPACE: &str = "agentdesk";
const DEFAULT_DATABASE: &str = "desk";

/// Configuration for an authenticated SurrealDB connection
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// WebSocket endpoint URL (e.g., "wss://xxx.aws-use1.surrealdb.cloud")
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// Namespace (default: "agentdesk")
    pub namespace: String,
    /// Database name (default: "desk")
    pub database: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

impl CloudConfig {
    /// Create a new configuration for a database user
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Create from environment variables, requiring `SURREALDB_ENDPOINT`.
    pub fn from_env() -> std::result::Result<Self, String> {
        Self::from_lookup(|var| std::env::var(var).ok())?
            .ok_or_else(|| "SURREALDB_ENDPOINT not set".to_string())
    }

    /// Read the configuration through `lookup`.
    ///
    /// Reads:
    /// - SURREALDB_ENDPOINT (unset or blank: `Ok(None)`)
    /// - SURREALDB_USERNAME (required with an endpoint)
    /// - SURREALDB_PASSWORD (required with an endpoint)
    /// - SURREALDB_NAMESPACE (optional, default: "agentdesk")
    /// - SURREALDB_DATABASE (optional, default: "desk")
    /// - SURREALDB_ROOT (optional, default: "false")
    pub fn from_lookup<F>(lookup: F) -> std::result::Result<Option<Self>, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let Some(endpoint) = var("SURREALDB_ENDPOINT") else {
            return Ok(None);
        };
        let username = var("SURREALDB_USERNAME").ok_or("SURREALDB_USERNAME not set")?;
        let password = var("SURREALDB_PASSWORD").ok_or("SURREALDB_PASSWORD not set")?;
        let namespace = var("SURREALDB_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let database = var("SURREALDB_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.to_string());
        let is_root = var("SURREALDB_ROOT")
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Ok(Some(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        }))
    }
}

/// SurrealDB connection handle for AgentDesk
#[derive(Clone)]
pub struct SurrealHandle {
    db: Surreal<Any>,
}

impl SurrealHandle {
    /// Connect to SurrealDB in-memory and set up schema
    #[instrument(skip_all)]
    pub async fn setup_db() -> Result<Self> {
        info!("Connecting to SurrealDB (in-memory)");
        Self::connect("mem://").await
    }

    /// Connect to an unauthenticated URL (`mem://`, `surrealkv://path`, `ws://host`)
    #[instrument]
    pub async fn connect(url: &str) -> Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {url}: {e}")))?;

        db.use_ns(DEFAULT_NAMESPACE)
            .use_db(DEFAULT_DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        let handle = SurrealHandle { db };
        migrations::init_schema(&handle.db).await?;

        info!("SurrealDB connected and schema initialized");
        Ok(handle)
    }

    /// Connect with credentials (cloud or self-hosted server)
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn setup_cloud(config: CloudConfig) -> Result<Self> {
        info!("Connecting to SurrealDB (root={})", config.is_root);

        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if config.is_root {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root authentication failed: {}", e)))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| {
                StateError::Connection(format!("Database authentication failed: {}", e))
            })?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to select namespace/database: {}", e))
            })?;

        let handle = SurrealHandle { db };
        migrations::init_schema(&handle.db).await?;

        info!("SurrealDB connected and schema initialized");
        Ok(handle)
    }

    /// Connect using environment variables
    ///
    /// With `SURREALDB_ENDPOINT` set, connects with the credentials from
    /// [`CloudConfig::from_lookup`]. Otherwise the store is in-memory.
    #[instrument(skip_all)]
    pub async fn setup_from_env() -> Result<Self> {
        match CloudConfig::from_lookup(|var| std::env::var(var).ok()).map_err(StateError::Config)? {
            Some(config) => {
                info!("SURREALDB_ENDPOINT found, connecting with credentials");
                Self::setup_cloud(config).await
            }
            None => {
                info!("SURREALDB_ENDPOINT not set, using in-memory store");
                Self::setup_db().await
            }
        }
    }

    pub(crate) fn db(&self) -> &Surreal<Any> {
        &self.db
    }

    /// Allocate the next integer identity for `sequence` (1, 2, 3, ...).
    pub(crate) async fn next_id(&self, sequence: &str) -> StorageResult<i64> {
        let mut response = self
            .db
            .query("UPSERT type::thing('sequences', $name) SET value += 1 RETURN AFTER")
            .bind(("name", sequence.to_string()))
            .await?;
        let rows: Vec<SequenceRow> = response.take(0)?;
        let id = rows
            .into_iter()
            .next()
            .map(|row| row.value)
            .ok_or_else(|| StorageError::Backend(format!("sequence {sequence} returned no row")))?;
        debug!(sequence, id, "allocated id");
        Ok(id)
    }
}

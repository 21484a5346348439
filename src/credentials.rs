// src/credentials.rs
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{NodeError, Result};
use crate::store::{DocumentStore, StoreConnector};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigurationType {
    #[default]
    ConnectionString,
    Values,
}

/// Stored MongoDB credentials, as loaded from YAML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub configuration_type: ConfigurationType,
    pub connection_string: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub tls: bool,
    pub ca_file: Option<PathBuf>,
    pub cert_key_file: Option<PathBuf>,
    /// Passphrase of an encrypted client key in `cert_key_file`.
    pub cert_key_password: Option<String>,
}

#[derive(Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub ca_file: Option<PathBuf>,
    pub cert_key_file: Option<PathBuf>,
    pub cert_key_password: Option<String>,
}

impl fmt::Debug for TlsFiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsFiles")
            .field("ca_file", &self.ca_file)
            .field("cert_key_file", &self.cert_key_file)
            .field("cert_key_password", &self.cert_key_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Connection string and database name ready for a [`StoreConnector`].
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedConnection {
    pub connection_string: String,
    pub database: String,
    pub tls: Option<TlsFiles>,
}

impl fmt::Debug for ResolvedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConnection")
            .field("connection_string", &"<redacted>")
            .field("database", &self.database)
            .field("tls", &self.tls)
            .finish()
    }
}

impl Credentials {
    pub fn from_uri(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Credentials {
            connection_string: Some(uri.into()),
            database: Some(database.into()),
            ..Default::default()
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {}", path.display(), e)))?;
        serde_yaml::from_str(&text).map_err(|e| NodeError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn resolve(&self) -> Result<ResolvedConnection> {
        let database = self
            .database
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        let connection_string = match self.configuration_type {
            ConfigurationType::ConnectionString => self
                .connection_string
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    NodeError::credentials(
                        "Cannot override credentials: valid MongoDB connection string not provided ",
                    )
                })?
                .to_string(),
            ConfigurationType::Values => self.parameterized_connection_string()?,
        };

        let tls = self.tls.then(|| TlsFiles {
            ca_file: self.ca_file.clone(),
            cert_key_file: self.cert_key_file.clone(),
            cert_key_password: self.cert_key_password.clone().filter(|p| !p.is_empty()),
        });

        Ok(ResolvedConnection {
            connection_string,
            database,
            tls,
        })
    }

    fn parameterized_connection_string(&self) -> Result<String> {
        let host = self
            .host
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| NodeError::credentials("MongoDB host not provided"))?;

        let auth = match self.user.as_deref().filter(|u| !u.is_empty()) {
            Some(user) => format!(
                "{}:{}@",
                urlencoding::encode(user),
                urlencoding::encode(self.password.as_deref().unwrap_or_default())
            ),
            None => String::new(),
        };

        Ok(match self.port {
            Some(port) => format!("mongodb://{}{}:{}", auth, host, port),
            None => format!("mongodb+srv://{}{}", auth, host),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "OK")]
    Ok,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialCheck {
    pub status: CheckStatus,
    pub message: String,
}

/// Connects, lists databases and confirms the configured one exists.
///
/// Never fails: every problem is reported through the returned status.
pub async fn check_credentials<K: StoreConnector>(connector: &K, credentials: &Credentials) -> CredentialCheck {
    match try_check(connector, credentials).await {
        Ok(()) => CredentialCheck {
            status: CheckStatus::Ok,
            message: "Connection successful!".to_string(),
        },
        Err(e) => {
            warn!(error = %e, "credential check failed");
            CredentialCheck {
                status: CheckStatus::Error,
                message: e.to_string(),
            }
        }
    }
}

async fn try_check<K: StoreConnector>(connector: &K, credentials: &Credentials) -> Result<()> {
    let resolved = credentials.resolve()?;
    let store = connector.connect(&resolved).await?;
    let outcome = database_exists(&store, &resolved.database).await;
    store.close().await;
    outcome
}

async fn database_exists<S: DocumentStore>(store: &S, database: &str) -> Result<()> {
    let names = store.list_database_names().await?;
    debug!(count = names.len(), "listed databases");
    if names.iter().any(|name| name == database) {
        Ok(())
    } else {
        Err(NodeError::credentials(format!("Database \"{}\" does not exist", database)))
    }
}

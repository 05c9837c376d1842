//! Secret stores that receive assembled credential bundles
//!
//! The contract is create-only: a name that already exists is an error,
//! never an overwrite.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, PostParams};
use kube::Client;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use crate::bundle::CredentialBundle;

/// Errors returned by a secret store
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A record with this name already exists
    #[error("secret {0} already exists")]
    AlreadyExists(String),

    /// The store refused the record
    #[error("secret store rejected {name}: {reason}")]
    Rejected {
        /// Record name
        name: String,
        /// Reason given by the store
        reason: String,
    },

    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

/// Destination for credential bundles
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Create a new record from `bundle`, failing if the name is taken
    async fn create(&self, bundle: &CredentialBundle) -> Result<(), PersistenceError>;
}

/// Stores bundles as Kubernetes secrets in one namespace
pub struct KubeSecretStore {
    api: Api<Secret>,
    namespace: String,
}

impl KubeSecretStore {
    /// Create a store writing to `namespace`
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            api: Api::namespaced(client, &namespace),
            namespace,
        }
    }
}

/// Translate a failed create into the store contract
fn map_create_error(name: &str, err: kube::Error) -> PersistenceError {
    match err {
        kube::Error::Api(e) if e.code == 409 => PersistenceError::AlreadyExists(name.to_string()),
        kube::Error::Api(e) if e.code == 403 || e.code == 422 => PersistenceError::Rejected {
            name: name.to_string(),
            reason: e.message,
        },
        e => e.into(),
    }
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn create(&self, bundle: &CredentialBundle) -> Result<(), PersistenceError> {
        let secret = bundle.to_secret(&self.namespace);

        self.api
            .create(&PostParams::default(), &secret)
            .await
            .map_err(|e| map_create_error(bundle.name(), e))?;

        debug!(secret = bundle.name(), namespace = %self.namespace, "created secret");
        Ok(())
    }
}

/// Keeps bundles in memory; used for dry runs and tests
#[derive(Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<BTreeMap<String, CredentialBundle>>,
}

impl InMemorySecretStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a stored bundle by name
    pub async fn get(&self, name: &str) -> Option<CredentialBundle> {
        self.secrets.read().await.get(name).cloned()
    }

    /// Names of every stored bundle, sorted
    pub async fn names(&self) -> Vec<String> {
        self.secrets.read().await.keys().cloned().collect()
    }

    /// Number of stored bundles
    pub async fn len(&self) -> usize {
        self.secrets.read().await.len()
    }

    /// Whether nothing has been stored
    pub async fn is_empty(&self) -> bool {
        self.secrets.read().await.is_empty()
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn create(&self, bundle: &CredentialBundle) -> Result<(), PersistenceError> {
        let mut secrets = self.secrets.write().await;
        if secrets.contains_key(bundle.name()) {
            return Err(PersistenceError::AlreadyExists(bundle.name().to_string()));
        }
        secrets.insert(bundle.name().to_string(), bundle.clone());
        Ok(())
    }
}

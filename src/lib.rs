//! etcd-tls - private CA and mTLS certificate provisioning for etcd clusters
//!
//! Bootstraps a root of trust and mints the client, server and peer
//! certificates an etcd cluster backing Vault needs for mutual TLS, then hands
//! each one to a secret store as a PEM bundle.
//!
//! # Architecture
//!
//! A provisioning run creates one CA and walks an ordered list of role
//! profiles. For each role it derives the certificate identity, issues a leaf
//! signed by the CA, packages key, certificate and CA certificate into a
//! bundle, and persists it. Runs are strictly sequential and stop at the first
//! failure.
//!
//! # Modules
//!
//! - [`pki`] - Key generation, the certificate authority, and leaf issuance
//! - [`profile`] - Role profiles and the cluster descriptor
//! - [`naming`] - Secret names, DNS names and labels for a Vault cluster
//! - [`bundle`] - PEM credential bundles and their Kubernetes secret form
//! - [`store`] - Create-only secret stores (Kubernetes and in-memory)
//! - [`provision`] - The orchestrator sequencing a run
//! - [`config`] - Provisioner configuration
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod bundle;
pub mod config;
pub mod error;
pub mod naming;
pub mod pki;
pub mod profile;
pub mod provision;
pub mod store;

pub use bundle::{CredentialBundle, FieldMap};
pub use config::ProvisionerConfig;
pub use error::Error;
pub use profile::{ClusterDescriptor, Role, RoleProfile};
pub use provision::{ProvisioningOrchestrator, ProvisioningReport, Stage};
pub use store::{InMemorySecretStore, KubeSecretStore, PersistenceError, SecretStore};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

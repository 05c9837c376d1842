//! Provisioning orchestrator
//!
//! A run is a linear sequence of stages:
//!
//! ```text
//! CreateCa -> Issue(client) -> Persist(client)
//!          -> Issue(server) -> Persist(server)
//!          -> Issue(peer)   -> Persist(peer)   -> done
//! ```
//!
//! The first failure stops the run. Nothing is retried and bundles that were
//! already persisted stay in place; the reconciliation loop calling
//! [`ProvisioningOrchestrator::provision`] repairs partial state on its next pass.

use std::fmt;

use tracing::{debug, error, info, instrument};

use crate::bundle::CredentialBundle;
use crate::config::ProvisionerConfig;
use crate::naming::labels_for_vault;
use crate::pki::{
    CertificateAuthority, CertificateIssuer, KeyGenerator, PkiError, RsaKeyGenerator,
    TrustRootProvider,
};
use crate::profile::{ClusterDescriptor, RoleProfile};
use crate::store::SecretStore;
use crate::Error;

/// One step of a provisioning run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// Generate or import the CA
    CreateCa,
    /// Issue and package the certificate for a role
    Issue(String),
    /// Hand a role's bundle to the secret store
    Persist(String),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateCa => f.write_str("create CA"),
            Self::Issue(role) => write!(f, "issue {} certificate", role),
            Self::Persist(role) => write!(f, "persist {} secret", role),
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningReport {
    /// Vault cluster the secrets belong to
    pub cluster: String,
    /// Namespace of the cluster
    pub namespace: String,
    /// Persisted secret names, in provisioning order
    pub secrets: Vec<String>,
}

/// Sequences CA creation, issuance, packaging and persistence
pub struct ProvisioningOrchestrator<S> {
    config: ProvisionerConfig,
    trust_root: TrustRootProvider,
    keys: Box<dyn KeyGenerator>,
    store: S,
}

impl<S: SecretStore> ProvisioningOrchestrator<S> {
    /// Create an orchestrator that generates a fresh CA for every run
    pub fn new(config: ProvisionerConfig, store: S) -> Result<Self, Error> {
        config.validate()?;
        let keys = RsaKeyGenerator::new(config.key_bits)
            .map_err(|e| Error::config(e.to_string()))?;

        Ok(Self {
            config,
            trust_root: TrustRootProvider::default(),
            keys: Box::new(keys),
            store,
        })
    }

    /// Use a different root of trust
    pub fn with_trust_root(mut self, trust_root: TrustRootProvider) -> Self {
        self.trust_root = trust_root;
        self
    }

    /// Use a different key source
    pub fn with_key_generator(mut self, keys: impl KeyGenerator + 'static) -> Self {
        self.keys = Box::new(keys);
        self
    }

    /// Active configuration
    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    /// The secret store bundles are handed to
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Ordered stages a run walks through
    pub fn plan(&self) -> Vec<Stage> {
        std::iter::once(Stage::CreateCa)
            .chain(self.config.roles.iter().flat_map(|role| {
                [
                    Stage::Issue(role.name.clone()),
                    Stage::Persist(role.name.clone()),
                ]
            }))
            .collect()
    }

    fn establish_ca(&self) -> Result<CertificateAuthority, Error> {
        self.trust_root
            .establish(
                &self.config.ca_cert_config(),
                self.config.ca_validity_days,
                self.keys.as_ref(),
            )
            .map_err(|e| Error::pki(Stage::CreateCa, e))
    }

    fn build_bundle(
        &self,
        ca: &CertificateAuthority,
        role: &RoleProfile,
        cluster: &ClusterDescriptor,
    ) -> Result<CredentialBundle, Error> {
        let stage = || Stage::Issue(role.name.clone());

        let cert_config = self.config.profile_builder().build(role, cluster);
        let issued = CertificateIssuer::new(ca, self.keys.as_ref(), self.config.cert_validity_days)
            .issue(&cert_config)
            .map_err(|e| Error::pki(stage(), e))?;

        CredentialBundle::assemble(
            role.name.clone(),
            role.secret_name(cluster),
            labels_for_vault(&cluster.name),
            &issued,
            ca.ca_cert_pem(),
            &role.fields,
        )
        .map_err(|e: PkiError| Error::pki(stage(), e))
    }

    /// Construct every bundle for `cluster` without persisting anything
    ///
    /// Each call creates a new CA, so two calls with the same input yield
    /// structurally identical but cryptographically distinct bundles.
    pub fn build_bundles(
        &self,
        cluster: &ClusterDescriptor,
    ) -> Result<Vec<CredentialBundle>, Error> {
        let ca = self.establish_ca()?;
        self.config
            .roles
            .iter()
            .map(|role| self.build_bundle(&ca, role, cluster))
            .collect()
    }

    /// Create the CA, then issue and persist one bundle per role, in order
    #[instrument(
        skip(self, cluster),
        fields(cluster = %cluster.name, namespace = %cluster.namespace)
    )]
    pub async fn provision(
        &self,
        cluster: &ClusterDescriptor,
    ) -> Result<ProvisioningReport, Error> {
        info!(roles = self.config.roles.len(), "preparing etcd TLS secrets");

        let ca = self.establish_ca().map_err(|e| {
            error!(error = %e, "CA creation failed");
            e
        })?;
        debug!("CA ready");

        let mut secrets = Vec::with_capacity(self.config.roles.len());
        for role in &self.config.roles {
            let bundle = self.build_bundle(&ca, role, cluster).map_err(|e| {
                error!(role = %role.name, error = %e, "certificate issuance failed");
                e
            })?;

            self.store.create(&bundle).await.map_err(|e| {
                error!(
                    role = %role.name,
                    secret = bundle.name(),
                    error = %e,
                    "failed to persist secret"
                );
                Error::persistence(Stage::Persist(role.name.clone()), e)
            })?;

            info!(role = %role.name, secret = bundle.name(), "created TLS secret");
            secrets.push(bundle.name().to_string());
        }

        info!(secrets = secrets.len(), "etcd TLS secrets prepared");

        Ok(ProvisioningReport {
            cluster: cluster.name.clone(),
            namespace: cluster.namespace.clone(),
            secrets,
        })
    }
}

//! Provisioner configuration
//!
//! Everything that used to be a process-wide constant (organization, CA
//! identity, default domain, key size, validity, the role list) is carried
//! here and handed to the orchestrator when it is built.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::pki::{
    CertConfig, CA_VALIDITY_DAYS, CERT_VALIDITY_DAYS, DEFAULT_KEY_BITS, MIN_KEY_BITS,
};
use crate::profile::{RoleProfile, RoleProfileBuilder, DEFAULT_CLUSTER_DOMAIN};
use crate::Error;

/// Organization stamped on every certificate
pub const DEFAULT_ORGANIZATION: &str = "coreos.com";

/// Common name of the generated CA
pub const DEFAULT_CA_COMMON_NAME: &str = "vault operator CA";

/// Configuration for a provisioning run
///
/// Every field has a default, so an empty YAML document is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProvisionerConfig {
    /// Subject organization for the CA and every leaf
    pub organization: Vec<String>,
    /// Common name of the generated CA
    pub ca_common_name: String,
    /// Cluster domain used when the descriptor has none
    pub default_cluster_domain: String,
    /// RSA modulus size for every generated key
    pub key_bits: usize,
    /// Lifetime of the generated CA in days
    pub ca_validity_days: i64,
    /// Lifetime of leaf certificates in days
    pub cert_validity_days: i64,
    /// Roles to provision, in order
    pub roles: Vec<RoleProfile>,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            organization: vec![DEFAULT_ORGANIZATION.to_string()],
            ca_common_name: DEFAULT_CA_COMMON_NAME.to_string(),
            default_cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
            key_bits: DEFAULT_KEY_BITS,
            ca_validity_days: CA_VALIDITY_DAYS,
            cert_validity_days: CERT_VALIDITY_DAYS,
            roles: RoleProfile::defaults(),
        }
    }
}

impl ProvisionerConfig {
    /// Parse a config from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid provisioner config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML config file
    pub fn from_file(path: &Path) -> Result<Self, Error> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&yaml)
    }

    /// Reject configurations that cannot produce a sound run
    pub fn validate(&self) -> Result<(), Error> {
        if self.organization.len() != 1 || self.organization[0].is_empty() {
            return Err(Error::config(format!(
                "organization must hold exactly one non-empty entry, got {:?}",
                self.organization
            )));
        }
        if self.ca_common_name.is_empty() {
            return Err(Error::config("CA common name must not be empty"));
        }
        if self.default_cluster_domain.is_empty() {
            return Err(Error::config("default cluster domain must not be empty"));
        }
        if self.key_bits < MIN_KEY_BITS {
            return Err(Error::config(format!(
                "key size {} is below the minimum of {} bits",
                self.key_bits, MIN_KEY_BITS
            )));
        }
        if self.ca_validity_days <= 0 || self.cert_validity_days <= 0 {
            return Err(Error::config("validity periods must be positive"));
        }
        if self.cert_validity_days > self.ca_validity_days {
            return Err(Error::config("leaf validity must not exceed CA validity"));
        }
        if self.roles.is_empty() {
            return Err(Error::config("at least one role must be configured"));
        }

        let mut seen = HashSet::new();
        for role in &self.roles {
            if role.name.is_empty() || role.common_name.is_empty() {
                return Err(Error::config("role name and common name must not be empty"));
            }
            if !seen.insert(role.name.as_str()) {
                return Err(Error::config(format!("duplicate role '{}'", role.name)));
            }
            role.fields
                .validate()
                .map_err(|e| Error::config(format!("role '{}': {}", role.name, e)))?;
        }
        Ok(())
    }

    /// Subject of the generated CA
    pub fn ca_cert_config(&self) -> CertConfig {
        CertConfig::new(self.ca_common_name.clone(), &self.organization)
    }

    /// Builder deriving leaf identities under this config
    pub fn profile_builder(&self) -> RoleProfileBuilder {
        RoleProfileBuilder::new(
            self.organization.clone(),
            self.default_cluster_domain.clone(),
        )
    }
}

//! Role profiles: which identity each etcd role's certificate carries
//!
//! The three built-in roles differ only in data:
//!
//! - **client** authenticates the caller, so it carries no network names
//! - **server** must answer on each member address and on the client service
//! - **peer** only talks member-to-member
//!
//! A role is a [`RoleProfile`] value; the orchestrator walks an ordered list of
//! them, so adding a role never touches control flow.

use serde::{Deserialize, Serialize};

use crate::bundle::FieldMap;
use crate::naming;
use crate::pki::CertConfig;

/// Cluster domain used when a descriptor does not name one
pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

/// The Vault cluster whose etcd certificates are being provisioned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterDescriptor {
    /// Vault cluster name
    pub name: String,
    /// Namespace the cluster lives in
    pub namespace: String,
    /// Kubernetes cluster DNS domain, falls back to the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_domain: Option<String>,
}

impl ClusterDescriptor {
    /// Describe a cluster using the default cluster domain
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            cluster_domain: None,
        }
    }

    /// Override the cluster domain
    pub fn with_cluster_domain(mut self, domain: impl Into<String>) -> Self {
        self.cluster_domain = Some(domain.into());
        self
    }
}

/// Which network names a role's certificate is valid for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AltNamePolicy {
    /// No alternative names
    None,
    /// `localhost`, every member, and the client service
    MembersAndClientService,
    /// Every member only
    Members,
}

/// Declarative description of one certificate role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleProfile {
    /// Short role name, used in the secret name and logs
    pub name: String,
    /// Certificate common name
    pub common_name: String,
    /// Alternative names to encode
    pub alt_names: AltNamePolicy,
    /// Output field names in the bundle
    pub fields: FieldMap,
}

impl RoleProfile {
    /// Profile for etcd clients
    pub fn client() -> Self {
        Self {
            name: "client".to_string(),
            common_name: "etcd client".to_string(),
            alt_names: AltNamePolicy::None,
            fields: FieldMap::new("etcd-client.key", "etcd-client.crt", "etcd-client-ca.crt"),
        }
    }

    /// Profile for etcd servers
    pub fn server() -> Self {
        Self {
            name: "server".to_string(),
            common_name: "etcd server".to_string(),
            alt_names: AltNamePolicy::MembersAndClientService,
            fields: FieldMap::new("server.key", "server.crt", "server-ca.crt"),
        }
    }

    /// Profile for etcd peer traffic
    pub fn peer() -> Self {
        Self {
            name: "peer".to_string(),
            common_name: "etcd peer".to_string(),
            alt_names: AltNamePolicy::Members,
            fields: FieldMap::new("peer.key", "peer.crt", "peer-ca.crt"),
        }
    }

    /// Built-in profiles in provisioning order
    pub fn defaults() -> Vec<Self> {
        Role::ALL.into_iter().map(Role::profile).collect()
    }

    /// Name of the secret this role is stored under
    pub fn secret_name(&self, cluster: &ClusterDescriptor) -> String {
        naming::etcd_tls_secret_name(&cluster.name, &self.name)
    }
}

/// Built-in etcd roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Client-to-server authentication
    Client,
    /// Server identity
    Server,
    /// Member-to-member traffic
    Peer,
}

impl Role {
    /// Every built-in role, in provisioning order
    pub const ALL: [Role; 3] = [Role::Client, Role::Server, Role::Peer];

    /// The declarative profile for this role
    pub fn profile(self) -> RoleProfile {
        match self {
            Self::Client => RoleProfile::client(),
            Self::Server => RoleProfile::server(),
            Self::Peer => RoleProfile::peer(),
        }
    }
}

/// Derives a role's [`CertConfig`] from cluster naming conventions
#[derive(Debug, Clone)]
pub struct RoleProfileBuilder {
    organization: Vec<String>,
    default_cluster_domain: String,
}

impl RoleProfileBuilder {
    /// Create a builder stamping `organization` on every certificate
    pub fn new(organization: Vec<String>, default_cluster_domain: impl Into<String>) -> Self {
        Self {
            organization,
            default_cluster_domain: default_cluster_domain.into(),
        }
    }

    /// Build the certificate identity for `profile` in `cluster`
    pub fn build(&self, profile: &RoleProfile, cluster: &ClusterDescriptor) -> CertConfig {
        let domain = cluster
            .cluster_domain
            .as_deref()
            .unwrap_or(&self.default_cluster_domain);

        let alt_names = match profile.alt_names {
            AltNamePolicy::None => Vec::new(),
            AltNamePolicy::MembersAndClientService => vec![
                "localhost".to_string(),
                naming::member_wildcard_dns(&cluster.name, &cluster.namespace, domain),
                naming::client_service_dns(&cluster.name, &cluster.namespace, domain),
            ],
            AltNamePolicy::Members => vec![naming::member_wildcard_dns(
                &cluster.name,
                &cluster.namespace,
                domain,
            )],
        };

        CertConfig::new(profile.common_name.clone(), &self.organization).with_alt_names(alt_names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn builder() -> RoleProfileBuilder {
        RoleProfileBuilder::new(vec!["coreos.com".to_string()], DEFAULT_CLUSTER_DOMAIN)
    }

    fn cluster() -> ClusterDescriptor {
        ClusterDescriptor::new("vault1", "ns1")
    }

    fn alt_name_set(config: &CertConfig) -> BTreeSet<&str> {
        config.alt_names.iter().map(String::as_str).collect()
    }

    #[test]
    fn client_profile_has_no_alt_names() {
        let config = builder().build(&Role::Client.profile(), &cluster());
        assert_eq!(config.common_name, "etcd client");
        assert!(config.alt_names.is_empty());
    }

    #[test]
    fn server_profile_covers_members_and_client_service() {
        let config = builder().build(&Role::Server.profile(), &cluster());
        assert_eq!(config.common_name, "etcd server");
        assert_eq!(
            alt_name_set(&config),
            BTreeSet::from([
                "localhost",
                "*.vault1-etcd.ns1.svc.cluster.local",
                "vault1-etcd-client.ns1.svc.cluster.local",
            ])
        );
    }

    #[test]
    fn peer_profile_covers_members_only() {
        let config = builder().build(&Role::Peer.profile(), &cluster());
        assert_eq!(config.common_name, "etcd peer");
        assert_eq!(
            alt_name_set(&config),
            BTreeSet::from(["*.vault1-etcd.ns1.svc.cluster.local"])
        );
    }

    #[test]
    fn organization_is_stamped_on_every_role() {
        for profile in RoleProfile::defaults() {
            let config = builder().build(&profile, &cluster());
            assert_eq!(config.organization, vec!["coreos.com".to_string()]);
        }
    }

    #[test]
    fn descriptor_domain_overrides_default() {
        let cluster = cluster().with_cluster_domain("corp.internal");
        let config = builder().build(&Role::Peer.profile(), &cluster);
        assert_eq!(
            config.alt_names,
            vec!["*.vault1-etcd.ns1.svc.corp.internal"]
        );
    }

    #[test]
    fn builder_default_domain_is_configurable() {
        let builder = RoleProfileBuilder::new(vec!["example.org".to_string()], "edge.local");
        let config = builder.build(&Role::Peer.profile(), &cluster());
        assert_eq!(config.alt_names, vec!["*.vault1-etcd.ns1.svc.edge.local"]);
        assert_eq!(config.organization, vec!["example.org".to_string()]);
    }

    #[test]
    fn defaults_are_ordered_client_server_peer() {
        let names: Vec<_> = RoleProfile::defaults().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["client", "server", "peer"]);
    }

    #[test]
    fn built_in_roles_match_their_naming_helpers() {
        let cluster = cluster();
        let expected = [
            naming::etcd_client_tls_secret_name("vault1"),
            naming::etcd_server_tls_secret_name("vault1"),
            naming::etcd_peer_tls_secret_name("vault1"),
        ];
        for (role, name) in Role::ALL.into_iter().zip(expected) {
            assert_eq!(role.profile().secret_name(&cluster), name);
        }
    }

    #[test]
    fn secret_names_come_from_role_name() {
        let cluster = cluster();
        assert_eq!(
            RoleProfile::client().secret_name(&cluster),
            "vault1-etcd-client-tls"
        );
        assert_eq!(
            RoleProfile::server().secret_name(&cluster),
            "vault1-etcd-server-tls"
        );
        assert_eq!(
            RoleProfile::peer().secret_name(&cluster),
            "vault1-etcd-peer-tls"
        );
    }

    #[test]
    fn extra_roles_are_plain_data() {
        let metrics = RoleProfile {
            name: "metrics".to_string(),
            common_name: "etcd metrics".to_string(),
            alt_names: AltNamePolicy::Members,
            fields: FieldMap::new("metrics.key", "metrics.crt", "metrics-ca.crt"),
        };
        let config = builder().build(&metrics, &cluster());
        assert_eq!(config.common_name, "etcd metrics");
        assert_eq!(metrics.secret_name(&cluster()), "vault1-etcd-metrics-tls");
    }
}

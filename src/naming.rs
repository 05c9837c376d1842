//! Naming conventions for Vault-backed etcd clusters
//!
//! Every name here is derived from the Vault cluster name alone (plus the
//! namespace and cluster domain for DNS names). The functions are pure and
//! never fail; validating the inputs is the caller's job.

use std::collections::BTreeMap;

/// Label key identifying the application
pub const APP_LABEL_KEY: &str = "app";

/// Label value identifying Vault resources
pub const APP_LABEL_VALUE: &str = "vault";

/// Label key carrying the owning Vault cluster name
pub const VAULT_CLUSTER_LABEL_KEY: &str = "vault_cluster";

/// Name of the etcd cluster backing a Vault cluster
pub fn etcd_name_for_vault(vault_name: &str) -> String {
    format!("{}-etcd", vault_name)
}

/// Name of the TLS secret for one etcd role
pub fn etcd_tls_secret_name(vault_name: &str, role: &str) -> String {
    format!("{}-etcd-{}-tls", vault_name, role)
}

/// Secret holding the etcd client TLS assets
pub fn etcd_client_tls_secret_name(vault_name: &str) -> String {
    etcd_tls_secret_name(vault_name, "client")
}

/// Secret holding the etcd server TLS assets
pub fn etcd_server_tls_secret_name(vault_name: &str) -> String {
    etcd_tls_secret_name(vault_name, "server")
}

/// Secret holding the etcd peer TLS assets
pub fn etcd_peer_tls_secret_name(vault_name: &str) -> String {
    etcd_tls_secret_name(vault_name, "peer")
}

/// Wildcard DNS name matching every etcd member pod
pub fn member_wildcard_dns(vault_name: &str, namespace: &str, cluster_domain: &str) -> String {
    format!(
        "*.{}.{}.svc.{}",
        etcd_name_for_vault(vault_name),
        namespace,
        cluster_domain
    )
}

/// DNS name of the client-facing etcd service
pub fn client_service_dns(vault_name: &str, namespace: &str, cluster_domain: &str) -> String {
    format!(
        "{}-client.{}.svc.{}",
        etcd_name_for_vault(vault_name),
        namespace,
        cluster_domain
    )
}

/// Labels attached to every resource owned by a Vault cluster
pub fn labels_for_vault(vault_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (APP_LABEL_KEY.to_string(), APP_LABEL_VALUE.to_string()),
        (VAULT_CLUSTER_LABEL_KEY.to_string(), vault_name.to_string()),
    ])
}

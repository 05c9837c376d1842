//! Credential bundles: PEM key material packaged for a secret store

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::pki::{IssuedCertificate, PkiError};

/// Output field names for the three parts of a bundle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMap {
    /// Field holding the leaf private key
    pub key: String,
    /// Field holding the leaf certificate
    pub cert: String,
    /// Field holding the CA certificate
    pub ca: String,
}

impl FieldMap {
    /// Create a field map
    pub fn new(key: impl Into<String>, cert: impl Into<String>, ca: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            cert: cert.into(),
            ca: ca.into(),
        }
    }

    /// Check that every field is named and no two fields collide
    pub fn validate(&self) -> Result<(), String> {
        let names = [&self.key, &self.cert, &self.ca];
        if names.iter().any(|n| n.is_empty()) {
            return Err("field names must not be empty".to_string());
        }
        if self.key == self.cert || self.key == self.ca || self.cert == self.ca {
            return Err(format!(
                "field names must be distinct, got key={} cert={} ca={}",
                self.key, self.cert, self.ca
            ));
        }
        Ok(())
    }
}

/// A named, labelled set of PEM fields ready to hand to a secret store
///
/// Field contents are zeroized on drop and never printed by `Debug`.
#[derive(Clone)]
pub struct CredentialBundle {
    role: String,
    name: String,
    labels: BTreeMap<String, String>,
    data: BTreeMap<String, Zeroizing<Vec<u8>>>,
}

impl CredentialBundle {
    /// Encode a leaf key, its certificate and the CA certificate into a bundle
    ///
    /// Only the CA *certificate* is accepted, so the CA key cannot end up in
    /// a bundle.
    pub fn assemble(
        role: impl Into<String>,
        name: impl Into<String>,
        labels: BTreeMap<String, String>,
        issued: &IssuedCertificate,
        ca_cert_pem: &str,
        fields: &FieldMap,
    ) -> Result<Self, PkiError> {
        let key_pem = issued.key().to_pkcs1_pem()?;

        let data = BTreeMap::from([
            (
                fields.key.clone(),
                Zeroizing::new(key_pem.as_bytes().to_vec()),
            ),
            (
                fields.cert.clone(),
                Zeroizing::new(issued.cert_pem().as_bytes().to_vec()),
            ),
            (
                fields.ca.clone(),
                Zeroizing::new(ca_cert_pem.as_bytes().to_vec()),
            ),
        ]);

        Ok(Self {
            role: role.into(),
            name: name.into(),
            labels,
            data,
        })
    }

    /// Role this bundle was issued for
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Target record name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Labels for the storage collaborator
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Raw bytes of one field
    pub fn field(&self, name: &str) -> Option<&[u8]> {
        self.data.get(name).map(|v| v.as_slice())
    }

    /// One field decoded as UTF-8 PEM text
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(|b| std::str::from_utf8(b).ok())
    }

    /// Field names in sorted order
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    /// Render as an `Opaque` Kubernetes secret in `namespace`
    pub fn to_secret(&self, namespace: &str) -> Secret {
        let data = self
            .data
            .iter()
            .map(|(k, v)| (k.clone(), ByteString(v.to_vec())))
            .collect();

        Secret {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(namespace.to_string()),
                labels: Some(self.labels.clone()),
                ..Default::default()
            },
            type_: Some("Opaque".to_string()),
            data: Some(data),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("role", &self.role)
            .field("name", &self.name)
            .field("labels", &self.labels)
            .field("fields", &self.data.keys().collect::<Vec<_>>())
            .finish()
    }
}

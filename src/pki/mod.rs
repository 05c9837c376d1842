//! PKI operations for etcd mTLS certificates
//!
//! This module owns the root of trust and the leaf certificates signed by it.
//! A provisioning run creates (or imports) exactly one CA and uses it to sign
//! the client, server and peer certificates for one etcd cluster.
//!
//! # Security Model
//!
//! - The CA key pair exists only in memory for the duration of a run
//! - The CA key has no public PEM accessor; only the CA certificate is distributed
//! - Every leaf gets a freshly generated RSA key
//! - Leaf certificates carry both client and server auth extended key usage

mod authority;
mod issuer;
mod key;

pub use authority::{CertificateAuthority, TrustRootProvider};
pub use issuer::{CertificateIssuer, IssuedCertificate};
pub use key::{KeyGenerator, PrivateKey, RsaKeyGenerator, DEFAULT_KEY_BITS, MIN_KEY_BITS};

#[cfg(test)]
pub use key::MockKeyGenerator;

use std::net::IpAddr;

use rand::RngCore;
use rcgen::{string::Ia5String, DistinguishedName, DnType, DnValue, SanType, SerialNumber};
use thiserror::Error;
use x509_parser::prelude::*;

/// Default validity period for CA certificates (10 years)
pub const CA_VALIDITY_DAYS: i64 = 10 * 365;

/// Default validity period for leaf certificates (1 year)
pub const CERT_VALIDITY_DAYS: i64 = 365;

/// PKI errors
#[derive(Debug, Error)]
pub enum PkiError {
    /// RSA key generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// The root of trust could not be generated or imported
    #[error("CA initialization failed: {0}")]
    CaInitialization(#[source] Box<PkiError>),

    /// A leaf certificate could not be issued
    #[error("certificate issuance failed: {0}")]
    CertificateIssuance(#[source] Box<PkiError>),

    /// Building or signing a certificate failed
    #[error("certificate signing failed: {0}")]
    Signing(String),

    /// Key or certificate could not be encoded
    #[error("encoding failed: {0}")]
    Encoding(String),

    /// Certificate parsing error
    #[error("certificate parsing error: {0}")]
    ParseError(String),

    /// Subject fields cannot be represented in a certificate
    #[error("invalid subject: {0}")]
    InvalidSubject(String),

    /// Imported CA material is unusable
    #[error("invalid CA: {0}")]
    InvalidCa(String),
}

impl PkiError {
    /// Wrap a failure that happened while establishing the CA
    pub fn ca_initialization(source: PkiError) -> Self {
        Self::CaInitialization(Box::new(source))
    }

    /// Wrap a failure that happened while issuing a leaf certificate
    pub fn certificate_issuance(source: PkiError) -> Self {
        Self::CertificateIssuance(Box::new(source))
    }
}

/// Result type for PKI operations
pub type Result<T> = std::result::Result<T, PkiError>;

/// Identity encoded into a certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertConfig {
    /// Subject common name
    pub common_name: String,
    /// Subject organization, in order
    pub organization: Vec<String>,
    /// Subject alternative names (DNS names or IP addresses)
    pub alt_names: Vec<String>,
}

impl CertConfig {
    /// Create a config without alternative names
    pub fn new(common_name: impl Into<String>, organization: &[String]) -> Self {
        Self {
            common_name: common_name.into(),
            organization: organization.to_vec(),
            alt_names: Vec::new(),
        }
    }

    /// Attach alternative names
    pub fn with_alt_names<I, S>(mut self, alt_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alt_names = alt_names.into_iter().map(Into::into).collect();
        self
    }

    /// Build the subject distinguished name
    ///
    /// X.509 allows several O attributes but rcgen keeps one value per
    /// attribute type, so more than one organization is rejected rather
    /// than silently truncated.
    pub(crate) fn distinguished_name(&self) -> Result<DistinguishedName> {
        let mut dn = DistinguishedName::new();
        dn.push(
            DnType::CommonName,
            DnValue::Utf8String(self.common_name.clone()),
        );
        match self.organization.as_slice() {
            [] => {}
            [org] => dn.push(DnType::OrganizationName, DnValue::Utf8String(org.clone())),
            orgs => {
                return Err(PkiError::InvalidSubject(format!(
                    "expected at most one organization, got {}",
                    orgs.len()
                )));
            }
        }
        Ok(dn)
    }

    /// Convert alternative names into SAN entries, IPs first-class
    pub(crate) fn subject_alt_names(&self) -> Result<Vec<SanType>> {
        self.alt_names
            .iter()
            .map(|san| {
                if let Ok(ip) = san.parse::<IpAddr>() {
                    Ok(SanType::IpAddress(ip))
                } else {
                    Ia5String::try_from(san.to_string())
                        .map(SanType::DnsName)
                        .map_err(|e| {
                            PkiError::InvalidSubject(format!("invalid DNS name '{}': {}", san, e))
                        })
                }
            })
            .collect()
    }
}

/// Compute a validity window starting now
fn compute_validity(days: i64) -> (::time::OffsetDateTime, ::time::OffsetDateTime) {
    let now = ::time::OffsetDateTime::now_utc();
    let not_after = now + ::time::Duration::days(days);
    (now, not_after)
}

/// Random positive 128-bit serial number
fn random_serial() -> SerialNumber {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    // DER INTEGER must stay positive
    bytes[0] &= 0x7f;
    SerialNumber::from(bytes.to_vec())
}

/// Parse PEM-encoded data and return the DER bytes
pub fn parse_pem(pem_data: &str) -> Result<Vec<u8>> {
    let pem_obj = ::pem::parse(pem_data.as_bytes())
        .map_err(|e| PkiError::ParseError(format!("failed to parse PEM: {}", e)))?;
    Ok(pem_obj.contents().to_vec())
}

/// Decoded view of a certificate, for inspection and verification
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    /// Subject common name
    pub common_name: String,
    /// Subject organizations
    pub organizations: Vec<String>,
    /// Issuer common name
    pub issuer_common_name: String,
    /// DNS subject alternative names
    pub dns_names: Vec<String>,
    /// IP subject alternative names
    pub ip_addresses: Vec<IpAddr>,
    /// Whether basic constraints mark this certificate as a CA
    pub is_ca: bool,
    /// Extended key usage permits TLS client authentication
    pub client_auth: bool,
    /// Extended key usage permits TLS server authentication
    pub server_auth: bool,
    /// Serial number as uppercase hex
    pub serial_hex: String,
    /// When the certificate becomes valid (Unix timestamp)
    pub not_before: i64,
    /// When the certificate expires (Unix timestamp)
    pub not_after: i64,
}

impl CertificateInfo {
    /// Parse certificate info from PEM-encoded certificate
    pub fn from_pem(pem_data: &str) -> Result<Self> {
        let der = parse_pem(pem_data)?;
        Self::from_der(&der)
    }

    /// Parse certificate info from DER-encoded certificate
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let (_, cert) = X509Certificate::from_der(der)
            .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;

        let first_cn = |name: &X509Name<'_>| {
            name.iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .unwrap_or("")
                .to_string()
        };

        let organizations = cert
            .subject()
            .iter_organization()
            .filter_map(|o| o.as_str().ok())
            .map(str::to_string)
            .collect();

        let mut dns_names = Vec::new();
        let mut ip_addresses = Vec::new();
        if let Ok(Some(san)) = cert.subject_alternative_name() {
            for name in &san.value.general_names {
                match name {
                    GeneralName::DNSName(dns) => dns_names.push(dns.to_string()),
                    GeneralName::IPAddress(bytes) => {
                        if let Some(ip) = ip_from_bytes(bytes) {
                            ip_addresses.push(ip);
                        }
                    }
                    _ => {}
                }
            }
        }

        let is_ca = matches!(cert.basic_constraints(), Ok(Some(bc)) if bc.value.ca);
        let (client_auth, server_auth) = match cert.extended_key_usage() {
            Ok(Some(eku)) => (eku.value.client_auth, eku.value.server_auth),
            _ => (false, false),
        };

        let serial_hex = cert
            .raw_serial()
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect();

        Ok(Self {
            common_name: first_cn(cert.subject()),
            organizations,
            issuer_common_name: first_cn(cert.issuer()),
            dns_names,
            ip_addresses,
            is_ca,
            client_auth,
            server_auth,
            serial_hex,
            not_before: cert.validity().not_before.timestamp(),
            not_after: cert.validity().not_after.timestamp(),
        })
    }

    /// Total lifetime of the certificate in seconds
    pub fn lifetime_secs(&self) -> i64 {
        self.not_after - self.not_before
    }
}

fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(IpAddr::from),
        _ => None,
    }
}

/// Check that `cert_pem` was signed by the CA in `ca_cert_pem`
///
/// Returns `Ok(false)` when the issuer name or signature does not match,
/// and an error only when either input cannot be parsed.
pub fn verify_signed_by(cert_pem: &str, ca_cert_pem: &str) -> Result<bool> {
    let cert_der = parse_pem(cert_pem)?;
    let (_, cert) = X509Certificate::from_der(&cert_der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse certificate: {}", e)))?;

    let ca_der = parse_pem(ca_cert_pem)?;
    let (_, ca_cert) = X509Certificate::from_der(&ca_der)
        .map_err(|e| PkiError::ParseError(format!("failed to parse CA cert: {}", e)))?;

    if cert.issuer().as_raw() != ca_cert.subject().as_raw() {
        return Ok(false);
    }

    Ok(cert.verify_signature(Some(ca_cert.public_key())).is_ok())
}

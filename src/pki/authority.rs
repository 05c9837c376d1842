//! Root of trust: a self-signed or imported certificate authority

use ::time::OffsetDateTime;
use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyUsagePurpose};
use tracing::debug;
use x509_parser::prelude::*;
use zeroize::Zeroizing;

use super::{
    compute_validity, parse_pem, random_serial, CertConfig, CertificateInfo, KeyGenerator,
    PkiError, PrivateKey, Result,
};

/// Certificate Authority used to sign every leaf of one provisioning run
///
/// The private key has no PEM accessor. Only the CA certificate leaves
/// this type.
pub struct CertificateAuthority {
    key: PrivateKey,
    ca_cert_pem: String,
    not_after: OffsetDateTime,
}

impl CertificateAuthority {
    /// Create a new self-signed CA
    ///
    /// `config` supplies the subject; alternative names are ignored since a
    /// root is never addressed by network name.
    pub fn generate(
        config: &CertConfig,
        validity_days: i64,
        keys: &dyn KeyGenerator,
    ) -> Result<Self> {
        Self::build(config, validity_days, keys).map_err(PkiError::ca_initialization)
    }

    fn build(config: &CertConfig, validity_days: i64, keys: &dyn KeyGenerator) -> Result<Self> {
        let mut params = CertificateParams::default();
        params.distinguished_name = config.distinguished_name()?;

        // CA settings
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];
        params.serial_number = Some(random_serial());

        let (not_before, not_after) = compute_validity(validity_days);
        params.not_before = not_before;
        params.not_after = not_after;

        let key = keys.generate()?;
        let signing_key = key.signing_key()?;

        let cert = params
            .self_signed(&signing_key)
            .map_err(|e| PkiError::Signing(format!("failed to create CA cert: {}", e)))?;

        debug!(common_name = %config.common_name, "generated self-signed CA");

        Ok(Self {
            key,
            ca_cert_pem: cert.pem(),
            not_after,
        })
    }

    /// Load an externally supplied CA from PEM
    ///
    /// The certificate must be marked as a CA, must not have expired, must
    /// permit certificate signing if it restricts key usage, and must carry
    /// the public half of `key_pem`.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        Self::import(cert_pem, key_pem).map_err(PkiError::ca_initialization)
    }

    fn import(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let key = PrivateKey::from_pem(key_pem)?;

        let der = parse_pem(cert_pem)?;
        let (_, cert) = X509Certificate::from_der(&der)
            .map_err(|e| PkiError::ParseError(format!("failed to parse CA cert: {}", e)))?;

        if !matches!(cert.basic_constraints(), Ok(Some(bc)) if bc.value.ca) {
            return Err(PkiError::InvalidCa("certificate is not marked as a CA".to_string()));
        }

        let not_after = OffsetDateTime::from_unix_timestamp(cert.validity().not_after.timestamp())
            .map_err(|e| PkiError::ParseError(format!("invalid CA expiry: {}", e)))?;
        if not_after <= OffsetDateTime::now_utc() {
            return Err(PkiError::InvalidCa(format!("certificate expired at {}", not_after)));
        }

        if matches!(cert.key_usage(), Ok(Some(ku)) if !ku.value.key_cert_sign()) {
            return Err(PkiError::InvalidCa(
                "key usage does not permit certificate signing".to_string(),
            ));
        }

        if !key.matches_public_key_der(cert.public_key().raw) {
            return Err(PkiError::InvalidCa(
                "private key does not match CA certificate".to_string(),
            ));
        }

        debug!("imported external CA");

        Ok(Self {
            key,
            ca_cert_pem: cert_pem.to_string(),
            not_after,
        })
    }

    /// Get the CA certificate in PEM format (for distribution in bundles)
    pub fn ca_cert_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// When the CA certificate expires; no leaf may outlive it
    pub fn not_after(&self) -> OffsetDateTime {
        self.not_after
    }

    /// Get certificate info (subject, validity, etc.)
    pub fn cert_info(&self) -> Result<CertificateInfo> {
        CertificateInfo::from_pem(&self.ca_cert_pem)
    }

    pub(crate) fn private_key(&self) -> &PrivateKey {
        &self.key
    }
}

impl std::fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Where the root of trust for a provisioning run comes from
#[derive(Clone)]
pub enum TrustRootProvider {
    /// Generate a fresh self-signed CA for every run
    GenerateSelfSigned,
    /// Use a CA supplied by the user
    ImportExternal {
        /// CA certificate PEM
        cert_pem: String,
        /// CA private key PEM (zeroized on drop)
        key_pem: Zeroizing<String>,
    },
}

impl TrustRootProvider {
    /// Build a provider for an external CA
    pub fn import(cert_pem: impl Into<String>, key_pem: impl Into<String>) -> Self {
        Self::ImportExternal {
            cert_pem: cert_pem.into(),
            key_pem: Zeroizing::new(key_pem.into()),
        }
    }

    /// Produce the CA for one run
    pub fn establish(
        &self,
        config: &CertConfig,
        validity_days: i64,
        keys: &dyn KeyGenerator,
    ) -> Result<CertificateAuthority> {
        match self {
            Self::GenerateSelfSigned => CertificateAuthority::generate(config, validity_days, keys),
            Self::ImportExternal { cert_pem, key_pem } => {
                CertificateAuthority::from_pem(cert_pem, key_pem)
            }
        }
    }
}

impl Default for TrustRootProvider {
    fn default() -> Self {
        Self::GenerateSelfSigned
    }
}

impl std::fmt::Debug for TrustRootProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GenerateSelfSigned => f.write_str("GenerateSelfSigned"),
            Self::ImportExternal { .. } => f.write_str("ImportExternal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pki::{verify_signed_by, MockKeyGenerator, RsaKeyGenerator, CA_VALIDITY_DAYS};

    fn ca_config() -> CertConfig {
        CertConfig::new("vault operator CA", &["coreos.com".to_string()])
    }

    fn new_ca() -> CertificateAuthority {
        CertificateAuthority::generate(&ca_config(), CA_VALIDITY_DAYS, &RsaKeyGenerator::default())
            .expect("CA creation should succeed")
    }

    #[test]
    fn ca_is_self_signed() {
        let ca = new_ca();
        let info = ca.cert_info().expect("CA info should parse");

        assert_eq!(info.common_name, "vault operator CA");
        assert_eq!(info.issuer_common_name, info.common_name);
        assert_eq!(info.organizations, vec!["coreos.com".to_string()]);
        assert!(info.is_ca);
        assert!(info.dns_names.is_empty());

        let self_verified = verify_signed_by(ca.ca_cert_pem(), ca.ca_cert_pem())
            .expect("verification should run");
        assert!(self_verified);
    }

    #[test]
    fn ca_validity_spans_ten_years() {
        let ca = new_ca();
        let info = ca.cert_info().expect("CA info should parse");
        let days = info.lifetime_secs() / (24 * 60 * 60);
        assert!((days - CA_VALIDITY_DAYS).abs() <= 1);
    }

    #[test]
    fn ca_ignores_alt_names() {
        let config = ca_config().with_alt_names(["localhost"]);
        let ca = CertificateAuthority::generate(&config, 30, &RsaKeyGenerator::default())
            .expect("CA creation should succeed");
        let info = ca.cert_info().expect("CA info should parse");
        assert!(info.dns_names.is_empty());
    }

    #[test]
    fn ca_key_is_not_in_debug_output() {
        let ca = new_ca();
        assert!(!format!("{:?}", ca).contains("PRIVATE KEY"));
    }

    #[test]
    fn key_generation_failure_surfaces_as_ca_initialization() {
        let mut keys = MockKeyGenerator::new();
        keys.expect_generate()
            .times(1)
            .returning(|| Err(PkiError::KeyGeneration("entropy exhausted".to_string())));

        let result = CertificateAuthority::generate(&ca_config(), CA_VALIDITY_DAYS, &keys);
        match result {
            Err(PkiError::CaInitialization(inner)) => {
                assert!(matches!(*inner, PkiError::KeyGeneration(_)));
            }
            other => panic!("expected CaInitialization, got {:?}", other),
        }
    }

    fn ca_params() -> CertificateParams {
        let mut params = CertificateParams::default();
        params.distinguished_name = ca_config().distinguished_name().expect("DN should build");
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params
    }

    fn self_signed(params: CertificateParams) -> (String, Zeroizing<String>) {
        let key = RsaKeyGenerator::default()
            .generate()
            .expect("key generation should succeed");
        let cert = params
            .self_signed(&key.signing_key().expect("signing key should load"))
            .expect("self-signing should succeed");
        (cert.pem(), key.to_pkcs1_pem().expect("encoding should succeed"))
    }

    fn expect_invalid_ca(result: Result<CertificateAuthority>) -> String {
        match result {
            Err(PkiError::CaInitialization(inner)) => match *inner {
                PkiError::InvalidCa(msg) => msg,
                other => panic!("expected InvalidCa, got {:?}", other),
            },
            other => panic!("expected CaInitialization, got {:?}", other),
        }
    }

    #[test]
    fn ca_can_be_imported() {
        let (cert_pem, key_pem) = self_signed(ca_params());

        let ca =
            CertificateAuthority::from_pem(&cert_pem, &key_pem).expect("import should succeed");
        assert_eq!(ca.ca_cert_pem(), cert_pem);

        let info = ca.cert_info().expect("CA info should parse");
        assert_eq!(ca.not_after().unix_timestamp(), info.not_after);
    }

    #[test]
    fn import_rejects_expired_ca() {
        let now = OffsetDateTime::now_utc();
        let mut params = ca_params();
        params.not_before = now - ::time::Duration::days(60);
        params.not_after = now - ::time::Duration::days(30);
        let (cert_pem, key_pem) = self_signed(params);

        let msg = expect_invalid_ca(CertificateAuthority::from_pem(&cert_pem, &key_pem));
        assert!(msg.contains("expired"));
    }

    #[test]
    fn import_rejects_ca_without_cert_sign_usage() {
        let mut params = ca_params();
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        let (cert_pem, key_pem) = self_signed(params);

        let msg = expect_invalid_ca(CertificateAuthority::from_pem(&cert_pem, &key_pem));
        assert!(msg.contains("certificate signing"));
    }

    #[test]
    fn import_accepts_restricted_usage_with_cert_sign() {
        let mut params = ca_params();
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        let (cert_pem, key_pem) = self_signed(params);

        CertificateAuthority::from_pem(&cert_pem, &key_pem).expect("import should succeed");
    }

    #[test]
    fn import_rejects_mismatched_key() {
        let ca = new_ca();
        let other = RsaKeyGenerator::default()
            .generate()
            .expect("key generation should succeed");
        let other_pem = other.to_pkcs1_pem().expect("encoding should succeed");

        let msg = expect_invalid_ca(CertificateAuthority::from_pem(ca.ca_cert_pem(), &other_pem));
        assert!(msg.contains("does not match"));
    }

    #[test]
    fn import_rejects_non_ca_certificate() {
        let keys = RsaKeyGenerator::default();
        let key = keys.generate().expect("key generation should succeed");
        let key_pem = key.to_pkcs1_pem().expect("encoding should succeed");

        let mut params = CertificateParams::default();
        params.is_ca = IsCa::NoCa;
        let cert = params
            .self_signed(&key.signing_key().expect("signing key should load"))
            .expect("self-signing should succeed");

        let result = CertificateAuthority::from_pem(&cert.pem(), &key_pem);
        assert!(matches!(result, Err(PkiError::CaInitialization(_))));
    }

    #[test]
    fn import_rejects_corrupted_material() {
        let ca = new_ca();
        assert!(CertificateAuthority::from_pem(ca.ca_cert_pem(), "invalid key pem").is_err());

        let key_pem = ca
            .private_key()
            .to_pkcs1_pem()
            .expect("encoding should succeed");
        assert!(CertificateAuthority::from_pem("invalid cert pem", &key_pem).is_err());
    }

    #[test]
    fn providers_produce_independent_roots() {
        let keys = RsaKeyGenerator::default();
        let provider = TrustRootProvider::GenerateSelfSigned;
        let a = provider
            .establish(&ca_config(), CA_VALIDITY_DAYS, &keys)
            .expect("first CA should succeed");
        let b = provider
            .establish(&ca_config(), CA_VALIDITY_DAYS, &keys)
            .expect("second CA should succeed");
        assert_ne!(a.ca_cert_pem(), b.ca_cert_pem());
    }

    #[test]
    fn import_provider_never_calls_key_generator() {
        let ca = new_ca();
        let key_pem = ca
            .private_key()
            .to_pkcs1_pem()
            .expect("encoding should succeed");
        let provider = TrustRootProvider::import(ca.ca_cert_pem(), key_pem.as_str());

        let mut keys = MockKeyGenerator::new();
        keys.expect_generate().times(0);

        let imported = provider
            .establish(&ca_config(), CA_VALIDITY_DAYS, &keys)
            .expect("import should succeed");
        assert_eq!(imported.ca_cert_pem(), ca.ca_cert_pem());
        assert_eq!(format!("{:?}", provider), "ImportExternal");
    }
}

//! Leaf certificate issuance

use rcgen::{CertificateParams, ExtendedKeyUsagePurpose, IsCa, Issuer, KeyUsagePurpose};
use tracing::debug;

use super::{
    compute_validity, random_serial, CertConfig, CertificateAuthority, CertificateInfo,
    KeyGenerator, PkiError, PrivateKey, Result,
};

/// A freshly generated key and the certificate the CA signed for it
#[derive(Debug)]
pub struct IssuedCertificate {
    key: PrivateKey,
    cert_pem: String,
}

impl IssuedCertificate {
    /// The leaf private key
    pub fn key(&self) -> &PrivateKey {
        &self.key
    }

    /// The leaf certificate in PEM format
    pub fn cert_pem(&self) -> &str {
        &self.cert_pem
    }

    /// Decoded view of the leaf certificate
    pub fn cert_info(&self) -> Result<CertificateInfo> {
        CertificateInfo::from_pem(&self.cert_pem)
    }
}

/// Signs leaf certificates with a CA
pub struct CertificateIssuer<'a> {
    ca: &'a CertificateAuthority,
    keys: &'a dyn KeyGenerator,
    validity_days: i64,
}

impl<'a> CertificateIssuer<'a> {
    /// Create an issuer backed by `ca`, drawing leaf keys from `keys`
    pub fn new(
        ca: &'a CertificateAuthority,
        keys: &'a dyn KeyGenerator,
        validity_days: i64,
    ) -> Self {
        Self {
            ca,
            keys,
            validity_days,
        }
    }

    /// Generate a key and sign a certificate for `config`
    ///
    /// Every leaf carries both client and server auth extended key usage,
    /// whatever role it is issued for. Expiry is capped at the CA's. Either
    /// a complete key/certificate pair is returned or nothing is.
    pub fn issue(&self, config: &CertConfig) -> Result<IssuedCertificate> {
        self.sign(config).map_err(PkiError::certificate_issuance)
    }

    fn sign(&self, config: &CertConfig) -> Result<IssuedCertificate> {
        let mut params = CertificateParams::default();
        params.distinguished_name = config.distinguished_name()?;
        params.subject_alt_names = config.subject_alt_names()?;

        // Not a CA
        params.is_ca = IsCa::NoCa;
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyEncipherment,
        ];

        // Extended key usage for TLS client and server
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ServerAuth,
            ExtendedKeyUsagePurpose::ClientAuth,
        ];
        params.serial_number = Some(random_serial());

        let (not_before, not_after) = compute_validity(self.validity_days);
        params.not_before = not_before;
        params.not_after = not_after.min(self.ca.not_after());

        let key = self.keys.generate()?;
        let leaf_key = key.signing_key()?;

        // Create the Issuer from our CA certificate and key
        let ca_key = self.ca.private_key().signing_key()?;
        let issuer = Issuer::from_ca_cert_pem(self.ca.ca_cert_pem(), &ca_key)
            .map_err(|e| PkiError::ParseError(format!("failed to create issuer: {}", e)))?;

        let cert = params
            .signed_by(&leaf_key, &issuer)
            .map_err(|e| PkiError::Signing(format!("failed to sign certificate: {}", e)))?;

        debug!(
            common_name = %config.common_name,
            alt_names = config.alt_names.len(),
            "issued leaf certificate"
        );

        Ok(IssuedCertificate {
            key,
            cert_pem: cert.pem(),
        })
    }
}

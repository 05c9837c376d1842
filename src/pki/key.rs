//! RSA private key generation

#[cfg(test)]
use mockall::automock;
use rand::rngs::OsRng;
use rcgen::{KeyPair, PKCS_RSA_SHA256};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use super::{PkiError, Result};

/// Key size used when none is configured
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Smallest key size accepted for generated keys
pub const MIN_KEY_BITS: usize = 2048;

/// Source of fresh private keys
///
/// Abstracted so provisioning can be exercised against a failing generator.
#[cfg_attr(test, automock)]
pub trait KeyGenerator: Send + Sync {
    /// Generate a new private key
    fn generate(&self) -> Result<PrivateKey>;
}

/// Generates RSA keys from the operating system's CSPRNG
#[derive(Debug, Clone, Copy)]
pub struct RsaKeyGenerator {
    bits: usize,
}

impl RsaKeyGenerator {
    /// Create a generator for the given modulus size
    pub fn new(bits: usize) -> Result<Self> {
        if bits < MIN_KEY_BITS {
            return Err(PkiError::KeyGeneration(format!(
                "RSA key size {} is below the minimum of {} bits",
                bits, MIN_KEY_BITS
            )));
        }
        Ok(Self { bits })
    }

    /// Modulus size in bits
    pub fn bits(&self) -> usize {
        self.bits
    }
}

impl Default for RsaKeyGenerator {
    fn default() -> Self {
        Self {
            bits: DEFAULT_KEY_BITS,
        }
    }
}

impl KeyGenerator for RsaKeyGenerator {
    fn generate(&self) -> Result<PrivateKey> {
        let inner = RsaPrivateKey::new(&mut OsRng, self.bits)
            .map_err(|e| PkiError::KeyGeneration(format!("failed to generate RSA key: {}", e)))?;
        Ok(PrivateKey { inner })
    }
}

/// An RSA private key
///
/// Key material never shows up in `Debug` output and PEM encodings are
/// zeroized when dropped.
#[derive(Clone)]
pub struct PrivateKey {
    inner: RsaPrivateKey,
}

impl PrivateKey {
    /// Parse a PKCS#8 (`PRIVATE KEY`) or PKCS#1 (`RSA PRIVATE KEY`) PEM key
    pub fn from_pem(pem: &str) -> Result<Self> {
        let inner = RsaPrivateKey::from_pkcs8_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
            .map_err(|e| PkiError::ParseError(format!("failed to parse RSA key: {}", e)))?;
        Ok(Self { inner })
    }

    /// Modulus size in bits
    pub fn bits(&self) -> usize {
        self.inner.size() * 8
    }

    /// Public half of the key pair
    pub fn public_key(&self) -> RsaPublicKey {
        self.inner.to_public_key()
    }

    /// Encode as PKCS#1 `RSA PRIVATE KEY` PEM, the format etcd reads
    pub fn to_pkcs1_pem(&self) -> Result<Zeroizing<String>> {
        self.inner
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| PkiError::Encoding(format!("failed to encode private key: {}", e)))
    }

    /// Whether a DER SubjectPublicKeyInfo belongs to this key
    pub fn matches_public_key_der(&self, spki_der: &[u8]) -> bool {
        RsaPublicKey::from_public_key_der(spki_der)
            .map(|public| public == self.public_key())
            .unwrap_or(false)
    }

    /// Build the rcgen signing key for this RSA key
    pub(crate) fn signing_key(&self) -> Result<KeyPair> {
        let pkcs8 = self
            .inner
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| PkiError::Encoding(format!("failed to encode private key: {}", e)))?;
        KeyPair::from_pkcs8_pem_and_sign_algo(&pkcs8, &PKCS_RSA_SHA256)
            .map_err(|e| PkiError::Signing(format!("failed to load signing key: {}", e)))
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("algorithm", &"RSA")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

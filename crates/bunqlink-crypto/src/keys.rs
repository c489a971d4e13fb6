//! Key provisioning for bunqlink
//!
//! The client keypair is generated once per installation and persisted as PEM
//! text (PKCS#8 for the private half, SPKI for the public half). The server
//! public key arrives as PEM in the installation response.

use crate::{CryptoError, CryptoResult};
use async_trait::async_trait;
use openssl::error::ErrorStack;
use openssl::pkey::{PKey, Private, Public};
use openssl::rsa::Rsa;

/// Smallest modulus accepted for a signing key
pub const MIN_RSA_BITS: usize = 2048;

/// Modulus size used when nothing else is configured
pub const DEFAULT_RSA_BITS: usize = 2048;

fn key_format(err: ErrorStack) -> CryptoError {
    CryptoError::InvalidKeyFormat(err.to_string())
}

fn pem_text(pem: Vec<u8>) -> CryptoResult<String> {
    String::from_utf8(pem).map_err(|e| CryptoError::InvalidKeyFormat(e.to_string()))
}

/// RSA private key used to sign requests
#[derive(Clone)]
pub struct PrivateKey(PKey<Private>);

impl PrivateKey {
    /// Parse a PEM private key (PKCS#8 or traditional PKCS#1)
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        let key = PKey::private_key_from_pem(pem.as_bytes()).map_err(key_format)?;
        // Only RSA keys can produce bunq signatures
        key.rsa().map_err(key_format)?;
        Ok(Self(key))
    }

    /// Encode as PKCS#8 PEM (for secure storage only!)
    pub fn to_pem(&self) -> CryptoResult<String> {
        pem_text(self.0.private_key_to_pem_pkcs8().map_err(key_format)?)
    }

    /// Derive the matching public key
    pub fn public_key(&self) -> CryptoResult<PublicKey> {
        let der = self.0.public_key_to_der().map_err(key_format)?;
        PKey::public_key_from_der(&der)
            .map(PublicKey)
            .map_err(key_format)
    }

    /// Modulus size in bits
    pub fn bits(&self) -> usize {
        self.0.bits() as usize
    }

    pub(crate) fn inner(&self) -> &PKey<Private> {
        &self.0
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

/// RSA public key (safe to share)
#[derive(Clone)]
pub struct PublicKey(PKey<Public>);

impl PublicKey {
    /// Parse a PEM public key (SPKI, with PKCS#1 accepted as fallback)
    pub fn from_pem(pem: &str) -> CryptoResult<Self> {
        let key = match PKey::public_key_from_pem(pem.as_bytes()) {
            Ok(key) => key,
            Err(_) => Rsa::public_key_from_pem_pkcs1(pem.as_bytes())
                .and_then(PKey::from_rsa)
                .map_err(key_format)?,
        };
        key.rsa().map_err(key_format)?;
        Ok(Self(key))
    }

    /// Encode as SPKI PEM, the format the installation endpoint expects
    pub fn to_pem(&self) -> CryptoResult<String> {
        pem_text(self.0.public_key_to_pem().map_err(key_format)?)
    }

    /// Modulus size in bits
    pub fn bits(&self) -> usize {
        self.0.bits() as usize
    }

    pub(crate) fn inner(&self) -> &PKey<Public> {
        &self.0
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.public_eq(&other.0)
    }
}

impl Eq for PublicKey {}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublicKey")
            .field("bits", &self.bits())
            .finish()
    }
}

/// A client signing key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    private_key: PrivateKey,
    public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair with the given modulus size
    pub fn generate(bits: usize) -> CryptoResult<Self> {
        if bits < MIN_RSA_BITS {
            return Err(CryptoError::KeyGenerationFailed(format!(
                "RSA modulus must be at least {} bits, got {}",
                MIN_RSA_BITS, bits
            )));
        }

        let key = u32::try_from(bits)
            .map_err(|_| CryptoError::KeyGenerationFailed(format!("Unsupported modulus size {}", bits)))
            .and_then(|bits| {
                Rsa::generate(bits)
                    .and_then(PKey::from_rsa)
                    .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))
            })?;

        Self::from_private_key(PrivateKey(key))
    }

    /// Rebuild a pair from a stored private key
    pub fn from_private_key(private_key: PrivateKey) -> CryptoResult<Self> {
        let public_key = private_key.public_key()?;
        Ok(Self {
            private_key,
            public_key,
        })
    }

    /// Rebuild a pair from a stored PEM private key
    pub fn from_private_pem(pem: &str) -> CryptoResult<Self> {
        PrivateKey::from_pem(pem).and_then(Self::from_private_key)
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Encode both halves as PEM text
    pub fn to_pem(&self) -> CryptoResult<KeyPairPem> {
        Ok(KeyPairPem {
            public_key: self.public_key.to_pem()?,
            private_key: self.private_key.to_pem()?,
        })
    }
}

/// PEM text form of a key pair, as persisted in the credential store
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPairPem {
    pub public_key: String,
    pub private_key: String,
}

impl std::fmt::Debug for KeyPairPem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPairPem")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Source of fresh client key pairs
///
/// The orchestrator calls this exactly once per full setup.
#[async_trait]
pub trait KeyProvisioner: Send + Sync {
    async fn generate_key_pair(&self) -> CryptoResult<KeyPair>;
}

/// Generates RSA key pairs with the operating system RNG
#[derive(Debug, Clone)]
pub struct RsaKeyProvisioner {
    bits: usize,
}

impl RsaKeyProvisioner {
    pub fn new() -> Self {
        Self {
            bits: DEFAULT_RSA_BITS,
        }
    }

    /// Use a larger modulus; anything below 2048 bits is rejected
    pub fn with_bits(bits: usize) -> CryptoResult<Self> {
        if bits < MIN_RSA_BITS {
            return Err(CryptoError::KeyGenerationFailed(format!(
                "RSA modulus must be at least {} bits, got {}",
                MIN_RSA_BITS, bits
            )));
        }
        Ok(Self { bits })
    }

    pub fn bits(&self) -> usize {
        self.bits
    }
}

impl Default for RsaKeyProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KeyProvisioner for RsaKeyProvisioner {
    async fn generate_key_pair(&self) -> CryptoResult<KeyPair> {
        tracing::debug!(bits = self.bits, "Generating client RSA key pair");
        let bits = self.bits;
        // Prime search takes long enough to stall a runtime worker
        tokio::task::spawn_blocking(move || KeyPair::generate(bits))
            .await
            .map_err(|e| CryptoError::KeyGenerationFailed(format!("Key generation task failed: {}", e)))?
    }
}

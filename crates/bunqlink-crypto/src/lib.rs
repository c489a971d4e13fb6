//! bunqlink Crypto - Cryptographic primitives for the bunq trust handshake
//!
//! This crate provides:
//! - RSA key pair provisioning (PEM encoded, 2048 bit minimum)
//! - Request signing (RSA-SHA256, base64)
//! - Response signature verification
//! - API key fingerprinting (SHA-256)
//!
//! # Security Invariant
//!
//! **A request is only ever signed with a loaded private key, and a response
//! is only ever verified against the server key of the same installation.**

pub mod keys;
pub mod signature;
pub mod hash;

pub use keys::*;
pub use signature::*;
pub use hash::*;

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGenerationFailed(String),

    #[error("Signing failed: {0}")]
    SigningFailed(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    #[error("Invalid signature encoding: {0}")]
    InvalidSignatureEncoding(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;

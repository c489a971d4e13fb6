//! Request signing and response verification
//!
//! Signatures are RSA PKCS#1 v1.5 over SHA-256 of the exact body bytes,
//! base64 encoded with the standard alphabet. Bodyless requests sign the
//! empty string.

use crate::{CryptoError, CryptoResult, PrivateKey, PublicKey};
use base64::Engine;
use openssl::hash::MessageDigest;
use openssl::sign::{Signer, Verifier};

fn engine() -> &'static base64::engine::GeneralPurpose {
    &base64::engine::general_purpose::STANDARD
}

/// Sign a body and return the base64 signature header value
pub fn sign_body(private_key: &PrivateKey, body: &[u8]) -> CryptoResult<String> {
    let signature = Signer::new(MessageDigest::sha256(), private_key.inner())
        .and_then(|mut signer| signer.sign_oneshot_to_vec(body))
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

    Ok(engine().encode(signature))
}

/// Verify a base64 signature over a body
///
/// Returns `Ok(false)` for a well-formed signature that does not match, and an
/// error when the header value cannot be decoded at all.
pub fn verify_body(public_key: &PublicKey, body: &[u8], signature_b64: &str) -> CryptoResult<bool> {
    let signature = engine()
        .decode(signature_b64.trim())
        .map_err(|e| CryptoError::InvalidSignatureEncoding(e.to_string()))?;

    let mut verifier = Verifier::new(MessageDigest::sha256(), public_key.inner())
        .map_err(|e| CryptoError::VerificationFailed(e.to_string()))?;

    // A truncated or oversized signature is reported by OpenSSL as an error
    Ok(verifier.verify_oneshot(&signature, body).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;
    use std::sync::OnceLock;

    fn keypairs() -> &'static (KeyPair, KeyPair) {
        static PAIRS: OnceLock<(KeyPair, KeyPair)> = OnceLock::new();
        PAIRS.get_or_init(|| (KeyPair::generate(2048).unwrap(), KeyPair::generate(2048).unwrap()))
    }

    #[test]
    fn test_sign_and_verify() {
        let (keypair, _) = keypairs();
        let body = br#"{"secret":"k1"}"#;

        let signature = sign_body(keypair.private_key(), body).unwrap();
        assert!(verify_body(keypair.public_key(), body, &signature).unwrap());
    }

    #[test]
    fn test_empty_body_signs() {
        let (keypair, _) = keypairs();
        let signature = sign_body(keypair.private_key(), b"").unwrap();
        assert!(verify_body(keypair.public_key(), b"", &signature).unwrap());
    }

    #[test]
    fn test_tampered_body_fails() {
        let (keypair, _) = keypairs();
        let signature = sign_body(keypair.private_key(), br#"{"amount":"10.00"}"#).unwrap();

        assert!(!verify_body(keypair.public_key(), br#"{"amount":"99.00"}"#, &signature).unwrap());
    }

    #[test]
    fn test_wrong_key_fails() {
        let (keypair1, keypair2) = keypairs();
        let body = b"Hello, bunq!";

        let signature = sign_body(keypair1.private_key(), body).unwrap();
        assert!(!verify_body(keypair2.public_key(), body, &signature).unwrap());
    }

    #[test]
    fn test_whitespace_is_significant() {
        let (keypair, _) = keypairs();
        let signature = sign_body(keypair.private_key(), br#"{"a":1}"#).unwrap();

        assert!(!verify_body(keypair.public_key(), br#"{"a": 1}"#, &signature).unwrap());
    }

    #[test]
    fn test_truncated_signature_does_not_verify() {
        let (keypair, _) = keypairs();
        let signature = sign_body(keypair.private_key(), b"body").unwrap();
        let truncated = &signature[..signature.len() / 2];
        let truncated = &truncated[..truncated.len() - truncated.len() % 4];

        assert!(!verify_body(keypair.public_key(), b"body", truncated).unwrap());
    }

    #[test]
    fn test_undecodable_signature_is_an_error() {
        let (keypair, _) = keypairs();
        let result = verify_body(keypair.public_key(), b"body", "%%% not base64 %%%");
        assert!(matches!(result, Err(CryptoError::InvalidSignatureEncoding(_))));
    }
}

//! Detached signatures over canonical EXI fragments
//!
//! ISO 15118 PnC signs a SHA-256 digest of selected message fragments
//! with the contract (or OEM provisioning) key, ECDSA P-256. The codec
//! guarantees canonical fragment octets, so signer and verifier hash
//! identical input.

use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, UnparsedPublicKey, ECDSA_P256_SHA256_ASN1, ECDSA_P256_SHA256_ASN1_SIGNING,
};
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use crate::error::PkiError;

/// SHA-256 digest of a canonical fragment, the DigestValue of the
/// detached signature.
pub fn fragment_digest(fragment: &[u8]) -> Vec<u8> {
    Sha256::digest(fragment).to_vec()
}

/// Verify an ECDSA P-256 signature over `payload` with the public key
/// of `signer_der` (an end-entity certificate).
pub fn verify_detached(signer_der: &[u8], payload: &[u8], signature: &[u8]) -> Result<(), PkiError> {
    let (_, cert) =
        X509Certificate::from_der(signer_der).map_err(|e| PkiError::Parse(e.to_string()))?;
    let spki = &cert.tbs_certificate.subject_pki.subject_public_key.data;
    let key = UnparsedPublicKey::new(&ECDSA_P256_SHA256_ASN1, spki.as_ref());
    key.verify(payload, signature)
        .map_err(|_| PkiError::BadSignature)
}

/// A loaded ECDSA P-256 signing key (PKCS#8 DER).
pub struct SigningKey {
    key_pair: EcdsaKeyPair,
    rng: SystemRandom,
}

impl SigningKey {
    pub fn from_pkcs8(pkcs8: &[u8]) -> Result<Self, PkiError> {
        let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, pkcs8)
            .map_err(|e| PkiError::BadKey(e.to_string()))?;
        Ok(Self {
            key_pair,
            rng: SystemRandom::new(),
        })
    }

    /// Produce the detached SignatureValue over `payload`.
    pub fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, PkiError> {
        self.key_pair
            .sign(&self.rng, payload)
            .map(|sig| sig.as_ref().to_vec())
            .map_err(|e| PkiError::BadKey(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{Certificate, CertificateParams, DnType, KeyUsagePurpose, PKCS_ECDSA_P256_SHA256};

    fn leaf_with_key() -> (Vec<u8>, Vec<u8>) {
        let mut params = CertificateParams::new(vec![]);
        params
            .distinguished_name
            .push(DnType::CommonName, "Contract Leaf".to_string());
        params.alg = &PKCS_ECDSA_P256_SHA256;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        let cert = Certificate::from_params(params).unwrap();
        let der = cert.serialize_der().unwrap();
        let key = cert.serialize_private_key_der();
        (der, key)
    }

    #[test]
    fn sign_then_verify() {
        let (cert_der, key_der) = leaf_with_key();
        let key = SigningKey::from_pkcs8(&key_der).unwrap();
        let payload = b"canonical fragment octets";
        let sig = key.sign(payload).unwrap();
        verify_detached(&cert_der, payload, &sig).unwrap();
    }

    #[test]
    fn tampered_payload_fails() {
        let (cert_der, key_der) = leaf_with_key();
        let key = SigningKey::from_pkcs8(&key_der).unwrap();
        let sig = key.sign(b"original").unwrap();
        assert!(matches!(
            verify_detached(&cert_der, b"tampered", &sig),
            Err(PkiError::BadSignature)
        ));
    }

    #[test]
    fn digest_is_stable() {
        assert_eq!(fragment_digest(b"abc"), fragment_digest(b"abc"));
        assert_ne!(fragment_digest(b"abc"), fragment_digest(b"abd"));
    }
}

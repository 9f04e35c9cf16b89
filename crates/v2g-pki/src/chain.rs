//! Leaf-first certificate chain validation
//!
//! Rules per ISO 15118: every certificate must sit inside its validity
//! window, carry the key usage its position requires, be signed by the
//! next certificate in the chain, and the chain must terminate in an
//! anchor of the appropriate role.

use std::collections::HashSet;

use x509_parser::prelude::*;

use crate::error::PkiError;

/// Normalized (uppercase, separator-free) certificate serial.
pub fn normalized_serial(cert: &X509Certificate) -> String {
    cert.raw_serial_as_string()
        .replace(':', "")
        .to_ascii_uppercase()
}

/// Subject common name of a DER certificate. The contract leaf's CN
/// carries the eMAID.
pub fn subject_common_name(der: &[u8]) -> Result<String, PkiError> {
    let cert = parse(der)?;
    let result = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
        .ok_or_else(|| PkiError::Parse("certificate has no common name".to_string()));
    result
}

fn parse<'a>(der: &'a [u8]) -> Result<X509Certificate<'a>, PkiError> {
    let (_, cert) =
        X509Certificate::from_der(der).map_err(|e| PkiError::Parse(e.to_string()))?;
    Ok(cert)
}

fn check_window(cert: &X509Certificate, now_ts: i64) -> Result<(), PkiError> {
    let not_before = cert.validity().not_before.timestamp();
    let not_after = cert.validity().not_after.timestamp();
    if now_ts < not_before {
        return Err(PkiError::NotYetValid { not_before });
    }
    if now_ts > not_after {
        return Err(PkiError::Expired { not_after });
    }
    Ok(())
}

fn check_key_usage(cert: &X509Certificate, position: usize, is_leaf: bool) -> Result<(), PkiError> {
    let ku = cert
        .key_usage()
        .map_err(|e| PkiError::Parse(e.to_string()))?;
    if is_leaf {
        // End-entity certificates sign session material
        match ku {
            Some(ext) if ext.value.digital_signature() => Ok(()),
            _ => Err(PkiError::BadKeyUsage {
                position,
                usage: "digitalSignature",
            }),
        }
    } else {
        let ca = cert
            .basic_constraints()
            .map_err(|e| PkiError::Parse(e.to_string()))?
            .map(|ext| ext.value.ca)
            .unwrap_or(false);
        let can_sign = ku.map(|ext| ext.value.key_cert_sign()).unwrap_or(false);
        if ca && can_sign {
            Ok(())
        } else {
            Err(PkiError::BadKeyUsage {
                position,
                usage: "keyCertSign+cA",
            })
        }
    }
}

/// Validate a leaf-first DER chain against `anchors` (the anchor set of
/// one role). `now_ts` is epoch seconds; `revoked` holds normalized
/// serials of locally revoked end-entity certificates.
pub fn validate_chain(
    chain: &[Vec<u8>],
    anchors: &[Vec<u8>],
    role: &'static str,
    now_ts: i64,
    revoked: &HashSet<String>,
) -> Result<(), PkiError> {
    if chain.is_empty() {
        return Err(PkiError::EmptyChain);
    }

    let certs: Vec<X509Certificate> = chain
        .iter()
        .map(|der| parse(der))
        .collect::<Result<_, _>>()?;

    for (position, cert) in certs.iter().enumerate() {
        check_window(cert, now_ts)?;
        check_key_usage(cert, position, position == 0)?;
    }

    let leaf_serial = normalized_serial(&certs[0]);
    if revoked.contains(&leaf_serial) {
        return Err(PkiError::Revoked {
            serial: leaf_serial,
        });
    }

    // Each certificate must be issued and signed by its successor
    for position in 0..certs.len() - 1 {
        let cert = &certs[position];
        let issuer = &certs[position + 1];
        if cert.issuer().as_raw() != issuer.subject().as_raw() {
            return Err(PkiError::BrokenChain { position });
        }
        cert.verify_signature(Some(&issuer.tbs_certificate.subject_pki))
            .map_err(|_| PkiError::BadChainSignature { position })?;
    }

    // The top of the chain must be, or be signed by, a trusted anchor
    let top = &certs[certs.len() - 1];
    for anchor_der in anchors {
        if anchor_der == &chain[chain.len() - 1] {
            return Ok(());
        }
        let anchor = parse(anchor_der)?;
        if top.issuer().as_raw() == anchor.subject().as_raw()
            && top
                .verify_signature(Some(&anchor.tbs_certificate.subject_pki))
                .is_ok()
        {
            check_window(&anchor, now_ts)?;
            return Ok(());
        }
    }

    Err(PkiError::UnknownRoot { role })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{
        BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyUsagePurpose,
        PKCS_ECDSA_P256_SHA256,
    };

    fn ca_params(name: &str) -> CertificateParams {
        let mut params = CertificateParams::new(vec![]);
        params
            .distinguished_name
            .push(DnType::CommonName, name.to_string());
        params.alg = &PKCS_ECDSA_P256_SHA256;
        params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        params.key_usages = vec![KeyUsagePurpose::KeyCertSign, KeyUsagePurpose::CrlSign];
        params
    }

    fn leaf_params(name: &str) -> CertificateParams {
        let mut params = CertificateParams::new(vec![]);
        params
            .distinguished_name
            .push(DnType::CommonName, name.to_string());
        params.alg = &PKCS_ECDSA_P256_SHA256;
        params.is_ca = IsCa::ExplicitNoCa;
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params
    }

    /// root -> sub -> leaf, all ECDSA P-256
    fn make_chain() -> (Vec<Vec<u8>>, Vec<u8>) {
        let root = Certificate::from_params(ca_params("V2G Root Test")).unwrap();
        let sub = Certificate::from_params(ca_params("CPO Sub Test")).unwrap();
        let leaf = Certificate::from_params(leaf_params("SECC Leaf Test")).unwrap();

        let root_der = root.serialize_der().unwrap();
        let sub_der = sub.serialize_der_with_signer(&root).unwrap();
        let leaf_der = leaf.serialize_der_with_signer(&sub).unwrap();

        (vec![leaf_der, sub_der], root_der)
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    #[test]
    fn valid_chain_passes() {
        let (chain, root) = make_chain();
        validate_chain(&chain, &[root], "v2g", now(), &HashSet::new()).unwrap();
    }

    #[test]
    fn unknown_root_is_rejected() {
        let (chain, _) = make_chain();
        let (_, other_root) = make_chain();
        let err = validate_chain(&chain, &[other_root], "v2g", now(), &HashSet::new());
        assert!(matches!(err, Err(PkiError::UnknownRoot { .. })));
    }

    #[test]
    fn expired_leaf_is_rejected() {
        let (chain, root) = make_chain();
        // Far future: everything in the chain has lapsed
        let err = validate_chain(&chain, &[root], "v2g", now() + 40 * 365 * 86_400, &HashSet::new());
        assert!(matches!(err, Err(PkiError::Expired { .. })));
    }

    #[test]
    fn revoked_leaf_is_rejected() {
        let (chain, root) = make_chain();
        let (_, leaf) = X509Certificate::from_der(&chain[0]).unwrap();
        let mut revoked = HashSet::new();
        revoked.insert(normalized_serial(&leaf));
        let err = validate_chain(&chain, &[root], "contract", now(), &revoked);
        assert!(matches!(err, Err(PkiError::Revoked { .. })));
    }

    #[test]
    fn leaf_without_digital_signature_is_rejected() {
        let root = Certificate::from_params(ca_params("Root")).unwrap();
        let mut params = leaf_params("Leaf");
        params.key_usages = vec![KeyUsagePurpose::KeyEncipherment];
        let leaf = Certificate::from_params(params).unwrap();
        let chain = vec![leaf.serialize_der_with_signer(&root).unwrap()];
        let root_der = root.serialize_der().unwrap();
        let err = validate_chain(&chain, &[root_der], "v2g", now(), &HashSet::new());
        assert!(matches!(err, Err(PkiError::BadKeyUsage { .. })));
    }

    #[test]
    fn shuffled_chain_is_rejected() {
        let (mut chain, root) = make_chain();
        chain.swap(0, 1);
        let err = validate_chain(&chain, &[root], "v2g", now(), &HashSet::new());
        assert!(err.is_err());
    }
}

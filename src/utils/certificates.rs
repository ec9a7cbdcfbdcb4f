//! Certificate validation for gateway TLS material.
//!
//! Parses PEM certificates and private keys, confirms the key belongs to the
//! leaf certificate, checks the validity window and answers whether a
//! certificate's SANs cover a domain. Everything here is pure: no I/O, and the
//! clock is a parameter of [`validate_at`].

use anyhow::anyhow;
use chrono::{DateTime, TimeZone, Utc};
use ring::{
    rand::SystemRandom,
    signature::{
        EcdsaKeyPair, Ed25519KeyPair, KeyPair, RsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING,
        ECDSA_P384_SHA384_ASN1_SIGNING,
    },
};
use rustls::pki_types::{pem::PemObject, CertificateDer, PrivateKeyDer};
use simple_asn1::{oid, ASN1Block, BigInt, BigUint, OID};
use x509_parser::prelude::*;

use crate::errors::CertificateError;

const OID_ED25519: &str = "1.3.101.112";
const OID_EC_PUBLIC_KEY: &str = "1.2.840.10045.2.1";
const OID_RSA_ENCRYPTION: &str = "1.2.840.113549.1.1.1";

/// Metadata of the leaf certificate, used for listings and logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// DNS names the certificate is issued to
    pub sans: Vec<String>,
}

/// Validate a certificate/key pair against the current time.
pub fn validate(cert_pem: &str, key_pem: &str) -> Result<CertificateInfo, CertificateError> {
    validate_at(cert_pem, key_pem, Utc::now())
}

/// Validate a certificate/key pair: PEM structure, key match and validity window.
pub fn validate_at(
    cert_pem: &str,
    key_pem: &str,
    now: DateTime<Utc>,
) -> Result<CertificateInfo, CertificateError> {
    let leaf = leaf_certificate(cert_pem)?;
    let (_, parsed) = X509Certificate::from_der(leaf.as_ref())
        .map_err(|e| CertificateError::invalid_cert(format!("failed to parse DER: {e}")))?;

    let info = certificate_info(&parsed)?;

    if info.not_before > now {
        return Err(CertificateError::CertNotYetValid { not_before: info.not_before });
    }
    if info.not_after <= now {
        return Err(CertificateError::CertExpired { not_after: info.not_after });
    }

    let private_key = PrivateKeyDer::from_pem_slice(key_pem.as_bytes())
        .map_err(|e| CertificateError::invalid_key(e.to_string()))?;

    let spki = parsed.public_key();
    enforce_public_key_match(
        &spki.algorithm.algorithm.to_id_string(),
        spki.subject_public_key.data.as_ref(),
        &private_key,
    )?;

    Ok(info)
}

/// Parse the leaf certificate and report its metadata without checking the key.
pub fn describe(cert_pem: &str) -> Result<CertificateInfo, CertificateError> {
    let leaf = leaf_certificate(cert_pem)?;
    let (_, parsed) = X509Certificate::from_der(leaf.as_ref())
        .map_err(|e| CertificateError::invalid_cert(format!("failed to parse DER: {e}")))?;
    certificate_info(&parsed)
}

/// DNS names of the leaf certificate. Falls back to the subject common names
/// when the certificate carries no SAN extension.
pub fn sans_of(cert_pem: &str) -> Result<Vec<String>, CertificateError> {
    Ok(describe(cert_pem)?.sans)
}

/// Whether any SAN covers `domain`: an exact (case-insensitive) match, or a
/// wildcard `*.suffix` covering exactly one extra label in front of `suffix`.
pub fn covers(sans: &[String], domain: &str) -> bool {
    let domain = domain.trim_end_matches('.').to_ascii_lowercase();
    sans.iter().any(|san| {
        let san = san.trim_end_matches('.').to_ascii_lowercase();
        if san == domain {
            return true;
        }
        match san.strip_prefix("*.") {
            Some(suffix) => domain
                .strip_suffix(suffix)
                .and_then(|prefix| prefix.strip_suffix('.'))
                .is_some_and(|label| !label.is_empty() && !label.contains('.')),
            None => false,
        }
    })
}

fn leaf_certificate(cert_pem: &str) -> Result<CertificateDer<'static>, CertificateError> {
    let mut chain = CertificateDer::pem_slice_iter(cert_pem.as_bytes())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| CertificateError::invalid_cert(e.to_string()))?;

    if chain.is_empty() {
        return Err(CertificateError::invalid_cert("no certificate found in PEM"));
    }
    Ok(chain.remove(0))
}

fn certificate_info(parsed: &X509Certificate<'_>) -> Result<CertificateInfo, CertificateError> {
    let validity = parsed.validity();
    let not_before = asn1_to_chrono(validity.not_before.timestamp())?;
    let not_after = asn1_to_chrono(validity.not_after.timestamp())?;

    let mut sans = Vec::new();
    for ext in parsed.extensions() {
        if let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() {
            for name in &san.general_names {
                if let GeneralName::DNSName(dns) = name {
                    sans.push(dns.to_string());
                }
            }
        }
    }

    if sans.is_empty() {
        sans.extend(
            parsed
                .subject()
                .iter_common_name()
                .filter_map(|cn| cn.as_str().ok())
                .map(str::to_string),
        );
    }

    Ok(CertificateInfo {
        subject: parsed.subject().to_string(),
        issuer: parsed.issuer().to_string(),
        not_before,
        not_after,
        sans,
    })
}

fn asn1_to_chrono(timestamp: i64) -> Result<DateTime<Utc>, CertificateError> {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .ok_or_else(|| CertificateError::invalid_cert("certificate time out of range"))
}

/// Public key algorithms the gateway accepts for TLS material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyAlgorithm {
    Ed25519,
    Ec,
    Rsa,
}

impl KeyAlgorithm {
    fn from_certificate_oid(oid: &str) -> Option<Self> {
        match oid {
            OID_ED25519 => Some(Self::Ed25519),
            OID_EC_PUBLIC_KEY => Some(Self::Ec),
            OID_RSA_ENCRYPTION => Some(Self::Rsa),
            _ => None,
        }
    }

    fn from_asn1_oid(oid: &OID) -> Option<Self> {
        if *oid == oid!(1, 3, 101, 112) {
            Some(Self::Ed25519)
        } else if *oid == oid!(1, 2, 840, 10045, 2, 1) {
            Some(Self::Ec)
        } else if *oid == oid!(1, 2, 840, 113549, 1, 1, 1) {
            Some(Self::Rsa)
        } else {
            None
        }
    }

    /// Algorithm of a private key, read from its encoding.
    fn of_private_key(private_key: &PrivateKeyDer<'_>) -> Option<Self> {
        match private_key {
            PrivateKeyDer::Pkcs1(_) => Some(Self::Rsa),
            PrivateKeyDer::Sec1(_) => Some(Self::Ec),
            PrivateKeyDer::Pkcs8(key) => pkcs8_algorithm(key.secret_pkcs8_der()),
            _ => None,
        }
    }
}

fn enforce_public_key_match(
    algorithm_oid: &str,
    public_key: &[u8],
    private_key: &PrivateKeyDer<'_>,
) -> Result<(), CertificateError> {
    // Unknown algorithms are accepted as-is; the gateway will reject them
    // at load time if it cannot use them.
    let Some(algorithm) = KeyAlgorithm::from_certificate_oid(algorithm_oid) else {
        return Ok(());
    };
    if KeyAlgorithm::of_private_key(private_key).is_some_and(|key_algorithm| key_algorithm != algorithm) {
        return Err(CertificateError::CertKeyMismatch);
    }

    let key_bytes = private_key.secret_der();
    match (algorithm, private_key) {
        (KeyAlgorithm::Ec, PrivateKeyDer::Sec1(_)) => compare_bytes(&sec1_public_key(key_bytes)?, public_key),
        (KeyAlgorithm::Ec, _) => {
            let rng = SystemRandom::new();
            let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, key_bytes, &rng)
                .or_else(|_| EcdsaKeyPair::from_pkcs8(&ECDSA_P384_SHA384_ASN1_SIGNING, key_bytes, &rng))
                .map_err(|e| CertificateError::invalid_key(format!("unusable EC private key: {e}")))?;
            compare_bytes(key_pair.public_key().as_ref(), public_key)
        }
        (KeyAlgorithm::Ed25519, _) => {
            let key_pair = Ed25519KeyPair::from_pkcs8_maybe_unchecked(key_bytes)
                .map_err(|e| CertificateError::invalid_key(format!("unusable Ed25519 private key: {e}")))?;
            compare_bytes(key_pair.public_key().as_ref(), public_key)
        }
        (KeyAlgorithm::Rsa, _) => {
            let key_pair = RsaKeyPair::from_pkcs8(key_bytes)
                .or_else(|_| RsaKeyPair::from_der(key_bytes))
                .map_err(|e| CertificateError::invalid_key(format!("unusable RSA private key: {e}")))?;
            compare_rsa_public_key(&key_pair, public_key).map_err(|_| CertificateError::CertKeyMismatch)
        }
    }
}

/// Algorithm named by the `privateKeyAlgorithm` field of a PKCS#8 key.
fn pkcs8_algorithm(der: &[u8]) -> Option<KeyAlgorithm> {
    let blocks = simple_asn1::from_der(der).ok()?;
    let Some(ASN1Block::Sequence(_, items)) = blocks.first() else {
        return None;
    };
    let Some(ASN1Block::Sequence(_, algorithm)) = items.get(1) else {
        return None;
    };
    match algorithm.first()? {
        ASN1Block::ObjectIdentifier(_, oid) => KeyAlgorithm::from_asn1_oid(oid),
        _ => None,
    }
}

/// The `[1] publicKey` point carried by a SEC1 `ECPrivateKey`.
fn sec1_public_key(der: &[u8]) -> Result<Vec<u8>, CertificateError> {
    let blocks = simple_asn1::from_der(der)
        .map_err(|e| CertificateError::invalid_key(format!("malformed EC private key: {e}")))?;
    let Some(ASN1Block::Sequence(_, items)) = blocks.first() else {
        return Err(CertificateError::invalid_key("EC private key is not a sequence"));
    };

    let public_key_tag = BigUint::from(1u8);
    items
        .iter()
        .find_map(|item| match item {
            ASN1Block::Explicit(_, _, tag, inner) if *tag == public_key_tag => match inner.as_ref() {
                ASN1Block::BitString(_, _, bits) => Some(bits.clone()),
                _ => None,
            },
            _ => None,
        })
        .ok_or_else(|| CertificateError::invalid_key("EC private key carries no public key"))
}

fn compare_bytes(expected: &[u8], actual: &[u8]) -> Result<(), CertificateError> {
    if expected == actual {
        Ok(())
    } else {
        Err(CertificateError::CertKeyMismatch)
    }
}

fn compare_rsa_public_key(key_pair: &RsaKeyPair, public_key: &[u8]) -> anyhow::Result<()> {
    let (cert_modulus, cert_exponent) = rsa_components(public_key)?;
    let (key_modulus, key_exponent) = rsa_components(key_pair.public().as_ref())?;

    if cert_modulus == key_modulus && cert_exponent == key_exponent {
        Ok(())
    } else {
        Err(anyhow!("RSA key mismatch"))
    }
}

/// Modulus and exponent of a DER `RSAPublicKey`.
fn rsa_components(der: &[u8]) -> anyhow::Result<(Vec<u8>, Vec<u8>)> {
    let blocks = simple_asn1::from_der(der)?;
    let seq = match blocks.first() {
        Some(ASN1Block::Sequence(_, items)) if items.len() >= 2 => items,
        _ => return Err(anyhow!("RSA public key is not a modulus/exponent sequence")),
    };

    match (&seq[0], &seq[1]) {
        (ASN1Block::Integer(_, modulus), ASN1Block::Integer(_, exponent)) => {
            Ok((bigint_to_bytes(modulus), bigint_to_bytes(exponent)))
        }
        _ => Err(anyhow!("RSA modulus/exponent missing")),
    }
}

fn bigint_to_bytes(value: &BigInt) -> Vec<u8> {
    value.to_biguint().map_or_else(Vec::new, |v| v.to_bytes_be())
}

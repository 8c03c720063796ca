//! Root and leaf certificate generation, loading and persistence.
//!
//! ```text
//! Root "CA" (self-signed, CA:TRUE)
//!   └── Leaf <domain> (CA:FALSE, SAN = domain)
//! ```
//!
//! Both certificates use RSA-4096 keys, SHA-256 signatures and a ten year
//! validity window starting at creation time.

use std::net::IpAddr;
use std::path::Path;

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, PKeyRef, Private};
use openssl::rsa::Rsa;
use openssl::x509::extension::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage,
    SubjectAlternativeName, SubjectKeyIdentifier,
};
use openssl::x509::{X509Name, X509Ref, X509};

use super::{CertError, CA_CERT_FILE, CA_KEY_FILE, SERVER_CERT_FILE, SERVER_KEY_FILE};
use crate::storage::write_atomic;

const X509_VERSION_3: i32 = 2; // X509 version 3 is represented by 2

/// RSA modulus size for both root and leaf keys.
pub const RSA_KEY_BITS: u32 = 4096;

/// Validity window for both certificates (ten years).
pub const VALIDITY_DAYS: u32 = 3650;

/// Common name of the self-signed root.
pub const ROOT_COMMON_NAME: &str = "CA";

/// The root of trust: self-signed certificate plus its private key.
pub struct RootAuthority {
    pub cert: X509,
    pub key: PKey<Private>,
    /// PEM encoding of `cert`, exactly as stored on disk
    pub cert_pem: Vec<u8>,
    /// True when this process generated the root instead of loading it
    pub generated: bool,
}

/// The server's own certificate, signed by the root.
pub struct LeafCertificate {
    pub cert: X509,
    pub key: PKey<Private>,
    pub cert_pem: Vec<u8>,
    pub key_pem: Vec<u8>,
}

/// Everything the server needs from the certificate directory at startup.
pub struct TrustMaterial {
    pub root: RootAuthority,
    pub leaf: LeafCertificate,
}

impl TrustMaterial {
    /// Load the root and leaf from `dir`, generating whatever is missing.
    ///
    /// Key generation can take seconds; call this from a blocking context.
    pub fn load_or_create(dir: &Path, domain: &str) -> Result<Self, CertError> {
        std::fs::create_dir_all(dir).map_err(|source| CertError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        let root = ensure_root(dir)?;
        let leaf = ensure_leaf(domain, &root, dir)?;
        Ok(Self { root, leaf })
    }
}

/// Load the root pair from `dir`, or generate and persist a new one.
///
/// The certificate and key are treated as a unit: if either file is missing,
/// both are regenerated so a stale certificate is never paired with a new key.
pub fn ensure_root(dir: &Path) -> Result<RootAuthority, CertError> {
    let cert_path = dir.join(CA_CERT_FILE);
    let key_path = dir.join(CA_KEY_FILE);

    if cert_path.exists() && key_path.exists() {
        let cert_pem = read_file(&cert_path)?;
        let key_pem = read_file(&key_path)?;
        let (cert, key) = parse_pair(&cert_path, &cert_pem, &key_path, &key_pem)?;

        tracing::info!(path = %cert_path.display(), "Root certificate loaded");
        return Ok(RootAuthority {
            cert,
            key,
            cert_pem,
            generated: false,
        });
    }

    tracing::info!(
        dir = %dir.display(),
        "No root certificate found, generating a new {}-bit root",
        RSA_KEY_BITS
    );

    let key = generate_key()?;
    let cert = build_certificate(ROOT_COMMON_NAME, &key, None).map_err(CertError::Sign)?;
    let cert_pem = cert.to_pem().map_err(CertError::Sign)?;
    let key_pem = key.private_key_to_pem_pkcs8().map_err(CertError::Sign)?;

    // Key first: a crash between the two writes leaves the cert missing,
    // which regenerates the pair on the next start.
    write_file(&key_path, &key_pem)?;
    write_file(&cert_path, &cert_pem)?;

    tracing::info!(path = %cert_path.display(), "Root certificate generated");
    Ok(RootAuthority {
        cert,
        key,
        cert_pem,
        generated: true,
    })
}

/// Generate a fresh key pair and a certificate for `domain` signed by `root`,
/// and persist both to `dir`.
pub fn issue_leaf(
    domain: &str,
    root: &RootAuthority,
    dir: &Path,
) -> Result<LeafCertificate, CertError> {
    let key = generate_key()?;
    let cert = build_certificate(domain, &key, Some((&*root.cert, &*root.key)))
        .map_err(CertError::Sign)?;
    let cert_pem = cert.to_pem().map_err(CertError::Sign)?;
    let key_pem = key.private_key_to_pem_pkcs8().map_err(CertError::Sign)?;

    write_file(&dir.join(SERVER_KEY_FILE), &key_pem)?;
    write_file(&dir.join(SERVER_CERT_FILE), &cert_pem)?;

    tracing::info!(domain = %domain, "Server certificate issued");
    Ok(LeafCertificate {
        cert,
        key,
        cert_pem,
        key_pem,
    })
}

/// Load the stored leaf if it is still usable, otherwise issue a new one.
///
/// A stored leaf is reused only when the root was loaded (not regenerated),
/// the leaf verifies against that root and its common name is `domain`.
pub fn ensure_leaf(
    domain: &str,
    root: &RootAuthority,
    dir: &Path,
) -> Result<LeafCertificate, CertError> {
    let cert_path = dir.join(SERVER_CERT_FILE);
    let key_path = dir.join(SERVER_KEY_FILE);

    if !root.generated && cert_path.exists() && key_path.exists() {
        let cert_pem = read_file(&cert_path)?;
        let key_pem = read_file(&key_path)?;
        let (cert, key) = parse_pair(&cert_path, &cert_pem, &key_path, &key_pem)?;

        let signed_by_root = cert.verify(&root.key).unwrap_or(false);
        if signed_by_root && common_name(&cert).as_deref() == Some(domain) {
            tracing::info!(path = %cert_path.display(), "Server certificate loaded");
            return Ok(LeafCertificate {
                cert,
                key,
                cert_pem,
                key_pem,
            });
        }

        tracing::warn!(
            path = %cert_path.display(),
            signed_by_root,
            "Stored server certificate does not match root or domain, reissuing"
        );
    }

    issue_leaf(domain, root, dir)
}

/// First common name entry of the certificate subject.
pub fn common_name(cert: &X509Ref) -> Option<String> {
    cert.subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .and_then(|entry| String::from_utf8(entry.data().as_slice().to_vec()).ok())
}

fn generate_key() -> Result<PKey<Private>, CertError> {
    let rsa = Rsa::generate(RSA_KEY_BITS).map_err(CertError::Generate)?;
    PKey::from_rsa(rsa).map_err(CertError::Generate)
}

/// Build and sign an X.509v3 certificate for `common_name`.
///
/// With `issuer == None` the certificate is a self-signed CA; otherwise it is
/// an end-entity certificate signed by the issuer, with the common name also
/// placed in the subjectAltName so hostname verification succeeds.
fn build_certificate(
    common_name: &str,
    key: &PKeyRef<Private>,
    issuer: Option<(&X509Ref, &PKeyRef<Private>)>,
) -> Result<X509, ErrorStack> {
    let mut builder = X509::builder()?;
    builder.set_version(X509_VERSION_3)?;

    // Random 128-bit serial
    let mut serial = BigNum::new()?;
    serial.rand(128, MsbOption::MAYBE_ZERO, false)?;
    let serial = serial.to_asn1_integer()?;
    builder.set_serial_number(&serial)?;

    let mut name_builder = X509Name::builder()?;
    name_builder.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
    let subject = name_builder.build();
    builder.set_subject_name(&subject)?;
    match issuer {
        Some((issuer_cert, _)) => builder.set_issuer_name(issuer_cert.subject_name())?,
        None => builder.set_issuer_name(&subject)?,
    }

    let not_before = Asn1Time::days_from_now(0)?;
    let not_after = Asn1Time::days_from_now(VALIDITY_DAYS)?;
    builder.set_not_before(&not_before)?;
    builder.set_not_after(&not_after)?;
    builder.set_pubkey(key)?;

    let is_ca = issuer.is_none();
    let issuer_cert = issuer.map(|(cert, _)| cert);

    let mut constraints = BasicConstraints::new();
    constraints.critical();
    if is_ca {
        constraints.ca();
    }
    builder.append_extension(constraints.build()?)?;

    let mut usage = KeyUsage::new();
    usage
        .critical()
        .digital_signature()
        .key_agreement()
        .key_encipherment()
        .data_encipherment();
    if is_ca {
        usage.key_cert_sign().crl_sign();
    }
    builder.append_extension(usage.build()?)?;

    builder.append_extension(ExtendedKeyUsage::new().server_auth().client_auth().build()?)?;

    let subject_key_id =
        SubjectKeyIdentifier::new().build(&builder.x509v3_context(issuer_cert, None))?;
    builder.append_extension(subject_key_id)?;

    let authority_key_id = AuthorityKeyIdentifier::new()
        .keyid(false)
        .issuer(false)
        .build(&builder.x509v3_context(issuer_cert, None))?;
    builder.append_extension(authority_key_id)?;

    if !is_ca {
        let mut san = SubjectAlternativeName::new();
        if common_name.parse::<IpAddr>().is_ok() {
            san.ip(common_name);
        } else {
            san.dns(common_name);
        }
        let san = san.build(&builder.x509v3_context(issuer_cert, None))?;
        builder.append_extension(san)?;
    }

    let signing_key = issuer.map(|(_, key)| key).unwrap_or(key);
    builder.sign(signing_key, MessageDigest::sha256())?;
    Ok(builder.build())
}

fn parse_pair(
    cert_path: &Path,
    cert_pem: &[u8],
    key_path: &Path,
    key_pem: &[u8],
) -> Result<(X509, PKey<Private>), CertError> {
    let cert = X509::from_pem(cert_pem).map_err(|source| CertError::Parse {
        path: cert_path.to_path_buf(),
        source,
    })?;
    let key = PKey::private_key_from_pem(key_pem).map_err(|source| CertError::Parse {
        path: key_path.to_path_buf(),
        source,
    })?;

    let public = cert.public_key().map_err(|source| CertError::Parse {
        path: cert_path.to_path_buf(),
        source,
    })?;
    if !public.public_eq(&key) {
        return Err(CertError::KeyMismatch {
            path: cert_path.to_path_buf(),
        });
    }

    Ok((cert, key))
}

fn read_file(path: &Path) -> Result<Vec<u8>, CertError> {
    std::fs::read(path).map_err(|source| CertError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), CertError> {
    write_atomic(path, bytes).map_err(|source| CertError::Io {
        path: path.to_path_buf(),
        source,
    })
}

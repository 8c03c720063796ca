//! Integration tests for the certificate authority: generation, reload,
//! regeneration rules and chain validation.

use std::path::Path;

use chatroom_server::cert::authority::{common_name, VALIDITY_DAYS};
use chatroom_server::cert::{
    ensure_leaf, ensure_root, issue_leaf, CertError, TrustMaterial, CA_CERT_FILE, CA_KEY_FILE,
    SERVER_CERT_FILE, SERVER_KEY_FILE,
};
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509Ref, X509StoreContext};

/// Verify `leaf` chains to `root` using OpenSSL's full path validation
/// (signature, validity, CA flag and key usage on the issuer).
fn chains_to(leaf: &X509Ref, root: &X509Ref) -> bool {
    chains_via(leaf, &[], root)
}

fn chains_via(leaf: &X509Ref, intermediates: &[&X509Ref], root: &X509Ref) -> bool {
    let mut builder = X509StoreBuilder::new().unwrap();
    builder.add_cert(root.to_owned()).unwrap();
    let store = builder.build();
    let mut chain = Stack::new().unwrap();
    for cert in intermediates {
        chain.push((*cert).to_owned()).unwrap();
    }
    let mut ctx = X509StoreContext::new().unwrap();
    ctx.init(&store, leaf, &chain, |c| c.verify_cert()).unwrap()
}

fn all_files_exist(dir: &Path) -> bool {
    [CA_CERT_FILE, CA_KEY_FILE, SERVER_CERT_FILE, SERVER_KEY_FILE]
        .iter()
        .all(|f| dir.join(f).exists())
}

#[test]
fn test_fresh_directory_generates_valid_chain() {
    let dir = tempfile::tempdir().unwrap();
    let trust = TrustMaterial::load_or_create(dir.path(), "localhost").unwrap();

    assert!(trust.root.generated);
    assert!(all_files_exist(dir.path()));

    assert_eq!(common_name(&trust.root.cert).as_deref(), Some("CA"));
    assert_eq!(common_name(&trust.leaf.cert).as_deref(), Some("localhost"));

    // Root is self-signed, leaf is signed by root
    let root_key = trust.root.cert.public_key().unwrap();
    assert!(trust.root.cert.verify(&root_key).unwrap());
    assert!(trust.leaf.cert.verify(&root_key).unwrap());
    assert!(chains_to(&trust.leaf.cert, &trust.root.cert));

    // The leaf is not a CA: nothing chains through it, even when presented
    // as an intermediate
    let other_dir = tempfile::tempdir().unwrap();
    let fake_root = chatroom_server::cert::RootAuthority {
        cert: trust.leaf.cert.clone(),
        key: trust.leaf.key.clone(),
        cert_pem: trust.leaf.cert_pem.clone(),
        generated: false,
    };
    let grandchild = issue_leaf("evil.example", &fake_root, other_dir.path()).unwrap();
    assert!(!chains_via(&grandchild.cert, &[&*trust.leaf.cert], &trust.root.cert));

    // Ten year window
    for cert in [&trust.root.cert, &trust.leaf.cert] {
        let diff = cert.not_before().diff(cert.not_after()).unwrap();
        assert_eq!(diff.days, VALIDITY_DAYS as i32);
    }

    // Leaf names the domain in its SAN
    let sans = trust.leaf.cert.subject_alt_names().expect("leaf should carry a SAN");
    assert!(sans.iter().any(|n| n.dnsname() == Some("localhost")));

    // Keys are 4096-bit RSA
    assert_eq!(trust.root.key.bits(), 4096);
    assert_eq!(trust.leaf.key.bits(), 4096);
}

#[test]
fn test_reload_returns_same_material() {
    let dir = tempfile::tempdir().unwrap();
    let first = TrustMaterial::load_or_create(dir.path(), "localhost").unwrap();
    let second = TrustMaterial::load_or_create(dir.path(), "localhost").unwrap();

    assert!(!second.root.generated);
    assert_eq!(first.root.cert_pem, second.root.cert_pem);
    assert_eq!(first.leaf.cert_pem, second.leaf.cert_pem);
    assert_eq!(first.leaf.key_pem, second.leaf.key_pem);
    assert_eq!(
        std::fs::read(dir.path().join(CA_CERT_FILE)).unwrap(),
        second.root.cert_pem
    );
}

#[test]
fn test_missing_root_key_regenerates_pair_and_leaf() {
    let dir = tempfile::tempdir().unwrap();
    let first = TrustMaterial::load_or_create(dir.path(), "localhost").unwrap();

    std::fs::remove_file(dir.path().join(CA_KEY_FILE)).unwrap();
    let second = TrustMaterial::load_or_create(dir.path(), "localhost").unwrap();

    assert!(second.root.generated);
    assert_ne!(first.root.cert_pem, second.root.cert_pem);
    // The old leaf cannot chain to the new root, so it was reissued
    assert_ne!(first.leaf.cert_pem, second.leaf.cert_pem);
    assert!(chains_to(&second.leaf.cert, &second.root.cert));
    assert!(!chains_to(&first.leaf.cert, &second.root.cert));
}

#[test]
fn test_domain_change_reissues_leaf_only() {
    let dir = tempfile::tempdir().unwrap();
    let first = TrustMaterial::load_or_create(dir.path(), "localhost").unwrap();
    let second = TrustMaterial::load_or_create(dir.path(), "127.0.0.1").unwrap();

    assert_eq!(first.root.cert_pem, second.root.cert_pem);
    assert_ne!(first.leaf.cert_pem, second.leaf.cert_pem);
    assert_eq!(common_name(&second.leaf.cert).as_deref(), Some("127.0.0.1"));

    let sans = second.leaf.cert.subject_alt_names().unwrap();
    assert!(sans.iter().any(|n| n.ipaddress() == Some(&[127, 0, 0, 1][..])));
}

#[test]
fn test_issue_leaf_always_generates_fresh_key() {
    let dir = tempfile::tempdir().unwrap();
    let root = ensure_root(dir.path()).unwrap();
    let a = issue_leaf("localhost", &root, dir.path()).unwrap();
    let b = issue_leaf("localhost", &root, dir.path()).unwrap();

    assert_ne!(a.key_pem, b.key_pem);
    assert_ne!(
        a.cert.serial_number().to_bn().unwrap(),
        b.cert.serial_number().to_bn().unwrap()
    );
    // The most recent one is what's on disk
    assert_eq!(std::fs::read(dir.path().join(SERVER_CERT_FILE)).unwrap(), b.cert_pem);

    // and is what ensure_leaf picks up
    let loaded = ensure_leaf("localhost", &ensure_root(dir.path()).unwrap(), dir.path()).unwrap();
    assert_eq!(loaded.cert_pem, b.cert_pem);
}

#[test]
fn test_malformed_root_is_a_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(CA_CERT_FILE), b"-----BEGIN GARBAGE-----").unwrap();
    std::fs::write(dir.path().join(CA_KEY_FILE), b"not a key").unwrap();

    let err = ensure_root(dir.path()).err().expect("malformed root must not load");
    assert!(matches!(err, CertError::Parse { .. }), "unexpected error: {err}");

    // Nothing was overwritten
    assert_eq!(
        std::fs::read(dir.path().join(CA_KEY_FILE)).unwrap(),
        b"not a key"
    );
}

#[test]
fn test_mismatched_root_pair_is_rejected() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    ensure_root(a.path()).unwrap();
    ensure_root(b.path()).unwrap();

    // Pair a's certificate with b's key
    std::fs::copy(b.path().join(CA_KEY_FILE), a.path().join(CA_KEY_FILE)).unwrap();

    let err = ensure_root(a.path()).err().expect("mismatched pair must not load");
    assert!(matches!(err, CertError::KeyMismatch { .. }), "unexpected error: {err}");
}

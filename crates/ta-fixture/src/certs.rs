//! Self-signed TLS material for the registry fixture.
//!
//! Each scenario gets its own key pair, issued for the scenario's registry
//! hostname and never reused.

use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
    KeyUsagePurpose, SerialNumber, PKCS_ECDSA_P256_SHA256,
};
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use time::{Duration, OffsetDateTime};
use tracing::debug;

use crate::error::{HarnessError, Result};

/// Organization placed in the certificate subject.
pub const ORGANIZATION: &str = "Konflux";

/// Certificate validity in days.
pub const VALIDITY_DAYS: i64 = 365;

/// PEM-encoded certificate and private key.
#[derive(Debug, Clone)]
pub struct CertificateMaterial {
    /// `CERTIFICATE` block.
    pub cert_pem: String,
    /// PKCS#8 `PRIVATE KEY` block.
    pub key_pem: String,
}

/// Generates a P-256 key pair and a self-signed server certificate for `hostname`.
///
/// # Errors
///
/// Returns `HarnessError::CertGen` on any cryptographic failure.
pub fn generate(hostname: &str) -> Result<CertificateMaterial> {
    let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256).map_err(cert_err)?;

    let mut params = CertificateParams::new(vec![hostname.to_string()]).map_err(cert_err)?;

    let mut subject = DistinguishedName::new();
    subject.push(DnType::OrganizationName, ORGANIZATION);
    params.distinguished_name = subject;

    let not_before = OffsetDateTime::now_utc();
    params.not_before = not_before;
    params.not_after = not_before + Duration::days(VALIDITY_DAYS);

    params.is_ca = IsCa::ExplicitNoCa;
    params.key_usages = vec![
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::DigitalSignature,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    params.serial_number = Some(random_serial());

    let cert = params.self_signed(&key_pair).map_err(cert_err)?;

    Ok(CertificateMaterial {
        cert_pem: cert.pem(),
        key_pem: key_pair.serialize_pem(),
    })
}

/// Returns a serial of 128 random bits.
///
/// rcgen encodes the serial as a positive DER integer, prepending a zero
/// byte when the top bit is set.
fn random_serial() -> SerialNumber {
    let serial: [u8; 16] = rand::random();
    SerialNumber::from_slice(&serial)
}

/// Generates certificate material for `hostname` and writes both PEM files.
///
/// The files are created with mode 0600.
///
/// # Errors
///
/// Returns `HarnessError::CertGen` on any cryptographic or I/O failure.
pub fn issue(hostname: &str, cert_path: &Path, key_path: &Path) -> Result<()> {
    let material = generate(hostname)?;
    write_private(cert_path, &material.cert_pem)?;
    write_private(key_path, &material.key_pem)?;
    debug!(hostname, cert = %cert_path.display(), "issued self-signed certificate");
    Ok(())
}

fn write_private(path: &Path, contents: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| HarnessError::CertGen(format!("creating {}: {e}", path.display())))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| HarnessError::CertGen(format!("writing {}: {e}", path.display())))
}

fn cert_err(err: rcgen::Error) -> HarnessError {
    HarnessError::CertGen(err.to_string())
}

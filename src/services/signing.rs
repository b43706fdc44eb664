//! Digest signing.
//!
//! The signer's contract: given the five-digest blob and a credential
//! reference, return a DER PKCS#7 `SignedData`. Credentials are either a
//! PKCS#12 file or a PKCS#11 token addressed by module path, slot id, key
//! id, and PIN. Credential material lives only for the span of one
//! `sign_digests` call.

use std::path::{Path, PathBuf};

use cryptoki::context::{CInitializeArgs, Pkcs11};
use cryptoki::mechanism::Mechanism;
use cryptoki::object::{Attribute, AttributeType, ObjectClass};
use cryptoki::session::UserType;
use cryptoki::types::AuthPin;
use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::Id;
use openssl::sign::Signer;

use crate::domain::constants;
use crate::domain::digests::AppxDigests;
use crate::infra::error::{PackagingError, PackagingResult};
use crate::services::pkcs7::{build_signed_data, SignedDataParams};
use crate::types::PivPin;

/// A reference to signing key material.
#[derive(Debug, Clone)]
pub enum SigningCredentials {
    /// A PKCS#12 (PFX) file holding the certificate and private key.
    Pkcs12File { path: PathBuf },
    /// A key on a PKCS#11 token.
    Pkcs11Token {
        module: PathBuf,
        slot_id: u64,
        key_id: u8,
        pin: PivPin,
    },
}

/// Produces the DER PKCS#7 signature binding the digest blob.
pub fn sign_digests(
    credentials: &SigningCredentials,
    digests: &AppxDigests,
) -> PackagingResult<Vec<u8>> {
    match credentials {
        SigningCredentials::Pkcs12File { path } => sign_with_pkcs12(path, digests),
        SigningCredentials::Pkcs11Token {
            module,
            slot_id,
            key_id,
            pin,
        } => sign_with_pkcs11(module, *slot_id, *key_id, pin, digests),
    }
}

fn sign_with_pkcs12(path: &Path, digests: &AppxDigests) -> PackagingResult<Vec<u8>> {
    let der = std::fs::read(path)
        .map_err(|e| PackagingError::Signing(format!("{}: {e}", path.display())))?;
    let pkcs12 = Pkcs12::from_der(&der)
        .map_err(|e| PackagingError::Signing(format!("{}: not a PKCS#12 file: {e}", path.display())))?;
    let parsed = pkcs12
        .parse2("")
        .map_err(|e| PackagingError::Signing(format!("{}: {e}", path.display())))?;
    let key = parsed.pkey.ok_or_else(|| {
        PackagingError::Signing(format!("{}: no private key", path.display()))
    })?;
    let cert = parsed.cert.ok_or_else(|| {
        PackagingError::Signing(format!("{}: no certificate", path.display()))
    })?;

    let signature_algorithm = match key.id() {
        Id::EC => constants::ECDSA_WITH_SHA256,
        _ => constants::RSA_ENCRYPTION,
    };
    let cert_der = cert.to_der()?;

    log::info!("signing digests with certificate from {}", path.display());
    build_signed_data(
        &SignedDataParams {
            cert_der: &cert_der,
            digests,
            signature_algorithm,
        },
        |attributes| {
            let mut signer = Signer::new(MessageDigest::sha256(), &key)?;
            signer.update(attributes)?;
            Ok(signer.sign_to_vec()?)
        },
    )
}

fn sign_with_pkcs11(
    module: &Path,
    slot_id: u64,
    key_id: u8,
    pin: &PivPin,
    digests: &AppxDigests,
) -> PackagingResult<Vec<u8>> {
    let pkcs11 = Pkcs11::new(module)
        .map_err(|e| PackagingError::Signing(format!("{}: {e}", module.display())))?;
    pkcs11.initialize(CInitializeArgs::OsThreads)?;

    let slot = pkcs11
        .get_slots_with_token()?
        .into_iter()
        .find(|slot| slot.id() == slot_id)
        .ok_or_else(|| PackagingError::Signing(format!("no token in slot {slot_id}")))?;

    let session = pkcs11.open_ro_session(slot)?;
    session.login(UserType::User, Some(&AuthPin::new(pin.as_str().to_string())))?;

    let certificate_der = token_certificate(&session, key_id)?;
    let key = session
        .find_objects(&[
            Attribute::Class(ObjectClass::PRIVATE_KEY),
            Attribute::Id(vec![key_id]),
        ])?
        .into_iter()
        .next()
        .ok_or_else(|| {
            PackagingError::Signing(format!(
                "no usable key with slot {slot_id} and key id {key_id}"
            ))
        })?;

    log::info!("signing digests with PKCS#11 key {key_id} in slot {slot_id}");
    build_signed_data(
        &SignedDataParams {
            cert_der: &certificate_der,
            digests,
            // PIV signing keys are RSA.
            signature_algorithm: constants::RSA_ENCRYPTION,
        },
        |attributes| Ok(session.sign(&Mechanism::Sha256RsaPkcs, key, attributes)?),
    )
}

/// Reads the signing certificate off the token, preferring one whose id
/// matches the key id.
fn token_certificate(
    session: &cryptoki::session::Session,
    key_id: u8,
) -> PackagingResult<Vec<u8>> {
    let mut handles = session.find_objects(&[
        Attribute::Class(ObjectClass::CERTIFICATE),
        Attribute::Id(vec![key_id]),
    ])?;
    if handles.is_empty() {
        handles = session.find_objects(&[Attribute::Class(ObjectClass::CERTIFICATE)])?;
    }
    let handle = handles
        .into_iter()
        .next()
        .ok_or_else(|| PackagingError::Signing("no certificate on token".to_string()))?;
    let attributes = session.get_attributes(handle, &[AttributeType::Value])?;
    match attributes.into_iter().next() {
        Some(Attribute::Value(der)) => Ok(der),
        _ => Err(PackagingError::Signing(
            "token certificate has no value".to_string(),
        )),
    }
}

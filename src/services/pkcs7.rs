//! PKCS#7 `SignedData` assembly for the APPX signature.
//!
//! Builds the full `ContentInfo` around an `SpcIndirectDataContent`
//! payload: one SHA-256 digest algorithm, the signing certificate, and a
//! single `SignerInfo` whose authenticated attributes carry the
//! Authenticode content-type, message-digest, opus-info, and
//! statement-type values. The caller supplies the raw signing operation,
//! so file-based and token-based credentials share this code.

use der::asn1::ObjectIdentifier;
use openssl::x509::X509;
use sha2::{Digest, Sha256};

use crate::domain::constants::{self, TAG_CONTEXT_0, TAG_SEQUENCE, TAG_SET};
use crate::domain::digests::AppxDigests;
use crate::infra::error::{PackagingError, PackagingResult};
use crate::services::asn1;
use crate::services::spc;

/// Everything the assembly needs besides the private-key operation.
pub struct SignedDataParams<'a> {
    /// DER-encoded signing certificate.
    pub cert_der: &'a [u8],
    pub digests: &'a AppxDigests,
    /// Algorithm recorded in `SignerInfo.digestEncryptionAlgorithm`;
    /// rsaEncryption carries NULL parameters, ECDSA none.
    pub signature_algorithm: ObjectIdentifier,
}

/// One signed attribute: `SEQUENCE { type, SET { value } }`.
fn attribute(oid: &ObjectIdentifier, value: &[u8]) -> Vec<u8> {
    let mut body = asn1::encode_oid(oid);
    body.extend_from_slice(&asn1::tlv(TAG_SET, value));
    asn1::tlv(TAG_SEQUENCE, &body)
}

/// The four authenticated attributes, concatenated in DER SET-OF order
/// (sorted by encoded bytes).
fn signed_attributes(message_digest: &[u8]) -> Vec<u8> {
    let mut attributes = vec![
        attribute(
            &constants::PKCS9_CONTENT_TYPE,
            &asn1::encode_oid(&constants::SPC_INDIRECT_DATA),
        ),
        attribute(
            &constants::PKCS9_MESSAGE_DIGEST,
            &asn1::octet_string(message_digest),
        ),
        // SpcSpOpusInfo with neither program name nor more-info.
        attribute(&constants::SPC_SP_OPUS_INFO, &asn1::tlv(TAG_SEQUENCE, &[])),
        attribute(
            &constants::SPC_STATEMENT_TYPE,
            &asn1::tlv(
                TAG_SEQUENCE,
                &asn1::encode_oid(&constants::SPC_INDIVIDUAL_SP_KEY_PURPOSE),
            ),
        ),
    ];
    attributes.sort();
    attributes.concat()
}

/// `IssuerAndSerialNumber` from the signing certificate.
fn issuer_and_serial_number(cert_der: &[u8]) -> PackagingResult<Vec<u8>> {
    let cert = X509::from_der(cert_der)
        .map_err(|e| PackagingError::Signing(format!("cannot parse certificate: {e}")))?;
    let issuer_der = cert
        .issuer_name()
        .to_der()
        .map_err(|e| PackagingError::Signing(format!("cannot encode issuer name: {e}")))?;
    let serial = cert
        .serial_number()
        .to_bn()
        .map_err(|e| PackagingError::Signing(format!("cannot read serial number: {e}")))?;
    let mut body = issuer_der;
    body.extend_from_slice(&asn1::integer_from_bytes(&serial.to_vec()));
    Ok(asn1::tlv(TAG_SEQUENCE, &body))
}

fn signature_algorithm_identifier(oid: &ObjectIdentifier) -> Vec<u8> {
    let mut body = asn1::encode_oid(oid);
    if *oid == constants::RSA_ENCRYPTION {
        body.extend_from_slice(constants::ASN1_NULL);
    }
    asn1::tlv(TAG_SEQUENCE, &body)
}

/// Builds the DER `ContentInfo` containing the signed data. `sign` is
/// called exactly once, with the DER SET OF authenticated attributes, and
/// must return the raw signature bytes.
pub fn build_signed_data(
    params: &SignedDataParams<'_>,
    sign: impl FnOnce(&[u8]) -> PackagingResult<Vec<u8>>,
) -> PackagingResult<Vec<u8>> {
    let spc_content = spc::spc_indirect_data_content(params.digests);

    // Per RFC 2315 section 9.3 only the contents octets of the content are
    // digested, not the identifier or length octets.
    let spc_contents_octets = asn1::contents_octets(&spc_content)?;
    let message_digest: [u8; 32] = Sha256::digest(spc_contents_octets).into();

    let attributes = signed_attributes(&message_digest);
    // The signature covers the attributes under their SET OF tag; the
    // SignerInfo stores them under the implicit [0] tag instead.
    let signature = sign(&asn1::tlv(TAG_SET, &attributes))?;
    if signature.is_empty() {
        return Err(PackagingError::Signing(
            "signer returned an empty signature".to_string(),
        ));
    }

    // SignerInfo.
    let mut signer_info = asn1::integer_from_u32(1);
    signer_info.extend_from_slice(&issuer_and_serial_number(params.cert_der)?);
    signer_info.extend_from_slice(&spc::sha256_algorithm_identifier());
    signer_info.extend_from_slice(&asn1::tlv(TAG_CONTEXT_0, &attributes));
    signer_info.extend_from_slice(&signature_algorithm_identifier(
        &params.signature_algorithm,
    ));
    signer_info.extend_from_slice(&asn1::octet_string(&signature));
    let signer_info = asn1::tlv(TAG_SEQUENCE, &signer_info);

    // SignedData.
    let mut signed_data = asn1::integer_from_u32(1);
    signed_data.extend_from_slice(&asn1::tlv(TAG_SET, &spc::sha256_algorithm_identifier()));
    {
        // encapContentInfo: SEQUENCE { SPC_INDIRECT_DATA_OBJID, [0] content }
        let mut content_info = asn1::encode_oid(&constants::SPC_INDIRECT_DATA);
        content_info.extend_from_slice(&asn1::tlv(TAG_CONTEXT_0, &spc_content));
        signed_data.extend_from_slice(&asn1::tlv(TAG_SEQUENCE, &content_info));
    }
    // certificates [0] IMPLICIT: the signing certificate.
    signed_data.extend_from_slice(&asn1::tlv(TAG_CONTEXT_0, params.cert_der));
    signed_data.extend_from_slice(&asn1::tlv(TAG_SET, &signer_info));
    let signed_data = asn1::tlv(TAG_SEQUENCE, &signed_data);

    // Outer ContentInfo.
    let mut outer = asn1::encode_oid(&constants::PKCS7_SIGNED_DATA);
    outer.extend_from_slice(&asn1::tlv(TAG_CONTEXT_0, &signed_data));
    Ok(asn1::tlv(TAG_SEQUENCE, &outer))
}

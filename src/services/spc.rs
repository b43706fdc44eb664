//! `SpcIndirectDataContent` construction.
//!
//! The Authenticode structure binding the APPX digest blob into the
//! signature:
//!
//! ```text
//! SpcIndirectDataContent ::= SEQUENCE {
//!     data          SpcAttributeTypeAndOptionalValue,  -- SIP info
//!     messageDigest DigestInfo                          -- SHA-256, blob
//! }
//! ```

use crate::domain::constants::{self, ASN1_NULL, TAG_SEQUENCE};
use crate::domain::digests::AppxDigests;
use crate::services::asn1;

/// The 16-byte platform GUID carried in the SIP info value. Fixed for APPX
/// packages.
const SIP_INFO_GUID: [u8; 16] = [
    0x4B, 0xDF, 0xC5, 0x0A, 0x07, 0xCE, 0xE2, 0x4D, 0xB7, 0x6E, 0x23, 0xC8, 0x39, 0xA0, 0x9F,
    0xD1,
];

/// The SIP info version integer.
const SIP_INFO_VERSION: u32 = 0x0101_0000;

/// AlgorithmIdentifier for SHA-256 with NULL parameters.
pub(crate) fn sha256_algorithm_identifier() -> Vec<u8> {
    let mut body = asn1::encode_oid(&constants::SHA256);
    body.extend_from_slice(ASN1_NULL);
    asn1::tlv(TAG_SEQUENCE, &body)
}

fn sip_info_value() -> Vec<u8> {
    let mut body = asn1::integer_from_u32(SIP_INFO_VERSION);
    body.extend_from_slice(&asn1::octet_string(&SIP_INFO_GUID));
    for _ in 0..5 {
        body.extend_from_slice(&asn1::integer_from_u32(0));
    }
    asn1::tlv(TAG_SEQUENCE, &body)
}

/// The DER encoding of the full `SpcIndirectDataContent` SEQUENCE.
#[must_use]
pub fn spc_indirect_data_content(digests: &AppxDigests) -> Vec<u8> {
    // data: SEQUENCE { SPC_SIPINFO_OBJID, SpcSipInfo value }
    let mut data = asn1::encode_oid(&constants::SPC_SIPINFO);
    data.extend_from_slice(&sip_info_value());
    let data = asn1::tlv(TAG_SEQUENCE, &data);

    // messageDigest: SEQUENCE { AlgorithmIdentifier, OCTET STRING blob }
    let mut digest_info = sha256_algorithm_identifier();
    digest_info.extend_from_slice(&asn1::octet_string(&digests.to_bytes()));
    let digest_info = asn1::tlv(TAG_SEQUENCE, &digest_info);

    let mut content = data;
    content.extend_from_slice(&digest_info);
    asn1::tlv(TAG_SEQUENCE, &content)
}

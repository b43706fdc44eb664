//! OIDs and ASN.1 tag bytes used by the Authenticode signature path.

use der::asn1::ObjectIdentifier;

// === Microsoft Authenticode OIDs ===

/// SPC indirect data content type (`SPC_INDIRECT_DATA_OBJID`).
pub const SPC_INDIRECT_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.2.1.4");

/// SIP info (`SPC_SIPINFO_OBJID`), the data half of the indirect content.
pub const SPC_SIPINFO: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.2.1.30");

/// Opus info signed attribute (`SPC_SP_OPUS_INFO_OBJID`).
pub const SPC_SP_OPUS_INFO: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.2.1.12");

/// Statement type signed attribute (`SPC_STATEMENT_TYPE_OBJID`).
pub const SPC_STATEMENT_TYPE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.2.1.11");

/// Individual code signing statement (`SPC_INDIVIDUAL_SP_KEY_PURPOSE_OBJID`).
pub const SPC_INDIVIDUAL_SP_KEY_PURPOSE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.3.6.1.4.1.311.2.1.21");

// === PKCS#7 / PKCS#9 OIDs ===

pub const PKCS7_SIGNED_DATA: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.7.2");

pub const PKCS9_CONTENT_TYPE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.3");

pub const PKCS9_MESSAGE_DIGEST: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.4");

// === Algorithm OIDs ===

pub const SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");

pub const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

pub const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

// === ASN.1 DER tags ===

pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_OID: u8 = 0x06;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_SET: u8 = 0x31;
/// Context-specific constructed tag `[0]`.
pub const TAG_CONTEXT_0: u8 = 0xA0;

/// Complete DER NULL value.
pub const ASN1_NULL: &[u8] = &[0x05, 0x00];

/// Magic prefix of `AppxSignature.p7x`.
pub const P7X_MAGIC: &[u8] = &[0x50, 0x4B, 0x43, 0x58]; // "PKCX"

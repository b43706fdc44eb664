//! Pure data and format logic: sinks, ZIP records, digests, DER constants.

pub mod constants;
pub mod deflate;
pub mod digests;
pub mod hash;
pub mod sink;
pub mod xml;
pub mod zip;

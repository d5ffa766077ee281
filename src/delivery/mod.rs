//! Outbound surfaces: SMTP mail with the workbook attached, and the archive
//! directory with checksum sidecars.

pub mod archive;
pub mod email;

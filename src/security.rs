//! Security (certificate) directory parsing.
//!
//! Unlike every other directory, the Security directory's "VirtualAddress"
//! is a raw file offset. The table is a sequence of WIN_CERTIFICATE records,
//! each starting on an 8-byte boundary; `dwLength` covers the header and the
//! certificate body. Only the headers are recorded; signature validation is
//! out of scope.

use crate::data_dir::DataDirectory;
use crate::reader::{Cursor, ImageView};

/// Certificate revision values.
pub mod revision {
    pub const REVISION_1_0: u16 = 0x0100;
    pub const REVISION_2_0: u16 = 0x0200;
}

/// Certificate type values.
pub mod cert_type {
    pub const X509: u16 = 0x0001;
    pub const PKCS_SIGNED_DATA: u16 = 0x0002;
    pub const RESERVED_1: u16 = 0x0003;
    pub const TS_STACK_SIGNED: u16 = 0x0004;
}

/// WIN_CERTIFICATE header - 8 bytes, body excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WinCertificate {
    /// Length of the whole record, header included.
    pub length: u32,
    /// Certificate version.
    pub revision: u16,
    /// Certificate type.
    pub certificate_type: u16,
}

impl WinCertificate {
    /// Size of the header alone.
    pub const HEADER_SIZE: usize = 8;

    pub(crate) fn read(cur: &mut Cursor<'_>) -> Option<Self> {
        Some(Self {
            length: cur.u32()?,
            revision: cur.u16()?,
            certificate_type: cur.u16()?,
        })
    }
}

/// One certificate record with its file offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityEntry {
    /// File offset of this WIN_CERTIFICATE.
    pub offset: u32,
    /// The record header.
    pub certificate: WinCertificate,
}

/// Walk the certificate table. A record whose declared length is shorter
/// than its own header would stall the walk and terminates it instead.
pub(crate) fn parse(view: &ImageView<'_>, dir: DataDirectory) -> Option<Vec<SecurityEntry>> {
    if dir.virtual_address == 0 || dir.size == 0 {
        return None;
    }
    let start = dir.virtual_address as usize;
    let end = start.checked_add(dir.size as usize)?;
    if start >= view.len() || end > view.len() {
        return None;
    }

    let mut entries = Vec::new();
    let mut at = start;
    while at < end {
        let Some(raw) = view.slice(at, WinCertificate::HEADER_SIZE) else {
            break;
        };
        let Some(certificate) = WinCertificate::read(&mut Cursor::new(raw)) else {
            break;
        };

        entries.push(SecurityEntry {
            offset: at as u32,
            certificate,
        });

        // Next record starts at the 8-byte boundary after this one.
        let length = certificate.length as usize;
        if length < WinCertificate::HEADER_SIZE {
            break;
        }
        let aligned = match length.checked_add(7) {
            Some(v) => v & !7,
            None => break,
        };
        at = match at.checked_add(aligned) {
            Some(v) => v,
            None => break,
        };
    }

    Some(entries)
}

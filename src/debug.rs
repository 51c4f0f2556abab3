//! Debug directory parsing.

use crate::data_dir::DataDirectory;
use crate::reader::{Cursor, ImageView, MAX_PATH};
use crate::section::{section_by_name, section_by_rva, SectionRecord};

/// Debug type values (IMAGE_DEBUG_TYPE_*).
pub mod debug_type {
    pub const UNKNOWN: u32 = 0;
    pub const COFF: u32 = 1;
    pub const CODEVIEW: u32 = 2;
    pub const FPO: u32 = 3;
    pub const MISC: u32 = 4;
    pub const EXCEPTION: u32 = 5;
    pub const FIXUP: u32 = 6;
    pub const OMAP_TO_SRC: u32 = 7;
    pub const OMAP_FROM_SRC: u32 = 8;
    pub const BORLAND: u32 = 9;
    pub const CLSID: u32 = 11;
    pub const VC_FEATURE: u32 = 12;
    pub const POGO: u32 = 13;
    pub const ILTCG: u32 = 14;
    pub const MPX: u32 = 15;
    pub const REPRO: u32 = 16;
}

/// CodeView PDB 7.0 signature "RSDS".
pub const CV_SIGNATURE_RSDS: u32 = 0x5344_5352;
/// CodeView PDB 2.0 signature "NB10".
pub const CV_SIGNATURE_NB10: u32 = 0x3031_424E;

/// Payload offset of the PDB path for each CodeView sub-format.
const RSDS_PATH_OFFSET: usize = 24;
const NB10_PATH_OFFSET: usize = 16;

/// IMAGE_DEBUG_DIRECTORY - 28 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DebugDirectory {
    /// Reserved, must be zero.
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    /// Format of the debug data.
    pub debug_type: u32,
    pub size_of_data: u32,
    /// RVA of the debug data once loaded.
    pub address_of_raw_data: u32,
    /// File offset of the debug data.
    pub pointer_to_raw_data: u32,
}

impl DebugDirectory {
    pub const SIZE: usize = 28;

    pub(crate) fn read(cur: &mut Cursor<'_>) -> Option<Self> {
        Some(Self {
            characteristics: cur.u32()?,
            time_date_stamp: cur.u32()?,
            major_version: cur.u16()?,
            minor_version: cur.u16()?,
            debug_type: cur.u32()?,
            size_of_data: cur.u32()?,
            address_of_raw_data: cur.u32()?,
            pointer_to_raw_data: cur.u32()?,
        })
    }
}

/// One debug directory record with a peek at its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugEntry {
    /// File offset of this record.
    pub offset: u32,
    /// The raw directory entry.
    pub directory: DebugDirectory,
    /// First six DWORDs of the payload at `PointerToRawData`; their meaning
    /// depends on the first (the signature). Reads past EOF yield zero.
    pub header: [u32; 6],
    /// PDB path for CodeView entries, empty otherwise.
    pub pdb_path: String,
}

/// Parse the debug directory.
///
/// Normally the directory size is a byte count. When a section literally
/// named `.debug` starts at the directory RVA, the table is read at that
/// section's raw pointer and the directory size counts entries instead,
/// matching how such images are laid out.
pub(crate) fn parse(
    view: &ImageView<'_>,
    dir: DataDirectory,
    sections: &[SectionRecord],
) -> Option<Vec<DebugEntry>> {
    if dir.virtual_address == 0 {
        return None;
    }

    let (start, dir_size) = match section_by_name(sections, ".debug") {
        Some(sec) if sec.header.virtual_address == dir.virtual_address => (
            sec.header.pointer_to_raw_data as usize,
            (dir.size as usize).checked_mul(DebugDirectory::SIZE)?,
        ),
        _ => {
            section_by_rva(sections, u64::from(dir.virtual_address))?;
            (
                view.rva_to_offset(u64::from(dir.virtual_address))?,
                dir.size as usize,
            )
        }
    };

    let count = dir_size / DebugDirectory::SIZE;
    if count == 0 {
        return None;
    }
    // The whole table must fit in the file.
    view.slice(start, dir_size)?;

    let mut entries = Vec::with_capacity(count);
    for i in 0..count {
        let offset = start + i * DebugDirectory::SIZE;
        let Some(directory) = view.cursor_at(offset).and_then(|mut c| DebugDirectory::read(&mut c))
        else {
            break;
        };

        let payload = directory.pointer_to_raw_data as usize;
        let mut header = [0u32; 6];
        for (j, slot) in header.iter_mut().enumerate() {
            *slot = view.u32_at(payload + j * 4).unwrap_or(0);
        }

        let mut pdb_path = String::new();
        if directory.debug_type == debug_type::CODEVIEW {
            let path_offset = match header[0] {
                CV_SIGNATURE_RSDS => Some(RSDS_PATH_OFFSET),
                CV_SIGNATURE_NB10 => Some(NB10_PATH_OFFSET),
                _ => None,
            };
            if let Some(off) = path_offset {
                pdb_path = view.cstr_at(payload + off, MAX_PATH).unwrap_or_default();
            }
        }

        entries.push(DebugEntry {
            offset: offset as u32,
            directory,
            header,
            pdb_path,
        });
    }

    Some(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::SectionHeader;

    fn section(name: &[u8; 8], va: u32, vsize: u32, raw: u32) -> SectionRecord {
        SectionRecord {
            offset: 0,
            header: SectionHeader {
                name: *name,
                virtual_size: vsize,
                virtual_address: va,
                size_of_raw_data: vsize,
                pointer_to_raw_data: raw,
                pointer_to_relocations: 0,
                pointer_to_linenumbers: 0,
                number_of_relocations: 0,
                number_of_linenumbers: 0,
                characteristics: 0,
            },
            name: String::from_utf8_lossy(&name[..]).trim_end_matches('\0').to_string(),
        }
    }

    fn put_u32(data: &mut [u8], at: usize, v: u32) {
        data[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// One CodeView RSDS entry at RVA 0x2000 (file 0x400); payload at 0x500.
    fn rsds_image() -> Vec<u8> {
        let mut data = vec![0u8; 0x1000];
        put_u32(&mut data, 0x400 + 12, debug_type::CODEVIEW);
        put_u32(&mut data, 0x400 + 16, 0x30); // SizeOfData
        put_u32(&mut data, 0x400 + 24, 0x500); // PointerToRawData
        put_u32(&mut data, 0x500, CV_SIGNATURE_RSDS);
        data[0x500 + 24..0x500 + 24 + 10].copy_from_slice(b"a\\out.pdb\0");
        data
    }

    #[test]
    fn test_rsds_pdb_path() {
        let data = rsds_image();
        let sections = vec![section(b".rdata\0\0", 0x2000, 0x1000, 0x400)];
        let view = ImageView::new(&data, &sections, 0x40_0000);
        let dir = DataDirectory {
            virtual_address: 0x2000,
            size: 28,
        };

        let entries = parse(&view, dir, &sections).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].offset, 0x400);
        assert_eq!(entries[0].header[0], CV_SIGNATURE_RSDS);
        assert_eq!(entries[0].pdb_path, "a\\out.pdb");
    }

    #[test]
    fn test_nb10_pdb_path() {
        let mut data = rsds_image();
        put_u32(&mut data, 0x500, CV_SIGNATURE_NB10);
        data[0x500 + 16..0x500 + 16 + 8].copy_from_slice(b"old.pdb\0");
        let sections = vec![section(b".rdata\0\0", 0x2000, 0x1000, 0x400)];
        let view = ImageView::new(&data, &sections, 0x40_0000);
        let dir = DataDirectory {
            virtual_address: 0x2000,
            size: 28,
        };

        let entries = parse(&view, dir, &sections).unwrap();
        assert_eq!(entries[0].pdb_path, "old.pdb");
    }

    #[test]
    fn test_debug_section_counts_entries() {
        // A `.debug` section at the directory RVA switches the size field's
        // meaning to an entry count.
        let data = rsds_image();
        let sections = vec![section(b".debug\0\0", 0x2000, 0x1000, 0x400)];
        let view = ImageView::new(&data, &sections, 0x40_0000);
        let dir = DataDirectory {
            virtual_address: 0x2000,
            size: 1, // one entry
        };

        let entries = parse(&view, dir, &sections).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].pdb_path, "a\\out.pdb");
    }

    #[test]
    fn test_payload_past_eof_reads_zero() {
        let mut data = rsds_image();
        put_u32(&mut data, 0x400 + 24, 0xFFFF_0000); // payload far past EOF
        let sections = vec![section(b".rdata\0\0", 0x2000, 0x1000, 0x400)];
        let view = ImageView::new(&data, &sections, 0x40_0000);
        let dir = DataDirectory {
            virtual_address: 0x2000,
            size: 28,
        };

        let entries = parse(&view, dir, &sections).unwrap();
        assert_eq!(entries[0].header, [0u32; 6]);
        assert!(entries[0].pdb_path.is_empty());
    }
}

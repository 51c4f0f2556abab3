//! Bounds-checked access to the raw image bytes.
//!
//! Every read in the crate goes through one of two primitives defined here:
//! [`Cursor`] for decoding consecutive little-endian fields of a fixed-size
//! structure, and [`ImageView`] for random access keyed by file offset, RVA
//! or VA. Both return `Option` and never index the slice directly elsewhere,
//! so an out-of-bounds or overflowing access cannot be expressed without
//! going through the checks.

use crate::section::SectionRecord;

/// Cap applied to every NUL-terminated or counted string read from the image.
pub(crate) const MAX_PATH: usize = 260;

/// Sequential little-endian field reader over a byte slice.
#[derive(Debug, Clone)]
pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        if end > self.data.len() {
            return None;
        }
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Some(bytes)
    }

    pub(crate) fn u8(&mut self) -> Option<u8> {
        self.take(1).map(|b| b[0])
    }

    pub(crate) fn u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> Option<u32> {
        self.take(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&mut self) -> Option<u64> {
        self.take(8)
            .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    pub(crate) fn i32(&mut self) -> Option<i32> {
        self.take(4).map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn bytes<const N: usize>(&mut self) -> Option<[u8; N]> {
        let src = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(src);
        Some(out)
    }
}

/// Whole-file view used by the directory parsers.
///
/// Couples the raw bytes with the section table and image base so that RVAs
/// and VAs can be resolved to file offsets. Constructed once the section
/// headers are known; header parsing works on the bare slice.
pub(crate) struct ImageView<'a> {
    data: &'a [u8],
    sections: &'a [SectionRecord],
    image_base: u64,
}

impl<'a> ImageView<'a> {
    pub(crate) fn new(data: &'a [u8], sections: &'a [SectionRecord], image_base: u64) -> Self {
        Self {
            data,
            sections,
            image_base,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    /// Bounds-checked span. The end of the span may coincide with the end of
    /// the file; a span starting at or past the end yields `None` unless it
    /// is empty and ends exactly at EOF (resources may do that).
    pub(crate) fn slice(&self, offset: usize, len: usize) -> Option<&'a [u8]> {
        let end = offset.checked_add(len)?;
        if end > self.data.len() {
            return None;
        }
        Some(&self.data[offset..end])
    }

    /// Cursor positioned at `offset`, for decoding a structure in place.
    pub(crate) fn cursor_at(&self, offset: usize) -> Option<Cursor<'a>> {
        if offset >= self.data.len() {
            return None;
        }
        Some(Cursor {
            data: self.data,
            pos: offset,
        })
    }

    pub(crate) fn u16_at(&self, offset: usize) -> Option<u16> {
        self.slice(offset, 2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32_at(&self, offset: usize) -> Option<u32> {
        self.slice(offset, 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64_at(&self, offset: usize) -> Option<u64> {
        self.slice(offset, 8)
            .map(|b| u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    /// Resolve an RVA to a file offset through the section table.
    ///
    /// A section matches when `VirtualAddress <= rva < VirtualAddress +
    /// VirtualSize`; the offset is rebased onto `PointerToRawData`. Offsets
    /// landing past the end of the file do not resolve.
    pub(crate) fn rva_to_offset(&self, rva: u64) -> Option<usize> {
        rva_to_offset(self.sections, rva, self.data.len())
    }

    /// Resolve a VA (image-base-relative) to a file offset.
    pub(crate) fn va_to_offset(&self, va: u64) -> Option<usize> {
        self.rva_to_offset(va.checked_sub(self.image_base)?)
    }

    /// NUL-terminated ASCII string at a file offset, truncated at `cap`
    /// bytes or at end of file, whichever comes first.
    pub(crate) fn cstr_at(&self, offset: usize, cap: usize) -> Option<String> {
        if offset >= self.data.len() {
            return None;
        }
        let avail = (self.data.len() - offset).min(cap);
        let bytes = &self.data[offset..offset + avail];
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Some(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// NUL-terminated ASCII string at an RVA.
    pub(crate) fn cstr_at_rva(&self, rva: u64, cap: usize) -> Option<String> {
        self.cstr_at(self.rva_to_offset(rva)?, cap)
    }

    /// Counted UTF-16LE string (an `IMAGE_RESOURCE_DIR_STRING_U`) at a file
    /// offset: a u16 length in code units followed by the characters. The
    /// length is capped at `MAX_PATH` units.
    pub(crate) fn utf16_counted_at(&self, offset: usize) -> Option<String> {
        let units = self.u16_at(offset)? as usize;
        let units = units.min(MAX_PATH);
        let raw = self.slice(offset.checked_add(2)?, units.checked_mul(2)?)?;
        let mut buf = Vec::with_capacity(units);
        for pair in raw.chunks_exact(2) {
            buf.push(u16::from_le_bytes([pair[0], pair[1]]));
        }
        Some(String::from_utf16_lossy(&buf))
    }
}

/// Section-table RVA resolution shared by [`ImageView`] and the model's
/// public `offset_from_rva`.
pub(crate) fn rva_to_offset(sections: &[SectionRecord], rva: u64, file_size: usize) -> Option<usize> {
    for sec in sections {
        let hdr = &sec.header;
        let start = u64::from(hdr.virtual_address);
        let size = u64::from(hdr.virtual_size);
        if rva >= start && rva < start.checked_add(size)? {
            let offset = rva
                .checked_sub(start)?
                .checked_add(u64::from(hdr.pointer_to_raw_data))?;
            let offset = usize::try_from(offset).ok()?;
            if offset >= file_size {
                return None;
            }
            return Some(offset);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_reads_le() {
        let data = [0x4D, 0x5A, 0x01, 0x00, 0x00, 0x00];
        let mut cur = Cursor::new(&data);
        assert_eq!(cur.u16(), Some(0x5A4D));
        assert_eq!(cur.u32(), Some(1));
        assert_eq!(cur.u8(), None);
    }

    #[test]
    fn test_cursor_stops_at_end() {
        let data = [0xFF; 3];
        let mut cur = Cursor::new(&data);
        assert_eq!(cur.u32(), None);
        // A failed read does not advance.
        assert_eq!(cur.u16(), Some(0xFFFF));
    }

    #[test]
    fn test_view_slice_boundary() {
        let data = [0u8; 8];
        let view = ImageView::new(&data, &[], 0);
        assert!(view.slice(0, 8).is_some());
        assert!(view.slice(8, 0).is_some());
        assert!(view.slice(1, 8).is_none());
        assert!(view.slice(usize::MAX, 2).is_none());
    }

    #[test]
    fn test_cstr_truncates_at_cap() {
        let mut data = vec![b'A'; 300];
        data.push(0);
        let view = ImageView::new(&data, &[], 0);
        let s = view.cstr_at(0, MAX_PATH).unwrap();
        assert_eq!(s.len(), MAX_PATH);
    }

    #[test]
    fn test_utf16_counted() {
        // Length 4, "ICON".
        let mut data = vec![4u8, 0];
        for ch in "ICON".encode_utf16() {
            data.extend_from_slice(&ch.to_le_bytes());
        }
        let view = ImageView::new(&data, &[], 0);
        assert_eq!(view.utf16_counted_at(0).as_deref(), Some("ICON"));
    }
}

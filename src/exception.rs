//! Exception directory (.pdata) parsing.

use crate::data_dir::DataDirectory;
use crate::reader::{Cursor, ImageView};

/// RUNTIME_FUNCTION - 12 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RuntimeFunction {
    /// RVA of the function start.
    pub begin_address: u32,
    /// RVA one past the function end.
    pub end_address: u32,
    /// RVA of the unwind information.
    pub unwind_info_address: u32,
}

impl RuntimeFunction {
    pub const SIZE: usize = 12;

    pub(crate) fn read(cur: &mut Cursor<'_>) -> Option<Self> {
        Some(Self {
            begin_address: cur.u32()?,
            end_address: cur.u32()?,
            unwind_info_address: cur.u32()?,
        })
    }

    /// Check if an RVA falls inside this function.
    pub fn contains_rva(&self, rva: u32) -> bool {
        rva >= self.begin_address && rva < self.end_address
    }
}

/// One exception table record with its file offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionEntry {
    /// File offset of this record.
    pub offset: u32,
    /// The raw runtime-function record.
    pub function: RuntimeFunction,
}

/// Parse the runtime-function table. The entry count comes from the
/// directory size; entries past the end of the file are dropped.
pub(crate) fn parse(view: &ImageView<'_>, dir: DataDirectory) -> Option<Vec<ExceptionEntry>> {
    if dir.virtual_address == 0 {
        return None;
    }
    let start = view.rva_to_offset(u64::from(dir.virtual_address))?;
    let count = dir.size as usize / RuntimeFunction::SIZE;
    if count == 0 {
        return None;
    }

    let mut entries = Vec::with_capacity(count.min(4096));
    for i in 0..count {
        let Some(offset) = start.checked_add(i * RuntimeFunction::SIZE) else {
            break;
        };
        let Some(raw) = view.slice(offset, RuntimeFunction::SIZE) else {
            break;
        };
        let Some(function) = RuntimeFunction::read(&mut Cursor::new(raw)) else {
            break;
        };
        entries.push(ExceptionEntry {
            offset: offset as u32,
            function,
        });
    }

    Some(entries)
}

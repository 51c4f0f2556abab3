//! Delay import directory parsing.
//!
//! A delay-load descriptor carries four parallel thunk arrays: the name
//! table drives the walk, and the address, bound-address and unload-info
//! tables contribute one thunk each per position. Any absent parallel array
//! substitutes zeroed thunks.

use crate::data_dir::DataDirectory;
use crate::import::ImportThunk;
use crate::reader::{Cursor, ImageView, MAX_PATH};

/// IMAGE_DELAYLOAD_DESCRIPTOR - 32 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DelayLoadDescriptor {
    /// Attribute flags.
    pub attributes: u32,
    /// RVA of the DLL name; zero terminates the descriptor chain.
    pub dll_name_rva: u32,
    /// RVA of the module handle slot.
    pub module_handle_rva: u32,
    /// RVA of the delay import address table.
    pub import_address_table_rva: u32,
    /// RVA of the delay import name table.
    pub import_name_table_rva: u32,
    /// RVA of the bound delay import address table.
    pub bound_import_address_table_rva: u32,
    /// RVA of the unload information table.
    pub unload_information_table_rva: u32,
    /// Bind timestamp.
    pub time_date_stamp: u32,
}

impl DelayLoadDescriptor {
    pub const SIZE: usize = 32;

    pub(crate) fn read(cur: &mut Cursor<'_>) -> Option<Self> {
        Some(Self {
            attributes: cur.u32()?,
            dll_name_rva: cur.u32()?,
            module_handle_rva: cur.u32()?,
            import_address_table_rva: cur.u32()?,
            import_name_table_rva: cur.u32()?,
            bound_import_address_table_rva: cur.u32()?,
            unload_information_table_rva: cur.u32()?,
            time_date_stamp: cur.u32()?,
        })
    }
}

/// The four parallel thunks of one delay-imported function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayImportThunks {
    /// From the import name table.
    pub name: ImportThunk,
    /// From the import address table.
    pub address: ImportThunk,
    /// From the bound import address table.
    pub bound_address: ImportThunk,
    /// From the unload information table.
    pub unload_info: ImportThunk,
}

/// One delay-imported function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayImportFunction {
    pub thunks: DelayImportThunks,
    /// Hint from the IMAGE_IMPORT_BY_NAME record, zero for ordinal imports.
    pub hint: u16,
    /// Function name, empty for ordinal imports.
    pub name: String,
}

/// One delay-imported module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayImportModule {
    /// File offset of this descriptor.
    pub offset: u32,
    /// The raw descriptor.
    pub descriptor: DelayLoadDescriptor,
    /// Imported DLL name.
    pub dll_name: String,
    pub functions: Vec<DelayImportFunction>,
}

fn thunk_width(is_64bit: bool) -> usize {
    if is_64bit {
        8
    } else {
        4
    }
}

fn read_thunk(view: &ImageView<'_>, offset: usize, is_64bit: bool) -> Option<ImportThunk> {
    if is_64bit {
        view.u64_at(offset).map(ImportThunk::Thunk64)
    } else {
        view.u32_at(offset).map(ImportThunk::Thunk32)
    }
}

/// Parallel-array slot: the thunk at position `k`, or a zeroed thunk when
/// the array is absent or truncated.
fn parallel_thunk(
    view: &ImageView<'_>,
    base: Option<usize>,
    k: usize,
    is_64bit: bool,
) -> ImportThunk {
    let Some(base) = base else {
        return ImportThunk::zeroed(is_64bit);
    };
    base.checked_add(k * thunk_width(is_64bit))
        .and_then(|at| read_thunk(view, at, is_64bit))
        .unwrap_or_else(|| ImportThunk::zeroed(is_64bit))
}

fn read_functions(
    view: &ImageView<'_>,
    descriptor: &DelayLoadDescriptor,
    is_64bit: bool,
) -> Vec<DelayImportFunction> {
    let Some(name_base) = view.rva_to_offset(u64::from(descriptor.import_name_table_rva)) else {
        return Vec::new();
    };
    let iat_base = view.rva_to_offset(u64::from(descriptor.import_address_table_rva));
    let bound_base = view.rva_to_offset(u64::from(descriptor.bound_import_address_table_rva));
    let unload_base = view.rva_to_offset(u64::from(descriptor.unload_information_table_rva));
    let step = thunk_width(is_64bit);

    let mut functions = Vec::new();
    for k in 0.. {
        let Some(at) = name_base.checked_add(k * step) else {
            break;
        };
        let Some(name_thunk) = read_thunk(view, at, is_64bit) else {
            break;
        };
        if name_thunk.value() == 0 {
            break;
        }

        let mut hint = 0u16;
        let mut name = String::new();
        if !name_thunk.is_ordinal() {
            if let Some(hn_off) = view.rva_to_offset(name_thunk.hint_name_rva()) {
                if let Some(h) = view.u16_at(hn_off) {
                    hint = h;
                    name = view.cstr_at(hn_off + 2, MAX_PATH).unwrap_or_default();
                }
            }
        }

        functions.push(DelayImportFunction {
            thunks: DelayImportThunks {
                name: name_thunk,
                address: parallel_thunk(view, iat_base, k, is_64bit),
                bound_address: parallel_thunk(view, bound_base, k, is_64bit),
                unload_info: parallel_thunk(view, unload_base, k, is_64bit),
            },
            hint,
            name,
        });
    }

    functions
}

/// Walk the delay-load descriptor chain.
pub(crate) fn parse(
    view: &ImageView<'_>,
    dir: DataDirectory,
    is_64bit: bool,
) -> Option<Vec<DelayImportModule>> {
    if dir.virtual_address == 0 {
        return None;
    }
    let mut offset = view.rva_to_offset(u64::from(dir.virtual_address))?;

    let mut modules = Vec::new();
    loop {
        let Some(descriptor) =
            view.cursor_at(offset).and_then(|mut c| DelayLoadDescriptor::read(&mut c))
        else {
            break;
        };
        if descriptor.dll_name_rva == 0 {
            break;
        }

        if descriptor.import_name_table_rva != 0 {
            let functions = read_functions(view, &descriptor, is_64bit);
            let dll_name = view
                .cstr_at_rva(u64::from(descriptor.dll_name_rva), MAX_PATH)
                .unwrap_or_default();
            modules.push(DelayImportModule {
                offset: offset as u32,
                descriptor,
                dll_name,
                functions,
            });
        }

        offset += DelayLoadDescriptor::SIZE;
    }

    Some(modules)
}

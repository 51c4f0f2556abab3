//! Load configuration directory parsing.
//!
//! The load-config structure has grown with every Windows release; the
//! fields through the Control Flow Guard block cover what the sixteen
//! standard directories expose. The structure's own `Size` field is
//! retained, and fields past the end of the file read as zero.

use crate::data_dir::DataDirectory;
use crate::reader::{Cursor, ImageView};

/// IMAGE_LOAD_CONFIG_DIRECTORY32, through the Guard CF fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadConfigDirectory32 {
    pub size: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub global_flags_clear: u32,
    pub global_flags_set: u32,
    pub critical_section_default_timeout: u32,
    pub de_commit_free_block_threshold: u32,
    pub de_commit_total_free_threshold: u32,
    /// VA of the lock prefix table.
    pub lock_prefix_table: u32,
    pub maximum_allocation_size: u32,
    pub virtual_memory_threshold: u32,
    pub process_heap_flags: u32,
    pub process_affinity_mask: u32,
    pub csd_version: u16,
    pub dependent_load_flags: u16,
    pub edit_list: u32,
    /// VA of the /GS security cookie.
    pub security_cookie: u32,
    /// VA of the SafeSEH handler table.
    pub se_handler_table: u32,
    pub se_handler_count: u32,
    pub guard_cf_check_function_pointer: u32,
    pub guard_cf_dispatch_function_pointer: u32,
    pub guard_cf_function_table: u32,
    pub guard_cf_function_count: u32,
    pub guard_flags: u32,
}

impl LoadConfigDirectory32 {
    /// Fixed part through `SEHandlerCount`.
    pub const BASE_SIZE: usize = 72;

    pub(crate) fn read(cur: &mut Cursor<'_>) -> Option<Self> {
        let mut dir = Self {
            size: cur.u32()?,
            time_date_stamp: cur.u32()?,
            major_version: cur.u16()?,
            minor_version: cur.u16()?,
            global_flags_clear: cur.u32()?,
            global_flags_set: cur.u32()?,
            critical_section_default_timeout: cur.u32()?,
            de_commit_free_block_threshold: cur.u32()?,
            de_commit_total_free_threshold: cur.u32()?,
            lock_prefix_table: cur.u32()?,
            maximum_allocation_size: cur.u32()?,
            virtual_memory_threshold: cur.u32()?,
            process_heap_flags: cur.u32()?,
            process_affinity_mask: cur.u32()?,
            csd_version: cur.u16()?,
            dependent_load_flags: cur.u16()?,
            edit_list: cur.u32()?,
            security_cookie: cur.u32()?,
            se_handler_table: cur.u32()?,
            se_handler_count: cur.u32()?,
            ..Default::default()
        };
        // Guard CF fields appear in newer images only.
        if let Some(v) = cur.u32() {
            dir.guard_cf_check_function_pointer = v;
            dir.guard_cf_dispatch_function_pointer = cur.u32().unwrap_or(0);
            dir.guard_cf_function_table = cur.u32().unwrap_or(0);
            dir.guard_cf_function_count = cur.u32().unwrap_or(0);
            dir.guard_flags = cur.u32().unwrap_or(0);
        }
        Some(dir)
    }
}

/// IMAGE_LOAD_CONFIG_DIRECTORY64, through the Guard CF fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadConfigDirectory64 {
    pub size: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub global_flags_clear: u32,
    pub global_flags_set: u32,
    pub critical_section_default_timeout: u32,
    pub de_commit_free_block_threshold: u64,
    pub de_commit_total_free_threshold: u64,
    /// VA of the lock prefix table.
    pub lock_prefix_table: u64,
    pub maximum_allocation_size: u64,
    pub virtual_memory_threshold: u64,
    pub process_affinity_mask: u64,
    pub process_heap_flags: u32,
    pub csd_version: u16,
    pub dependent_load_flags: u16,
    pub edit_list: u64,
    /// VA of the /GS security cookie.
    pub security_cookie: u64,
    /// VA of the SafeSEH handler table.
    pub se_handler_table: u64,
    pub se_handler_count: u64,
    pub guard_cf_check_function_pointer: u64,
    pub guard_cf_dispatch_function_pointer: u64,
    pub guard_cf_function_table: u64,
    pub guard_cf_function_count: u64,
    pub guard_flags: u32,
}

impl LoadConfigDirectory64 {
    /// Fixed part through `SEHandlerCount`.
    pub const BASE_SIZE: usize = 112;

    pub(crate) fn read(cur: &mut Cursor<'_>) -> Option<Self> {
        let mut dir = Self {
            size: cur.u32()?,
            time_date_stamp: cur.u32()?,
            major_version: cur.u16()?,
            minor_version: cur.u16()?,
            global_flags_clear: cur.u32()?,
            global_flags_set: cur.u32()?,
            critical_section_default_timeout: cur.u32()?,
            de_commit_free_block_threshold: cur.u64()?,
            de_commit_total_free_threshold: cur.u64()?,
            lock_prefix_table: cur.u64()?,
            maximum_allocation_size: cur.u64()?,
            virtual_memory_threshold: cur.u64()?,
            process_affinity_mask: cur.u64()?,
            process_heap_flags: cur.u32()?,
            csd_version: cur.u16()?,
            dependent_load_flags: cur.u16()?,
            edit_list: cur.u64()?,
            security_cookie: cur.u64()?,
            se_handler_table: cur.u64()?,
            se_handler_count: cur.u64()?,
            ..Default::default()
        };
        if let Some(v) = cur.u64() {
            dir.guard_cf_check_function_pointer = v;
            dir.guard_cf_dispatch_function_pointer = cur.u64().unwrap_or(0);
            dir.guard_cf_function_table = cur.u64().unwrap_or(0);
            dir.guard_cf_function_count = cur.u64().unwrap_or(0);
            dir.guard_flags = cur.u32().unwrap_or(0);
        }
        Some(dir)
    }
}

/// Load-config directory in either width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadConfigDirectory {
    Config32(LoadConfigDirectory32),
    Config64(LoadConfigDirectory64),
}

/// The parsed load-config record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadConfig {
    /// File offset of the directory.
    pub offset: u32,
    /// The raw 32- or 64-bit directory.
    pub directory: LoadConfigDirectory,
}

pub(crate) fn parse(view: &ImageView<'_>, dir: DataDirectory, is_64bit: bool) -> Option<LoadConfig> {
    if dir.virtual_address == 0 {
        return None;
    }
    let offset = view.rva_to_offset(u64::from(dir.virtual_address))?;
    let mut cur = view.cursor_at(offset)?;
    let directory = if is_64bit {
        LoadConfigDirectory::Config64(LoadConfigDirectory64::read(&mut cur)?)
    } else {
        LoadConfigDirectory::Config32(LoadConfigDirectory32::read(&mut cur)?)
    };

    Some(LoadConfig {
        offset: offset as u32,
        directory,
    })
}

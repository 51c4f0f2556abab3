//! # peview
//!
//! A read-only, bounds-checked parser for PE (Portable Executable) images,
//! PE32 and PE32+.
//!
//! The parser ingests a byte buffer and produces an owned, immutable
//! [`Pe`] model of every standard header and directory: MS-DOS stub, the
//! undocumented "Rich" stub, NT/file/optional headers, data directories,
//! the section table, and the sixteen directory tables (export, import,
//! resources, exceptions, certificates, relocations, debug, TLS, load
//! config, bound and delay imports, CLR descriptor, and the presence-only
//! architecture / global-pointer / IAT entries).
//!
//! ## Design
//!
//! The input is untrusted. Every read goes through a bounds-checked reader,
//! every offset addition is overflow-checked, and the recursive resource
//! tree is cycle-guarded. Only a missing DOS header fails a load; malformed
//! directories degrade to absent or partially-filled records, with per-
//! directory presence flags in [`FileInfo`] telling the two apart.
//!
//! ## Example
//!
//! ```no_run
//! use peview::Pe;
//!
//! let bytes = std::fs::read("example.dll")?;
//! let pe = Pe::parse(&bytes)?;
//!
//! if let Some(info) = pe.file_info() {
//!     println!("64-bit: {}", info.is_pe64);
//! }
//! for module in pe.imports().unwrap_or_default() {
//!     println!("{}: {} functions", module.dll_name, module.functions.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bound_import;
pub mod clr;
pub mod coff;
pub mod data_dir;
pub mod debug;
pub mod delay_import;
pub mod dos;
pub mod error;
pub mod exception;
pub mod export;
pub mod import;
pub mod loadconfig;
pub mod optional;
pub mod pe;
pub mod reloc;
pub mod resource;
pub mod rich;
pub mod section;
pub mod security;
pub mod tls;

mod reader;

pub use bound_import::{BoundForwarder, BoundForwarderRef, BoundImportDescriptor, BoundModule};
pub use clr::{ComDescriptor, Cor20Header};
pub use coff::{FileHeader, PE_SIGNATURE};
pub use data_dir::{DataDirEntry, DataDirectory, DataDirectoryType};
pub use debug::{DebugDirectory, DebugEntry};
pub use delay_import::{DelayImportFunction, DelayImportModule, DelayImportThunks, DelayLoadDescriptor};
pub use dos::{DosHeader, DOS_SIGNATURE};
pub use error::{LoadError, Result};
pub use exception::{ExceptionEntry, RuntimeFunction};
pub use export::{ExportDirectory, ExportFunction, ExportTable};
pub use import::{ImportDescriptor, ImportFunction, ImportModule, ImportThunk};
pub use loadconfig::{LoadConfig, LoadConfigDirectory, LoadConfigDirectory32, LoadConfigDirectory64};
pub use optional::{OptionalHeader, OptionalHeader32, OptionalHeader64, PE32PLUS_MAGIC, PE32_MAGIC};
pub use pe::{FileInfo, NtHeaders, Pe};
pub use reloc::{BaseRelocation, RelocBlock, RelocEntry};
pub use resource::{
    flatten as flatten_resources, FlatResource, ResourceData, ResourceDataEntry,
    ResourceDirectory, ResourceDirectoryEntry, ResourceLangDir, ResourceLangEntry,
    ResourceNameChild, ResourceNameDir, ResourceNameEntry, ResourceRoot, ResourceTypeChild,
    ResourceTypeEntry,
};
pub use rich::RichEntry;
pub use section::{SectionHeader, SectionRecord};
pub use security::{SecurityEntry, WinCertificate};
pub use tls::{TlsDirectory, TlsDirectory32, TlsDirectory64, TlsRecord};

//! The parsed image model and the parse orchestrator.
//!
//! `Pe::load` drives the header parsers in order, then every directory
//! parser, recording a presence flag per structure. Only a missing or
//! undersized DOS header fails the load; a missing NT header simply leaves
//! every directory flag unset, and each directory fails soft on its own.
//! All record bytes are copied, so the input buffer can be dropped as soon
//! as `load` returns.

use crate::bound_import::{self, BoundModule};
use crate::clr::{self, ComDescriptor};
use crate::coff::{FileHeader, PE_SIGNATURE};
use crate::data_dir::{self, DataDirEntry, DataDirectory, DataDirectoryType};
use crate::debug::{self as debug_dir, DebugEntry};
use crate::delay_import::{self, DelayImportModule};
use crate::dos::DosHeader;
use crate::error::{LoadError, Result};
use crate::exception::{self, ExceptionEntry};
use crate::export::{self, ExportTable};
use crate::import::{self, ImportModule};
use crate::loadconfig::{self, LoadConfig};
use crate::optional::OptionalHeader;
use crate::reader::{self, ImageView};
use crate::reloc::{self, RelocBlock};
use crate::resource::{self, FlatResource, ResourceRoot};
use crate::rich::{self, RichEntry};
use crate::section::{self, SectionRecord};
use crate::security::{self, SecurityEntry};
use crate::tls::{self, TlsRecord};

/// NT headers: the signature plus file and optional headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtHeaders {
    /// File offset of the "PE\0\0" signature.
    pub offset: u32,
    pub file_header: FileHeader,
    /// PE32 or PE32+ optional header.
    pub optional_header: OptionalHeader,
}

/// Per-structure presence flags and the bitness discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileInfo {
    pub is_pe32: bool,
    pub is_pe64: bool,
    pub has_dos_hdr: bool,
    pub has_rich_hdr: bool,
    pub has_nt_hdr: bool,
    pub has_data_dirs: bool,
    pub has_sections: bool,
    pub has_export: bool,
    pub has_import: bool,
    pub has_resource: bool,
    pub has_exception: bool,
    pub has_security: bool,
    pub has_reloc: bool,
    pub has_debug: bool,
    pub has_architecture: bool,
    pub has_global_ptr: bool,
    pub has_tls: bool,
    pub has_load_config: bool,
    pub has_bound_import: bool,
    pub has_iat: bool,
    pub has_delay_import: bool,
    pub has_com_descriptor: bool,
}

/// A parsed PE image.
///
/// Every accessor answers `Some` exactly when the corresponding presence
/// flag is set. The model is immutable once loaded and safe to share across
/// threads.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Pe {
    loaded: bool,
    file_size: usize,
    image_base: u64,
    info: FileInfo,
    dos_header: Option<DosHeader>,
    rich: Vec<RichEntry>,
    nt_headers: Option<NtHeaders>,
    data_dirs: Vec<DataDirEntry>,
    sections: Vec<SectionRecord>,
    export: Option<ExportTable>,
    imports: Vec<ImportModule>,
    resources: Option<ResourceRoot>,
    exceptions: Vec<ExceptionEntry>,
    security: Vec<SecurityEntry>,
    relocations: Vec<RelocBlock>,
    debug: Vec<DebugEntry>,
    tls: Option<TlsRecord>,
    load_config: Option<LoadConfig>,
    bound_imports: Vec<BoundModule>,
    delay_imports: Vec<DelayImportModule>,
    com_descriptor: Option<ComDescriptor>,
}

/// Presence-only probe: the directory counts as present when its RVA is
/// non-zero and resolves through the section table.
fn directory_resolves(view: &ImageView<'_>, dir: DataDirectory) -> bool {
    dir.virtual_address != 0 && view.rva_to_offset(u64::from(dir.virtual_address)).is_some()
}

impl Pe {
    /// Fresh, not-loaded model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a PE image from a byte buffer into a fresh model.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < DosHeader::SIZE {
            return Err(LoadError::FileTooSmall);
        }
        let dos_header = DosHeader::parse(data).ok_or(LoadError::NoDosHeader)?;

        let mut info = FileInfo {
            has_dos_hdr: true,
            ..FileInfo::default()
        };

        let rich = rich::parse(data, dos_header.e_lfanew);
        info.has_rich_hdr = rich.is_some();
        let rich = rich.unwrap_or_default();

        // NT headers. Without them there is nothing further to parse.
        let header_view = ImageView::new(data, &[], 0);
        let mut nt_headers = None;
        if dos_header.e_lfanew >= 0 {
            let nt_offset = dos_header.e_lfanew as usize;
            if let Some(mut cur) = header_view.cursor_at(nt_offset) {
                if cur.u32() == Some(PE_SIGNATURE) {
                    if let Some(file_header) = FileHeader::read(&mut cur) {
                        if let Some(optional_header) = OptionalHeader::read(&mut cur) {
                            info.is_pe32 = optional_header.is_pe32();
                            info.is_pe64 = optional_header.is_pe32plus();
                            info.has_nt_hdr = true;
                            nt_headers = Some(NtHeaders {
                                offset: nt_offset as u32,
                                file_header,
                                optional_header,
                            });
                        }
                    }
                }
            }
        }

        let Some(nt) = nt_headers else {
            return Ok(Self {
                loaded: true,
                file_size: data.len(),
                info,
                dos_header: Some(dos_header),
                rich,
                ..Self::default()
            });
        };

        let image_base = nt.optional_header.image_base();
        let is_64bit = info.is_pe64;

        let table_offset = (nt.offset as usize)
            .saturating_add(4 + FileHeader::SIZE)
            .saturating_add(usize::from(nt.file_header.size_of_optional_header));
        let sections = section::parse_table(
            data,
            table_offset,
            usize::from(nt.file_header.number_of_sections),
            &nt.file_header,
        );
        info.has_sections = !sections.is_empty();

        let data_dirs = data_dir::annotate(nt.optional_header.data_directories(), &sections);
        info.has_data_dirs = !data_dirs.is_empty();

        let view = ImageView::new(data, &sections, image_base);
        let dir = |t: DataDirectoryType| nt.optional_header.directory(t.as_index());

        let export = export::parse(&view, dir(DataDirectoryType::Export));
        info.has_export = export.is_some();

        let imports = import::parse(&view, dir(DataDirectoryType::Import), is_64bit);
        info.has_import = imports.is_some();
        let imports = imports.unwrap_or_default();

        let resources = resource::parse(&view, dir(DataDirectoryType::Resource));
        info.has_resource = resources.is_some();

        let exceptions = exception::parse(&view, dir(DataDirectoryType::Exception));
        info.has_exception = exceptions.is_some();
        let exceptions = exceptions.unwrap_or_default();

        let security = security::parse(&view, dir(DataDirectoryType::Security));
        info.has_security = security.is_some();
        let security = security.unwrap_or_default();

        let relocations = reloc::parse(&view, dir(DataDirectoryType::BaseReloc));
        info.has_reloc = relocations.is_some();
        let relocations = relocations.unwrap_or_default();

        let debug = debug_dir::parse(&view, dir(DataDirectoryType::Debug), &sections);
        info.has_debug = debug.is_some();
        let debug = debug.unwrap_or_default();

        info.has_architecture = directory_resolves(&view, dir(DataDirectoryType::Architecture));
        info.has_global_ptr = directory_resolves(&view, dir(DataDirectoryType::GlobalPtr));

        let tls = tls::parse(&view, dir(DataDirectoryType::Tls), is_64bit);
        info.has_tls = tls.is_some();

        let load_config = loadconfig::parse(&view, dir(DataDirectoryType::LoadConfig), is_64bit);
        info.has_load_config = load_config.is_some();

        let bound_imports = bound_import::parse(&view, dir(DataDirectoryType::BoundImport));
        info.has_bound_import = bound_imports.is_some();
        let bound_imports = bound_imports.unwrap_or_default();

        info.has_iat = directory_resolves(&view, dir(DataDirectoryType::Iat));

        let delay_imports =
            delay_import::parse(&view, dir(DataDirectoryType::DelayImport), is_64bit);
        info.has_delay_import = delay_imports.is_some();
        let delay_imports = delay_imports.unwrap_or_default();

        let com_descriptor = clr::parse(&view, dir(DataDirectoryType::ComDescriptor));
        info.has_com_descriptor = com_descriptor.is_some();

        Ok(Self {
            loaded: true,
            file_size: data.len(),
            image_base,
            info,
            dos_header: Some(dos_header),
            rich,
            nt_headers: Some(nt),
            data_dirs,
            sections,
            export,
            imports,
            resources,
            exceptions,
            security,
            relocations,
            debug,
            tls,
            load_config,
            bound_imports,
            delay_imports,
            com_descriptor,
        })
    }

    /// Load a buffer into this model, clearing any previous state first.
    /// On error the model is left cleared.
    pub fn load(&mut self, data: &[u8]) -> Result<()> {
        self.clear();
        *self = Self::parse(data)?;
        Ok(())
    }

    /// Reset to the not-loaded state, dropping every record and flag.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Presence flags, available once any load succeeded.
    pub fn file_info(&self) -> Option<&FileInfo> {
        self.loaded.then_some(&self.info)
    }

    /// Preferred load address, when NT headers were parsed.
    pub fn image_base(&self) -> Option<u64> {
        self.info.has_nt_hdr.then_some(self.image_base)
    }

    /// Translate an RVA to a file offset through the section table.
    pub fn offset_from_rva(&self, rva: u64) -> Option<usize> {
        if !self.loaded {
            return None;
        }
        reader::rva_to_offset(&self.sections, rva, self.file_size)
    }

    /// Translate a VA to a file offset by rebasing it off the image base.
    pub fn offset_from_va(&self, va: u64) -> Option<usize> {
        self.offset_from_rva(va.checked_sub(self.image_base)?)
    }

    pub fn dos_header(&self) -> Option<&DosHeader> {
        if !self.loaded || !self.info.has_dos_hdr {
            return None;
        }
        self.dos_header.as_ref()
    }

    pub fn rich(&self) -> Option<&[RichEntry]> {
        (self.loaded && self.info.has_rich_hdr).then_some(self.rich.as_slice())
    }

    pub fn nt_header(&self) -> Option<&NtHeaders> {
        if !self.loaded || !self.info.has_nt_hdr {
            return None;
        }
        self.nt_headers.as_ref()
    }

    pub fn data_dirs(&self) -> Option<&[DataDirEntry]> {
        (self.loaded && self.info.has_data_dirs).then_some(self.data_dirs.as_slice())
    }

    pub fn sections(&self) -> Option<&[SectionRecord]> {
        (self.loaded && self.info.has_sections).then_some(self.sections.as_slice())
    }

    /// Find a parsed section by resolved name.
    pub fn section_by_name(&self, name: &str) -> Option<&SectionRecord> {
        section::section_by_name(self.sections()?, name)
    }

    /// Find the parsed section whose virtual range contains `rva`.
    pub fn section_by_rva(&self, rva: u64) -> Option<&SectionRecord> {
        section::section_by_rva(self.sections()?, rva)
    }

    pub fn export_table(&self) -> Option<&ExportTable> {
        if !self.loaded || !self.info.has_export {
            return None;
        }
        self.export.as_ref()
    }

    pub fn imports(&self) -> Option<&[ImportModule]> {
        (self.loaded && self.info.has_import).then_some(self.imports.as_slice())
    }

    pub fn resources(&self) -> Option<&ResourceRoot> {
        if !self.loaded || !self.info.has_resource {
            return None;
        }
        self.resources.as_ref()
    }

    /// One row per resource leaf, in tree order. Empty when the image has no
    /// resource directory.
    pub fn flatten_resources(&self) -> Vec<FlatResource<'_>> {
        self.resources().map(resource::flatten).unwrap_or_default()
    }

    pub fn exceptions(&self) -> Option<&[ExceptionEntry]> {
        (self.loaded && self.info.has_exception).then_some(self.exceptions.as_slice())
    }

    pub fn security(&self) -> Option<&[SecurityEntry]> {
        (self.loaded && self.info.has_security).then_some(self.security.as_slice())
    }

    pub fn relocations(&self) -> Option<&[RelocBlock]> {
        (self.loaded && self.info.has_reloc).then_some(self.relocations.as_slice())
    }

    pub fn debug(&self) -> Option<&[DebugEntry]> {
        (self.loaded && self.info.has_debug).then_some(self.debug.as_slice())
    }

    pub fn tls(&self) -> Option<&TlsRecord> {
        if !self.loaded || !self.info.has_tls {
            return None;
        }
        self.tls.as_ref()
    }

    pub fn load_config(&self) -> Option<&LoadConfig> {
        if !self.loaded || !self.info.has_load_config {
            return None;
        }
        self.load_config.as_ref()
    }

    pub fn bound_imports(&self) -> Option<&[BoundModule]> {
        (self.loaded && self.info.has_bound_import).then_some(self.bound_imports.as_slice())
    }

    pub fn delay_imports(&self) -> Option<&[DelayImportModule]> {
        (self.loaded && self.info.has_delay_import).then_some(self.delay_imports.as_slice())
    }

    pub fn com_descriptor(&self) -> Option<&ComDescriptor> {
        if !self.loaded || !self.info.has_com_descriptor {
            return None;
        }
        self.com_descriptor.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_too_small() {
        let data = [0u8; 60];
        assert_eq!(Pe::parse(&data), Err(LoadError::FileTooSmall));
    }

    #[test]
    fn test_no_dos_header() {
        let data = [0u8; 64];
        assert_eq!(Pe::parse(&data), Err(LoadError::NoDosHeader));
    }

    #[test]
    fn test_fresh_model_not_loaded() {
        let pe = Pe::new();
        assert!(!pe.is_loaded());
        assert!(pe.file_info().is_none());
        assert!(pe.dos_header().is_none());
        assert!(pe.offset_from_rva(0x1000).is_none());
    }

    #[test]
    fn test_dos_only_image() {
        let mut data = vec![0u8; 0x100];
        data[0] = b'M';
        data[1] = b'Z';
        data[60..64].copy_from_slice(&0x3Ci32.to_le_bytes());

        let pe = Pe::parse(&data).unwrap();
        assert!(pe.is_loaded());
        let info = pe.file_info().unwrap();
        assert!(info.has_dos_hdr);
        assert!(!info.has_nt_hdr);
        assert!(!info.is_pe32 && !info.is_pe64);
        assert!(!info.has_data_dirs && !info.has_sections);
        assert!(pe.nt_header().is_none());
    }

    #[test]
    fn test_load_clears_previous_state() {
        let mut data = vec![0u8; 0x100];
        data[0] = b'M';
        data[1] = b'Z';

        let mut pe = Pe::new();
        pe.load(&data).unwrap();
        assert!(pe.is_loaded());

        // A failing load leaves the model cleared, not stale.
        let junk = [0u8; 64];
        assert_eq!(pe.load(&junk), Err(LoadError::NoDosHeader));
        assert!(!pe.is_loaded());
        assert!(pe.dos_header().is_none());
    }

    #[test]
    fn test_clear_resets() {
        let mut data = vec![0u8; 0x100];
        data[0] = b'M';
        data[1] = b'Z';

        let mut pe = Pe::new();
        pe.load(&data).unwrap();
        pe.clear();
        assert!(!pe.is_loaded());
        assert_eq!(pe, Pe::new());
    }
}

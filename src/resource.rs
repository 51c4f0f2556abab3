//! Resource directory parsing.
//!
//! Resources form a three-level tree: type, then name, then language. Every
//! level is an `IMAGE_RESOURCE_DIRECTORY` followed by its entries; entry
//! offsets are relative to the resource root, except the leaf data entry's
//! `OffsetToData`, which is a plain RVA. Malformed images can point a child
//! directory back at an ancestor, so each descent is guarded.

use tracing::debug;

use crate::data_dir::DataDirectory;
use crate::reader::{Cursor, ImageView};

/// High bit of the name/offset fields of a directory entry.
const SUBDIR_FLAG: u32 = 0x8000_0000;

/// Well-known resource type identifiers.
pub fn type_name(id: u16) -> Option<&'static str> {
    Some(match id {
        1 => "RT_CURSOR",
        2 => "RT_BITMAP",
        3 => "RT_ICON",
        4 => "RT_MENU",
        5 => "RT_DIALOG",
        6 => "RT_STRING",
        7 => "RT_FONTDIR",
        8 => "RT_FONT",
        9 => "RT_ACCELERATOR",
        10 => "RT_RCDATA",
        11 => "RT_MESSAGETABLE",
        12 => "RT_GROUP_CURSOR",
        14 => "RT_GROUP_ICON",
        16 => "RT_VERSION",
        17 => "RT_DLGINCLUDE",
        19 => "RT_PLUGPLAY",
        20 => "RT_VXD",
        21 => "RT_ANICURSOR",
        22 => "RT_ANIICON",
        23 => "RT_HTML",
        24 => "RT_MANIFEST",
        _ => return None,
    })
}

/// IMAGE_RESOURCE_DIRECTORY - 16 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceDirectory {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub number_of_named_entries: u16,
    pub number_of_id_entries: u16,
}

impl ResourceDirectory {
    pub const SIZE: usize = 16;

    pub(crate) fn read(cur: &mut Cursor<'_>) -> Option<Self> {
        Some(Self {
            characteristics: cur.u32()?,
            time_date_stamp: cur.u32()?,
            major_version: cur.u16()?,
            minor_version: cur.u16()?,
            number_of_named_entries: cur.u16()?,
            number_of_id_entries: cur.u16()?,
        })
    }

    /// Total entries following this directory header.
    pub fn entry_count(&self) -> usize {
        usize::from(self.number_of_named_entries) + usize::from(self.number_of_id_entries)
    }
}

/// IMAGE_RESOURCE_DIRECTORY_ENTRY - 8 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceDirectoryEntry {
    /// Name offset (high bit: name is a string) or integer ID.
    pub name: u32,
    /// Child offset (high bit: child is a directory) or data entry offset.
    pub offset_to_data: u32,
}

impl ResourceDirectoryEntry {
    pub const SIZE: usize = 8;

    pub(crate) fn read(cur: &mut Cursor<'_>) -> Option<Self> {
        Some(Self {
            name: cur.u32()?,
            offset_to_data: cur.u32()?,
        })
    }

    /// The name field points at a counted UTF-16 string.
    pub fn name_is_string(&self) -> bool {
        self.name & SUBDIR_FLAG != 0
    }

    /// Root-relative offset of the name string.
    pub fn name_offset(&self) -> u32 {
        self.name & !SUBDIR_FLAG
    }

    /// Integer ID, meaningful when the name is not a string.
    pub fn id(&self) -> u16 {
        (self.name & 0xFFFF) as u16
    }

    /// The offset field points at a child directory.
    pub fn data_is_directory(&self) -> bool {
        self.offset_to_data & SUBDIR_FLAG != 0
    }

    /// Root-relative offset of the child directory or data entry.
    pub fn child_offset(&self) -> u32 {
        self.offset_to_data & !SUBDIR_FLAG
    }
}

/// IMAGE_RESOURCE_DATA_ENTRY - 16 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResourceDataEntry {
    /// RVA of the resource bytes. Unlike directory-entry offsets this is not
    /// resource-relative.
    pub offset_to_data: u32,
    pub size: u32,
    pub code_page: u32,
    pub reserved: u32,
}

impl ResourceDataEntry {
    pub const SIZE: usize = 16;

    pub(crate) fn read(cur: &mut Cursor<'_>) -> Option<Self> {
        Some(Self {
            offset_to_data: cur.u32()?,
            size: cur.u32()?,
            code_page: cur.u32()?,
            reserved: cur.u32()?,
        })
    }
}

/// A data leaf: the raw data entry plus a copy of the bytes it points at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceData {
    /// The raw data entry.
    pub data_entry: ResourceDataEntry,
    /// Copied resource bytes; empty when the RVA or size did not resolve.
    pub bytes: Vec<u8>,
}

/// Language-level (level 3) entry: always a leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLangEntry {
    pub entry: ResourceDirectoryEntry,
    /// Unicode name, when the entry is named rather than ID-keyed.
    pub name: Option<String>,
    /// The leaf, absent when its data entry was unreadable.
    pub data: Option<ResourceData>,
}

/// Language-level (level 3) directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceLangDir {
    /// File offset of this directory header.
    pub offset: u32,
    pub directory: ResourceDirectory,
    pub entries: Vec<ResourceLangEntry>,
}

/// What a name-level entry leads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceNameChild {
    /// A level-3 directory. Empty when the descent was cut by the cycle
    /// guard.
    Directory(ResourceLangDir),
    /// A data leaf directly at level 2.
    Data(ResourceData),
}

/// Name-level (level 2) entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNameEntry {
    pub entry: ResourceDirectoryEntry,
    pub name: Option<String>,
    /// Absent when the child pointer was unreadable.
    pub child: Option<ResourceNameChild>,
}

/// Name-level (level 2) directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceNameDir {
    /// File offset of this directory header.
    pub offset: u32,
    pub directory: ResourceDirectory,
    pub entries: Vec<ResourceNameEntry>,
}

/// What a type-level entry leads to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceTypeChild {
    /// A level-2 directory. Empty when the descent was cut by the cycle
    /// guard.
    Directory(ResourceNameDir),
    /// A data leaf directly at the root.
    Data(ResourceData),
}

/// Type-level (root) entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceTypeEntry {
    pub entry: ResourceDirectoryEntry,
    pub name: Option<String>,
    /// Absent when the child pointer was unreadable.
    pub child: Option<ResourceTypeChild>,
}

/// The resource tree root.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceRoot {
    /// File offset of the root directory header.
    pub offset: u32,
    pub directory: ResourceDirectory,
    pub entries: Vec<ResourceTypeEntry>,
}

/// One flattened leaf: its identity on all three levels plus the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlatResource<'a> {
    /// Type ID, zero when the type is named.
    pub type_id: u16,
    /// Type name, when named.
    pub type_name: Option<&'a str>,
    /// Name ID, zero when named.
    pub name_id: u16,
    /// Resource name, when named.
    pub name_name: Option<&'a str>,
    /// Language ID, zero when named.
    pub lang_id: u16,
    /// Language name, when named.
    pub lang_name: Option<&'a str>,
    /// The leaf's raw bytes.
    pub data: &'a [u8],
}

/// Directory header plus a validated span for its entries.
fn read_dir_at(
    view: &ImageView<'_>,
    offset: usize,
) -> Option<(ResourceDirectory, usize /* first entry */)> {
    let directory = ResourceDirectory::read(&mut view.cursor_at(offset)?)?;
    let first = offset.checked_add(ResourceDirectory::SIZE)?;
    view.slice(first, directory.entry_count().checked_mul(ResourceDirectoryEntry::SIZE)?)?;
    Some((directory, first))
}

fn read_name(view: &ImageView<'_>, root: usize, entry: &ResourceDirectoryEntry) -> Option<String> {
    if !entry.name_is_string() {
        return None;
    }
    let at = root.checked_add(entry.name_offset() as usize)?;
    view.utf16_counted_at(at)
}

/// Read the data entry a non-directory entry points at, and copy its bytes.
/// The bytes may end exactly at EOF.
fn read_leaf(view: &ImageView<'_>, root: usize, entry: &ResourceDirectoryEntry) -> Option<ResourceData> {
    let at = root.checked_add(entry.child_offset() as usize)?;
    let data_entry = ResourceDataEntry::read(&mut view.cursor_at(at)?)?;

    let bytes = view
        .rva_to_offset(u64::from(data_entry.offset_to_data))
        .and_then(|p| view.slice(p, data_entry.size as usize))
        .map(<[u8]>::to_vec)
        .unwrap_or_default();

    Some(ResourceData { data_entry, bytes })
}

fn parse_lang_dir(view: &ImageView<'_>, root: usize, dir_off: usize) -> Option<ResourceLangDir> {
    let (directory, first) = read_dir_at(view, dir_off)?;
    let mut entries = Vec::with_capacity(directory.entry_count());
    for i in 0..directory.entry_count() {
        let entry =
            ResourceDirectoryEntry::read(&mut view.cursor_at(first + i * ResourceDirectoryEntry::SIZE)?)?;
        let name = read_name(view, root, &entry);
        let data = read_leaf(view, root, &entry);
        entries.push(ResourceLangEntry { entry, name, data });
    }
    Some(ResourceLangDir {
        offset: dir_off as u32,
        directory,
        entries,
    })
}

fn parse_name_dir(view: &ImageView<'_>, root: usize, dir_off: usize) -> Option<ResourceNameDir> {
    let (directory, first) = read_dir_at(view, dir_off)?;
    let mut entries = Vec::with_capacity(directory.entry_count());
    for i in 0..directory.entry_count() {
        let entry =
            ResourceDirectoryEntry::read(&mut view.cursor_at(first + i * ResourceDirectoryEntry::SIZE)?)?;
        let name = read_name(view, root, &entry);

        let child = if entry.data_is_directory() {
            match root.checked_add(entry.child_offset() as usize) {
                Some(lang_off) if lang_off < view.len() => {
                    if lang_off == root || lang_off == dir_off {
                        // Points back at an ancestor: terminal empty directory.
                        debug!(lang_off, "resource language directory loops back");
                        let directory = ResourceDirectory::read(&mut view.cursor_at(lang_off)?)?;
                        Some(ResourceNameChild::Directory(ResourceLangDir {
                            offset: lang_off as u32,
                            directory,
                            entries: Vec::new(),
                        }))
                    } else {
                        parse_lang_dir(view, root, lang_off).map(ResourceNameChild::Directory)
                    }
                }
                _ => None,
            }
        } else {
            read_leaf(view, root, &entry).map(ResourceNameChild::Data)
        };

        entries.push(ResourceNameEntry { entry, name, child });
    }
    Some(ResourceNameDir {
        offset: dir_off as u32,
        directory,
        entries,
    })
}

/// Parse the whole resource tree.
pub(crate) fn parse(view: &ImageView<'_>, dir: DataDirectory) -> Option<ResourceRoot> {
    if dir.virtual_address == 0 {
        return None;
    }
    let root = view.rva_to_offset(u64::from(dir.virtual_address))?;
    let (directory, first) = read_dir_at(view, root)?;

    let mut entries = Vec::with_capacity(directory.entry_count());
    for i in 0..directory.entry_count() {
        let entry =
            ResourceDirectoryEntry::read(&mut view.cursor_at(first + i * ResourceDirectoryEntry::SIZE)?)?;
        let name = read_name(view, root, &entry);

        let child = if entry.data_is_directory() {
            match root.checked_add(entry.child_offset() as usize) {
                Some(name_off) if name_off < view.len() => {
                    if name_off == root {
                        debug!(name_off, "resource name directory loops back to the root");
                        let directory = ResourceDirectory::read(&mut view.cursor_at(name_off)?)?;
                        Some(ResourceTypeChild::Directory(ResourceNameDir {
                            offset: name_off as u32,
                            directory,
                            entries: Vec::new(),
                        }))
                    } else {
                        parse_name_dir(view, root, name_off).map(ResourceTypeChild::Directory)
                    }
                }
                _ => None,
            }
        } else {
            read_leaf(view, root, &entry).map(ResourceTypeChild::Data)
        };

        entries.push(ResourceTypeEntry { entry, name, child });
    }

    Some(ResourceRoot {
        offset: root as u32,
        directory,
        entries,
    })
}

/// Linearize the tree: one row per leaf, in tree order.
pub fn flatten(root: &ResourceRoot) -> Vec<FlatResource<'_>> {
    let mut rows = Vec::new();

    for type_entry in &root.entries {
        let mut row = FlatResource::default();
        match &type_entry.name {
            Some(name) => row.type_name = Some(name.as_str()),
            None => row.type_id = type_entry.entry.id(),
        }

        match &type_entry.child {
            Some(ResourceTypeChild::Directory(name_dir)) => {
                for name_entry in &name_dir.entries {
                    let mut row = row.clone();
                    match &name_entry.name {
                        Some(name) => row.name_name = Some(name.as_str()),
                        None => row.name_id = name_entry.entry.id(),
                    }

                    match &name_entry.child {
                        Some(ResourceNameChild::Directory(lang_dir)) => {
                            for lang_entry in &lang_dir.entries {
                                let mut row = row.clone();
                                match &lang_entry.name {
                                    Some(name) => row.lang_name = Some(name.as_str()),
                                    None => row.lang_id = lang_entry.entry.id(),
                                }
                                if let Some(data) = &lang_entry.data {
                                    row.data = &data.bytes;
                                }
                                rows.push(row);
                            }
                        }
                        Some(ResourceNameChild::Data(data)) => {
                            let mut row = row.clone();
                            row.data = &data.bytes;
                            rows.push(row);
                        }
                        None => {}
                    }
                }
            }
            Some(ResourceTypeChild::Data(data)) => {
                row.data = &data.bytes;
                rows.push(row);
            }
            None => {}
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::{SectionHeader, SectionRecord};

    fn rsrc_section(va: u32, raw: u32, len: u32) -> Vec<SectionRecord> {
        vec![SectionRecord {
            offset: 0,
            header: SectionHeader {
                name: *b".rsrc\0\0\0",
                virtual_size: len,
                virtual_address: va,
                size_of_raw_data: len,
                pointer_to_raw_data: raw,
                pointer_to_relocations: 0,
                pointer_to_linenumbers: 0,
                number_of_relocations: 0,
                number_of_linenumbers: 0,
                characteristics: 0,
            },
            name: ".rsrc".into(),
        }]
    }

    fn put_u16(data: &mut [u8], at: usize, v: u16) {
        data[at..at + 2].copy_from_slice(&v.to_le_bytes());
    }

    fn put_u32(data: &mut [u8], at: usize, v: u32) {
        data[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// Directory header with `ids` ID entries at `at`.
    fn put_dir(data: &mut [u8], at: usize, ids: u16) {
        put_u16(data, at + 14, ids);
    }

    /// Resource tree at RVA 0x1000 (= file offset 0x1000): one RT_ICON type,
    /// one name (ID 1), one language (0x409) leaf with 4 bytes of data.
    fn icon_image() -> Vec<u8> {
        let mut data = vec![0u8; 0x2000];
        let root = 0x1000usize;
        put_dir(&mut data, root, 1);
        // Root entry: ID 3 (RT_ICON), child directory at +0x20.
        put_u32(&mut data, root + 16, 3);
        put_u32(&mut data, root + 20, 0x20 | 0x8000_0000);
        // Name directory at +0x20: ID 1, child directory at +0x40.
        put_dir(&mut data, root + 0x20, 1);
        put_u32(&mut data, root + 0x30, 1);
        put_u32(&mut data, root + 0x34, 0x40 | 0x8000_0000);
        // Language directory at +0x40: ID 0x409, data entry at +0x60.
        put_dir(&mut data, root + 0x40, 1);
        put_u32(&mut data, root + 0x50, 0x409);
        put_u32(&mut data, root + 0x54, 0x60);
        // Data entry at +0x60: RVA 0x1800, size 4.
        put_u32(&mut data, root + 0x60, 0x1800);
        put_u32(&mut data, root + 0x64, 4);
        data[0x1800..0x1804].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
        data
    }

    fn icon_dir() -> DataDirectory {
        DataDirectory {
            virtual_address: 0x1000,
            size: 0x1000,
        }
    }

    #[test]
    fn test_three_level_tree() {
        let data = icon_image();
        let sections = rsrc_section(0x1000, 0x1000, 0x1000);
        let view = ImageView::new(&data, &sections, 0x40_0000);

        let root = parse(&view, icon_dir()).unwrap();
        assert_eq!(root.offset, 0x1000);
        assert_eq!(root.entries.len(), 1);
        assert_eq!(root.entries[0].entry.id(), 3);

        let Some(ResourceTypeChild::Directory(names)) = &root.entries[0].child else {
            panic!("expected a name directory");
        };
        assert_eq!(names.entries.len(), 1);
        assert_eq!(names.entries[0].entry.id(), 1);

        let Some(ResourceNameChild::Directory(langs)) = &names.entries[0].child else {
            panic!("expected a language directory");
        };
        assert_eq!(langs.entries.len(), 1);
        assert_eq!(langs.entries[0].entry.id(), 0x409);

        let data_leaf = langs.entries[0].data.as_ref().unwrap();
        assert_eq!(data_leaf.bytes, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn test_cycle_to_root_is_terminal() {
        let mut data = icon_image();
        // Name directory's child points back at the resource root.
        put_u32(&mut data, 0x1000 + 0x34, 0x8000_0000);
        let sections = rsrc_section(0x1000, 0x1000, 0x1000);
        let view = ImageView::new(&data, &sections, 0x40_0000);

        let root = parse(&view, icon_dir()).unwrap();
        let Some(ResourceTypeChild::Directory(names)) = &root.entries[0].child else {
            panic!("expected a name directory");
        };
        let Some(ResourceNameChild::Directory(langs)) = &names.entries[0].child else {
            panic!("expected a terminal directory");
        };
        assert!(langs.entries.is_empty());
    }

    #[test]
    fn test_named_type_string() {
        let mut data = icon_image();
        // Root entry name: string at +0x70, "CFG" (3 UTF-16 units).
        put_u32(&mut data, 0x1000 + 16, 0x70 | 0x8000_0000);
        put_u16(&mut data, 0x1070, 3);
        for (i, ch) in "CFG".encode_utf16().enumerate() {
            put_u16(&mut data, 0x1072 + i * 2, ch);
        }
        let sections = rsrc_section(0x1000, 0x1000, 0x1000);
        let view = ImageView::new(&data, &sections, 0x40_0000);

        let root = parse(&view, icon_dir()).unwrap();
        assert_eq!(root.entries[0].name.as_deref(), Some("CFG"));
    }

    #[test]
    fn test_flatten_single_leaf() {
        let data = icon_image();
        let sections = rsrc_section(0x1000, 0x1000, 0x1000);
        let view = ImageView::new(&data, &sections, 0x40_0000);
        let root = parse(&view, icon_dir()).unwrap();

        let rows = flatten(&root);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].type_id, 3);
        assert_eq!(rows[0].name_id, 1);
        assert_eq!(rows[0].lang_id, 0x409);
        assert_eq!(rows[0].data, &[0xDE, 0xAD, 0xBE, 0xEF]);

        // Re-flattening yields the same sequence.
        assert_eq!(flatten(&root), rows);
    }

    #[test]
    fn test_data_to_eof_boundary_inclusive() {
        let mut data = icon_image();
        // Leaf data runs to exactly the end of the file.
        let tail = data.len() as u32 - 0x1800;
        put_u32(&mut data, 0x1000 + 0x64, tail);
        let sections = rsrc_section(0x1000, 0x1000, 0x1000);
        let view = ImageView::new(&data, &sections, 0x40_0000);

        let root = parse(&view, icon_dir()).unwrap();
        let rows = flatten(&root);
        assert_eq!(rows[0].data.len(), tail as usize);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(type_name(3), Some("RT_ICON"));
        assert_eq!(type_name(24), Some("RT_MANIFEST"));
        assert_eq!(type_name(999), None);
    }
}

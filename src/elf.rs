//! # ELF Module
//!
//! Symbol index over an ELF64 executable image.
//!
//! [`ElfImage::load`] validates the file header, finds the section header table, the section
//! name table and the first `SHT_SYMTAB` section with its linked string table. The image borrows
//! the file contents: headers and symbols are typed views into the buffer, produced by
//! [`object`]'s bounds-checked [`ReadRef`] accessors, so a corrupted offset ends in
//! [`ElfError::Truncated`] instead of a read past the buffer.
//!
//! The index answers the two questions the debugger asks: where does a function start
//! ([`ElfImage::resolve_name`]), and which function contains an address
//! ([`ElfImage::resolve_address`]).

use std::collections::HashMap;
use std::fmt::Display;

use object::elf::{
    FileHeader64, SectionHeader64, Sym64, ELFCLASS64, ELFDATA2LSB, ELFDATA2MSB, ELFMAG, SHN_ABS,
    SHN_COMMON, SHN_UNDEF, SHN_XINDEX, SHT_SYMTAB, STB_GLOBAL, STB_LOCAL, STB_WEAK, STT_FILE,
    STT_FUNC, STT_NOTYPE, STT_OBJECT, STT_SECTION, STV_DEFAULT, STV_HIDDEN, STV_INTERNAL,
    STV_PROTECTED,
};
use object::read::StringTable;
use object::{Endianness, ReadRef};
use tracing::{debug, trace};

use crate::addr::Addr;
use crate::errors::ElfError;

type Header = FileHeader64<Endianness>;
type SectionHeader = SectionHeader64<Endianness>;
type Sym = Sym64<Endianness>;

/// Symbol type, from the low nibble of `st_info`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    NoType,
    Object,
    Function,
    Section,
    File,
    Other(u8),
}

impl From<u8> for SymbolKind {
    fn from(st_type: u8) -> Self {
        match st_type {
            STT_NOTYPE => SymbolKind::NoType,
            STT_OBJECT => SymbolKind::Object,
            STT_FUNC => SymbolKind::Function,
            STT_SECTION => SymbolKind::Section,
            STT_FILE => SymbolKind::File,
            other => SymbolKind::Other(other),
        }
    }
}

impl Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SymbolKind::NoType => "STT_NOTYPE",
            SymbolKind::Object => "STT_OBJECT",
            SymbolKind::Function => "STT_FUNC",
            SymbolKind::Section => "STT_SECTION",
            SymbolKind::File => "STT_FILE",
            SymbolKind::Other(_) => "STT_UNKNOWN",
        };
        f.pad(s)
    }
}

/// Symbol binding, from the high nibble of `st_info`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolBind {
    Local,
    Global,
    Weak,
    Other(u8),
}

impl From<u8> for SymbolBind {
    fn from(st_bind: u8) -> Self {
        match st_bind {
            STB_LOCAL => SymbolBind::Local,
            STB_GLOBAL => SymbolBind::Global,
            STB_WEAK => SymbolBind::Weak,
            other => SymbolBind::Other(other),
        }
    }
}

impl Display for SymbolBind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SymbolBind::Local => "STB_LOCAL",
            SymbolBind::Global => "STB_GLOBAL",
            SymbolBind::Weak => "STB_WEAK",
            SymbolBind::Other(_) => "STB_UNKNOWN",
        };
        f.pad(s)
    }
}

/// Symbol visibility, from the low bits of `st_other`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolVisibility {
    Default,
    Internal,
    Hidden,
    Protected,
}

impl From<u8> for SymbolVisibility {
    fn from(st_other: u8) -> Self {
        match st_other & 0x3 {
            STV_DEFAULT => SymbolVisibility::Default,
            STV_INTERNAL => SymbolVisibility::Internal,
            STV_HIDDEN => SymbolVisibility::Hidden,
            STV_PROTECTED => SymbolVisibility::Protected,
            _ => unreachable!("visibility is two bits wide"),
        }
    }
}

impl Display for SymbolVisibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SymbolVisibility::Default => "STV_DEFAULT",
            SymbolVisibility::Internal => "STV_INTERNAL",
            SymbolVisibility::Hidden => "STV_HIDDEN",
            SymbolVisibility::Protected => "STV_PROTECTED",
        };
        f.pad(s)
    }
}

/// One entry of the symbol table
///
/// The name borrows from the image's string table. Names that are not valid UTF-8 are
/// represented as the empty string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolEntry<'data> {
    pub name: &'data str,
    pub value: Addr,
    pub size: u64,
    pub kind: SymbolKind,
    pub bind: SymbolBind,
    pub visibility: SymbolVisibility,
    pub section_index: u16,
}

impl SymbolEntry<'_> {
    /// Whether `addr` lies in the half-open range `[value, value + size)`
    pub fn contains(&self, addr: Addr) -> bool {
        let start = self.value.u64();
        let addr = addr.u64();
        addr >= start && addr - start < self.size
    }

    pub fn is_function(&self) -> bool {
        self.kind == SymbolKind::Function
    }
}

/// The parsed executable
///
/// Built once per session from the bytes of the executable and never modified afterwards.
#[derive(Debug)]
pub struct ElfImage<'data> {
    endian: Endianness,
    sections: &'data [SectionHeader],
    section_names: Option<StringTable<'data>>,
    symbols: Vec<SymbolEntry<'data>>,
    functions_by_name: HashMap<&'data str, usize>,
}

impl<'data> ElfImage<'data> {
    /// Parses `data` as an ELF64 image and indexes its symbol table
    ///
    /// # Errors
    ///
    /// * [`ElfError::NotElf`] if the magic does not match
    /// * [`ElfError::Unsupported`] for 32-bit images or an unknown data encoding
    /// * [`ElfError::Malformed`] if the header declares table entry sizes that are not ELF64
    /// * [`ElfError::Truncated`] if any table or string lies outside `data`
    /// * [`ElfError::NoSymbolTable`] if there is no `SHT_SYMTAB` section
    pub fn load(data: &'data [u8]) -> Result<Self, ElfError> {
        if data.len() < ELFMAG.len() || data[..ELFMAG.len()] != ELFMAG {
            return Err(ElfError::NotElf);
        }
        let header: &Header = data.read_at(0).map_err(|_| ElfError::Truncated)?;
        if header.e_ident.class != ELFCLASS64 {
            return Err(ElfError::Unsupported("only 64-bit images are supported"));
        }
        let endian = match header.e_ident.data {
            ELFDATA2LSB => Endianness::Little,
            ELFDATA2MSB => Endianness::Big,
            _ => return Err(ElfError::Unsupported("unknown data encoding")),
        };

        let sections = Self::section_table(data, header, endian)?;
        debug!("found {} sections", sections.len());

        let shstrndx = Self::section_names_index(data, header, endian)?;
        let section_names = if shstrndx == u32::from(SHN_UNDEF) {
            None
        } else {
            let shdr = sections.get(shstrndx as usize).ok_or(ElfError::Truncated)?;
            Some(Self::string_table(data, shdr, endian)?)
        };

        let symtab = sections
            .iter()
            .find(|s| s.sh_type.get(endian) == SHT_SYMTAB)
            .ok_or(ElfError::NoSymbolTable)?;
        let symbols = Self::parse_symbols(data, sections, symtab, endian)?;

        let mut functions_by_name = HashMap::new();
        for (idx, sym) in symbols.iter().enumerate() {
            if sym.is_function() && !sym.name.is_empty() {
                functions_by_name.entry(sym.name).or_insert(idx);
            }
        }
        debug!(
            "indexed {} symbols, {} named functions",
            symbols.len(),
            functions_by_name.len()
        );

        Ok(ElfImage {
            endian,
            sections,
            section_names,
            symbols,
            functions_by_name,
        })
    }

    fn section_table(
        data: &'data [u8],
        header: &Header,
        endian: Endianness,
    ) -> Result<&'data [SectionHeader], ElfError> {
        let shoff = header.e_shoff.get(endian);
        if shoff == 0 {
            return Ok(&[]);
        }
        if header.e_shentsize.get(endian) as usize != std::mem::size_of::<SectionHeader>() {
            return Err(ElfError::Malformed("unexpected section header size"));
        }
        let mut shnum = header.e_shnum.get(endian) as usize;
        if shnum == 0 {
            // extended numbering: the real count lives in the first section header
            let first: &SectionHeader = data.read_at(shoff).map_err(|_| ElfError::Truncated)?;
            shnum = usize::try_from(first.sh_size.get(endian))
                .map_err(|_| ElfError::Truncated)?;
        }
        data.read_slice_at(shoff, shnum)
            .map_err(|_| ElfError::Truncated)
    }

    fn section_names_index(
        data: &'data [u8],
        header: &Header,
        endian: Endianness,
    ) -> Result<u32, ElfError> {
        let idx = header.e_shstrndx.get(endian);
        if idx != SHN_XINDEX {
            return Ok(idx as u32);
        }
        let first: &SectionHeader = data
            .read_at(header.e_shoff.get(endian))
            .map_err(|_| ElfError::Truncated)?;
        Ok(first.sh_link.get(endian))
    }

    fn string_table(
        data: &'data [u8],
        shdr: &SectionHeader,
        endian: Endianness,
    ) -> Result<StringTable<'data>, ElfError> {
        let start = shdr.sh_offset.get(endian);
        let size = shdr.sh_size.get(endian);
        data.read_bytes_at(start, size)
            .map_err(|_| ElfError::Truncated)?;
        Ok(StringTable::new(data, start, start + size))
    }

    fn parse_symbols(
        data: &'data [u8],
        sections: &'data [SectionHeader],
        symtab: &SectionHeader,
        endian: Endianness,
    ) -> Result<Vec<SymbolEntry<'data>>, ElfError> {
        let entsize = symtab.sh_entsize.get(endian) as usize;
        if entsize != 0 && entsize != std::mem::size_of::<Sym>() {
            return Err(ElfError::Malformed("unexpected symbol entry size"));
        }
        let count = usize::try_from(symtab.sh_size.get(endian))
            .map_err(|_| ElfError::Truncated)?
            / std::mem::size_of::<Sym>();
        let raw: &'data [Sym] = data
            .read_slice_at(symtab.sh_offset.get(endian), count)
            .map_err(|_| ElfError::Truncated)?;

        let strtab_shdr = sections
            .get(symtab.sh_link.get(endian) as usize)
            .ok_or(ElfError::Truncated)?;
        let strings = Self::string_table(data, strtab_shdr, endian)?;

        raw.iter()
            .map(|sym| {
                let name_off = sym.st_name.get(endian);
                let name = if name_off == 0 {
                    ""
                } else {
                    let bytes = strings.get(name_off).map_err(|_| ElfError::Truncated)?;
                    std::str::from_utf8(bytes).unwrap_or_else(|_| {
                        trace!("symbol name at {name_off:#x} is not valid utf-8");
                        ""
                    })
                };
                Ok(SymbolEntry {
                    name,
                    value: Addr::from(sym.st_value.get(endian)),
                    size: sym.st_size.get(endian),
                    kind: SymbolKind::from(sym.st_info & 0xf),
                    bind: SymbolBind::from(sym.st_info >> 4),
                    visibility: SymbolVisibility::from(sym.st_other),
                    section_index: sym.st_shndx.get(endian),
                })
            })
            .collect()
    }

    /// All symbols in table order, including the null entry
    pub fn symbols(&self) -> &[SymbolEntry<'data>] {
        &self.symbols
    }

    /// Function symbols in table order
    pub fn functions(&self) -> impl Iterator<Item = &SymbolEntry<'data>> {
        self.symbols.iter().filter(|s| s.is_function())
    }

    /// Looks up the address of the function called `name`
    ///
    /// Only function symbols are considered. If several functions share a name, the first one
    /// in table order wins.
    pub fn resolve_name(&self, name: &str) -> Option<Addr> {
        self.functions_by_name
            .get(name)
            .map(|idx| self.symbols[*idx].value)
    }

    /// Finds the function whose range contains `addr`
    ///
    /// Ranges of well-formed images do not overlap; if they do, the first match in table order
    /// is returned.
    pub fn resolve_address(&self, addr: Addr) -> Option<&SymbolEntry<'data>> {
        self.functions().find(|s| s.contains(addr))
    }

    /// Name of the section with header index `index`
    pub fn section_name(&self, index: usize) -> Option<&'data str> {
        let shdr = self.sections.get(index)?;
        let bytes = self
            .section_names
            .as_ref()?
            .get(shdr.sh_name.get(self.endian))
            .ok()?;
        std::str::from_utf8(bytes).ok()
    }

    /// Renders the section column of a symbol listing
    ///
    /// Reserved indices get their usual short names, and an index without a resolvable name is
    /// printed as a number.
    pub fn section_label(&self, index: u16) -> String {
        match index {
            SHN_UNDEF => "UND".to_string(),
            SHN_ABS => "ABS".to_string(),
            SHN_COMMON => "COM".to_string(),
            idx => self
                .section_name(idx as usize)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| idx.to_string()),
        }
    }
}

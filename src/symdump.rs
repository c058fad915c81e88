//! Static symbol table listing, one tab separated line per symbol.
//!
//! Columns: value, size, kind, bind, visibility, section, name. Source file symbols are left out.

use std::io::Write;

use crate::elf::{ElfImage, SymbolEntry, SymbolKind};

/// Renders the listing line of `sym`
pub fn symbol_line(image: &ElfImage<'_>, sym: &SymbolEntry<'_>) -> String {
    format!(
        "{:016x}\t{}\t{}\t{}\t{}\t{}\t{}",
        sym.value,
        sym.size,
        sym.kind,
        sym.bind,
        sym.visibility,
        image.section_label(sym.section_index),
        sym.name
    )
}

/// Writes the listing of all symbols of `image` in table order
///
/// Returns the number of lines written.
pub fn write_symbols<W: Write>(image: &ElfImage<'_>, out: &mut W) -> std::io::Result<usize> {
    let mut lines = 0;
    for sym in image
        .symbols()
        .iter()
        .filter(|s| s.kind != SymbolKind::File)
    {
        writeln!(out, "{}", symbol_line(image, sym))?;
        lines += 1;
    }
    Ok(lines)
}

// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Listing file generation.
//!
//! The listing is rendered purely from each section's byte records: a row
//! starts at every opcode or annotated record, so the disassembly-style
//! view never re-derives instruction boundaries.

use std::io::Write;

use crate::core::section::{ByteRecord, Section, Sections};
use crate::core::symbol_table::SymbolTable;

const ROW_BYTES: usize = 8;

/// Writer for listing file output.
pub struct ListingWriter<W: Write> {
    out: W,
}

impl<W: Write> ListingWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn header(&mut self, title: &str) -> std::io::Result<()> {
        writeln!(self.out, "{title}")?;
        writeln!(self.out, "ADDR    BYTES                     ")?;
        writeln!(self.out, "------  --------------------------")?;
        Ok(())
    }

    pub fn write_sections(&mut self, sections: &Sections) -> std::io::Result<()> {
        for section in sections.iter() {
            if section.is_empty() {
                continue;
            }
            self.write_section(section)?;
        }
        Ok(())
    }

    fn write_section(&mut self, section: &Section) -> std::io::Result<()> {
        writeln!(
            self.out,
            "\nSECTION {} (base {:04X})",
            section.kind,
            section.base
        )?;

        let mut row: Vec<&ByteRecord> = Vec::new();
        for record in section.records() {
            let starts_row = record.is_opcode || record.annotation.is_some();
            if !row.is_empty() && (starts_row || row.len() >= ROW_BYTES) {
                self.write_row(&row)?;
                row.clear();
            }
            row.push(record);
        }
        if !row.is_empty() {
            self.write_row(&row)?;
        }
        Ok(())
    }

    fn write_row(&mut self, row: &[&ByteRecord]) -> std::io::Result<()> {
        let bytes: Vec<String> = row.iter().map(|r| format!("{:02X}", r.value)).collect();
        let annotation = row
            .first()
            .and_then(|r| r.annotation.as_deref())
            .unwrap_or("");
        writeln!(
            self.out,
            "{:04X}    {:<26}{}",
            row[0].addr,
            bytes.join(" "),
            annotation
        )
    }

    pub fn footer(
        &mut self,
        symbols: &SymbolTable,
        entry_point: Option<u32>,
        errors: usize,
        warnings: usize,
    ) -> std::io::Result<()> {
        writeln!(self.out, "\nErrors: {errors}  Warnings: {warnings}")?;
        if let Some(entry) = entry_point {
            writeln!(self.out, "Entry point: {entry:04X}")?;
        }
        if !symbols.is_empty() {
            writeln!(self.out, "\nSYMBOL TABLE\n")?;
            symbols.dump(&mut self.out)?;
        }
        Ok(())
    }
}

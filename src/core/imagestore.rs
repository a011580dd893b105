// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Image store with hex/bin output helpers.

use std::collections::BTreeMap;
use std::io::{self, Write};

use crate::core::section::Sections;

const LINE_LIMIT: usize = 32;

/// A flat address→byte mapping assembled from section streams, plus the
/// output writers consuming it.
#[derive(Default)]
pub struct ImageStore {
    bytes: BTreeMap<u32, u8>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flatten the three sections in order (code, data, reserved). Later
    /// records layer over earlier ones when base addresses overlap.
    pub fn from_sections(sections: &Sections) -> Self {
        let mut image = Self::new();
        for section in sections.iter() {
            for record in section.records() {
                image.store(record.addr, record.value);
            }
        }
        image
    }

    pub fn store(&mut self, addr: u32, value: u8) {
        self.bytes.insert(addr, value);
    }

    pub fn store_slice(&mut self, addr: u32, values: &[u8]) {
        for (ix, value) in values.iter().enumerate() {
            self.store(addr.wrapping_add(ix as u32), *value);
        }
    }

    pub fn num_entries(&self) -> usize {
        self.bytes.len()
    }

    pub fn output_range(&self) -> Option<(u32, u32)> {
        let min = self.bytes.keys().next()?;
        let max = self.bytes.keys().next_back()?;
        Some((*min, *max))
    }

    /// Write the image as Intel HEX records, optionally with a Start
    /// Segment Address record.
    pub fn write_hex_file<W: Write>(&self, mut out: W, go_addr: Option<u16>) -> io::Result<()> {
        let mut line_addr: u16 = 0;
        let mut line_bytes: u8 = 0;
        let mut checksum: u8 = 0;
        let mut hex_data = String::new();

        let entries: Vec<(u16, u8)> = self
            .bytes
            .iter()
            .map(|(addr, value)| (*addr as u16, *value))
            .collect();
        for (ix, (addr, value)) in entries.iter().enumerate() {
            if line_bytes == 0 {
                line_addr = *addr;
                checksum = 0;
                hex_data.clear();
            }
            hex_data.push_str(&format!("{value:02X}"));
            checksum = checksum.wrapping_add(*value);
            line_bytes = line_bytes.wrapping_add(1);

            let next_addr = entries
                .get(ix + 1)
                .map(|(next, _)| *next)
                .unwrap_or(*addr);
            if (line_bytes as usize) >= LINE_LIMIT || next_addr != addr.wrapping_add(1) {
                checksum = checksum.wrapping_add(line_bytes);
                checksum = checksum.wrapping_add((line_addr >> 8) as u8);
                checksum = checksum.wrapping_add((line_addr & 0xff) as u8);
                checksum = (!checksum).wrapping_add(1);
                writeln!(
                    out,
                    ":{:02X}{:04X}00{}{:02X}",
                    line_bytes, line_addr, hex_data, checksum
                )?;
                line_bytes = 0;
            }
        }

        if let Some(addr) = go_addr {
            let mut csum: u8 = 0;
            csum = csum.wrapping_add(4);
            csum = csum.wrapping_add(3);
            csum = csum.wrapping_add((addr >> 8) as u8);
            csum = csum.wrapping_add((addr & 0xff) as u8);
            csum = (!csum).wrapping_add(1);
            writeln!(out, ":040000030000{addr:04X}{csum:02X}")?;
        }

        writeln!(out, ":00000001FF")?;
        Ok(())
    }

    /// Write the image bytes in `[start, end]` as a raw binary, filling
    /// holes with `fill`.
    pub fn write_bin_file<W: Write>(
        &self,
        mut out: W,
        start: u32,
        end: u32,
        fill: u8,
    ) -> io::Result<()> {
        if end < start {
            return Ok(());
        }
        let mut buf = Vec::with_capacity((end - start + 1) as usize);
        for addr in start..=end {
            buf.push(self.bytes.get(&addr).copied().unwrap_or(fill));
        }
        out.write_all(&buf)
    }
}

// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Machine descriptors and the per-compile lookup tables derived from them.
//!
//! A [`MachineDescriptor`] is plain data supplied by the embedding
//! application: registers with aliases, mnemonics with one or more
//! operand-shape variants, address width, and byte order. The assembler
//! never consults the descriptor directly; at compile start it builds a
//! [`MachineTables`] value with case-normalized name lookups, owned by
//! that compile run alone. Two concurrent compiles share nothing.

use std::collections::HashMap;
use std::fmt;

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

use crate::core::matcher::OperandPattern;
use crate::core::operand::VariantPredicate;

/// Byte order for multi-byte values in emitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn write_u16(self, buf: &mut [u8], value: u16) {
        match self {
            ByteOrder::Little => LittleEndian::write_u16(buf, value),
            ByteOrder::Big => BigEndian::write_u16(buf, value),
        }
    }

    /// Write `value` into the first `nbytes` of `buf`.
    pub fn write_uint(self, buf: &mut [u8], value: u64, nbytes: usize) {
        match self {
            ByteOrder::Little => LittleEndian::write_uint(buf, value, nbytes),
            ByteOrder::Big => BigEndian::write_uint(buf, value, nbytes),
        }
    }
}

/// A named register with optional aliases.
#[derive(Debug, Clone)]
pub struct RegisterDescriptor {
    pub name: String,
    pub aliases: Vec<String>,
    pub id: u8,
    pub width: u8,
}

impl RegisterDescriptor {
    pub fn new(name: &str, id: u8, width: u8) -> Self {
        Self {
            name: name.to_string(),
            aliases: Vec::new(),
            id,
            width,
        }
    }

    pub fn alias(mut self, name: &str) -> Self {
        self.aliases.push(name.to_string());
        self
    }
}

/// One opcode/size/pattern alternative for a mnemonic.
#[derive(Debug, Clone)]
pub struct InstructionVariant {
    pub pattern: String,
    pub opcode: u8,
    pub size: u8,
    pub predicate: Option<VariantPredicate>,
    pub display: Option<String>,
}

impl InstructionVariant {
    pub fn new(pattern: &str, opcode: u8, size: u8) -> Self {
        Self {
            pattern: pattern.to_string(),
            opcode,
            size,
            predicate: None,
            display: None,
        }
    }

    pub fn when(mut self, predicate: VariantPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn shown_as(mut self, display: &str) -> Self {
        self.display = Some(display.to_string());
        self
    }
}

/// A mnemonic with a default shape and optional variant list.
#[derive(Debug, Clone)]
pub struct InstructionDescriptor {
    pub mnemonic: String,
    pub opcode: u8,
    pub pattern: String,
    pub size: u8,
    pub variants: Vec<InstructionVariant>,
}

impl InstructionDescriptor {
    pub fn new(mnemonic: &str, opcode: u8, pattern: &str, size: u8) -> Self {
        Self {
            mnemonic: mnemonic.to_string(),
            opcode,
            pattern: pattern.to_string(),
            size,
            variants: Vec::new(),
        }
    }

    pub fn variant(mut self, variant: InstructionVariant) -> Self {
        self.variants.push(variant);
        self
    }
}

/// Caller-supplied description of the target machine.
#[derive(Debug, Clone)]
pub struct MachineDescriptor {
    pub name: String,
    pub address_bits: u8,
    pub byte_order: ByteOrder,
    pub registers: Vec<RegisterDescriptor>,
    pub instructions: Vec<InstructionDescriptor>,
}

/// Error raised while validating a descriptor.
#[derive(Debug, Clone)]
pub struct MachineError {
    pub message: String,
}

impl MachineError {
    fn new(message: String) -> Self {
        Self { message }
    }
}

impl fmt::Display for MachineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for MachineError {}

/// A register resolved through the lookup tables.
#[derive(Debug, Clone)]
pub struct RegisterInfo {
    pub canonical: String,
    pub id: u8,
    pub width: u8,
}

/// One compiled instruction variant with its parsed pattern.
#[derive(Debug, Clone)]
pub struct Variant {
    pub pattern: OperandPattern,
    pub opcode: u8,
    pub size: u8,
    pub predicate: Option<VariantPredicate>,
    pub display: String,
}

/// A mnemonic's compiled variant list.
#[derive(Debug, Clone)]
pub struct InstructionInfo {
    pub mnemonic: String,
    pub variants: Vec<Variant>,
}

/// Immutable, case-normalized lookup tables for one compile run.
#[derive(Debug)]
pub struct MachineTables {
    pub address_bits: u8,
    pub byte_order: ByteOrder,
    case_sensitive: bool,
    registers: HashMap<String, RegisterInfo>,
    instructions: HashMap<String, InstructionInfo>,
}

impl MachineTables {
    /// Build lookup tables from a descriptor, validating patterns and
    /// declared sizes. Every variant's declared size must equal one opcode
    /// byte plus its pattern's operand bytes; a mismatch here would let
    /// the two passes disagree, so it is rejected up front.
    pub fn build(
        machine: &MachineDescriptor,
        case_sensitive: bool,
    ) -> Result<Self, MachineError> {
        let mut tables = Self {
            address_bits: machine.address_bits,
            byte_order: machine.byte_order,
            case_sensitive,
            registers: HashMap::new(),
            instructions: HashMap::new(),
        };

        for reg in &machine.registers {
            tables.insert_register(&reg.name, reg)?;
            for alias in &reg.aliases {
                tables.insert_register(alias, reg)?;
            }
        }

        let address_bytes = tables.address_bytes();
        for inst in &machine.instructions {
            let key = tables.key(&inst.mnemonic);
            if tables.instructions.contains_key(&key) {
                return Err(MachineError::new(format!(
                    "Duplicate mnemonic in descriptor: {}",
                    inst.mnemonic
                )));
            }

            let variants = if inst.variants.is_empty() {
                vec![compile_variant(
                    &inst.mnemonic,
                    &inst.pattern,
                    inst.opcode,
                    inst.size,
                    None,
                    None,
                    address_bytes,
                )?]
            } else {
                inst.variants
                    .iter()
                    .map(|variant| {
                        compile_variant(
                            &inst.mnemonic,
                            &variant.pattern,
                            variant.opcode,
                            variant.size,
                            variant.predicate,
                            variant.display.as_deref(),
                            address_bytes,
                        )
                    })
                    .collect::<Result<Vec<_>, _>>()?
            };

            tables.instructions.insert(
                key,
                InstructionInfo {
                    mnemonic: inst.mnemonic.clone(),
                    variants,
                },
            );
        }

        Ok(tables)
    }

    fn insert_register(
        &mut self,
        name: &str,
        reg: &RegisterDescriptor,
    ) -> Result<(), MachineError> {
        let key = self.key(name);
        let info = RegisterInfo {
            canonical: reg.name.clone(),
            id: reg.id,
            width: reg.width,
        };
        if self.registers.insert(key, info).is_some() {
            return Err(MachineError::new(format!(
                "Duplicate register name in descriptor: {name}"
            )));
        }
        Ok(())
    }

    fn key(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_ascii_uppercase()
        }
    }

    #[must_use]
    pub fn register(&self, name: &str) -> Option<&RegisterInfo> {
        self.registers.get(&self.key(name))
    }

    #[must_use]
    pub fn instruction(&self, name: &str) -> Option<&InstructionInfo> {
        self.instructions.get(&self.key(name))
    }

    #[must_use]
    pub fn is_register(&self, name: &str) -> bool {
        self.register(name).is_some()
    }

    #[must_use]
    pub fn is_mnemonic(&self, name: &str) -> bool {
        self.instruction(name).is_some()
    }

    pub fn case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Bytes needed to hold an address on this machine.
    pub fn address_bytes(&self) -> u8 {
        if self.address_bits > 8 {
            2
        } else {
            1
        }
    }
}

fn compile_variant(
    mnemonic: &str,
    pattern_text: &str,
    opcode: u8,
    size: u8,
    predicate: Option<VariantPredicate>,
    display: Option<&str>,
    address_bytes: u8,
) -> Result<Variant, MachineError> {
    let pattern = OperandPattern::parse(pattern_text).map_err(|msg| {
        MachineError::new(format!("{mnemonic}: {msg}"))
    })?;
    let expected = 1 + pattern.operand_bytes(address_bytes);
    if size != expected {
        return Err(MachineError::new(format!(
            "{mnemonic}: declared size {size} does not match pattern {pattern_text} ({expected} bytes)"
        )));
    }
    Ok(Variant {
        pattern,
        opcode,
        size,
        predicate,
        display: display.unwrap_or(mnemonic).to_string(),
    })
}

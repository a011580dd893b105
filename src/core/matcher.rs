// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Operand-shape patterns and instruction variant selection.
//!
//! The matcher is the single source of truth for instruction size. Both
//! the symbol collector and the code emitter call [`select_variant`] with
//! identical inputs, so the byte length an instruction occupies can never
//! differ between address layout and emission.

use crate::core::machine::Variant;
use crate::core::operand::Operand;

/// One position of an operand-shape pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    /// A register; encoded in the opcode, contributes no operand bytes.
    Reg,
    /// An 8-bit immediate (one byte).
    Imm8,
    /// A 16-bit immediate (two bytes, descriptor byte order).
    Imm16,
    /// A memory address (address-width bytes, descriptor byte order).
    Mem,
}

impl OperandShape {
    /// Check whether an operand satisfies this position.
    ///
    /// A label reference evaluates to an address constant, so it is
    /// accepted both where an immediate and where a memory address is
    /// required.
    pub fn accepts(self, operand: &Operand) -> bool {
        match self {
            OperandShape::Reg => matches!(operand, Operand::Register { .. }),
            OperandShape::Imm8 | OperandShape::Imm16 => matches!(
                operand,
                Operand::Immediate { .. } | Operand::LabelRef { .. }
            ),
            OperandShape::Mem => {
                matches!(operand, Operand::Memory { .. } | Operand::LabelRef { .. })
            }
        }
    }

    /// Bytes this position contributes after the opcode.
    pub fn operand_bytes(self, address_bytes: u8) -> u8 {
        match self {
            OperandShape::Reg => 0,
            OperandShape::Imm8 => 1,
            OperandShape::Imm16 => 2,
            OperandShape::Mem => address_bytes,
        }
    }
}

/// An underscore-delimited operand-shape pattern, e.g. `REG_IMM8`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperandPattern {
    shapes: Vec<OperandShape>,
}

impl OperandPattern {
    /// Parse a pattern string. Empty text and `NONE` mean no operands.
    pub fn parse(text: &str) -> Result<Self, String> {
        let upper = text.trim().to_ascii_uppercase();
        if upper.is_empty() || upper == "NONE" {
            return Ok(Self { shapes: Vec::new() });
        }
        let mut shapes = Vec::new();
        for part in upper.split('_') {
            let shape = match part {
                "REG" => OperandShape::Reg,
                "IMM8" => OperandShape::Imm8,
                "IMM16" => OperandShape::Imm16,
                "MEM" => OperandShape::Mem,
                _ => return Err(format!("Unknown operand shape: {part}")),
            };
            shapes.push(shape);
        }
        Ok(Self { shapes })
    }

    pub fn shapes(&self) -> &[OperandShape] {
        &self.shapes
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    /// Total operand bytes after the opcode.
    pub fn operand_bytes(&self, address_bytes: u8) -> u8 {
        self.shapes
            .iter()
            .map(|shape| shape.operand_bytes(address_bytes))
            .sum()
    }

    /// Check operand count and per-position type requirements.
    pub fn matches(&self, operands: &[Operand]) -> bool {
        self.shapes.len() == operands.len()
            && self
                .shapes
                .iter()
                .zip(operands)
                .all(|(shape, operand)| shape.accepts(operand))
    }
}

/// Select the first variant whose pattern and optional predicate match.
///
/// Returns `None` when no variant matches; the caller turns that into a
/// "no matching instruction variant" diagnostic.
pub fn select_variant<'a>(variants: &'a [Variant], operands: &[Operand]) -> Option<&'a Variant> {
    variants.iter().find(|variant| {
        variant.pattern.matches(operands)
            && variant.predicate.map_or(true, |pred| pred(operands))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::machine::Variant;
    use crate::core::operand::{MemTarget, Operand};
    use crate::core::tokenizer::Span;

    fn span() -> Span {
        Span {
            line: 1,
            col_start: 1,
            col_end: 1,
        }
    }

    fn reg(name: &str) -> Operand {
        Operand::Register {
            name: name.to_string(),
            id: 0,
            span: span(),
        }
    }

    fn imm(value: i64) -> Operand {
        Operand::Immediate {
            value,
            span: span(),
        }
    }

    fn label(name: &str) -> Operand {
        Operand::LabelRef {
            name: name.to_string(),
            span: span(),
        }
    }

    fn variant(pattern: &str, opcode: u8, predicate: Option<fn(&[Operand]) -> bool>) -> Variant {
        let pattern = OperandPattern::parse(pattern).unwrap();
        let size = 1 + pattern.operand_bytes(2);
        Variant {
            pattern,
            opcode,
            size,
            predicate,
            display: "TEST".to_string(),
        }
    }

    #[test]
    fn parses_patterns() {
        assert!(OperandPattern::parse("").unwrap().is_empty());
        assert!(OperandPattern::parse("NONE").unwrap().is_empty());
        assert_eq!(OperandPattern::parse("REG_IMM8").unwrap().len(), 2);
        assert!(OperandPattern::parse("REG_BOGUS").is_err());
    }

    #[test]
    fn operand_byte_counts() {
        let pattern = OperandPattern::parse("REG_IMM8").unwrap();
        assert_eq!(pattern.operand_bytes(2), 1);
        let pattern = OperandPattern::parse("MEM").unwrap();
        assert_eq!(pattern.operand_bytes(2), 2);
        assert_eq!(pattern.operand_bytes(1), 1);
    }

    #[test]
    fn label_reference_matches_imm_and_mem() {
        let imm16 = OperandPattern::parse("IMM16").unwrap();
        assert!(imm16.matches(&[label("later")]));
        let mem = OperandPattern::parse("MEM").unwrap();
        assert!(mem.matches(&[label("later")]));
        assert!(mem.matches(&[Operand::Memory {
            target: MemTarget::Address(0x10),
            span: span(),
        }]));
        let reg_pat = OperandPattern::parse("REG").unwrap();
        assert!(!reg_pat.matches(&[label("later")]));
    }

    #[test]
    fn first_matching_variant_wins() {
        let variants = vec![
            variant("REG_IMM8", 0x10, Some(|ops| ops[0].is_register("A"))),
            variant("REG_IMM8", 0x11, Some(|ops| ops[0].is_register("B"))),
            variant("IMM16", 0x20, None),
        ];
        let chosen = select_variant(&variants, &[reg("B"), imm(5)]).unwrap();
        assert_eq!(chosen.opcode, 0x11);
        let chosen = select_variant(&variants, &[imm(0x1234)]).unwrap();
        assert_eq!(chosen.opcode, 0x20);
        assert!(select_variant(&variants, &[reg("C"), imm(5)]).is_none());
        assert!(select_variant(&variants, &[imm(1), imm(2)]).is_none());
    }
}

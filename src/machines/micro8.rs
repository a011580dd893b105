// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! micro8: a tiny 8-bit big-endian machine with two registers.
//!
//! Addresses fit in one byte, so memory operands emit a single address
//! byte. Mostly useful for exercising the narrow-address code paths.

use crate::core::machine::{
    ByteOrder, InstructionDescriptor, InstructionVariant, MachineDescriptor, RegisterDescriptor,
};
use crate::core::operand::Operand;

fn op_is(operands: &[Operand], index: usize, name: &str) -> bool {
    operands.get(index).is_some_and(|op| op.is_register(name))
}

fn dst_x(operands: &[Operand]) -> bool {
    op_is(operands, 0, "X")
}

fn dst_y(operands: &[Operand]) -> bool {
    op_is(operands, 0, "Y")
}

fn src_x(operands: &[Operand]) -> bool {
    op_is(operands, 1, "X")
}

fn src_y(operands: &[Operand]) -> bool {
    op_is(operands, 1, "Y")
}

/// Build the micro8 descriptor.
pub fn descriptor() -> MachineDescriptor {
    let ld = InstructionDescriptor::new("LD", 0x01, "REG_IMM8", 2)
        .variant(InstructionVariant::new("REG_IMM8", 0x01, 2).when(dst_x))
        .variant(InstructionVariant::new("REG_IMM8", 0x02, 2).when(dst_y))
        .variant(InstructionVariant::new("REG_MEM", 0x05, 2).when(dst_x))
        .variant(InstructionVariant::new("REG_MEM", 0x06, 2).when(dst_y));

    let st = InstructionDescriptor::new("ST", 0x09, "MEM_REG", 2)
        .variant(InstructionVariant::new("MEM_REG", 0x09, 2).when(src_x))
        .variant(InstructionVariant::new("MEM_REG", 0x0a, 2).when(src_y));

    let add = InstructionDescriptor::new("ADD", 0x10, "REG", 1)
        .variant(InstructionVariant::new("REG", 0x10, 1).when(dst_x))
        .variant(InstructionVariant::new("REG", 0x11, 1).when(dst_y));

    let dec = InstructionDescriptor::new("DEC", 0x14, "REG", 1)
        .variant(InstructionVariant::new("REG", 0x14, 1).when(dst_x))
        .variant(InstructionVariant::new("REG", 0x15, 1).when(dst_y));

    MachineDescriptor {
        name: "micro8".to_string(),
        address_bits: 8,
        byte_order: ByteOrder::Big,
        registers: vec![
            RegisterDescriptor::new("X", 0, 8),
            RegisterDescriptor::new("Y", 1, 8),
        ],
        instructions: vec![
            InstructionDescriptor::new("NOP", 0x00, "", 1),
            InstructionDescriptor::new("HLT", 0xff, "", 1),
            InstructionDescriptor::new("JMP", 0x20, "MEM", 2),
            InstructionDescriptor::new("JNZ", 0x21, "MEM", 2),
            ld,
            st,
            add,
            dec,
        ],
    }
}

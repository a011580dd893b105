// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! micro16: a 16-bit little-endian accumulator machine.
//!
//! Four 8-bit general registers (A through D, with A doubling as the
//! accumulator) and a 16-bit stack pointer. Register operands are encoded
//! in the opcode, selected through variant predicates.

use crate::core::machine::{
    ByteOrder, InstructionDescriptor, InstructionVariant, MachineDescriptor, RegisterDescriptor,
};
use crate::core::operand::Operand;

fn op_is(operands: &[Operand], index: usize, name: &str) -> bool {
    operands.get(index).is_some_and(|op| op.is_register(name))
}

fn dst_a(operands: &[Operand]) -> bool {
    op_is(operands, 0, "A")
}

fn dst_b(operands: &[Operand]) -> bool {
    op_is(operands, 0, "B")
}

fn dst_c(operands: &[Operand]) -> bool {
    op_is(operands, 0, "C")
}

fn dst_d(operands: &[Operand]) -> bool {
    op_is(operands, 0, "D")
}

fn dst_sp(operands: &[Operand]) -> bool {
    op_is(operands, 0, "SP")
}

fn src_a(operands: &[Operand]) -> bool {
    op_is(operands, 1, "A")
}

fn src_b(operands: &[Operand]) -> bool {
    op_is(operands, 1, "B")
}

fn src_c(operands: &[Operand]) -> bool {
    op_is(operands, 1, "C")
}

fn src_d(operands: &[Operand]) -> bool {
    op_is(operands, 1, "D")
}

fn a_from(operands: &[Operand], src: &str) -> bool {
    dst_a(operands) && op_is(operands, 1, src)
}

fn mov_ab(operands: &[Operand]) -> bool {
    a_from(operands, "B")
}

fn mov_ac(operands: &[Operand]) -> bool {
    a_from(operands, "C")
}

fn mov_ad(operands: &[Operand]) -> bool {
    a_from(operands, "D")
}

fn mov_ba(operands: &[Operand]) -> bool {
    dst_b(operands) && src_a(operands)
}

fn mov_ca(operands: &[Operand]) -> bool {
    dst_c(operands) && src_a(operands)
}

fn mov_da(operands: &[Operand]) -> bool {
    dst_d(operands) && src_a(operands)
}

/// Build the micro16 descriptor.
pub fn descriptor() -> MachineDescriptor {
    let mut instructions = vec![
        InstructionDescriptor::new("NOP", 0x00, "", 1),
        InstructionDescriptor::new("HLT", 0x76, "", 1),
        InstructionDescriptor::new("JMP", 0x60, "IMM16", 3),
        InstructionDescriptor::new("JNZ", 0x61, "IMM16", 3),
        InstructionDescriptor::new("JZ", 0x62, "IMM16", 3),
        InstructionDescriptor::new("CALL", 0x63, "IMM16", 3),
        InstructionDescriptor::new("RET", 0x64, "", 1),
        InstructionDescriptor::new("OUT", 0x80, "IMM8", 2),
        InstructionDescriptor::new("IN", 0x81, "IMM8", 2),
    ];

    // LD: immediate and memory forms per destination register, plus a
    // 16-bit immediate form for SP. The 8-bit forms are listed first so
    // their predicates decide before the SP fallback is tried.
    let ld = InstructionDescriptor::new("LD", 0x10, "REG_IMM8", 2)
        .variant(InstructionVariant::new("REG_IMM8", 0x10, 2).when(dst_a))
        .variant(InstructionVariant::new("REG_IMM8", 0x11, 2).when(dst_b))
        .variant(InstructionVariant::new("REG_IMM8", 0x12, 2).when(dst_c))
        .variant(InstructionVariant::new("REG_IMM8", 0x13, 2).when(dst_d))
        .variant(InstructionVariant::new("REG_IMM16", 0x1e, 3).when(dst_sp))
        .variant(InstructionVariant::new("REG_MEM", 0x20, 3).when(dst_a))
        .variant(InstructionVariant::new("REG_MEM", 0x21, 3).when(dst_b))
        .variant(InstructionVariant::new("REG_MEM", 0x22, 3).when(dst_c))
        .variant(InstructionVariant::new("REG_MEM", 0x23, 3).when(dst_d));
    instructions.push(ld);

    let st = InstructionDescriptor::new("ST", 0x28, "MEM_REG", 3)
        .variant(InstructionVariant::new("MEM_REG", 0x28, 3).when(src_a))
        .variant(InstructionVariant::new("MEM_REG", 0x29, 3).when(src_b))
        .variant(InstructionVariant::new("MEM_REG", 0x2a, 3).when(src_c))
        .variant(InstructionVariant::new("MEM_REG", 0x2b, 3).when(src_d));
    instructions.push(st);

    // MOV only moves through the accumulator.
    let mov = InstructionDescriptor::new("MOV", 0x31, "REG_REG", 1)
        .variant(InstructionVariant::new("REG_REG", 0x31, 1).when(mov_ab))
        .variant(InstructionVariant::new("REG_REG", 0x32, 1).when(mov_ac))
        .variant(InstructionVariant::new("REG_REG", 0x33, 1).when(mov_ad))
        .variant(InstructionVariant::new("REG_REG", 0x35, 1).when(mov_ba))
        .variant(InstructionVariant::new("REG_REG", 0x36, 1).when(mov_ca))
        .variant(InstructionVariant::new("REG_REG", 0x37, 1).when(mov_da));
    instructions.push(mov);

    let add = InstructionDescriptor::new("ADD", 0x40, "REG", 1)
        .variant(InstructionVariant::new("REG", 0x40, 1).when(dst_a))
        .variant(InstructionVariant::new("REG", 0x41, 1).when(dst_b))
        .variant(InstructionVariant::new("REG", 0x42, 1).when(dst_c))
        .variant(InstructionVariant::new("REG", 0x43, 1).when(dst_d));
    instructions.push(add);

    let sub = InstructionDescriptor::new("SUB", 0x44, "REG", 1)
        .variant(InstructionVariant::new("REG", 0x44, 1).when(dst_a))
        .variant(InstructionVariant::new("REG", 0x45, 1).when(dst_b))
        .variant(InstructionVariant::new("REG", 0x46, 1).when(dst_c))
        .variant(InstructionVariant::new("REG", 0x47, 1).when(dst_d));
    instructions.push(sub);

    let push = InstructionDescriptor::new("PUSH", 0x70, "REG", 1)
        .variant(InstructionVariant::new("REG", 0x70, 1).when(dst_a))
        .variant(InstructionVariant::new("REG", 0x71, 1).when(dst_b))
        .variant(InstructionVariant::new("REG", 0x72, 1).when(dst_c))
        .variant(InstructionVariant::new("REG", 0x73, 1).when(dst_d));
    instructions.push(push);

    let pop = InstructionDescriptor::new("POP", 0x78, "REG", 1)
        .variant(InstructionVariant::new("REG", 0x78, 1).when(dst_a))
        .variant(InstructionVariant::new("REG", 0x79, 1).when(dst_b))
        .variant(InstructionVariant::new("REG", 0x7a, 1).when(dst_c))
        .variant(InstructionVariant::new("REG", 0x7b, 1).when(dst_d));
    instructions.push(pop);

    MachineDescriptor {
        name: "micro16".to_string(),
        address_bits: 16,
        byte_order: ByteOrder::Little,
        registers: vec![
            RegisterDescriptor::new("A", 0, 8).alias("ACC"),
            RegisterDescriptor::new("B", 1, 8),
            RegisterDescriptor::new("C", 2, 8),
            RegisterDescriptor::new("D", 3, 8),
            RegisterDescriptor::new("SP", 4, 16),
        ],
        instructions,
    }
}

use super::{compile, Assembler, CompileOptions};
use crate::core::error::Severity;
use crate::core::machine::{
    ByteOrder, InstructionDescriptor, MachineDescriptor, MachineTables, RegisterDescriptor,
};
use crate::core::section::{SectionKind, Sections};
use crate::core::symbol_table::{SymbolKind, SymbolTable, SymbolTableResult};
use crate::core::tokenizer::tokenize;

/// Minimal descriptor: one register `A`, `LD` as `REG_IMM8` (2 bytes),
/// `JMP` as `IMM16` (3 bytes), `ST` as `MEM` (3 bytes), 16-bit
/// little-endian addresses.
fn test_machine() -> MachineDescriptor {
    MachineDescriptor {
        name: "test".to_string(),
        address_bits: 16,
        byte_order: ByteOrder::Little,
        registers: vec![RegisterDescriptor::new("A", 0, 8)],
        instructions: vec![
            InstructionDescriptor::new("LD", 0x01, "REG_IMM8", 2),
            InstructionDescriptor::new("JMP", 0x02, "IMM16", 3),
            InstructionDescriptor::new("ST", 0x03, "MEM", 3),
        ],
    }
}

fn assemble(source: &str) -> super::CompiledProgram {
    compile(&test_machine(), source, &CompileOptions::default()).expect("compile")
}

fn assemble_clean(source: &str) -> super::CompiledProgram {
    let program = assemble(source);
    assert_eq!(
        program.error_count(),
        0,
        "unexpected errors: {:?}",
        program
            .diagnostics
            .iter()
            .map(|d| d.format())
            .collect::<Vec<_>>()
    );
    program
}

fn raw_assembler(source: &str, machine: &MachineDescriptor) -> Assembler {
    let options = CompileOptions::default();
    let tables = MachineTables::build(machine, false).expect("tables");
    let tokens = tokenize(source, &tables).expect("tokenize");
    Assembler {
        tables,
        tokens,
        symbols: SymbolTable::new(false),
        sections: Sections::new(
            options.code_base,
            options.data_base,
            options.reserved_base,
        ),
        pending: Vec::new(),
        diagnostics: Vec::new(),
        entry_point: None,
        options,
    }
}

#[test]
fn literal_round_trip() {
    let program = assemble_clean("LD A, 5");
    let code = program.sections.code.records();
    assert_eq!(program.sections.code.bytes(), vec![0x01, 0x05]);
    assert_eq!(code[0].addr, 0);
    assert_eq!(code[1].addr, 1);
    assert!(code[0].is_opcode);
    assert_eq!(code[0].annotation.as_deref(), Some("LD"));
    assert!(!code[1].is_opcode);
}

#[test]
fn forward_reference_resolves_correctly() {
    let program = assemble_clean("JMP later\nLD A, 1\nlater:\nLD A, 2");
    // JMP occupies 0-2, LD A,1 occupies 3-4, so `later` binds to 5.
    assert_eq!(program.symbols.address_of("later"), Some(5));
    assert_eq!(
        program.sections.code.bytes(),
        vec![0x02, 0x05, 0x00, 0x01, 0x01, 0x01, 0x02]
    );
}

#[test]
fn undefined_label_is_reported_not_silently_zeroed() {
    let program = assemble("JMP missing");
    assert_eq!(program.error_count(), 1);
    let diag = &program.diagnostics[0];
    assert!(diag.message().contains("Undefined label"));
    assert!(diag.message().contains("missing"));
    // The placeholder bytes stay in place, but the error is surfaced.
    assert_eq!(program.sections.code.bytes(), vec![0x02, 0x00, 0x00]);
}

#[test]
fn duplicate_label_is_rejected() {
    let program = assemble("start:\nLD A, 1\nstart:\nLD A, 2");
    assert_eq!(program.error_count(), 1);
    assert!(program.diagnostics[0].message().contains("Duplicate label"));
    assert!(program.diagnostics[0].message().contains("start"));
    // Only the first binding is kept.
    assert_eq!(program.symbols.address_of("start"), Some(0));
}

#[test]
fn pass1_layout_agrees_with_pass2_stream() {
    let source = "start: LD A, 1\nJMP start\nmid: LD A, 2\nST [0x1000]\nend:";
    let program = assemble_clean(source);
    // The collector's address accounting and the emitter's stream must
    // describe the same layout for every instruction in between.
    assert_eq!(program.symbols.address_of("mid"), Some(5));
    assert_eq!(
        program.symbols.address_of("end"),
        Some(program.sections.code.len() as u32)
    );
    assert_eq!(program.sections.code.len(), 10);
}

#[test]
fn compiling_twice_is_byte_identical() {
    let source = "start: LD A, 1\nJMP start\nsection .data\nmsg db \"hi\", 0\nptr dw msg";
    let first = assemble_clean(source);
    let second = assemble_clean(source);
    for kind in SectionKind::ALL {
        assert_eq!(
            first.sections.get(kind).records(),
            second.sections.get(kind).records()
        );
    }
    assert_eq!(first.symbols.len(), second.symbols.len());
    for entry in first.symbols.iter() {
        assert_eq!(second.symbols.address_of(&entry.name), Some(entry.addr));
    }
    assert_eq!(first.diagnostics.len(), second.diagnostics.len());
    assert_eq!(first.entry_point, second.entry_point);
}

#[test]
fn data_directives_emit_strings_values_and_references() {
    let source = "section .data\nmsg db \"Hi\", 0\nptr dw msg\nnum dw 0x1234";
    let program = assemble_clean(source);
    let data = &program.sections.data;
    assert_eq!(data.base, 0x8000);
    assert_eq!(program.symbols.address_of("msg"), Some(0x8000));
    assert_eq!(program.symbols.address_of("ptr"), Some(0x8003));
    assert_eq!(
        data.bytes(),
        vec![b'H', b'i', 0x00, 0x00, 0x80, 0x34, 0x12]
    );
    assert_eq!(data.records()[0].annotation.as_deref(), Some("db"));
    let entry = program.symbols.entry("msg").unwrap();
    assert_eq!(entry.kind, SymbolKind::Variable);
    assert_eq!(entry.section, SectionKind::Data);
}

#[test]
fn forward_data_reference_is_resolved_from_pass1_table() {
    let source = "section .data\nptr dw buffer\nbuffer db 7";
    let program = assemble_clean(source);
    assert_eq!(program.sections.data.bytes(), vec![0x02, 0x80, 0x07]);
}

#[test]
fn wide_data_element_carries_address_in_low_bytes() {
    let source = "section .data\nvec dd buffer\nbuffer db 7";
    let program = assemble_clean(source);
    assert_eq!(
        program.sections.data.bytes(),
        vec![0x04, 0x80, 0x00, 0x00, 0x07]
    );
}

#[test]
fn reservation_emits_zero_bytes_in_reserved_section() {
    let source = "section .bss\nbuf resb 4\nword_buf resw 2";
    let program = assemble_clean(source);
    let reserved = &program.sections.reserved;
    assert_eq!(reserved.base, 0xc000);
    assert_eq!(reserved.bytes(), vec![0; 8]);
    assert_eq!(program.symbols.address_of("buf"), Some(0xc000));
    assert_eq!(program.symbols.address_of("word_buf"), Some(0xc004));
}

#[test]
fn sections_keep_independent_cursors() {
    let source = "LD A, 1\nsection .data\nvalue db 9\nsection .text\nJMP 0\nsection .data\nmore db 8";
    let program = assemble_clean(source);
    assert_eq!(program.sections.code.bytes(), vec![0x01, 0x01, 0x02, 0x00, 0x00]);
    assert_eq!(program.sections.data.bytes(), vec![9, 8]);
    // Returning to a section resumes its cursor rather than its base.
    assert_eq!(program.symbols.address_of("more"), Some(0x8001));
}

#[test]
fn org_overrides_the_current_cursor() {
    let program = assemble_clean("org 0x100\nstart: LD A, 1");
    assert_eq!(program.symbols.address_of("start"), Some(0x100));
    assert_eq!(program.sections.code.records()[0].addr, 0x100);
}

#[test]
fn global_start_symbol_sets_entry_point() {
    let program = assemble_clean("global _start\nJMP _start\n_start: LD A, 1");
    assert_eq!(program.entry_point, Some(3));
    // Without the global marking there is no entry point.
    let program = assemble_clean("_start: LD A, 1");
    assert_eq!(program.entry_point, None);
}

#[test]
fn extern_reference_stays_unresolved() {
    let program = assemble("extern external_fn\nJMP external_fn");
    assert_eq!(program.error_count(), 1);
    assert!(program.diagnostics[0].message().contains("external_fn"));
    assert_eq!(program.sections.code.bytes(), vec![0x02, 0x00, 0x00]);
}

#[test]
fn unknown_mnemonic_recovers_with_one_byte_advance() {
    let program = assemble("LD A, 1\nBOGUS\nend: LD A, 2");
    assert_eq!(program.error_count(), 1);
    assert!(program.diagnostics[0].message().contains("Unknown mnemonic"));
    assert!(program.diagnostics[0].message().contains("BOGUS"));
    // Both passes advanced one byte for the unmatched statement, so the
    // label after it still binds consistently.
    assert_eq!(program.symbols.address_of("end"), Some(3));
}

#[test]
fn unmatched_operands_report_no_variant() {
    let program = assemble("LD 5, 5");
    assert_eq!(program.error_count(), 1);
    assert!(program.diagnostics[0]
        .message()
        .contains("No matching instruction variant"));
}

#[test]
fn out_of_range_immediate_warns_and_truncates() {
    let program = assemble("LD A, 300");
    assert_eq!(program.error_count(), 0);
    assert_eq!(program.warning_count(), 1);
    assert!(program.diagnostics[0].message().contains("truncated"));
    assert_eq!(program.diagnostics[0].severity, Severity::Warning);
    assert_eq!(program.sections.code.bytes(), vec![0x01, 0x2c]);
}

#[test]
fn negative_immediates_emit_twos_complement() {
    let program = assemble_clean("LD A, -1");
    assert_eq!(program.sections.code.bytes(), vec![0x01, 0xff]);
}

#[test]
fn memory_operands_accept_brackets_and_parens() {
    let program = assemble_clean("ST [0x1234]\nST (0x1234)");
    assert_eq!(
        program.sections.code.bytes(),
        vec![0x03, 0x34, 0x12, 0x03, 0x34, 0x12]
    );
}

#[test]
fn memory_operand_by_name_resolves() {
    let program = assemble_clean("ST [value]\nsection .data\nvalue db 1");
    assert_eq!(program.sections.code.bytes(), vec![0x03, 0x00, 0x80]);
}

#[test]
fn char_literal_is_an_immediate() {
    let program = assemble_clean("LD A, 'x'");
    assert_eq!(program.sections.code.bytes(), vec![0x01, b'x']);
}

#[test]
fn equ_and_times_are_recognized_but_skipped() {
    let program = assemble_clean("limit equ 5\ntimes 3\nLD A, 1");
    assert_eq!(program.sections.code.bytes(), vec![0x01, 0x01]);
    assert!(program.symbols.entry("limit").is_none());
}

#[test]
fn case_sensitive_compile_rejects_lowercase_mnemonics() {
    let options = CompileOptions {
        case_sensitive: true,
        ..CompileOptions::default()
    };
    let program = compile(&test_machine(), "ld A, 5", &options).expect("compile");
    assert_eq!(program.error_count(), 1);
    assert!(program.diagnostics[0].message().contains("Unknown mnemonic"));

    let program = compile(&test_machine(), "LD A, 5", &options).expect("compile");
    assert_eq!(program.error_count(), 0);
}

#[test]
fn lexical_error_aborts_with_no_partial_output() {
    let err = compile(&test_machine(), "LD A, 5\ndb \"oops", &CompileOptions::default())
        .expect_err("fatal");
    assert!(err.error.message().contains("Unterminated string"));
    assert_eq!(err.span.line, 2);

    let err = compile(&test_machine(), "LD A, @", &CompileOptions::default()).expect_err("fatal");
    assert!(err.error.message().contains("Unexpected character"));
}

#[test]
fn invalid_descriptor_is_rejected_up_front() {
    let mut machine = test_machine();
    machine.instructions[0].size = 9;
    let err = compile(&machine, "LD A, 5", &CompileOptions::default()).expect_err("fatal");
    assert!(err.error.message().contains("LD"));
}

#[test]
fn resolver_patches_queued_references_in_place() {
    // Pass 2 without a prior symbol pass leaves the reference queued with
    // a zero placeholder; defining the symbol and resolving patches the
    // recorded byte slots.
    let machine = test_machine();
    let mut assembler = raw_assembler("JMP target", &machine);
    assembler.run_pass(2);
    assert_eq!(assembler.pending.len(), 1);
    assert_eq!(assembler.sections.code.bytes(), vec![0x02, 0x00, 0x00]);

    let result =
        assembler
            .symbols
            .define("target", 0x1234, SectionKind::Code, SymbolKind::Label);
    assert_eq!(result, SymbolTableResult::Ok);
    assembler.resolve_references();
    assert!(assembler.diagnostics.is_empty());
    assert!(assembler.pending.is_empty());
    assert_eq!(assembler.sections.code.bytes(), vec![0x02, 0x34, 0x12]);
}

#[test]
fn resolver_honors_big_endian_byte_order() {
    let mut machine = test_machine();
    machine.byte_order = ByteOrder::Big;
    let mut assembler = raw_assembler("JMP target", &machine);
    assembler.run_pass(2);
    let result =
        assembler
            .symbols
            .define("target", 0x1234, SectionKind::Code, SymbolKind::Label);
    assert_eq!(result, SymbolTableResult::Ok);
    assembler.resolve_references();
    assert_eq!(assembler.sections.code.bytes(), vec![0x02, 0x12, 0x34]);
}

#[test]
fn imm8_reference_patches_one_byte() {
    let mut assembler = raw_assembler("LD A, flag", &test_machine());
    assembler.run_pass(2);
    assert_eq!(assembler.pending.len(), 1);
    assert_eq!(assembler.pending[0].width, 1);
    let result = assembler
        .symbols
        .define("flag", 0x42, SectionKind::Data, SymbolKind::Variable);
    assert_eq!(result, SymbolTableResult::Ok);
    assembler.resolve_references();
    assert_eq!(assembler.sections.code.bytes(), vec![0x01, 0x42]);
}

#[test]
fn every_queued_reference_is_resolved_or_reported() {
    let program = assemble("JMP one\nJMP two\none: LD A, 1");
    // `one` resolves from the pass-1 table; `two` must be reported.
    let errors: Vec<String> = program
        .diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.message().to_string())
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("two"));
    assert_eq!(
        program.sections.code.bytes(),
        vec![0x02, 0x06, 0x00, 0x02, 0x00, 0x00, 0x01, 0x01]
    );
}

// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Retargetable two-pass assembler - main entry point.
//!
//! This module ties together the machine-neutral core with a
//! caller-supplied machine descriptor. A compile runs four stages: lex,
//! collect symbols (pass 1), emit code (pass 2), resolve references. Both
//! passes walk the same token list with the same statement logic; only
//! pass 2 appends byte records. The variant matcher is the single source
//! of truth for instruction size, so section layout cannot drift between
//! the passes.

pub mod cli;

#[cfg(test)]
mod tests;

use std::fmt;
use std::fs::{self, File};
use std::io::Write;

use clap::Parser;

use crate::core::error::{AsmError, AsmErrorKind, AsmRunError, AsmRunReport, Diagnostic, Severity};
use crate::core::imagestore::ImageStore;
use crate::core::listing::ListingWriter;
use crate::core::machine::{ByteOrder, MachineDescriptor, MachineTables, Variant};
use crate::core::matcher::{select_variant, OperandShape};
use crate::core::number::parse_number_text;
use crate::core::operand::{MemTarget, Operand};
use crate::core::section::{ByteRecord, SectionKind, Sections, UnresolvedReference};
use crate::core::symbol_table::{SymbolKind, SymbolTable, SymbolTableResult, SymbolVisibility};
use crate::core::tokenizer::{tokenize, Directive, Span, Token, TokenKind};
use crate::machines;

use cli::{validate_cli, Cli, VERSION};

// Re-export public types
pub use crate::core::error::{AsmRunError as RunError, AsmRunReport as RunReport};

/// Canonical entry-point names, in preference order.
const ENTRY_SYMBOLS: &[&str] = &["_start", "main"];

/// Per-compile configuration supplied by the embedding application.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub case_sensitive: bool,
    pub code_base: u32,
    pub data_base: u32,
    pub reserved_base: u32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            code_base: 0x0000,
            data_base: 0x8000,
            reserved_base: 0xc000,
        }
    }
}

/// Result of one compile: the three section streams, the symbol table, an
/// optional entry point, and every diagnostic collected along the way.
///
/// A non-empty error list does not prevent output from being produced;
/// callers must check the diagnostics even when a program is returned.
#[derive(Debug)]
pub struct CompiledProgram {
    pub sections: Sections,
    pub symbols: SymbolTable,
    pub entry_point: Option<u32>,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompiledProgram {
    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

/// Fatal compile failure: a lexical error or an invalid descriptor.
/// No partial output exists; the whole compile must be treated as failed.
#[derive(Debug)]
pub struct CompileError {
    pub error: AsmError,
    pub span: Span,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.span.line > 0 {
            write!(f, "{}: {}", self.span.line, self.error)
        } else {
            write!(f, "{}", self.error)
        }
    }
}

impl std::error::Error for CompileError {}

/// Compile one source text against a machine descriptor.
pub fn compile(
    machine: &MachineDescriptor,
    source: &str,
    options: &CompileOptions,
) -> Result<CompiledProgram, CompileError> {
    let tables = MachineTables::build(machine, options.case_sensitive).map_err(|err| {
        CompileError {
            error: AsmError::new(AsmErrorKind::Machine, &err.message, None),
            span: Span::default(),
        }
    })?;
    let tokens = tokenize(source, &tables).map_err(|err| CompileError {
        error: AsmError::new(AsmErrorKind::Lexer, &err.message, None),
        span: err.span,
    })?;

    let mut assembler = Assembler {
        tables,
        tokens,
        symbols: SymbolTable::new(options.case_sensitive),
        sections: Sections::new(options.code_base, options.data_base, options.reserved_base),
        pending: Vec::new(),
        diagnostics: Vec::new(),
        entry_point: None,
        options: options.clone(),
    };
    assembler.run_pass(1);
    assembler.attach_entry_point();
    assembler.run_pass(2);
    assembler.resolve_references();
    Ok(assembler.finish())
}

struct Assembler {
    tables: MachineTables,
    tokens: Vec<Token>,
    symbols: SymbolTable,
    sections: Sections,
    pending: Vec<UnresolvedReference>,
    diagnostics: Vec<Diagnostic>,
    entry_point: Option<u32>,
    options: CompileOptions,
}

impl Assembler {
    fn run_pass(&mut self, pass: u8) {
        let mut walker = Pass {
            tables: &self.tables,
            tokens: &self.tokens,
            symbols: &mut self.symbols,
            sections: &mut self.sections,
            pending: &mut self.pending,
            diagnostics: &mut self.diagnostics,
            layout: LayoutContext::new(&self.options),
            pos: 0,
            pass,
        };
        walker.run();
    }

    fn attach_entry_point(&mut self) {
        for name in ENTRY_SYMBOLS {
            if let Some(entry) = self.symbols.entry(name) {
                if entry.is_defined() && entry.visibility == SymbolVisibility::Global {
                    self.entry_point = Some(entry.addr);
                    return;
                }
            }
        }
    }

    /// Patch every queued reference from the final symbol table. This is
    /// the only place an already-appended byte record is mutated.
    fn resolve_references(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for reference in pending {
            let Some(addr) = self.symbols.address_of(&reference.name) else {
                let error =
                    AsmError::new(AsmErrorKind::Symbol, "Undefined label", Some(&reference.name));
                self.diagnostics.push(
                    Diagnostic::new(reference.span.line, Severity::Error, error)
                        .with_column(Some(reference.span.col_start)),
                );
                continue;
            };

            let section = self.sections.get_mut(reference.section);
            let patched = if reference.width == 1 {
                if addr > 0xff {
                    let error = AsmError::new(
                        AsmErrorKind::Symbol,
                        "Address truncated to 8 bits",
                        Some(&reference.name),
                    );
                    self.diagnostics.push(
                        Diagnostic::new(reference.span.line, Severity::Warning, error)
                            .with_column(Some(reference.span.col_start)),
                    );
                }
                section.patch(reference.offset, addr as u8)
            } else {
                let mut buf = [0u8; 2];
                self.tables.byte_order.write_u16(&mut buf, addr as u16);
                section.patch(reference.offset, buf[0])
                    && section.patch(reference.offset + 1, buf[1])
            };

            if !patched {
                let error = AsmError::new(
                    AsmErrorKind::Assembler,
                    "Reference offset outside section stream",
                    Some(&reference.name),
                );
                self.diagnostics
                    .push(Diagnostic::new(reference.span.line, Severity::Error, error));
            }
        }
    }

    fn finish(self) -> CompiledProgram {
        CompiledProgram {
            sections: self.sections,
            symbols: self.symbols,
            entry_point: self.entry_point,
            diagnostics: self.diagnostics,
        }
    }
}

/// Current section plus one address cursor per section. Each pass owns its
/// own context, so no cursor state can leak between traversals or between
/// compiles.
struct LayoutContext {
    current: SectionKind,
    cursors: [u32; 3],
}

impl LayoutContext {
    fn new(options: &CompileOptions) -> Self {
        Self {
            current: SectionKind::Code,
            cursors: [
                options.code_base,
                options.data_base,
                options.reserved_base,
            ],
        }
    }

    fn addr(&self) -> u32 {
        self.cursors[self.current.index()]
    }

    fn advance(&mut self, count: u32) {
        let cursor = &mut self.cursors[self.current.index()];
        *cursor = cursor.wrapping_add(count);
    }

    fn set_addr(&mut self, addr: u32) {
        self.cursors[self.current.index()] = addr;
    }

    fn switch(&mut self, kind: SectionKind) {
        self.current = kind;
    }
}

/// One element of a data-definition literal list.
enum DataItem {
    Bytes(Vec<u8>),
    Value(i64, Span),
    Name(String, Span),
}

impl DataItem {
    fn byte_len(&self, width: u8) -> u32 {
        match self {
            DataItem::Bytes(bytes) => bytes.len() as u32,
            DataItem::Value(_, _) | DataItem::Name(_, _) => width as u32,
        }
    }
}

/// One traversal of the token list. The same statement logic runs in both
/// passes; `pass` selects whether addresses are only accounted (1) or
/// bytes are emitted (2).
///
/// Error reporting is split so the diagnostics list holds each problem
/// once: pass 1 reports symbol-shape errors (duplicate labels, malformed
/// directive operands), pass 2 reports instruction errors (unknown
/// mnemonic, no matching variant). Best-effort recovery advances the
/// cursor identically in both passes.
struct Pass<'a> {
    tables: &'a MachineTables,
    tokens: &'a [Token],
    symbols: &'a mut SymbolTable,
    sections: &'a mut Sections,
    pending: &'a mut Vec<UnresolvedReference>,
    diagnostics: &'a mut Vec<Diagnostic>,
    layout: LayoutContext,
    pos: usize,
    pass: u8,
}

impl<'a> Pass<'a> {
    fn run(&mut self) {
        while !self.at_end() {
            self.statement();
        }
    }

    // ------------------------------------------------------------------
    // Token cursor

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::End)
    }

    fn on_line(&self, line: u32) -> bool {
        !self.at_end() && self.peek().span.line == line
    }

    fn take_on_line(&mut self, line: u32) -> Option<Token> {
        if self.on_line(line) {
            let token = self.tokens[self.pos].clone();
            self.pos += 1;
            Some(token)
        } else {
            None
        }
    }

    fn skip_line(&mut self, line: u32) {
        while self.on_line(line) {
            self.pos += 1;
        }
    }

    // ------------------------------------------------------------------
    // Statements

    fn statement(&mut self) {
        let line = self.peek().span.line;

        while let TokenKind::Label(name) = &self.peek().kind {
            let name = name.clone();
            let span = self.peek().span;
            self.pos += 1;
            if self.pass == 1 {
                self.define_symbol(&name, SymbolKind::Label, span);
            }
        }

        if !self.on_line(line) {
            return;
        }

        let token = self.peek().clone();
        match token.kind {
            TokenKind::Directive(directive) => {
                self.pos += 1;
                self.directive(directive, token.span, line);
            }
            TokenKind::Mnemonic(name) => {
                self.pos += 1;
                self.instruction(&name, token.span, line);
            }
            TokenKind::Identifier(name) => {
                self.identifier_statement(&name, token.span, line);
            }
            _ => {
                if self.pass == 2 {
                    self.report(
                        Severity::Error,
                        AsmErrorKind::Assembler,
                        "Illegal statement",
                        Some(&token.text()),
                        token.span,
                    );
                }
            }
        }

        self.skip_line(line);
    }

    fn define_symbol(&mut self, name: &str, kind: SymbolKind, span: Span) {
        let addr = self.layout.addr();
        let section = self.layout.current;
        if self.symbols.define(name, addr, section, kind) == SymbolTableResult::Duplicate {
            self.report(
                Severity::Error,
                AsmErrorKind::Symbol,
                "Duplicate label",
                Some(name),
                span,
            );
        }
    }

    /// A bare identifier heads either a variable definition (`name db 1`),
    /// a constant definition this design does not emit (`name equ 1`), or
    /// an unknown mnemonic.
    fn identifier_statement(&mut self, name: &str, span: Span, line: u32) {
        let next = self.tokens.get(self.pos + 1).cloned();
        if let Some(next_token) = next {
            if next_token.span.line == line {
                if let TokenKind::Directive(directive) = next_token.kind {
                    if directive == Directive::Equ {
                        self.skip_line(line);
                        return;
                    }
                    if directive.data_width().is_some() {
                        self.pos += 2;
                        if self.pass == 1 {
                            self.define_symbol(name, SymbolKind::Variable, span);
                        }
                        self.data_definition(directive, line);
                        return;
                    }
                    if directive.reserve_width().is_some() {
                        self.pos += 2;
                        if self.pass == 1 {
                            self.define_symbol(name, SymbolKind::Variable, span);
                        }
                        self.reservation(directive, next_token.span, line);
                        return;
                    }
                }
            }
        }

        if self.pass == 2 {
            self.report(
                Severity::Error,
                AsmErrorKind::Instruction,
                "Unknown mnemonic",
                Some(name),
                span,
            );
        }
        self.layout.advance(1);
        self.skip_line(line);
    }

    // ------------------------------------------------------------------
    // Directives

    fn directive(&mut self, directive: Directive, span: Span, line: u32) {
        match directive {
            Directive::Section => self.section_switch(span, line),
            Directive::Text | Directive::Data | Directive::Bss => {
                if let Some(kind) = directive.section_kind() {
                    self.layout.switch(kind);
                }
            }
            Directive::Org => self.origin(span, line),
            Directive::Global | Directive::Extern => {
                self.symbol_declaration(directive, span, line);
            }
            Directive::Equ | Directive::Times => {
                // Recognized by the directive set, no emission semantics.
            }
            _ => {
                if directive.data_width().is_some() {
                    self.data_definition(directive, line);
                } else if directive.reserve_width().is_some() {
                    self.reservation(directive, span, line);
                }
            }
        }
    }

    fn section_switch(&mut self, span: Span, line: u32) {
        let Some(token) = self.take_on_line(line) else {
            if self.pass == 1 {
                self.report(
                    Severity::Error,
                    AsmErrorKind::Directive,
                    "Expected section name",
                    None,
                    span,
                );
            }
            return;
        };
        let kind = match &token.kind {
            TokenKind::Directive(directive) => directive.section_kind(),
            TokenKind::Identifier(name) => section_kind_from_name(name),
            _ => None,
        };
        match kind {
            Some(kind) => self.layout.switch(kind),
            None => {
                if self.pass == 1 {
                    self.report(
                        Severity::Error,
                        AsmErrorKind::Directive,
                        "Unknown section",
                        Some(&token.text()),
                        token.span,
                    );
                }
            }
        }
    }

    /// `org` forces the current section's cursor. This escapes normal
    /// layout; using it correctly is the caller's responsibility.
    fn origin(&mut self, span: Span, line: u32) {
        let Some(token) = self.take_on_line(line) else {
            if self.pass == 1 {
                self.report(
                    Severity::Error,
                    AsmErrorKind::Directive,
                    "Expected address after org",
                    None,
                    span,
                );
            }
            return;
        };
        match &token.kind {
            TokenKind::Number(text) => match parse_number_text(text) {
                Ok(value) => self.layout.set_addr(value as u32),
                Err(error) => {
                    if self.pass == 1 {
                        self.push_error(error, token.span);
                    }
                }
            },
            _ => {
                if self.pass == 1 {
                    self.report(
                        Severity::Error,
                        AsmErrorKind::Directive,
                        "Expected address after org",
                        Some(&token.text()),
                        token.span,
                    );
                }
            }
        }
    }

    fn symbol_declaration(&mut self, directive: Directive, span: Span, line: u32) {
        let mut seen = false;
        loop {
            let Some(token) = self.take_on_line(line) else {
                break;
            };
            match &token.kind {
                TokenKind::Identifier(name) => {
                    seen = true;
                    if self.pass == 1 {
                        let result = if directive == Directive::Global {
                            self.symbols.mark_global(name)
                        } else {
                            self.symbols.declare_extern(name)
                        };
                        debug_assert_eq!(result, SymbolTableResult::Ok);
                    }
                }
                _ => {
                    if self.pass == 1 {
                        self.report(
                            Severity::Error,
                            AsmErrorKind::Directive,
                            "Expected symbol name",
                            Some(&token.text()),
                            token.span,
                        );
                    }
                    self.skip_line(line);
                    return;
                }
            }
            if self.on_line(line) && matches!(self.peek().kind, TokenKind::Comma) {
                self.pos += 1;
            } else {
                break;
            }
        }
        if !seen && self.pass == 1 {
            self.report(
                Severity::Error,
                AsmErrorKind::Directive,
                "Expected symbol name",
                None,
                span,
            );
        }
    }

    // ------------------------------------------------------------------
    // Data definition and reservation

    fn data_definition(&mut self, directive: Directive, line: u32) {
        let width = directive.data_width().unwrap_or(1);
        let items = self.scan_data_list(line);
        if self.pass == 1 {
            let total: u32 = items.iter().map(|item| item.byte_len(width)).sum();
            self.layout.advance(total);
            return;
        }

        let mut annotation = Some(directive.name().to_string());
        for item in items {
            match item {
                DataItem::Bytes(bytes) => {
                    for value in bytes {
                        self.push_byte(value, annotation.take(), false);
                    }
                }
                DataItem::Value(value, span) => {
                    self.emit_value(value, width, annotation.take(), span);
                }
                DataItem::Name(name, span) => {
                    self.emit_name(name, width, annotation.take(), span);
                }
            }
        }
    }

    /// Scan the comma-separated literal list of a data directive until a
    /// token that cannot continue the list. Shared by both passes so the
    /// computed length and the emitted bytes can never disagree.
    fn scan_data_list(&mut self, line: u32) -> Vec<DataItem> {
        let mut items = Vec::new();
        loop {
            if !self.on_line(line) {
                break;
            }
            let token = self.peek().clone();
            let item = match &token.kind {
                TokenKind::Str(lit) => {
                    self.pos += 1;
                    Some(DataItem::Bytes(lit.bytes.clone()))
                }
                TokenKind::Number(text) => {
                    self.pos += 1;
                    match parse_number_text(text) {
                        Ok(value) => Some(DataItem::Value(value as i64, token.span)),
                        Err(error) => {
                            if self.pass == 1 {
                                self.push_error(error, token.span);
                            }
                            None
                        }
                    }
                }
                TokenKind::Minus => {
                    self.pos += 1;
                    match self.take_on_line(line) {
                        Some(Token {
                            kind: TokenKind::Number(text),
                            span,
                        }) => match parse_number_text(&text) {
                            Ok(value) => Some(DataItem::Value(-(value as i64), span)),
                            Err(error) => {
                                if self.pass == 1 {
                                    self.push_error(error, span);
                                }
                                None
                            }
                        },
                        _ => {
                            if self.pass == 1 {
                                self.report(
                                    Severity::Error,
                                    AsmErrorKind::Directive,
                                    "Expected number after sign",
                                    None,
                                    token.span,
                                );
                            }
                            break;
                        }
                    }
                }
                TokenKind::Identifier(name) => {
                    self.pos += 1;
                    Some(DataItem::Name(name.clone(), token.span))
                }
                _ => break,
            };
            if let Some(item) = item {
                items.push(item);
            }
            if self.on_line(line) && matches!(self.peek().kind, TokenKind::Comma) {
                self.pos += 1;
            } else {
                break;
            }
        }
        items
    }

    fn reservation(&mut self, directive: Directive, span: Span, line: u32) {
        let width = directive.reserve_width().unwrap_or(1) as u32;
        let Some(token) = self.take_on_line(line) else {
            if self.pass == 1 {
                self.report(
                    Severity::Error,
                    AsmErrorKind::Directive,
                    "Expected count",
                    None,
                    span,
                );
            }
            return;
        };
        let count = match &token.kind {
            TokenKind::Number(text) => match parse_number_text(text) {
                Ok(value) => value,
                Err(error) => {
                    if self.pass == 1 {
                        self.push_error(error, token.span);
                    }
                    return;
                }
            },
            _ => {
                if self.pass == 1 {
                    self.report(
                        Severity::Error,
                        AsmErrorKind::Directive,
                        "Expected count",
                        Some(&token.text()),
                        token.span,
                    );
                }
                return;
            }
        };

        let total = (count as u32).saturating_mul(width);
        if count > 0x10000 || total > 0x10000 {
            if self.pass == 1 {
                self.report(
                    Severity::Error,
                    AsmErrorKind::Directive,
                    "Reservation too large",
                    Some(&count.to_string()),
                    token.span,
                );
            }
            return;
        }

        if self.pass == 1 {
            self.layout.advance(total);
        } else {
            let mut annotation = Some(directive.name().to_string());
            for _ in 0..total {
                self.push_byte(0, annotation.take(), false);
            }
        }
    }

    // ------------------------------------------------------------------
    // Instructions

    fn instruction(&mut self, mnemonic: &str, span: Span, line: u32) {
        let operands = match self.parse_operands(line) {
            Ok(operands) => operands,
            Err((error, err_span)) => {
                if self.pass == 2 {
                    self.push_error(error, err_span);
                }
                self.layout.advance(1);
                self.skip_line(line);
                return;
            }
        };

        let tables = self.tables;
        let Some(info) = tables.instruction(mnemonic) else {
            // The lexer classified this as a mnemonic against the same
            // tables, so the lookup cannot fail; recover anyway.
            if self.pass == 2 {
                self.report(
                    Severity::Error,
                    AsmErrorKind::Instruction,
                    "Unknown mnemonic",
                    Some(mnemonic),
                    span,
                );
            }
            self.layout.advance(1);
            return;
        };

        match select_variant(&info.variants, &operands) {
            None => {
                if self.pass == 2 {
                    self.report(
                        Severity::Error,
                        AsmErrorKind::Instruction,
                        "No matching instruction variant",
                        Some(mnemonic),
                        span,
                    );
                }
                self.layout.advance(1);
            }
            Some(variant) => {
                if self.pass == 1 {
                    self.layout.advance(variant.size as u32);
                } else {
                    self.encode(variant, &operands);
                }
            }
        }
    }

    fn parse_operands(&mut self, line: u32) -> Result<Vec<Operand>, (AsmError, Span)> {
        let mut operands = Vec::new();
        if !self.on_line(line) {
            return Ok(operands);
        }
        loop {
            operands.push(self.parse_operand(line)?);
            if self.on_line(line) && matches!(self.peek().kind, TokenKind::Comma) {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.on_line(line) {
            let token = self.peek().clone();
            return Err((
                AsmError::new(
                    AsmErrorKind::Instruction,
                    "Unexpected token in operands",
                    Some(&token.text()),
                ),
                token.span,
            ));
        }
        Ok(operands)
    }

    fn parse_operand(&mut self, line: u32) -> Result<Operand, (AsmError, Span)> {
        let fallback_span = self.peek().span;
        let Some(token) = self.take_on_line(line) else {
            return Err((
                AsmError::new(AsmErrorKind::Instruction, "Expected operand", None),
                fallback_span,
            ));
        };
        match token.kind {
            TokenKind::Register(name) => {
                let Some(info) = self.tables.register(&name) else {
                    return Err((
                        AsmError::new(AsmErrorKind::Instruction, "Unknown register", Some(&name)),
                        token.span,
                    ));
                };
                Ok(Operand::Register {
                    name: info.canonical.clone(),
                    id: info.id,
                    span: token.span,
                })
            }
            TokenKind::Number(text) => {
                let value = parse_number_text(&text).map_err(|error| (error, token.span))?;
                Ok(Operand::Immediate {
                    value: value as i64,
                    span: token.span,
                })
            }
            TokenKind::Minus => {
                let Some(Token {
                    kind: TokenKind::Number(text),
                    span,
                }) = self.take_on_line(line)
                else {
                    return Err((
                        AsmError::new(AsmErrorKind::Instruction, "Expected number after sign", None),
                        token.span,
                    ));
                };
                let value = parse_number_text(&text).map_err(|error| (error, span))?;
                Ok(Operand::Immediate {
                    value: -(value as i64),
                    span: token.span,
                })
            }
            TokenKind::Identifier(name) => Ok(Operand::LabelRef {
                name,
                span: token.span,
            }),
            TokenKind::Str(lit) if lit.bytes.len() == 1 => Ok(Operand::Immediate {
                value: lit.bytes[0] as i64,
                span: token.span,
            }),
            TokenKind::OpenBracket | TokenKind::OpenParen => {
                let close = if token.kind == TokenKind::OpenBracket {
                    TokenKind::CloseBracket
                } else {
                    TokenKind::CloseParen
                };
                let Some(inner) = self.take_on_line(line) else {
                    return Err((
                        AsmError::new(AsmErrorKind::Instruction, "Malformed memory operand", None),
                        token.span,
                    ));
                };
                let target = match inner.kind {
                    TokenKind::Number(text) => {
                        let value =
                            parse_number_text(&text).map_err(|error| (error, inner.span))?;
                        MemTarget::Address(value as u32)
                    }
                    TokenKind::Identifier(name) => MemTarget::Name(name),
                    _ => {
                        return Err((
                            AsmError::new(
                                AsmErrorKind::Instruction,
                                "Malformed memory operand",
                                Some(&inner.text()),
                            ),
                            inner.span,
                        ))
                    }
                };
                match self.take_on_line(line) {
                    Some(closing) if closing.kind == close => Ok(Operand::Memory {
                        target,
                        span: token.span,
                    }),
                    _ => Err((
                        AsmError::new(
                            AsmErrorKind::Instruction,
                            "Missing closing bracket in memory operand",
                            None,
                        ),
                        token.span,
                    )),
                }
            }
            _ => Err((
                AsmError::new(
                    AsmErrorKind::Instruction,
                    "Illegal operand",
                    Some(&token.text()),
                ),
                token.span,
            )),
        }
    }

    /// Emit the opcode byte and then each operand according to the
    /// variant's shape. Register operands are already encoded in the
    /// opcode and emit nothing.
    fn encode(&mut self, variant: &Variant, operands: &[Operand]) {
        self.push_byte(variant.opcode, Some(variant.display.clone()), true);
        for (shape, operand) in variant.pattern.shapes().iter().zip(operands) {
            match shape {
                OperandShape::Reg => {}
                OperandShape::Imm8 => match operand {
                    Operand::Immediate { value, span } => {
                        self.emit_value(*value, 1, None, *span);
                    }
                    Operand::LabelRef { name, span } => {
                        self.emit_name(name.clone(), 1, None, *span);
                    }
                    _ => {}
                },
                OperandShape::Imm16 => match operand {
                    Operand::Immediate { value, span } => {
                        self.emit_value(*value, 2, None, *span);
                    }
                    Operand::LabelRef { name, span } => {
                        self.emit_name(name.clone(), 2, None, *span);
                    }
                    _ => {}
                },
                OperandShape::Mem => {
                    let width = self.tables.address_bytes();
                    match operand {
                        Operand::Memory {
                            target: MemTarget::Address(addr),
                            span,
                        } => self.emit_value(*addr as i64, width, None, *span),
                        Operand::Memory {
                            target: MemTarget::Name(name),
                            span,
                        } => self.emit_name(name.clone(), width, None, *span),
                        Operand::LabelRef { name, span } => {
                            self.emit_name(name.clone(), width, None, *span);
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Emission helpers (pass 2 only)

    fn push_byte(&mut self, value: u8, annotation: Option<String>, is_opcode: bool) {
        let addr = self.layout.addr();
        self.sections.get_mut(self.layout.current).push(ByteRecord {
            addr,
            value,
            annotation,
            is_opcode,
        });
        self.layout.advance(1);
    }

    /// Emit `value` as a `width`-byte quantity in the descriptor's byte
    /// order, warning when it does not fit.
    fn emit_value(&mut self, value: i64, width: u8, annotation: Option<String>, span: Span) {
        let width = usize::from(width).min(8);
        if !value_fits(value, width) {
            self.report(
                Severity::Warning,
                AsmErrorKind::Expression,
                "Value truncated",
                Some(&value.to_string()),
                span,
            );
        }
        let masked = if width >= 8 {
            value as u64
        } else {
            (value as u64) & ((1u64 << (width * 8)) - 1)
        };
        let mut buf = [0u8; 8];
        self.tables.byte_order.write_uint(&mut buf[..width], masked, width);
        let mut annotation = annotation;
        for &byte in &buf[..width] {
            self.push_byte(byte, annotation.take(), false);
        }
    }

    /// Emit a name reference: the resolved address when the symbol is
    /// already known, else a zero placeholder plus a queued reference at
    /// the byte slot the address will occupy.
    fn emit_name(&mut self, name: String, width: u8, annotation: Option<String>, span: Span) {
        if let Some(addr) = self.symbols.address_of(&name) {
            self.emit_value(addr as i64, width, annotation, span);
            return;
        }

        let ref_width = width.min(self.tables.address_bytes()).min(2);
        let start = self.sections.get(self.layout.current).len();
        let offset = if self.tables.byte_order == ByteOrder::Big && width > ref_width {
            start + usize::from(width - ref_width)
        } else {
            start
        };
        let mut annotation = annotation;
        for _ in 0..width {
            self.push_byte(0, annotation.take(), false);
        }
        self.pending.push(UnresolvedReference {
            offset,
            section: self.layout.current,
            name,
            width: ref_width,
            span,
        });
    }

    // ------------------------------------------------------------------
    // Diagnostics

    fn report(
        &mut self,
        severity: Severity,
        kind: AsmErrorKind,
        msg: &str,
        param: Option<&str>,
        span: Span,
    ) {
        let error = AsmError::new(kind, msg, param);
        self.diagnostics.push(
            Diagnostic::new(span.line, severity, error).with_column(Some(span.col_start)),
        );
    }

    fn push_error(&mut self, error: AsmError, span: Span) {
        self.diagnostics.push(
            Diagnostic::new(span.line, Severity::Error, error)
                .with_column(Some(span.col_start)),
        );
    }
}

fn section_kind_from_name(name: &str) -> Option<SectionKind> {
    let trimmed = name.strip_prefix('.').unwrap_or(name);
    match trimmed.to_ascii_lowercase().as_str() {
        "text" | "code" => Some(SectionKind::Code),
        "data" => Some(SectionKind::Data),
        "bss" | "reserved" => Some(SectionKind::Reserved),
        _ => None,
    }
}

fn value_fits(value: i64, width: usize) -> bool {
    if width >= 8 {
        return true;
    }
    let bits = width as u32 * 8;
    value >= -(1i64 << (bits - 1)) && value < (1i64 << bits)
}

// ----------------------------------------------------------------------
// CLI-driven run flow

/// Run the assembler with command-line arguments.
pub fn run() -> Result<AsmRunReport, AsmRunError> {
    let cli = Cli::parse();
    run_with_cli(&cli)
}

pub fn run_with_cli(cli: &Cli) -> Result<AsmRunReport, AsmRunError> {
    let config = validate_cli(cli)?;

    let source = fs::read_to_string(&cli.infile).map_err(|_| {
        AsmRunError::new(
            AsmError::new(
                AsmErrorKind::Io,
                "Error reading input file",
                Some(&cli.infile.to_string_lossy()),
            ),
            Vec::new(),
            Vec::new(),
        )
    })?;
    let source_lines: Vec<String> = source.lines().map(str::to_string).collect();

    let machine = machines::by_name(&config.machine).ok_or_else(|| {
        let known = machines::machine_names().join(", ");
        AsmRunError::new(
            AsmError::new(
                AsmErrorKind::Cli,
                &format!("Unknown machine: {}. Known machines: {known}", config.machine),
                None,
            ),
            Vec::new(),
            Vec::new(),
        )
    })?;

    let mut options = CompileOptions {
        case_sensitive: cli.case_sensitive,
        ..CompileOptions::default()
    };
    if let Some(org) = config.org {
        options.code_base = org;
    }

    let program = compile(&machine, &source, &options).map_err(|err| {
        let diagnostic = Diagnostic::new(err.span.line, Severity::Error, err.error.clone())
            .with_column(Some(err.span.col_start));
        AsmRunError::new(err.error, vec![diagnostic], source_lines.clone())
    })?;

    if let Some(path) = &config.list_path {
        let result = File::create(path).map(|mut file| write_listing(&mut file, &program, &config.machine));
        match result {
            Ok(Ok(())) => {}
            _ => {
                return Err(AsmRunError::new(
                    AsmError::new(
                        AsmErrorKind::Io,
                        "Error opening file for write",
                        Some(&path.to_string_lossy()),
                    ),
                    program.diagnostics,
                    source_lines,
                ));
            }
        }
    }

    // Hex and binary images are only written for a clean compile.
    if !program.has_errors() {
        let image = ImageStore::from_sections(&program.sections);
        if let Some(path) = &config.hex_path {
            let start = config
                .go_addr
                .or(program.entry_point.map(|addr| addr as u16));
            let result = File::create(path).map(|mut file| image.write_hex_file(&mut file, start));
            if !matches!(result, Ok(Ok(()))) {
                return Err(AsmRunError::new(
                    AsmError::new(
                        AsmErrorKind::Io,
                        "Error opening file for write",
                        Some(&path.to_string_lossy()),
                    ),
                    program.diagnostics,
                    source_lines,
                ));
            }
        }
        if let Some(path) = &config.bin_path {
            if let Some((start, end)) = image.output_range() {
                let result = File::create(path)
                    .map(|mut file| image.write_bin_file(&mut file, start, end, config.fill_byte));
                if !matches!(result, Ok(Ok(()))) {
                    return Err(AsmRunError::new(
                        AsmError::new(
                            AsmErrorKind::Io,
                            "Error opening file for write",
                            Some(&path.to_string_lossy()),
                        ),
                        program.diagnostics,
                        source_lines,
                    ));
                }
            }
        }
    }

    Ok(AsmRunReport::new(program.diagnostics, source_lines, cli.json))
}

fn write_listing<W: Write>(
    out: &mut W,
    program: &CompiledProgram,
    machine: &str,
) -> std::io::Result<()> {
    let mut listing = ListingWriter::new(out);
    listing.header(&format!("byteForge Assembler v{VERSION} ({machine})"))?;
    listing.write_sections(&program.sections)?;
    listing.footer(
        &program.symbols,
        program.entry_point,
        program.error_count(),
        program.warning_count(),
    )
}

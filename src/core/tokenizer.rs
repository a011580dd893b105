// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Tokenizer for assembly source with spans.
//!
//! The tokenizer consumes the full source string once, left to right, and
//! produces a token list terminated by an end marker. Identifiers are
//! classified against the machine tables' instruction, register, and
//! directive name sets; everything else falls back to a generic
//! identifier. Lexical failures (unterminated string, unexpected
//! character) are fatal for the whole compile.

use crate::core::machine::MachineTables;
use crate::core::section::SectionKind;
use crate::core::text_utils::{
    is_digit, is_hex_digit, is_ident_char, is_ident_start, is_num_char, is_space,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub col_start: usize,
    pub col_end: usize,
}

impl Span {
    fn new(line: u32, start: usize, end: usize) -> Self {
        Self {
            line,
            col_start: start + 1,
            col_end: end + 1,
        }
    }
}

/// Directives recognized by the lexer's directive name set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Section,
    Text,
    Data,
    Bss,
    Org,
    Global,
    Extern,
    Db,
    Dw,
    Dd,
    Dq,
    Resb,
    Resw,
    Resd,
    Resq,
    // Recognized but carrying no emission semantics.
    Equ,
    Times,
}

impl Directive {
    /// Look up a directive by name. A leading dot is accepted on every
    /// directive name; lookups are normalized unless the compile is
    /// case-sensitive.
    pub fn lookup(name: &str, case_sensitive: bool) -> Option<Directive> {
        let trimmed = name.strip_prefix('.').unwrap_or(name);
        let key = if case_sensitive {
            trimmed.to_string()
        } else {
            trimmed.to_ascii_lowercase()
        };
        let directive = match key.as_str() {
            "section" => Directive::Section,
            "text" => Directive::Text,
            "data" => Directive::Data,
            "bss" => Directive::Bss,
            "org" => Directive::Org,
            "global" => Directive::Global,
            "extern" => Directive::Extern,
            "db" => Directive::Db,
            "dw" => Directive::Dw,
            "dd" => Directive::Dd,
            "dq" => Directive::Dq,
            "resb" => Directive::Resb,
            "resw" => Directive::Resw,
            "resd" => Directive::Resd,
            "resq" => Directive::Resq,
            "equ" => Directive::Equ,
            "times" => Directive::Times,
            _ => return None,
        };
        Some(directive)
    }

    pub fn name(self) -> &'static str {
        match self {
            Directive::Section => "section",
            Directive::Text => ".text",
            Directive::Data => ".data",
            Directive::Bss => ".bss",
            Directive::Org => "org",
            Directive::Global => "global",
            Directive::Extern => "extern",
            Directive::Db => "db",
            Directive::Dw => "dw",
            Directive::Dd => "dd",
            Directive::Dq => "dq",
            Directive::Resb => "resb",
            Directive::Resw => "resw",
            Directive::Resd => "resd",
            Directive::Resq => "resq",
            Directive::Equ => "equ",
            Directive::Times => "times",
        }
    }

    /// Element width for data-definition directives.
    pub fn data_width(self) -> Option<u8> {
        match self {
            Directive::Db => Some(1),
            Directive::Dw => Some(2),
            Directive::Dd => Some(4),
            Directive::Dq => Some(8),
            _ => None,
        }
    }

    /// Element width for reservation directives.
    pub fn reserve_width(self) -> Option<u8> {
        match self {
            Directive::Resb => Some(1),
            Directive::Resw => Some(2),
            Directive::Resd => Some(4),
            Directive::Resq => Some(8),
            _ => None,
        }
    }

    /// Section selected by a canonical section-name directive.
    pub fn section_kind(self) -> Option<SectionKind> {
        match self {
            Directive::Text => Some(SectionKind::Code),
            Directive::Data => Some(SectionKind::Data),
            Directive::Bss => Some(SectionKind::Reserved),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringLiteral {
    pub raw: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Label(String),
    Mnemonic(String),
    Register(String),
    Directive(Directive),
    Identifier(String),
    Number(String),
    Str(StringLiteral),
    Comma,
    Colon,
    Plus,
    Minus,
    Star,
    OpenBracket,
    CloseBracket,
    OpenParen,
    CloseParen,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    /// Source text of this token, for error messages.
    pub fn text(&self) -> String {
        match &self.kind {
            TokenKind::Label(name)
            | TokenKind::Mnemonic(name)
            | TokenKind::Register(name)
            | TokenKind::Identifier(name)
            | TokenKind::Number(name) => name.clone(),
            TokenKind::Directive(d) => d.name().to_string(),
            TokenKind::Str(lit) => lit.raw.clone(),
            TokenKind::Comma => ",".to_string(),
            TokenKind::Colon => ":".to_string(),
            TokenKind::Plus => "+".to_string(),
            TokenKind::Minus => "-".to_string(),
            TokenKind::Star => "*".to_string(),
            TokenKind::OpenBracket => "[".to_string(),
            TokenKind::CloseBracket => "]".to_string(),
            TokenKind::OpenParen => "(".to_string(),
            TokenKind::CloseParen => ")".to_string(),
            TokenKind::End => String::new(),
        }
    }
}

/// Fatal lexical error; the compile produces no partial output.
#[derive(Debug, Clone)]
pub struct TokenizeError {
    pub message: String,
    pub span: Span,
}

struct Tokenizer<'a> {
    input: &'a [u8],
    cursor: usize,
    line: u32,
    line_start: usize,
    tables: &'a MachineTables,
}

/// Tokenize a complete source string against a machine's name sets.
pub fn tokenize(source: &str, tables: &MachineTables) -> Result<Vec<Token>, TokenizeError> {
    let mut tokenizer = Tokenizer {
        input: source.as_bytes(),
        cursor: 0,
        line: 1,
        line_start: 0,
        tables,
    };
    let mut tokens = Vec::new();
    loop {
        let token = tokenizer.next_token()?;
        let done = token.kind == TokenKind::End;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

impl<'a> Tokenizer<'a> {
    fn next_token(&mut self) -> Result<Token, TokenizeError> {
        self.skip_blank();
        let start = self.col();
        let c = self.current_byte();
        match c {
            0 => Ok(self.token(TokenKind::End, start)),
            _ if is_ident_start(c) => self.scan_identifier(),
            _ if is_digit(c) => self.scan_number(),
            b'"' | b'\'' => self.scan_string(),
            b'$' => {
                if is_hex_digit(self.peek_byte(1)) {
                    self.scan_hex_prefixed()
                } else {
                    Err(self.failure("Unexpected character", "$", start))
                }
            }
            _ => self.scan_punct(c, start),
        }
    }

    fn scan_punct(&mut self, c: u8, start: usize) -> Result<Token, TokenizeError> {
        let kind = match c {
            b',' => TokenKind::Comma,
            b':' => TokenKind::Colon,
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'[' => TokenKind::OpenBracket,
            b']' => TokenKind::CloseBracket,
            b'(' => TokenKind::OpenParen,
            b')' => TokenKind::CloseParen,
            _ => {
                let text = (c as char).to_string();
                return Err(self.failure("Unexpected character", &text, start));
            }
        };
        self.cursor += 1;
        Ok(self.token(kind, start))
    }

    fn scan_identifier(&mut self) -> Result<Token, TokenizeError> {
        let start = self.col();
        let from = self.cursor;
        while is_ident_char(self.current_byte()) {
            self.cursor += 1;
        }
        let text = String::from_utf8_lossy(&self.input[from..self.cursor]).to_string();

        // An identifier immediately followed by a colon is a label.
        if self.current_byte() == b':' {
            self.cursor += 1;
            return Ok(self.token(TokenKind::Label(text), start));
        }

        let case_sensitive = self.tables.case_sensitive();
        let kind = if self.tables.is_mnemonic(&text) {
            TokenKind::Mnemonic(text)
        } else if self.tables.is_register(&text) {
            TokenKind::Register(text)
        } else if let Some(directive) = Directive::lookup(&text, case_sensitive) {
            TokenKind::Directive(directive)
        } else {
            TokenKind::Identifier(text)
        };
        Ok(self.token(kind, start))
    }

    fn scan_number(&mut self) -> Result<Token, TokenizeError> {
        let start = self.col();
        let from = self.cursor;
        while is_num_char(self.current_byte()) {
            self.cursor += 1;
        }
        let text = String::from_utf8_lossy(&self.input[from..self.cursor]).to_string();
        Ok(self.token(TokenKind::Number(text), start))
    }

    fn scan_hex_prefixed(&mut self) -> Result<Token, TokenizeError> {
        let start = self.col();
        let from = self.cursor;
        self.cursor += 1;
        while is_hex_digit(self.current_byte()) || self.current_byte() == b'_' {
            self.cursor += 1;
        }
        let text = String::from_utf8_lossy(&self.input[from..self.cursor]).to_string();
        Ok(self.token(TokenKind::Number(text), start))
    }

    fn scan_string(&mut self) -> Result<Token, TokenizeError> {
        let start = self.col();
        let from = self.cursor;
        let quote = self.current_byte();
        self.cursor += 1;
        let mut bytes = Vec::new();
        loop {
            let c = self.current_byte();
            if c == 0 || c == b'\n' {
                let raw = String::from_utf8_lossy(&self.input[from..self.cursor]).to_string();
                return Err(self.failure("Unterminated string", &raw, start));
            }
            if c == quote {
                break;
            }
            if c == b'\\' {
                // One-character escape: the next character is taken literally.
                self.cursor += 1;
                let escaped = self.current_byte();
                if escaped == 0 || escaped == b'\n' {
                    let raw =
                        String::from_utf8_lossy(&self.input[from..self.cursor]).to_string();
                    return Err(self.failure("Unterminated string", &raw, start));
                }
                bytes.push(escaped);
            } else {
                bytes.push(c);
            }
            self.cursor += 1;
        }
        self.cursor += 1;
        let raw = String::from_utf8_lossy(&self.input[from..self.cursor]).to_string();
        Ok(self.token(TokenKind::Str(StringLiteral { raw, bytes }), start))
    }

    /// Skip whitespace, newlines, and comments, tracking line numbers.
    fn skip_blank(&mut self) {
        loop {
            let c = self.current_byte();
            if is_space(c) || c == b'\r' {
                self.cursor += 1;
            } else if c == b'\n' {
                self.cursor += 1;
                self.line += 1;
                self.line_start = self.cursor;
            } else if c == b';' {
                while self.current_byte() != 0 && self.current_byte() != b'\n' {
                    self.cursor += 1;
                }
            } else {
                return;
            }
        }
    }

    fn token(&self, kind: TokenKind, start_col: usize) -> Token {
        Token {
            kind,
            span: Span::new(self.line, start_col, self.col()),
        }
    }

    fn failure(&self, msg: &str, param: &str, start_col: usize) -> TokenizeError {
        TokenizeError {
            message: format!("{msg}: {param}"),
            span: Span::new(self.line, start_col, self.col()),
        }
    }

    fn col(&self) -> usize {
        self.cursor - self.line_start
    }

    fn current_byte(&self) -> u8 {
        self.input.get(self.cursor).copied().unwrap_or(0)
    }

    fn peek_byte(&self, offset: usize) -> u8 {
        self.input.get(self.cursor + offset).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::{tokenize, Directive, TokenKind};
    use crate::core::machine::{
        ByteOrder, InstructionDescriptor, MachineDescriptor, MachineTables, RegisterDescriptor,
    };

    fn tables() -> MachineTables {
        let machine = MachineDescriptor {
            name: "test".to_string(),
            address_bits: 16,
            byte_order: ByteOrder::Little,
            registers: vec![
                RegisterDescriptor::new("A", 0, 8),
                RegisterDescriptor::new("B", 1, 8),
            ],
            instructions: vec![InstructionDescriptor::new("LD", 0x01, "REG_IMM8", 2)],
        };
        MachineTables::build(&machine, false).unwrap()
    }

    #[test]
    fn classifies_label_mnemonic_and_register() {
        let tables = tables();
        let tokens = tokenize("start: LD A, 5", &tables).unwrap();
        assert!(matches!(tokens[0].kind, TokenKind::Label(ref n) if n == "start"));
        assert!(matches!(tokens[1].kind, TokenKind::Mnemonic(ref n) if n == "LD"));
        assert!(matches!(tokens[2].kind, TokenKind::Register(ref n) if n == "A"));
        assert_eq!(tokens[3].kind, TokenKind::Comma);
        assert!(matches!(tokens[4].kind, TokenKind::Number(ref n) if n == "5"));
        assert_eq!(tokens[5].kind, TokenKind::End);
    }

    #[test]
    fn classifies_directives_with_and_without_dot() {
        let tables = tables();
        let tokens = tokenize("section .text\norg 0x100", &tables).unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Directive(Directive::Section));
        assert_eq!(tokens[1].kind, TokenKind::Directive(Directive::Text));
        assert_eq!(tokens[2].kind, TokenKind::Directive(Directive::Org));
        assert_eq!(tokens[2].span.line, 2);
    }

    #[test]
    fn unknown_name_falls_back_to_identifier() {
        let tables = tables();
        let tokens = tokenize("JMP later", &tables).unwrap();
        assert!(matches!(tokens[0].kind, TokenKind::Identifier(ref n) if n == "JMP"));
        assert!(matches!(tokens[1].kind, TokenKind::Identifier(ref n) if n == "later"));
    }

    #[test]
    fn tracks_lines_and_columns() {
        let tables = tables();
        let tokens = tokenize("LD A, 1\n  LD B, 2 ; move\n", &tables).unwrap();
        assert_eq!(tokens[0].span.line, 1);
        assert_eq!(tokens[0].span.col_start, 1);
        let second_ld = &tokens[4];
        assert!(matches!(second_ld.kind, TokenKind::Mnemonic(_)));
        assert_eq!(second_ld.span.line, 2);
        assert_eq!(second_ld.span.col_start, 3);
    }

    #[test]
    fn numeric_literal_families_are_delimited() {
        let tables = tables();
        let tokens = tokenize("db 0x1F, $2a, 0b101, 0A6h, 42", &tables).unwrap();
        let numbers: Vec<String> = tokens
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::Number(text) => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(numbers, vec!["0x1F", "$2a", "0b101", "0A6h", "42"]);
    }

    #[test]
    fn string_escape_takes_next_character_literally() {
        let tables = tables();
        let tokens = tokenize("db \"a\\\"b\"", &tables).unwrap();
        match &tokens[1].kind {
            TokenKind::Str(lit) => assert_eq!(lit.bytes, vec![b'a', b'"', b'b']),
            other => panic!("expected string literal, got {other:?}"),
        }
    }

    #[test]
    fn single_quoted_strings_work() {
        let tables = tables();
        let tokens = tokenize("db 'hi'", &tables).unwrap();
        match &tokens[1].kind {
            TokenKind::Str(lit) => assert_eq!(lit.bytes, b"hi".to_vec()),
            other => panic!("expected string literal, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let tables = tables();
        let err = tokenize("db \"oops", &tables).unwrap_err();
        assert!(err.message.contains("Unterminated string"));
    }

    #[test]
    fn unexpected_character_is_fatal() {
        let tables = tables();
        let err = tokenize("LD A, @", &tables).unwrap_err();
        assert!(err.message.contains("Unexpected character"));
        assert_eq!(err.span.line, 1);
    }

    #[test]
    fn comments_and_crlf_are_discarded() {
        let tables = tables();
        let tokens = tokenize("; full line comment\r\nLD A, 1\r\n", &tables).unwrap();
        assert!(matches!(tokens[0].kind, TokenKind::Mnemonic(_)));
        assert_eq!(tokens[0].span.line, 2);
    }

    #[test]
    fn punctuation_tokens() {
        let tables = tables();
        let tokens = tokenize("[ ] ( ) + - * : ,", &tables).unwrap();
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::OpenBracket,
                TokenKind::CloseBracket,
                TokenKind::OpenParen,
                TokenKind::CloseParen,
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Colon,
                TokenKind::Comma,
                TokenKind::End,
            ]
        );
    }
}

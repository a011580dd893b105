// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::path::PathBuf;

use clap::{ArgAction, Parser};

use crate::core::error::{AsmError, AsmErrorKind, AsmRunError};

pub const VERSION: &str = "1.0";

const LONG_ABOUT: &str = "Retargetable table-driven assembler.

Outputs are opt-in: specify at least one of -l/--list, -x/--hex, or -b/--bin.
Filenames are optional for all three; when omitted, the input base name is
used with a .lst/.hex/.bin extension. Use -o/--outfile to override the base.
The target machine is selected with -m/--machine.";

#[derive(Parser, Debug)]
#[command(
    name = "byteForge",
    version = VERSION,
    about = "Retargetable table-driven assembler",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(value_name = "FILE", help = "Input assembly file")]
    pub infile: PathBuf,
    #[arg(
        short = 'm',
        long = "machine",
        value_name = "NAME",
        default_value = "micro16",
        long_help = "Target machine descriptor. Use a built-in machine name."
    )]
    pub machine: String,
    #[arg(
        short = 'o',
        long = "outfile",
        value_name = "BASE",
        long_help = "Output filename base when -l/-x/-b omit filenames. Defaults to the input base."
    )]
    pub outfile: Option<String>,
    #[arg(
        short = 'l',
        long = "list",
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = "",
        long_help = "Emit a listing file. FILE is optional; when omitted, the output base is used and a .lst extension is added."
    )]
    pub list_name: Option<String>,
    #[arg(
        short = 'x',
        long = "hex",
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = "",
        long_help = "Emit an Intel Hex file. FILE is optional; when omitted, the output base is used and a .hex extension is added."
    )]
    pub hex_name: Option<String>,
    #[arg(
        short = 'b',
        long = "bin",
        value_name = "FILE",
        num_args = 0..=1,
        default_missing_value = "",
        long_help = "Emit a binary image spanning the emitted output. FILE is optional; when omitted, the output base is used and a .bin extension is added."
    )]
    pub bin_name: Option<String>,
    #[arg(
        short = 'f',
        long = "fill",
        value_name = "hh",
        long_help = "Fill byte for binary output (2 hex digits). Defaults to FF. Requires -b."
    )]
    pub fill_byte: Option<String>,
    #[arg(
        short = 'g',
        long = "go",
        value_name = "aaaa",
        long_help = "Set execution start address (4 hex digits). Adds a Start Segment Address record to hex output. Defaults to the program entry point when one is declared. Requires hex output."
    )]
    pub go_addr: Option<String>,
    #[arg(
        long = "org",
        value_name = "aaaa",
        long_help = "Code section base address (4 hex digits). Defaults to 0000."
    )]
    pub org: Option<String>,
    #[arg(
        long = "case-sensitive",
        action = ArgAction::SetTrue,
        long_help = "Treat symbol and name-set lookups as case-sensitive."
    )]
    pub case_sensitive: bool,
    #[arg(
        long = "json",
        action = ArgAction::SetTrue,
        long_help = "Print diagnostics as JSON instead of formatted text."
    )]
    pub json: bool,
}

/// Validated CLI configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub machine: String,
    pub list_path: Option<PathBuf>,
    pub hex_path: Option<PathBuf>,
    pub bin_path: Option<PathBuf>,
    pub fill_byte: u8,
    pub go_addr: Option<u16>,
    pub org: Option<u32>,
}

pub fn is_valid_hex_4(s: &str) -> bool {
    s.len() == 4 && s.chars().all(|c| c.is_ascii_hexdigit())
}

pub fn is_valid_hex_2(s: &str) -> bool {
    s.len() == 2 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn cli_error(msg: &str, param: Option<&str>) -> AsmRunError {
    AsmRunError::new(
        AsmError::new(AsmErrorKind::Cli, msg, param),
        Vec::new(),
        Vec::new(),
    )
}

/// Base name of the input file without its extension.
pub fn input_base_from_path(path: &PathBuf) -> Result<String, AsmRunError> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| cli_error("Invalid input filename", Some(&path.to_string_lossy())))
}

/// Resolve an optional output filename against the base name. An empty
/// name (flag given without value) selects `<base>.<ext>`.
pub fn resolve_output_path(base: &str, name: Option<&str>, ext: &str) -> Option<PathBuf> {
    let name = name?;
    if name.is_empty() {
        return Some(PathBuf::from(format!("{base}.{ext}")));
    }
    let path = PathBuf::from(name);
    if path.extension().is_none() {
        Some(path.with_extension(ext))
    } else {
        Some(path)
    }
}

pub fn validate_cli(cli: &Cli) -> Result<CliConfig, AsmRunError> {
    let input_base = input_base_from_path(&cli.infile)?;
    let base = cli.outfile.as_deref().unwrap_or(&input_base);

    let list_path = resolve_output_path(base, cli.list_name.as_deref(), "lst");
    let hex_path = resolve_output_path(base, cli.hex_name.as_deref(), "hex");
    let bin_path = resolve_output_path(base, cli.bin_name.as_deref(), "bin");

    let fill_byte = match cli.fill_byte.as_deref() {
        Some(text) => {
            if bin_path.is_none() {
                return Err(cli_error("-f/--fill requires binary output (-b/--bin)", None));
            }
            if !is_valid_hex_2(text) {
                return Err(cli_error("Invalid fill byte (expected 2 hex digits)", Some(text)));
            }
            u8::from_str_radix(text, 16).unwrap_or(0xff)
        }
        None => 0xff,
    };

    let go_addr = match cli.go_addr.as_deref() {
        Some(text) => {
            if hex_path.is_none() {
                return Err(cli_error("-g/--go requires hex output (-x/--hex)", None));
            }
            if !is_valid_hex_4(text) {
                return Err(cli_error(
                    "Invalid start address (expected 4 hex digits)",
                    Some(text),
                ));
            }
            Some(u16::from_str_radix(text, 16).unwrap_or(0))
        }
        None => None,
    };

    let org = match cli.org.as_deref() {
        Some(text) => {
            if !is_valid_hex_4(text) {
                return Err(cli_error(
                    "Invalid origin address (expected 4 hex digits)",
                    Some(text),
                ));
            }
            Some(u32::from_str_radix(text, 16).unwrap_or(0))
        }
        None => None,
    };

    Ok(CliConfig {
        machine: cli.machine.clone(),
        list_path,
        hex_path,
        bin_path,
        fill_byte,
        go_addr,
        org,
    })
}

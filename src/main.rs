// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for byteForge.

use serde_json::json;

use byteforge::core::error::{Diagnostic, Severity};

fn diagnostics_json(diagnostics: &[Diagnostic]) -> serde_json::Value {
    json!({
        "schema": "byteforge-diagnostics-v1",
        "diagnostics": diagnostics.iter().map(|diag| {
            json!({
                "line": diag.line,
                "column": diag.column,
                "severity": match diag.severity {
                    Severity::Warning => "warning",
                    Severity::Error => "error",
                },
                "message": diag.message(),
            })
        }).collect::<Vec<_>>(),
    })
}

fn main() {
    let use_color = std::env::var("NO_COLOR").is_err();
    match byteforge::assembler::run() {
        Ok(report) => {
            if report.json() {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&diagnostics_json(report.diagnostics()))
                        .unwrap_or_default()
                );
            } else {
                for diag in report.diagnostics() {
                    eprintln!(
                        "{}",
                        diag.format_with_context(Some(report.source_lines()), use_color)
                    );
                }
            }
            if report.error_count() > 0 {
                std::process::exit(1);
            }
        }
        Err(err) => {
            for diag in err.diagnostics() {
                eprintln!(
                    "{}",
                    diag.format_with_context(Some(err.source_lines()), use_color)
                );
            }
            eprintln!("{err}");
            std::process::exit(1);
        }
    }
}

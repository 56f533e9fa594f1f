//! Integration Test: Blocking I/O Prohibition
//!
//! **Policy**: Code on the presentation path (stream adapter, directive
//! parser, reveal engine, controller) MUST NOT do blocking network, process
//! or console I/O. The only file I/O the controller triggers goes through
//! the `HistoryStore` trait, which lives in `history.rs`.
//! **Required**: Use `reqwest` async, `tokio::io` for the terminal.

use std::path::Path;

use architectural_enforcement::{code_part, production_lines, rust_files};

/// Files that must stay free of direct I/O
const PRESENTATION_PATH: &[&str] = &[
    "dialogue/core/src/backend",
    "dialogue/core/src/reveal",
    "dialogue/core/src/catalog.rs",
    "dialogue/core/src/controller.rs",
    "dialogue/core/src/conversation.rs",
    "dialogue/core/src/directive.rs",
    "dialogue/core/src/messages.rs",
];

/// Test that presentation-path code does not use blocking I/O
#[test]
fn test_no_blocking_io_in_presentation_path() {
    let mut violations = Vec::new();

    for dir in PRESENTATION_PATH {
        for path in rust_files(dir) {
            check_file(&path, &mut violations, true);
        }
    }
    for path in rust_files("dialogue/cli/src") {
        check_file(&path, &mut violations, false);
    }

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking I/O calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }

        eprintln!("\n❌ FORBIDDEN blocking I/O:");
        eprintln!("  - std::fs on the presentation path (use the HistoryStore)");
        eprintln!("  - std::net::TcpStream, std::net::TcpListener");
        eprintln!("  - std::process::Command");
        eprintln!("  - reqwest::blocking::*");
        eprintln!("  - std::io::stdin() inside async code");

        panic!(
            "\nFound {} blocking I/O violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

fn check_file(path: &Path, violations: &mut Vec<String>, forbid_fs: bool) {
    let lines = production_lines(path);
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();

    for (idx, line) in lines.iter().enumerate() {
        let code = code_part(line);
        let mut flag = |kind: &str| {
            violations.push(format!("{}:{} - {kind}: {}", path.display(), idx + 1, line.trim()));
        };

        if forbid_fs && (code.contains("std::fs") || code.contains("tokio::fs")) {
            flag("File I/O on presentation path");
        }
        if code.contains("std::net::") || code.contains("use std::net") {
            flag("Blocking network I/O");
        }
        if code.contains("std::process::Command") {
            flag("Blocking process I/O");
        }
        if code.contains("reqwest::blocking") {
            flag("Blocking HTTP client");
        }
        if code.contains("std::io::stdin()") && is_in_async_function(&lines, idx) {
            flag("Blocking stdin in async");
        }
    }
}

/// Check if line is inside an async function
fn is_in_async_function(lines: &[&str], current_idx: usize) -> bool {
    for line in lines[..current_idx].iter().rev() {
        let line = line.trim();

        if line.contains("async fn ") || line.contains("async move") {
            return true;
        }
        if line.starts_with("fn ") || line.starts_with("pub fn ") {
            return false;
        }
        if line.starts_with("mod ") || (line.starts_with("impl") && line.contains('{')) {
            return false;
        }
    }
    false
}

#[test]
fn test_async_function_detection() {
    let code = [
        "async fn bad_function() {",
        "    let line = std::io::stdin().read_line(&mut buf);",
        "}",
    ];
    assert!(is_in_async_function(&code, 1));

    let code = [
        "fn main() {",
        "    let line = std::io::stdin().read_line(&mut buf);",
        "}",
    ];
    assert!(!is_in_async_function(&code, 1));
}

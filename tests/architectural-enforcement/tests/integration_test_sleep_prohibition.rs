//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code MUST NOT call sleep methods. Time moves through
//! the controller's `tick`, and waiting happens on channels or `interval`.
//! **Exceptions**: exponential backoff between retry attempts, test code

use std::path::Path;

use architectural_enforcement::{code_part, production_lines, rust_files};

/// Test that production code does not contain sleep() calls
#[test]
fn test_no_sleep_in_production_code() {
    let violations = find_sleep_violations();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Sleep calls found in production code!\n");

        for violation in &violations {
            eprintln!("  ❌ {}", violation);
        }

        eprintln!("\n✅ ACCEPTABLE sleep uses:");
        eprintln!("  - Exponential backoff in retry logic");
        eprintln!("  - Test code (#[cfg(test)] modules)");
        eprintln!("  - Periodic tasks using tokio::time::interval()");
        eprintln!("\n❌ FORBIDDEN:");
        eprintln!("  - Sleep in polling loops");
        eprintln!("  - Sleep to pace the typewriter (use tick elapsed time)");
        eprintln!("  - Sleep to 'wait' for events (use channels!)");

        panic!(
            "\nFound {} sleep violation(s) in production code.\nFix these before merging!",
            violations.len()
        );
    }
}

/// Find all sleep() calls in production code
fn find_sleep_violations() -> Vec<String> {
    let mut violations = Vec::new();

    for dir in ["dialogue/core/src", "dialogue/cli/src"] {
        for path in rust_files(dir) {
            check_file(&path, &mut violations);
        }
    }

    violations
}

fn check_file(path: &Path, violations: &mut Vec<String>) {
    let lines = production_lines(path);
    let lines: Vec<&str> = lines.iter().map(String::as_str).collect();

    for (idx, line) in lines.iter().enumerate() {
        let code = code_part(line);
        if !(code.contains("::sleep(") || code.contains(".sleep(")) {
            continue;
        }

        if is_backoff_context(&lines, idx) || is_interval_pattern(&lines, idx) {
            continue;
        }

        violations.push(format!("{}:{} - {}", path.display(), idx + 1, line.trim()));
    }
}

/// Check if sleep is used for retry backoff
fn is_backoff_context(lines: &[&str], current_idx: usize) -> bool {
    let context_range = current_idx.saturating_sub(15)..std::cmp::min(current_idx + 5, lines.len());

    let mut has_backoff = false;
    let mut has_retry_context = false;

    for line in &lines[context_range] {
        let line = line.to_lowercase();
        if line.contains("backoff") {
            has_backoff = true;
        }
        if line.contains("retry") || line.contains("attempt") {
            has_retry_context = true;
        }
    }

    has_backoff && has_retry_context
}

/// Check if this is the tokio::time::interval pattern
fn is_interval_pattern(lines: &[&str], current_idx: usize) -> bool {
    let context_range = current_idx.saturating_sub(20)..std::cmp::min(current_idx + 5, lines.len());
    lines[context_range]
        .iter()
        .any(|line| line.contains("interval.tick()") || line.contains("tokio::time::interval"))
}

#[test]
fn test_backoff_detection() {
    let code = [
        "let delay = retry.backoff_for_retry(attempts - 1);",
        "tracing::info!(attempt = attempts, \"retrying\");",
        "tokio::time::sleep(delay).await;",
    ];
    assert!(is_backoff_context(&code, 2));
}

#[test]
fn test_plain_sleep_flagged() {
    let code = [
        "fn pace(&mut self) {",
        "    std::thread::sleep(self.rate);",
        "}",
    ];
    assert!(!is_backoff_context(&code, 1));
    assert!(!is_interval_pattern(&code, 1));
}

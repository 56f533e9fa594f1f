//! Integration Test: Clock-Free Reveal
//!
//! **Policy**: The typewriter and the directive parser are driven entirely
//! by the elapsed time passed to `tick`. They MUST NOT read a clock or
//! touch the runtime's timer, so that reveal progress is a pure function of
//! the ticks it was given and freezes exactly when ticks stop.

use architectural_enforcement::{code_part, production_lines, rust_files};

const CLOCK_READS: &[&str] = &[
    "Instant::now",
    "SystemTime",
    "chrono::",
    "tokio::time",
    "thread::sleep",
];

#[test]
fn test_reveal_never_reads_a_clock() {
    let mut violations = Vec::new();

    let mut files = rust_files("dialogue/core/src/reveal");
    files.extend(rust_files("dialogue/core/src/directive.rs"));

    for path in files {
        for (idx, line) in production_lines(&path).iter().enumerate() {
            let code = code_part(line);
            if let Some(call) = CLOCK_READS.iter().find(|c| code.contains(*c)) {
                violations.push(format!("{}:{} - {call}: {}", path.display(), idx + 1, line.trim()));
            }
        }
    }

    assert!(
        violations.is_empty(),
        "Reveal code must take time from tick() only:\n{}",
        violations.join("\n")
    );
}

//! Turns a raw model reply into a runnable candidate.
//!
//! This is a line-based text pass, not a Python parser. Function boundaries are
//! guessed from indentation: a `def` line opens a top-level function and the
//! next non-indented line closes it. Decorators, multi-line strings and
//! continuation lines can all confuse it. The sandbox run is the real validity
//! check.

use crate::types::{Candidate, Harness};

/// Clean `raw` and append the harness footer for `harness`.
pub fn clean(raw: &str, harness: &Harness) -> Candidate {
    let mut lines: Vec<&str> = Vec::new();
    let mut in_function = false;

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("```") {
            continue;
        }
        // The harness owns the only print.
        if line.contains("print(") {
            continue;
        }

        if starts_function(line) {
            if !lines.is_empty() {
                lines.push("");
            }
            in_function = true;
        } else if in_function && !is_indented(line) {
            in_function = false;
            lines.push("");
        }

        lines.push(line);
    }

    let mut source = lines.join("\n");
    source.push('\n');
    source.push_str(&harness.footer());
    Candidate::new(source)
}

fn starts_function(line: &str) -> bool {
    line.starts_with("def ") || line.starts_with("async def ")
}

fn is_indented(line: &str) -> bool {
    line.starts_with(' ') || line.starts_with('\t')
}

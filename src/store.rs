//! Champion file: a `# Test runtime: <secs> seconds` header followed by the source.
//!
//! The next run reads it back as its seed.

use crate::types::{Candidate, Champion};
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

const RUNTIME_HEADER_PREFIX: &str = "# Test runtime:";

#[derive(Debug, Clone, PartialEq)]
pub struct StoredChampion {
    pub runtime_secs: f64,
    pub code: Candidate,
}

/// Read a previously saved champion. A missing file or a malformed header yields `None`.
pub fn load_champion(path: &Path) -> Option<StoredChampion> {
    let content = fs::read_to_string(path).ok()?;
    let stored = parse_champion(&content);
    if stored.is_none() {
        tracing::warn!(path = %path.display(), "ignoring champion file without a runtime header");
    }
    stored
}

fn parse_champion(content: &str) -> Option<StoredChampion> {
    let (header, code) = content.split_once('\n').unwrap_or((content, ""));
    let runtime = header.trim().strip_prefix(RUNTIME_HEADER_PREFIX)?;
    let runtime_secs = runtime
        .trim()
        .trim_end_matches("seconds")
        .trim()
        .parse::<f64>()
        .ok()?;
    Some(StoredChampion {
        runtime_secs,
        code: Candidate::new(code),
    })
}

pub fn render_champion(champion: &Champion) -> String {
    format!(
        "{} {:.4} seconds\n{}",
        RUNTIME_HEADER_PREFIX,
        champion.elapsed_secs(),
        champion.code.source()
    )
}

/// Write `champion` to `path` via a temp file and rename.
pub fn save_champion(path: &Path, champion: &Champion) -> Result<()> {
    let content = render_champion(champion);
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp_path)
            .with_context(|| format!("Failed to create '{}'", tmp_path.display()))?;
        file.write_all(content.as_bytes())
            .with_context(|| format!("Failed to write '{}'", tmp_path.display()))?;
    }
    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err).with_context(|| format!("Failed to replace '{}'", path.display()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn champion() -> Champion {
        Champion {
            code: Candidate::from("def calculate_sum(n):\n    return n\nn = 5\nresult = calculate_sum(n)\nprint(result)"),
            elapsed: Duration::from_micros(123_456),
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("final_implementation.py");
        save_champion(&path, &champion()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# Test runtime: 0.1235 seconds\n"));

        let stored = load_champion(&path).unwrap();
        assert_eq!(stored.runtime_secs, 0.1235);
        assert_eq!(stored.code, champion().code);
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempdir().unwrap();
        assert!(load_champion(&dir.path().join("absent.py")).is_none());
    }

    #[test]
    fn test_file_without_header_is_none() {
        assert!(parse_champion("def calculate_sum(n):\n    return n\n").is_none());
        assert!(parse_champion("# Test runtime: fast seconds\nx = 1").is_none());
        assert!(parse_champion("").is_none());
    }

    #[test]
    fn test_header_only_file_has_empty_code() {
        let stored = parse_champion("# Test runtime: 2.5000 seconds").unwrap();
        assert_eq!(stored.runtime_secs, 2.5);
        assert_eq!(stored.code.source(), "");
    }
}

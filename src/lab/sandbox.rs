use crate::config::SandboxConfig;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use uuid::Uuid;

const SANDBOX_ROOT_DIR: &str = "llm-optimizer-sandbox";
const CANDIDATE_FILE_NAME: &str = "candidate.py";

/// Per-attempt scratch directory holding one candidate source file.
///
/// Every attempt gets its own `$TMPDIR/llm-optimizer-sandbox/<uuid>` directory,
/// so concurrent runs never share a file. The directory is removed on drop.
#[derive(Debug)]
pub struct SandboxSession {
    dir: PathBuf,
    source_path: PathBuf,
}

impl SandboxSession {
    pub fn create() -> Result<Self> {
        Self::create_in(&std::env::temp_dir().join(SANDBOX_ROOT_DIR))
    }

    pub fn create_in(root: &Path) -> Result<Self> {
        let dir = root.join(Uuid::new_v4().simple().to_string());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create sandbox directory '{}'", dir.display()))?;
        let source_path = dir.join(CANDIDATE_FILE_NAME);
        Ok(Self { dir, source_path })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn write_source(&self, source: &str) -> Result<()> {
        std::fs::write(&self.source_path, source).with_context(|| {
            format!(
                "Failed to write candidate source '{}'",
                self.source_path.display()
            )
        })
    }

    /// Interpreter command for the written source, with the configured isolation applied.
    pub fn command(&self, config: &SandboxConfig) -> Command {
        let mut cmd = match limit_prelude(config) {
            Some(prelude) => {
                // `exec` so a timeout kill lands on the interpreter itself.
                let mut cmd = Command::new("sh");
                cmd.arg("-c")
                    .arg(format!("{prelude}exec \"$0\" \"$@\""))
                    .arg(&config.interpreter);
                cmd
            }
            None => Command::new(&config.interpreter),
        };
        cmd.arg(&self.source_path).current_dir(&self.dir);

        if config.clear_env {
            cmd.env_clear();
            for key in PRESERVED_ENV {
                if let Ok(value) = std::env::var(key) {
                    cmd.env(key, value);
                }
            }
        }
        for (key, value) in Self::env_overrides() {
            cmd.env(key, value);
        }
        cmd
    }

    pub fn env_overrides() -> Vec<(String, String)> {
        vec![
            ("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string()),
            ("PYTHONHASHSEED".to_string(), "0".to_string()),
            ("PYTHONIOENCODING".to_string(), "utf-8".to_string()),
        ]
    }
}

impl Drop for SandboxSession {
    fn drop(&mut self) {
        if let Err(err) = std::fs::remove_dir_all(&self.dir) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(dir = %self.dir.display(), "failed to remove sandbox directory: {err}");
            }
        }
    }
}

/// Variables the interpreter still needs after `env_clear`.
const PRESERVED_ENV: &[&str] = &["PATH", "HOME", "LANG", "SYSTEMROOT"];

#[cfg(unix)]
fn limit_prelude(config: &SandboxConfig) -> Option<String> {
    let mut prelude = String::new();
    if let Some(mb) = config.memory_limit_mb {
        prelude.push_str(&format!("ulimit -v {} || exit 125; ", mb.saturating_mul(1024)));
    }
    if let Some(secs) = config.cpu_limit_secs {
        prelude.push_str(&format!("ulimit -t {} || exit 125; ", secs));
    }
    (!prelude.is_empty()).then_some(prelude)
}

#[cfg(not(unix))]
fn limit_prelude(config: &SandboxConfig) -> Option<String> {
    if config.memory_limit_mb.is_some() || config.cpu_limit_secs.is_some() {
        tracing::warn!("resource limits are only enforced on unix; running without them");
    }
    None
}

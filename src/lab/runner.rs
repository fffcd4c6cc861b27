use super::sandbox::SandboxSession;
use crate::config::SandboxConfig;
use crate::types::{Candidate, ExecutionFault, ExecutionOutcome};
use crate::util::{run_command_with_timeout, truncate};
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;

/// Substring left behind by malformed generation-service replies.
pub const CORRUPTION_MARKER: &str = "<userStyle>";

const LOG_OUTPUT_MAX_CHARS: usize = 200;

/// Modules that get an import prepended when a candidate uses them without one.
const IMPLICIT_IMPORTS: &[(&str, &str)] = &[("math", "import math")];

/// Runs candidates in a fresh interpreter process and checks their output.
#[derive(Debug, Clone)]
pub struct Executor {
    config: SandboxConfig,
}

impl Executor {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    /// Run `candidate` and compare its trimmed stdout with `expected_output`.
    pub fn run(&self, candidate: &Candidate, expected_output: &str) -> ExecutionOutcome {
        if candidate.source().contains(CORRUPTION_MARKER) {
            return ExecutionOutcome::failed(ExecutionFault::CorruptGeneration);
        }

        let source = with_implicit_imports(candidate.source());
        match self.launch(&source, expected_output) {
            Ok(outcome) => outcome,
            Err(err) => ExecutionOutcome::failed(ExecutionFault::Unexpected {
                detail: format!("{:#}", err),
            }),
        }
    }

    fn launch(&self, source: &str, expected_output: &str) -> anyhow::Result<ExecutionOutcome> {
        let session = SandboxSession::create()?;
        session.write_source(source)?;

        let mut command = session.command(&self.config);
        let result = run_command_with_timeout(&mut command, self.timeout())
            .map_err(|e| anyhow::anyhow!(e))?;

        tracing::debug!(
            stdout = %truncate(&result.stdout, LOG_OUTPUT_MAX_CHARS),
            expected = expected_output,
            elapsed_secs = result.elapsed.as_secs_f64(),
            "candidate finished"
        );

        if result.timed_out {
            return Ok(ExecutionOutcome::failed(ExecutionFault::Timeout));
        }

        let status = result
            .status
            .ok_or_else(|| anyhow::anyhow!("no exit status for candidate process"))?;
        if !status.success() {
            return Ok(ExecutionOutcome::failed(ExecutionFault::Runtime {
                stderr: result.stderr,
            }));
        }

        let output = result.stdout.trim();
        if output == expected_output.trim() {
            // Clamp so a verified run always reports a positive time.
            let elapsed = result.elapsed.max(Duration::from_nanos(1));
            Ok(ExecutionOutcome::verified(elapsed, output))
        } else {
            Ok(ExecutionOutcome::failed(ExecutionFault::Incorrect {
                stdout: output.to_string(),
            }))
        }
    }
}

fn with_implicit_imports(source: &str) -> String {
    let mut prefix = String::new();
    for (module, import) in IMPLICIT_IMPORTS {
        if references_module(source, module) && !imports_module(source, module) {
            prefix.push_str(import);
            prefix.push('\n');
        }
    }
    if prefix.is_empty() {
        source.to_string()
    } else {
        prefix + source
    }
}

fn references_module(source: &str, module: &str) -> bool {
    static WORD: OnceLock<Regex> = OnceLock::new();
    let re = WORD.get_or_init(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").expect("valid regex"));
    re.find_iter(source).any(|m| m.as_str() == module)
}

fn imports_module(source: &str, module: &str) -> bool {
    source.lines().any(|line| {
        let line = line.trim_start();
        line.strip_prefix("import ")
            .map(|rest| rest.split(',').any(|m| m.split_whitespace().next() == Some(module)))
            .unwrap_or(false)
    })
}

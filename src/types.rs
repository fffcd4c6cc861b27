//! Values passed between the optimizer, the generator and the sandbox.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Name of the entry point the harness footer calls when a problem does not name one.
pub const DEFAULT_ENTRY_POINT: &str = "calculate_sum";

/// One implementation attempt: source text defining the entry point.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Candidate(String);

impl Candidate {
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    pub fn source(&self) -> &str {
        &self.0
    }

    pub fn into_source(self) -> String {
        self.0
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Candidate {
    fn from(source: String) -> Self {
        Self(source)
    }
}

impl From<&str> for Candidate {
    fn from(source: &str) -> Self {
        Self(source.to_string())
    }
}

/// The fixed problem a run optimizes against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemSpec {
    pub prompt_text: String,
    pub test_input: i64,
    pub expected_output: String,
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
}

fn default_entry_point() -> String {
    DEFAULT_ENTRY_POINT.to_string()
}

impl ProblemSpec {
    pub fn new(
        prompt_text: impl Into<String>,
        test_input: i64,
        expected_output: impl Into<String>,
    ) -> Self {
        Self {
            prompt_text: prompt_text.into(),
            test_input,
            expected_output: expected_output.into(),
            entry_point: default_entry_point(),
        }
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = entry_point.into();
        self
    }

    /// Harness footer parameters for this problem.
    pub fn harness(&self) -> Harness {
        Harness {
            entry_point: self.entry_point.clone(),
            test_input: self.test_input,
        }
    }
}

/// What the sanitizer appends: a call of `entry_point(test_input)` and a bare print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Harness {
    pub entry_point: String,
    pub test_input: i64,
}

impl Harness {
    pub fn footer(&self) -> String {
        format!(
            "n = {}\nresult = {}(n)\nprint(result)",
            self.test_input, self.entry_point
        )
    }
}

/// Why a candidate was rejected. `Display` is the user-facing failure message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionFault {
    #[error("Invalid response")]
    CorruptGeneration,
    #[error("Timeout: Code took too long to execute")]
    Timeout,
    #[error("Execution error: {stderr}")]
    Runtime { stderr: String },
    #[error("Incorrect output: {stdout}")]
    Incorrect { stdout: String },
    #[error("Error running code: {detail}")]
    Unexpected { detail: String },
}

impl ExecutionFault {
    pub fn label(&self) -> &'static str {
        match self {
            ExecutionFault::CorruptGeneration => "corrupt_generation",
            ExecutionFault::Timeout => "timeout",
            ExecutionFault::Runtime { .. } => "runtime",
            ExecutionFault::Incorrect { .. } => "correctness",
            ExecutionFault::Unexpected { .. } => "unexpected",
        }
    }
}

/// Result of a single sandboxed run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub elapsed: Option<Duration>,
    pub message: String,
    pub fault: Option<ExecutionFault>,
}

impl ExecutionOutcome {
    pub fn verified(elapsed: Duration, stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            elapsed: Some(elapsed),
            message: stdout.into(),
            fault: None,
        }
    }

    pub fn failed(fault: ExecutionFault) -> Self {
        Self {
            success: false,
            elapsed: None,
            message: fault.to_string(),
            fault: Some(fault),
        }
    }

    /// Elapsed seconds, `+inf` when the run did not verify.
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.map_or(f64::INFINITY, |d| d.as_secs_f64())
    }
}

/// Fastest verified candidate seen so far.
#[derive(Debug, Clone, PartialEq)]
pub struct Champion {
    pub code: Candidate,
    pub elapsed: Duration,
}

impl Champion {
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// What happened in one optimization round.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundOutcome {
    /// The generator produced nothing usable.
    GenerationFailed,
    Rejected(ExecutionFault),
    Verified { elapsed: Duration, improved: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundRecord {
    pub iteration: usize,
    pub outcome: RoundOutcome,
    /// Champion time after this round, if any candidate has verified.
    pub champion_elapsed: Option<Duration>,
}

/// Terminal state of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizationOutcome {
    Verified(Champion),
    /// Nothing verified, including the seed; the seed is handed back untouched.
    NoneVerified { seed: Candidate },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    pub outcome: OptimizationOutcome,
    pub rounds: Vec<RoundRecord>,
}

impl OptimizationResult {
    pub fn champion(&self) -> Option<&Champion> {
        match &self.outcome {
            OptimizationOutcome::Verified(champion) => Some(champion),
            OptimizationOutcome::NoneVerified { .. } => None,
        }
    }

    pub fn best_code(&self) -> &Candidate {
        match &self.outcome {
            OptimizationOutcome::Verified(champion) => &champion.code,
            OptimizationOutcome::NoneVerified { seed } => seed,
        }
    }

    /// `(best candidate, elapsed seconds)`, with `+inf` when nothing verified.
    pub fn into_pair(self) -> (Candidate, f64) {
        match self.outcome {
            OptimizationOutcome::Verified(champion) => {
                let secs = champion.elapsed_secs();
                (champion.code, secs)
            }
            OptimizationOutcome::NoneVerified { seed } => (seed, f64::INFINITY),
        }
    }
}

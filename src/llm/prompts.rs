use crate::types::{Champion, ProblemSpec};

const RUNNABLE_CODE_REQUEST: &str = "Return clean, runnable Python code with proper indentation.";

const OPTIMIZE_REQUEST: &str =
    "Please optimize this code for better performance while maintaining correctness.";

/// First-round prompt: the problem and nothing else.
pub fn initial_prompt(problem: &ProblemSpec) -> String {
    format!(
        "\n{}\n\n{}\n",
        problem.prompt_text.trim_end(),
        RUNNABLE_CODE_REQUEST
    )
}

/// Prompt carrying the current champion's source and time back to the model.
pub fn improvement_prompt(problem: &ProblemSpec, champion: &Champion) -> String {
    format!(
        "\n{}\n\nHere is the current best implementation:\n\n{}\n\nThis code runs in {:.4} seconds.\n\n{}\n{}\n",
        problem.prompt_text.trim_end(),
        champion.code.source().trim_end(),
        champion.elapsed_secs(),
        OPTIMIZE_REQUEST,
        RUNNABLE_CODE_REQUEST
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Candidate;
    use std::time::Duration;

    fn problem() -> ProblemSpec {
        ProblemSpec::new("Sum the first n primes.", 10000, "496165411")
    }

    #[test]
    fn test_initial_prompt_has_problem_only() {
        let prompt = initial_prompt(&problem());
        assert!(prompt.contains("Sum the first n primes."));
        assert!(prompt.contains(RUNNABLE_CODE_REQUEST));
        assert!(!prompt.contains("current best implementation"));
    }

    #[test]
    fn test_improvement_prompt_embeds_champion() {
        let champion = Champion {
            code: Candidate::from("def calculate_sum(n):\n    return 42"),
            elapsed: Duration::from_millis(1234),
        };
        let prompt = improvement_prompt(&problem(), &champion);
        assert!(prompt.contains("Sum the first n primes."));
        assert!(prompt.contains("def calculate_sum(n):\n    return 42"));
        assert!(prompt.contains("This code runs in 1.2340 seconds."));
        assert!(prompt.contains(OPTIMIZE_REQUEST));
    }
}

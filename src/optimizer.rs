//! Execution-verified hill climbing.
//!
//! Each round asks the generator for a candidate, runs it, and keeps it only
//! if it verifies and beats the current champion's wall-clock time. Nothing
//! that goes wrong inside a round stops the run.

use crate::lab::Executor;
use crate::llm::{improvement_prompt, initial_prompt, GenerationClient};
use crate::types::{
    Candidate, Champion, ExecutionFault, ExecutionOutcome, Harness, OptimizationOutcome,
    OptimizationResult, ProblemSpec, RoundOutcome, RoundRecord,
};
use std::future::Future;

/// Source of new candidates.
pub trait Generate {
    fn generate(
        &self,
        prompt: &str,
        harness: &Harness,
    ) -> impl Future<Output = Option<Candidate>> + Send;
}

/// Runs a candidate and checks it against the expected output.
pub trait Evaluate {
    fn evaluate(&self, candidate: &Candidate, expected_output: &str) -> ExecutionOutcome;
}

impl Generate for GenerationClient {
    fn generate(
        &self,
        prompt: &str,
        harness: &Harness,
    ) -> impl Future<Output = Option<Candidate>> + Send {
        GenerationClient::generate(self, prompt, harness)
    }
}

impl Evaluate for Executor {
    fn evaluate(&self, candidate: &Candidate, expected_output: &str) -> ExecutionOutcome {
        self.run(candidate, expected_output)
    }
}

pub struct Optimizer<G, E> {
    generator: G,
    evaluator: E,
}

impl<G: Generate, E: Evaluate> Optimizer<G, E> {
    pub fn new(generator: G, evaluator: E) -> Self {
        Self {
            generator,
            evaluator,
        }
    }

    pub async fn optimize(
        &self,
        seed: Candidate,
        problem: &ProblemSpec,
        max_iterations: usize,
    ) -> OptimizationResult {
        tracing::info!(max_iterations, "starting optimization");
        let harness = problem.harness();

        let baseline = self.evaluator.evaluate(&seed, &problem.expected_output);
        let mut champion = match baseline.elapsed {
            Some(elapsed) if baseline.success => {
                tracing::info!(
                    elapsed_secs = elapsed.as_secs_f64(),
                    output = %baseline.message,
                    "seed implementation verified"
                );
                Some(Champion {
                    code: seed.clone(),
                    elapsed,
                })
            }
            _ => {
                tracing::info!(reason = %baseline.message, "seed implementation did not verify");
                None
            }
        };

        let mut rounds = Vec::with_capacity(max_iterations);
        for iteration in 1..=max_iterations {
            tracing::info!(iteration, max_iterations, "starting round");

            let prompt = match &champion {
                Some(current) => improvement_prompt(problem, current),
                None => initial_prompt(problem),
            };

            let outcome = match self.generator.generate(&prompt, &harness).await {
                None => {
                    tracing::warn!(iteration, "failed to generate valid code");
                    RoundOutcome::GenerationFailed
                }
                Some(candidate) => {
                    let result = self.evaluator.evaluate(&candidate, &problem.expected_output);
                    consider(&mut champion, candidate, result, iteration)
                }
            };

            rounds.push(RoundRecord {
                iteration,
                outcome,
                champion_elapsed: champion.as_ref().map(|c| c.elapsed),
            });
        }

        let outcome = match champion {
            Some(champion) => {
                tracing::info!(elapsed_secs = champion.elapsed_secs(), "optimization finished");
                OptimizationOutcome::Verified(champion)
            }
            None => {
                tracing::warn!("optimization finished without a verified implementation");
                OptimizationOutcome::NoneVerified { seed }
            }
        };
        OptimizationResult { outcome, rounds }
    }
}

/// Fold one execution result into the champion slot.
fn consider(
    champion: &mut Option<Champion>,
    candidate: Candidate,
    result: ExecutionOutcome,
    iteration: usize,
) -> RoundOutcome {
    let elapsed = match (result.success, result.elapsed) {
        (true, Some(elapsed)) => elapsed,
        _ => {
            tracing::info!(
                iteration,
                fault = result.fault.as_ref().map(|f| f.label()).unwrap_or("unknown"),
                "implementation failed: {}",
                result.message
            );
            return match result.fault {
                Some(fault) => RoundOutcome::Rejected(fault),
                None => RoundOutcome::Rejected(ExecutionFault::Unexpected {
                    detail: result.message,
                }),
            };
        }
    };

    tracing::info!(
        iteration,
        elapsed_secs = elapsed.as_secs_f64(),
        output = %result.message,
        "implementation verified"
    );

    // Ties keep the incumbent.
    let improved = champion.as_ref().is_none_or(|c| elapsed < c.elapsed);
    if improved {
        tracing::info!(iteration, elapsed_secs = elapsed.as_secs_f64(), "new champion found");
        tracing::debug!(code = %candidate, "champion code");
        *champion = Some(Champion {
            code: candidate,
            elapsed,
        });
    }
    RoundOutcome::Verified { elapsed, improved }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Hands out scripted candidates in order and records the prompts it saw.
    struct ScriptedGenerator {
        replies: Mutex<VecDeque<Option<Candidate>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(replies: Vec<Option<&str>>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(|r| r.map(Candidate::from)).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    impl Generate for &ScriptedGenerator {
        fn generate(
            &self,
            prompt: &str,
            _harness: &Harness,
        ) -> impl Future<Output = Option<Candidate>> + Send {
            self.prompts.lock().unwrap().push(prompt.to_string());
            let reply = self.replies.lock().unwrap().pop_front().flatten();
            async move { reply }
        }
    }

    /// Outcomes keyed by candidate source; unknown sources are incorrect.
    struct TableEvaluator {
        table: HashMap<String, ExecutionOutcome>,
        calls: Mutex<usize>,
    }

    impl TableEvaluator {
        fn new(entries: &[(&str, ExecutionOutcome)]) -> Self {
            Self {
                table: entries
                    .iter()
                    .map(|(src, out)| (src.to_string(), out.clone()))
                    .collect(),
                calls: Mutex::new(0),
            }
        }
    }

    impl Evaluate for &TableEvaluator {
        fn evaluate(&self, candidate: &Candidate, _expected_output: &str) -> ExecutionOutcome {
            *self.calls.lock().unwrap() += 1;
            self.table
                .get(candidate.source())
                .cloned()
                .unwrap_or_else(|| {
                    ExecutionOutcome::failed(ExecutionFault::Incorrect {
                        stdout: "0".to_string(),
                    })
                })
        }
    }

    fn ok(ms: u64) -> ExecutionOutcome {
        ExecutionOutcome::verified(Duration::from_millis(ms), "496165411")
    }

    fn problem() -> ProblemSpec {
        ProblemSpec::new("Sum the first n primes.", 10000, "496165411")
    }

    #[tokio::test]
    async fn test_slower_candidate_does_not_replace_champion() {
        let generator = ScriptedGenerator::new(vec![Some("slow")]);
        let evaluator = TableEvaluator::new(&[("seed", ok(100)), ("slow", ok(250))]);
        let result = Optimizer::new(&generator, &evaluator)
            .optimize(Candidate::from("seed"), &problem(), 1)
            .await;

        let champion = result.champion().unwrap();
        assert_eq!(champion.code.source(), "seed");
        assert_eq!(champion.elapsed, Duration::from_millis(100));
        assert_eq!(
            result.rounds[0].outcome,
            RoundOutcome::Verified {
                elapsed: Duration::from_millis(250),
                improved: false
            }
        );
    }

    #[tokio::test]
    async fn test_faster_candidate_becomes_champion() {
        let generator = ScriptedGenerator::new(vec![Some("fast")]);
        let evaluator = TableEvaluator::new(&[("seed", ok(100)), ("fast", ok(40))]);
        let result = Optimizer::new(&generator, &evaluator)
            .optimize(Candidate::from("seed"), &problem(), 1)
            .await;

        let (code, secs) = result.into_pair();
        assert_eq!(code.source(), "fast");
        assert_eq!(secs, Duration::from_millis(40).as_secs_f64());
    }

    #[tokio::test]
    async fn test_equal_time_keeps_incumbent() {
        let generator = ScriptedGenerator::new(vec![Some("tie")]);
        let evaluator = TableEvaluator::new(&[("seed", ok(100)), ("tie", ok(100))]);
        let result = Optimizer::new(&generator, &evaluator)
            .optimize(Candidate::from("seed"), &problem(), 1)
            .await;
        assert_eq!(result.best_code().source(), "seed");
    }

    #[tokio::test]
    async fn test_champion_times_never_increase() {
        let generator = ScriptedGenerator::new(vec![
            Some("a"),
            None,
            Some("b"),
            Some("broken"),
            Some("c"),
            Some("d"),
        ]);
        let evaluator = TableEvaluator::new(&[
            ("seed", ok(500)),
            ("a", ok(300)),
            ("b", ok(400)),
            ("c", ok(120)),
            ("d", ok(200)),
        ]);
        let result = Optimizer::new(&generator, &evaluator)
            .optimize(Candidate::from("seed"), &problem(), 6)
            .await;

        let times: Vec<Duration> = result
            .rounds
            .iter()
            .map(|r| r.champion_elapsed.unwrap())
            .collect();
        assert!(times.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(result.best_code().source(), "c");
        assert_eq!(result.champion().unwrap().elapsed, Duration::from_millis(120));
        assert_eq!(result.rounds[1].outcome, RoundOutcome::GenerationFailed);
        assert!(matches!(
            result.rounds[3].outcome,
            RoundOutcome::Rejected(ExecutionFault::Incorrect { .. })
        ));
    }

    #[tokio::test]
    async fn test_nothing_verified_returns_seed() {
        let generator = ScriptedGenerator::new(vec![Some("bad"), None]);
        let evaluator = TableEvaluator::new(&[(
            "bad",
            ExecutionOutcome::failed(ExecutionFault::Runtime {
                stderr: "Traceback".to_string(),
            }),
        )]);
        let result = Optimizer::new(&generator, &evaluator)
            .optimize(Candidate::from("seed"), &problem(), 2)
            .await;

        assert_eq!(
            result.outcome,
            OptimizationOutcome::NoneVerified {
                seed: Candidate::from("seed")
            }
        );
        assert!(result.rounds.iter().all(|r| r.champion_elapsed.is_none()));
        let (code, secs) = result.into_pair();
        assert_eq!(code.source(), "seed");
        assert!(secs.is_infinite());
    }

    #[tokio::test]
    async fn test_prompt_switches_to_improvement_after_first_success() {
        let generator = ScriptedGenerator::new(vec![None, Some("first"), Some("second")]);
        let evaluator = TableEvaluator::new(&[("first", ok(1500))]);
        let result = Optimizer::new(&generator, &evaluator)
            .optimize(Candidate::from("seed"), &problem(), 3)
            .await;

        let prompts = generator.prompts();
        assert_eq!(prompts.len(), 3);
        assert!(!prompts[0].contains("current best implementation"));
        assert!(!prompts[1].contains("current best implementation"));
        assert!(prompts[2].contains("current best implementation"));
        assert!(prompts[2].contains("first"));
        assert!(prompts[2].contains("1.5000 seconds"));
        assert_eq!(result.best_code().source(), "first");
    }

    #[tokio::test]
    async fn test_failed_generation_skips_evaluation() {
        let generator = ScriptedGenerator::new(vec![None, None]);
        let evaluator = TableEvaluator::new(&[("seed", ok(10))]);
        let result = Optimizer::new(&generator, &evaluator)
            .optimize(Candidate::from("seed"), &problem(), 2)
            .await;

        assert_eq!(*evaluator.calls.lock().unwrap(), 1);
        assert_eq!(result.rounds.len(), 2);
        assert_eq!(result.champion().unwrap().code.source(), "seed");
    }

    #[tokio::test]
    async fn test_zero_iterations_only_evaluates_seed() {
        let generator = ScriptedGenerator::new(vec![]);
        let evaluator = TableEvaluator::new(&[("seed", ok(10))]);
        let result = Optimizer::new(&generator, &evaluator)
            .optimize(Candidate::from("seed"), &problem(), 0)
            .await;
        assert!(result.rounds.is_empty());
        assert!(generator.prompts().is_empty());
        assert_eq!(result.best_code().source(), "seed");
    }
}

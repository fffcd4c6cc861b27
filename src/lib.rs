//! llm-optimizer library crate
//!
//! Drives a language model as a code optimizer: generate a candidate, run it
//! in a sandboxed interpreter, keep it if it is correct and faster than the
//! current champion, and feed the champion back into the next prompt.

pub mod config;
pub mod lab;
pub mod llm;
pub mod optimizer;
pub mod sanitize;
pub mod store;
pub mod types;
pub mod util;

pub use optimizer::{Evaluate, Generate, Optimizer};
pub use types::{
    Candidate, Champion, ExecutionFault, ExecutionOutcome, OptimizationOutcome,
    OptimizationResult, ProblemSpec,
};

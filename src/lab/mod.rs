//! Sandboxed candidate execution.

pub mod runner;
pub mod sandbox;

pub use runner::{Executor, CORRUPTION_MARKER};
pub use sandbox::SandboxSession;

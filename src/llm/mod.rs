pub mod client;
pub mod parse;
pub mod prompts;

pub use client::GenerationClient;
pub use parse::extract_code;
pub use prompts::{improvement_prompt, initial_prompt};

use regex::Regex;
use std::sync::OnceLock;

fn fenced_block() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    // Opening fence with an optional language tag, body, closing fence.
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_+.\-]*[ \t]*\r?\n(.*?)\r?\n?```").expect("valid regex")
    })
}

/// Code from the first fenced block in `reply`, or the whole trimmed reply when there is none.
pub fn extract_code(reply: &str) -> &str {
    let reply = reply.trim();
    fenced_block()
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(reply)
}

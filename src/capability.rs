//! Model-specific capability table (spec §9 design notes: "Capability tables
//! ... live in a small data table keyed by model-name glob. Add a
//! capability, not a branch.").
//!
//! Two quirks are tracked today:
//!
//! - **`max_tokens` rename**: models matching the "new-OpenAI-param" pattern
//!   (`gpt-5*`, `o1*`, `o3*`, `o4*`, ...) expect `max_completion_tokens`
//!   instead of `max_tokens` (spec §4.1).
//! - **Tool-concurrency warning**: a small list of model-name patterns known
//!   to behave poorly with concurrent tool calls; purely diagnostic (spec
//!   §4.4 "Tool concurrency diagnostic" — "This is diagnostic only; it never
//!   blocks the request.").

/// Matches a small glob dialect: a literal prefix optionally followed by `*`.
/// Sufficient for the patterns this table needs; not a general glob engine.
fn glob_match(pattern: &str, value: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => value == pattern,
    }
}

/// Model-name patterns that require `max_completion_tokens` in place of
/// `max_tokens` (spec §4.1: "a small capability table keyed by model-name glob").
const NEW_PARAM_MODEL_GLOBS: &[&str] = &["gpt-5*", "o1*", "o3*", "o4*"];

/// Returns true if `model` should receive `max_completion_tokens` rather
/// than `max_tokens` in the translated OpenAI request body.
pub fn uses_max_completion_tokens(model: &str) -> bool {
    NEW_PARAM_MODEL_GLOBS.iter().any(|glob| glob_match(glob, model))
}

/// Model-name patterns known to have issues executing multiple concurrent
/// tool calls in a single turn (spec §4.4 "Tool concurrency diagnostic").
const TOOL_CONCURRENCY_WARNING_GLOBS: &[&str] = &["deepseek-chat*", "glm-4*"];

/// Returns true if `model` is known to have tool-concurrency quirks.
/// Diagnostic only — callers log a warning, they never reject the request.
pub fn has_tool_concurrency_quirk(model: &str) -> bool {
    TOOL_CONCURRENCY_WARNING_GLOBS
        .iter()
        .any(|glob| glob_match(glob, model))
}

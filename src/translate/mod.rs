//! Bidirectional Anthropic ↔ OpenAI translation (spec §4.1/§4.3/§4.5).
//!
//! Split the way the teacher splits `backends/anthropic.rs`'s two directions:
//! `request` (Anthropic → OpenAI, inbound) and `response` (OpenAI →
//! Anthropic, outbound), plus `tokens` for the counting endpoint. The
//! streaming half of the response direction lives in [`crate::stream`]
//! instead, since it needs to be a stateful coordinator rather than a pure
//! function.

pub mod request;
pub mod response;
pub mod tokens;

//! Decoding for classification-service responses.
//!
//! The service is primed with an assistant turn that already opens the
//! JSON object, so its completion arrives as a continuation fragment.
//! `repair_brace_continuation` restores the opening before parsing.
//! A repaired document that does not parse is a stage failure, never a
//! crash. There is deliberately no fallback for a response that opens its
//! own object: prompt drift that breaks the continuation contract must
//! surface as failed parses, not be silently absorbed.

use anyhow::{Context, Result};

use fudwatch_common::{Stage1Verdict, Stage2Verdict};

/// The assistant-turn primer both stages send, and the prefix restored
/// before parsing. The two must stay identical.
pub const JSON_CONTINUATION_PRIMER: &str = "{\"";

/// Restore the object opening the primer consumed.
pub fn repair_brace_continuation(raw: &str) -> String {
    format!("{}{}", JSON_CONTINUATION_PRIMER, raw.trim())
}

pub fn parse_stage1(raw: &str) -> Result<Stage1Verdict> {
    let repaired = repair_brace_continuation(raw);
    serde_json::from_str(&repaired)
        .with_context(|| format!("stage-1 response did not parse: {repaired}"))
}

pub fn parse_stage2(raw: &str) -> Result<Stage2Verdict> {
    let repaired = repair_brace_continuation(raw);
    let mut verdict: Stage2Verdict = serde_json::from_str(&repaired)
        .with_context(|| format!("stage-2 response did not parse: {repaired}"))?;
    verdict.fud_probability = verdict.fud_probability.clamp(0.0, 1.0);
    Ok(verdict)
}

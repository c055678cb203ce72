//! Stage 1: cheap triage. One minimal prompt, a yes/no answer.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use ai_client::ChatTurn;
use fudwatch_common::MessageEvent;

use super::parse::{self, JSON_CONTINUATION_PRIMER};
use super::prompts::{render_thread, STAGE1_SYSTEM_PROMPT};
use crate::traits::Completer;

pub struct Stage1Classifier {
    completer: Arc<dyn Completer>,
}

impl Stage1Classifier {
    pub fn new(completer: Arc<dyn Completer>) -> Self {
        Self { completer }
    }

    /// True when the message warrants deep analysis. Any service or parse
    /// failure is an error; the caller discards the message either way.
    pub async fn triage(&self, event: &MessageEvent) -> Result<bool> {
        let prompt = format!(
            "Is the candidate message FUD-like?\n\n{}",
            render_thread(&event.context)
        );
        let turns = [
            ChatTurn::user(prompt),
            ChatTurn::assistant(JSON_CONTINUATION_PRIMER),
        ];

        let raw = self.completer.complete(&turns, STAGE1_SYSTEM_PROMPT).await?;
        let verdict = parse::parse_stage1(&raw)?;

        debug!(
            message_id = event.message.id.as_str(),
            is_fud = verdict.is_fud,
            "Stage-1 triage"
        );
        Ok(verdict.is_fud)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{make_event, ScriptedCompleter};

    #[tokio::test]
    async fn triage_parses_continuation_and_primes_assistant_turn() {
        let completer = Arc::new(ScriptedCompleter::new().then_ok("isFud\":true}"));
        let stage1 = Stage1Classifier::new(Arc::clone(&completer) as Arc<dyn Completer>);

        let flagged = stage1.triage(&make_event("m1", "alice")).await.unwrap();
        assert!(flagged);

        let calls = completer.calls();
        assert_eq!(calls.len(), 1);
        let (turns, system) = &calls[0];
        assert_eq!(system, STAGE1_SYSTEM_PROMPT);
        assert_eq!(turns.last().unwrap().content, JSON_CONTINUATION_PRIMER);
    }

    #[tokio::test]
    async fn triage_propagates_unparseable_responses() {
        let completer = Arc::new(ScriptedCompleter::new().then_ok("not json at all"));
        let stage1 = Stage1Classifier::new(completer as Arc<dyn Completer>);
        assert!(stage1.triage(&make_event("m1", "alice")).await.is_err());
    }
}

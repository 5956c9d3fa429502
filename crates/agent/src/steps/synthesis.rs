use async_trait::async_trait;

use carseek_core::{OriginTag, SessionRecord};

use crate::prompts::{parse_step_reply, SqlReply};

use super::retry::{dry_run_loop, DryRunAttempt, DryRunFailure};
use super::{parse_confidence, StepContext, StepError, StepReport};

pub const STEP: &str = "sql_generate";

/// Query synthesis. Generates a candidate, dry-runs it, and regenerates in
/// fix mode on failure until the dry-run passes or the attempt ceiling is
/// reached; the last candidate is kept either way.
pub async fn run(ctx: &StepContext, session: &mut SessionRecord) -> StepReport {
    let Some(summary) = session.pending_summary.clone().or_else(|| session.reply.clone()) else {
        tracing::info!(
            event_name = "step.sql_generate.skipped",
            session_id = %session.id.0,
            "no search summary available"
        );
        return StepReport::skipped(STEP, "no_search_summary");
    };

    let mut attempt = GenerationAttempt { ctx, summary: &summary };
    let outcome = dry_run_loop(
        &mut attempt,
        ctx.executor.as_ref(),
        &mut session.query_attempt_count,
        ctx.workflow.max_query_attempts,
    )
    .await;

    match outcome {
        Ok(outcome) => {
            let passed = outcome.passed();
            let reply = outcome.into_inner();
            tracing::info!(
                event_name = "step.sql_generate.candidate",
                session_id = %session.id.0,
                dry_run_passed = passed,
                attempts_used = session.query_attempt_count,
                "candidate query selected"
            );
            session.confidence = Some(parse_confidence(&reply.confidence));
            session.candidate_query = Some(reply.query_text);
            session.origin_tag = OriginTag::FromSynthesis;
            StepReport::completed(STEP)
        }
        Err(error) => {
            tracing::warn!(
                event_name = "step.sql_generate.contained_failure",
                session_id = %session.id.0,
                error = %error,
                "query synthesis failed; session unchanged"
            );
            StepReport::contained(STEP, error)
        }
    }
}

struct GenerationAttempt<'a> {
    ctx: &'a StepContext,
    summary: &'a str,
}

#[async_trait]
impl DryRunAttempt for GenerationAttempt<'_> {
    type Candidate = SqlReply;

    async fn propose(
        &mut self,
        prior_failure: Option<&DryRunFailure>,
    ) -> Result<SqlReply, StepError> {
        let previous =
            prior_failure.map(|failure| (failure.query_text.as_str(), failure.message.as_str()));
        let prompt = self.ctx.prompts.sql_generate(self.summary, previous)?;
        let raw = self
            .ctx
            .llm
            .complete(&prompt)
            .await
            .map_err(|error| StepError::Generation(error.to_string()))?;
        Ok(parse_step_reply::<SqlReply>(&raw)?)
    }

    fn query_text<'a>(&self, candidate: &'a SqlReply) -> &'a str {
        &candidate.query_text
    }
}

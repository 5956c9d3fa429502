use async_trait::async_trait;

use carseek_core::{OriginTag, SessionRecord};

use crate::prompts::{parse_step_reply, RefineReply};

use super::retry::{dry_run_loop, DryRunAttempt, DryRunFailure};
use super::{parse_confidence, StepContext, StepError, StepReport};

pub const STEP: &str = "sql_refine";

/// Query refinement: proposes an improved version of the current candidate
/// and dry-runs the refined text, under the refine attempt ceiling.
pub async fn run(ctx: &StepContext, session: &mut SessionRecord) -> StepReport {
    let Some(candidate_query) = session.candidate_query.clone() else {
        tracing::info!(
            event_name = "step.sql_refine.skipped",
            session_id = %session.id.0,
            "no candidate query to refine"
        );
        return StepReport::skipped(STEP, "no_candidate_query");
    };
    let Some(summary) = session.pending_summary.clone() else {
        tracing::info!(
            event_name = "step.sql_refine.skipped",
            session_id = %session.id.0,
            "no search summary available"
        );
        return StepReport::skipped(STEP, "no_search_summary");
    };

    let mut attempt =
        RefinementAttempt { ctx, candidate_query: &candidate_query, summary: &summary };
    let outcome = dry_run_loop(
        &mut attempt,
        ctx.executor.as_ref(),
        &mut session.refine_attempt_count,
        ctx.workflow.max_refine_attempts,
    )
    .await;

    match outcome {
        Ok(outcome) => {
            let passed = outcome.passed();
            let reply = outcome.into_inner();
            tracing::info!(
                event_name = "step.sql_refine.candidate",
                session_id = %session.id.0,
                dry_run_passed = passed,
                attempts_used = session.refine_attempt_count,
                "refined query selected"
            );
            session.confidence = Some(parse_confidence(&reply.confidence));
            session.refined_query = Some(reply.refined_query);
            session.origin_tag = OriginTag::FromRefinement;
            StepReport::completed(STEP)
        }
        Err(error) => {
            tracing::warn!(
                event_name = "step.sql_refine.contained_failure",
                session_id = %session.id.0,
                error = %error,
                "query refinement failed; session unchanged"
            );
            StepReport::contained(STEP, error)
        }
    }
}

struct RefinementAttempt<'a> {
    ctx: &'a StepContext,
    candidate_query: &'a str,
    summary: &'a str,
}

#[async_trait]
impl DryRunAttempt for RefinementAttempt<'_> {
    type Candidate = RefineReply;

    async fn propose(
        &mut self,
        prior_failure: Option<&DryRunFailure>,
    ) -> Result<RefineReply, StepError> {
        let previous =
            prior_failure.map(|failure| (failure.query_text.as_str(), failure.message.as_str()));
        let prompt = self.ctx.prompts.sql_refine(self.candidate_query, self.summary, previous)?;
        let raw = self
            .ctx
            .llm
            .complete(&prompt)
            .await
            .map_err(|error| StepError::Generation(error.to_string()))?;
        Ok(parse_step_reply::<RefineReply>(&raw)?)
    }

    fn query_text<'a>(&self, candidate: &'a RefineReply) -> &'a str {
        &candidate.refined_query
    }
}

use carseek_core::SessionRecord;

use super::{StepContext, StepError, StepReport};

pub const STEP: &str = "synthesize";

/// Fixed zero-result reply. Rendered without a generation call so the text
/// is byte-stable.
pub const NO_MATCHES_REPLY: &str = "I did not find any vehicles that match your current criteria. \
     Would you like me to adjust the search parameters or look for something different?";

/// Fixed reply when response rendering itself fails.
pub const RESPONSE_FAILURE_REPLY: &str = "I apologize, but I encountered an error while preparing \
     your response. Please try again or contact support.";

/// Response synthesis: renders the executed rows into the final user-facing
/// message and marks the search cycle complete.
pub async fn run(ctx: &StepContext, session: &mut SessionRecord) -> StepReport {
    let Some(rows) = session.result_rows.clone() else {
        // Execution never succeeded this turn; the prior answer stands.
        tracing::info!(
            event_name = "step.synthesize.skipped",
            session_id = %session.id.0,
            "no result rows; prior reply retained"
        );
        if session.reply.is_none() {
            session.reply = Some(RESPONSE_FAILURE_REPLY.to_string());
        }
        return StepReport::skipped(STEP, "no_result_rows");
    };

    if rows.is_empty() {
        session.reply = Some(NO_MATCHES_REPLY.to_string());
        session.cycle_marker = session.cycle_marker.advance(session.turn_history.len());
        tracing::info!(
            event_name = "step.synthesize.no_matches",
            session_id = %session.id.0,
            cycle = session.cycle_marker.count,
            "search cycle completed with no matches"
        );
        return StepReport::completed(STEP);
    }

    match render(ctx, &rows).await {
        Ok(text) => {
            session.reply = Some(text);
            session.cycle_marker = session.cycle_marker.advance(session.turn_history.len());
            tracing::info!(
                event_name = "step.synthesize.completed",
                session_id = %session.id.0,
                row_count = rows.len(),
                cycle = session.cycle_marker.count,
                "search cycle completed"
            );
            StepReport::completed(STEP)
        }
        Err(error) => {
            tracing::warn!(
                event_name = "step.synthesize.contained_failure",
                session_id = %session.id.0,
                error = %error,
                "response rendering failed"
            );
            session.reply = Some(RESPONSE_FAILURE_REPLY.to_string());
            StepReport::contained(STEP, error)
        }
    }
}

async fn render(
    ctx: &StepContext,
    rows: &[carseek_core::ResultRow],
) -> Result<String, StepError> {
    let results_json = serde_json::to_string_pretty(rows)
        .map_err(|error| StepError::Generation(error.to_string()))?;
    let prompt = ctx.prompts.synthesize(&results_json)?;
    let raw = ctx
        .llm
        .complete(&prompt)
        .await
        .map_err(|error| StepError::Generation(error.to_string()))?;

    let text = raw.trim();
    if text.is_empty() {
        return Err(StepError::Generation("response synthesis returned empty text".to_string()));
    }
    Ok(text.to_string())
}

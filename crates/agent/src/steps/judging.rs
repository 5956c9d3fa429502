use carseek_core::{Decision, OriginTag, SessionRecord};

use crate::conversation::{format_transcript, judging_window};
use crate::prompts::{parse_step_reply, JudgeReply};

use super::{parse_confidence, StepContext, StepError, StepReport};

pub const STEP: &str = "judging_assist";

/// Validation/judging pass. Runs the extraction variant against the turns
/// added since the last search cycle, or the validation variant when the
/// user is answering the outstanding yes/no confirmation.
pub async fn run(ctx: &StepContext, session: &mut SessionRecord) -> StepReport {
    let validation_mode = session.decision == Decision::Proceed;

    let transcript = format_transcript(judging_window(session), session.reply.as_deref());
    let reply = match judge(ctx, &transcript, validation_mode).await {
        Ok(reply) => reply,
        Err(error) => {
            tracing::warn!(
                event_name = "step.judging_assist.contained_failure",
                session_id = %session.id.0,
                validation_mode,
                error = %error,
                "judging pass failed; session unchanged"
            );
            return StepReport::contained(STEP, error);
        }
    };

    // Unparseable decisions fall back to asking for more information.
    let decision = Decision::parse(&reply.decision).unwrap_or(Decision::RequestMoreInfo);
    session.confidence = Some(parse_confidence(&reply.confidence));

    match decision {
        Decision::Proceed => {
            session.pending_summary = Some(reply.summary.clone());
            session.pending_validation_question = Some(reply.validation_question.clone());
            session.reply = Some(compose(&[&reply.summary, &reply.validation_question]));
            session.origin_tag = OriginTag::AwaitingConfirmation;
        }
        Decision::RequestMoreInfo | Decision::Unknown => {
            let prior = session.reply.take().unwrap_or_default();
            session.reply =
                Some(compose(&[&prior, &reply.issues_detected, &reply.validation_question]));
            session.origin_tag = OriginTag::Fresh;
        }
        Decision::Positive => {
            // Confirmation consumed; the retained summary drives synthesis.
            session.pending_validation_question = None;
            session.origin_tag = OriginTag::AwaitingConfirmation;
        }
        Decision::Negative => {
            session.pending_summary = None;
            session.pending_validation_question = None;
            session.origin_tag = OriginTag::Fresh;
        }
    }

    session.decision = decision;
    tracing::info!(
        event_name = "step.judging_assist.decided",
        session_id = %session.id.0,
        validation_mode,
        decision = decision.as_str(),
        "judging pass decided"
    );
    StepReport::completed(STEP)
}

async fn judge(
    ctx: &StepContext,
    transcript: &str,
    validation_mode: bool,
) -> Result<JudgeReply, StepError> {
    let prompt = if validation_mode {
        ctx.prompts.judge_validate(transcript)?
    } else {
        ctx.prompts.judge_extract(transcript)?
    };
    let raw = ctx
        .llm
        .complete(&prompt)
        .await
        .map_err(|error| StepError::Generation(error.to_string()))?;
    Ok(parse_step_reply::<JudgeReply>(&raw)?)
}

fn compose(parts: &[&str]) -> String {
    parts.iter().filter(|part| !part.trim().is_empty()).copied().collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use carseek_core::{Decision, OriginTag, SessionRecord, Turn};

    use super::run;
    use crate::steps::testing::{context_with_llm, scripted};
    use crate::steps::StepStatus;

    fn session_with_history() -> SessionRecord {
        let mut session = SessionRecord::new();
        session.turn_history = vec![
            Turn::user("Looking for a Toyota Corolla under $25000"),
            Turn::assistant("Got it, any year preference?"),
            Turn::user("2020 or newer"),
        ];
        session.user_message = Some("2020 or newer".to_string());
        session
    }

    #[tokio::test]
    async fn proceed_asks_for_confirmation_and_pauses() {
        let llm = scripted();
        llm.push_reply(
            r#"{"decision": "proceed", "summary": "Toyota, Corolla, 2020, $25000",
                "validation_question": "Reply with YES to confirm or NO to cancel.",
                "issues_detected": "", "confidence": "high"}"#,
        );
        let ctx = context_with_llm(llm).await;

        let mut session = session_with_history();
        let report = run(&ctx, &mut session).await;

        assert!(report.advanced());
        assert_eq!(session.decision, Decision::Proceed);
        assert_eq!(session.origin_tag, OriginTag::AwaitingConfirmation);
        assert_eq!(session.pending_summary.as_deref(), Some("Toyota, Corolla, 2020, $25000"));
        let reply = session.reply.expect("composed reply");
        assert!(reply.contains("Toyota, Corolla, 2020, $25000"));
        assert!(reply.contains("YES"));
    }

    #[tokio::test]
    async fn request_more_info_composes_issues_into_reply() {
        let llm = scripted();
        llm.push_reply(
            r#"{"decision": "request_more_info", "summary": "",
                "validation_question": "",
                "issues_detected": "Which model and price range do you have in mind?",
                "confidence": "medium"}"#,
        );
        let ctx = context_with_llm(llm).await;

        let mut session = session_with_history();
        session.reply = Some("Brand Toyota noted.".to_string());

        let report = run(&ctx, &mut session).await;

        assert!(report.advanced());
        assert_eq!(session.decision, Decision::RequestMoreInfo);
        assert_eq!(session.origin_tag, OriginTag::Fresh);
        let reply = session.reply.expect("composed reply");
        assert!(reply.starts_with("Brand Toyota noted."));
        assert!(reply.contains("Which model"));
    }

    #[tokio::test]
    async fn positive_confirmation_consumes_question_and_keeps_summary() {
        let llm = scripted();
        llm.push_reply(r#"{"decision": "positive", "confidence": "high"}"#);
        let ctx = context_with_llm(llm).await;

        let mut session = session_with_history();
        session.decision = Decision::Proceed;
        session.origin_tag = OriginTag::AwaitingConfirmation;
        session.pending_summary = Some("Toyota, Corolla, 2020, $25000".to_string());
        session.pending_validation_question = Some("Reply with YES to confirm.".to_string());

        let report = run(&ctx, &mut session).await;

        assert!(report.advanced());
        assert_eq!(session.decision, Decision::Positive);
        assert_eq!(session.origin_tag, OriginTag::AwaitingConfirmation);
        assert_eq!(session.pending_summary.as_deref(), Some("Toyota, Corolla, 2020, $25000"));
        assert_eq!(session.pending_validation_question, None, "question must be consumed");
    }

    #[tokio::test]
    async fn negative_confirmation_discards_pending_state() {
        let llm = scripted();
        llm.push_reply(r#"{"decision": "negative", "confidence": "high"}"#);
        let ctx = context_with_llm(llm).await;

        let mut session = session_with_history();
        session.decision = Decision::Proceed;
        session.origin_tag = OriginTag::AwaitingConfirmation;
        session.pending_summary = Some("Toyota, Corolla".to_string());
        session.pending_validation_question = Some("Confirm?".to_string());

        let report = run(&ctx, &mut session).await;

        assert!(report.advanced());
        assert_eq!(session.decision, Decision::Negative);
        assert_eq!(session.origin_tag, OriginTag::Fresh);
        assert_eq!(session.pending_summary, None);
        assert_eq!(session.pending_validation_question, None);
    }

    #[tokio::test]
    async fn unparseable_decision_defaults_to_request_more_info() {
        let llm = scripted();
        llm.push_reply(r#"{"decision": "PRO", "confidence": "??"}"#);
        let ctx = context_with_llm(llm).await;

        let mut session = session_with_history();
        let report = run(&ctx, &mut session).await;

        assert!(report.advanced());
        assert_eq!(session.decision, Decision::RequestMoreInfo);
        assert_eq!(session.origin_tag, OriginTag::Fresh);
    }

    #[tokio::test]
    async fn generation_failure_is_contained() {
        let llm = scripted();
        llm.push_failure("model endpoint unreachable");
        let ctx = context_with_llm(llm).await;

        let mut session = session_with_history();
        let before = session.clone();

        let report = run(&ctx, &mut session).await;

        assert!(matches!(report.status, StepStatus::ContainedFailure { .. }));
        assert_eq!(session, before);
    }

    #[tokio::test]
    async fn judging_is_idempotent_for_identical_transcripts() {
        let reply = r#"{"decision": "request_more_info", "summary": "",
            "validation_question": "", "issues_detected": "Need a price range.",
            "confidence": "medium"}"#;

        let llm = scripted();
        llm.push_reply(reply);
        llm.push_reply(reply);
        let ctx = context_with_llm(llm).await;

        let mut first = session_with_history();
        let mut second = session_with_history();
        second.id = first.id.clone();
        second.created_at = first.created_at;

        run(&ctx, &mut first).await;
        run(&ctx, &mut second).await;

        assert_eq!(first.decision, second.decision);
        assert_eq!(first.reply, second.reply);
    }
}

use carseek_core::{OriginTag, SessionRecord};

use crate::conversation::format_transcript;
use crate::prompts::{parse_step_reply, AssistReply};

use super::{parse_confidence, StepContext, StepError, StepReport};

pub const STEP: &str = "general_assist";

/// Intent classifier pass. Skips generation entirely while a confirmation
/// question is outstanding, so the user is never double-prompted.
pub async fn run(ctx: &StepContext, session: &mut SessionRecord) -> StepReport {
    if session.origin_tag == OriginTag::AwaitingConfirmation {
        tracing::info!(
            event_name = "step.general_assist.skipped",
            session_id = %session.id.0,
            "confirmation outstanding; classifier pass skipped"
        );
        return StepReport::skipped(STEP, "confirmation_outstanding");
    }

    let Some(user_message) = session.user_message.clone() else {
        tracing::info!(
            event_name = "step.general_assist.skipped",
            session_id = %session.id.0,
            "turn carries no user message"
        );
        return StepReport::skipped(STEP, "no_user_message");
    };

    let transcript = format_transcript(&session.turn_history, None);
    match classify(ctx, &transcript, &user_message).await {
        Ok(reply) => {
            session.confidence = Some(parse_confidence(&reply.confidence));
            session.reply = Some(reply.extracted_info);
            StepReport::completed(STEP)
        }
        Err(error) => {
            tracing::warn!(
                event_name = "step.general_assist.contained_failure",
                session_id = %session.id.0,
                error = %error,
                "classifier pass failed; session unchanged"
            );
            StepReport::contained(STEP, error)
        }
    }
}

async fn classify(
    ctx: &StepContext,
    transcript: &str,
    user_message: &str,
) -> Result<AssistReply, StepError> {
    let prompt = ctx.prompts.general_assist(transcript, user_message)?;
    let raw = ctx
        .llm
        .complete(&prompt)
        .await
        .map_err(|error| StepError::Generation(error.to_string()))?;
    Ok(parse_step_reply::<AssistReply>(&raw)?)
}

#[cfg(test)]
mod tests {
    use carseek_core::{Confidence, OriginTag, SessionRecord, Turn};

    use super::run;
    use crate::steps::testing::{context_with_llm, scripted};
    use crate::steps::StepStatus;

    #[tokio::test]
    async fn classifies_fresh_user_message() {
        let llm = scripted();
        llm.push_reply(
            r#"{"extracted_info": "Brand Toyota, budget under $30000. Which model?", "confidence": "medium"}"#,
        );
        let ctx = context_with_llm(llm).await;

        let mut session = SessionRecord::new();
        session.begin_turn("Looking for a Toyota under $30000", &[], 10);

        let report = run(&ctx, &mut session).await;

        assert!(report.advanced());
        assert!(session.reply.as_deref().expect("reply set").contains("Toyota"));
        assert_eq!(session.confidence, Some(Confidence::Medium));
        assert_eq!(session.origin_tag, OriginTag::Fresh);
    }

    #[tokio::test]
    async fn skips_generation_while_confirmation_outstanding() {
        let llm = scripted();
        let ctx = context_with_llm(llm).await;

        let mut session = SessionRecord::new();
        session.origin_tag = OriginTag::AwaitingConfirmation;
        session.user_message = Some("yes".to_string());
        session.turn_history = vec![Turn::user("yes")];

        let report = run(&ctx, &mut session).await;

        assert!(matches!(
            report.status,
            StepStatus::Skipped { reason: "confirmation_outstanding" }
        ));
        assert_eq!(session.reply, None, "skip must leave the session unchanged");
    }

    #[tokio::test]
    async fn missing_user_message_is_a_noop() {
        let llm = scripted();
        let ctx = context_with_llm(llm).await;

        let mut session = SessionRecord::new();
        let report = run(&ctx, &mut session).await;

        assert!(matches!(report.status, StepStatus::Skipped { reason: "no_user_message" }));
    }

    #[tokio::test]
    async fn generation_failure_is_contained() {
        let llm = scripted();
        llm.push_failure("model endpoint unreachable");
        let ctx = context_with_llm(llm).await;

        let mut session = SessionRecord::new();
        session.begin_turn("find me a car", &[], 10);
        let before = session.clone();

        let report = run(&ctx, &mut session).await;

        assert!(matches!(report.status, StepStatus::ContainedFailure { .. }));
        assert_eq!(session, before, "contained failure must leave the session unchanged");
    }

    #[tokio::test]
    async fn unparseable_reply_is_contained() {
        let llm = scripted();
        llm.push_reply("sorry, I cannot help with that");
        let ctx = context_with_llm(llm).await;

        let mut session = SessionRecord::new();
        session.begin_turn("find me a car", &[], 10);

        let report = run(&ctx, &mut session).await;

        assert!(matches!(report.status, StepStatus::ContainedFailure { .. }));
        assert_eq!(session.reply, None);
    }
}

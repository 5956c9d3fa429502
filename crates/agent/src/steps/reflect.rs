use carseek_core::{OriginTag, SessionRecord};

use super::StepReport;

pub const STEP: &str = "reflect";

/// Pure bookkeeping: moves exactly one retry counter, selected by which step
/// produced the pending state. Exists so the retry-count mutation is an
/// observable transition instead of a side effect inside synthesis.
pub fn run(session: &mut SessionRecord) -> StepReport {
    match session.origin_tag {
        OriginTag::FromSynthesis => {
            session.query_attempt_count += 1;
            tracing::info!(
                event_name = "step.reflect.counted",
                session_id = %session.id.0,
                query_attempt_count = session.query_attempt_count,
                "query attempt recorded"
            );
            StepReport::completed(STEP)
        }
        OriginTag::FromRefinement => {
            session.refine_attempt_count += 1;
            tracing::info!(
                event_name = "step.reflect.counted",
                session_id = %session.id.0,
                refine_attempt_count = session.refine_attempt_count,
                "refine attempt recorded"
            );
            StepReport::completed(STEP)
        }
        _ => {
            tracing::info!(
                event_name = "step.reflect.skipped",
                session_id = %session.id.0,
                origin_tag = session.origin_tag.as_str(),
                "origin does not select a retry counter"
            );
            StepReport::skipped(STEP, "unrecognized_origin")
        }
    }
}

#[cfg(test)]
mod tests {
    use carseek_core::{OriginTag, SessionRecord};

    use super::run;
    use crate::steps::StepStatus;

    #[test]
    fn synthesis_origin_moves_only_the_query_counter() {
        let mut session = SessionRecord::new();
        session.origin_tag = OriginTag::FromSynthesis;

        let report = run(&mut session);

        assert!(report.advanced());
        assert_eq!(session.query_attempt_count, 1);
        assert_eq!(session.refine_attempt_count, 0);
    }

    #[test]
    fn refinement_origin_moves_only_the_refine_counter() {
        let mut session = SessionRecord::new();
        session.origin_tag = OriginTag::FromRefinement;

        let report = run(&mut session);

        assert!(report.advanced());
        assert_eq!(session.query_attempt_count, 0);
        assert_eq!(session.refine_attempt_count, 1);
    }

    #[test]
    fn other_origins_leave_the_session_unchanged() {
        for origin in [OriginTag::Fresh, OriginTag::AwaitingConfirmation, OriginTag::FromExecution]
        {
            let mut session = SessionRecord::new();
            session.origin_tag = origin;

            let report = run(&mut session);

            assert!(matches!(report.status, StepStatus::Skipped { .. }));
            assert_eq!(session.query_attempt_count, 0);
            assert_eq!(session.refine_attempt_count, 0);
        }
    }
}

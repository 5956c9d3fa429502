use carseek_core::{OriginTag, SessionRecord};

use super::{StepContext, StepError, StepReport};

pub const STEP: &str = "sql_execute";

/// Runs the refined query when one exists, otherwise the candidate. Leaves
/// `result_rows` unset on failure so response synthesis falls back. The
/// origin tag moves to `from_execution` regardless of outcome.
pub async fn run(ctx: &StepContext, session: &mut SessionRecord) -> StepReport {
    let Some(query) = session.refined_query.clone().or_else(|| session.candidate_query.clone())
    else {
        tracing::info!(
            event_name = "step.sql_execute.skipped",
            session_id = %session.id.0,
            "no query to execute"
        );
        session.origin_tag = OriginTag::FromExecution;
        return StepReport::skipped(STEP, "no_query");
    };

    let report = match ctx.executor.execute(&query).await {
        Ok(rows) => {
            tracing::info!(
                event_name = "step.sql_execute.completed",
                session_id = %session.id.0,
                row_count = rows.len(),
                "search query executed"
            );
            session.result_rows = Some(rows);
            StepReport::completed(STEP)
        }
        Err(error) => {
            tracing::warn!(
                event_name = "step.sql_execute.contained_failure",
                session_id = %session.id.0,
                error = %error,
                "search query failed"
            );
            StepReport::contained(STEP, StepError::Execution(error.to_string()))
        }
    };

    session.origin_tag = OriginTag::FromExecution;
    report
}

#[cfg(test)]
mod tests {
    use carseek_core::{OriginTag, SessionRecord};

    use super::run;
    use crate::steps::testing::{context_with_pool, insert_vehicle, scripted};
    use crate::steps::StepStatus;

    #[tokio::test]
    async fn executes_refined_query_over_candidate() {
        let (ctx, pool) = context_with_pool(scripted()).await;
        insert_vehicle(&pool, "Toyota", "Corolla", 24500.0).await;
        insert_vehicle(&pool, "Ford", "Focus", 19000.0).await;

        let mut session = SessionRecord::new();
        session.candidate_query = Some("SELECT * FROM vehicles".to_string());
        session.refined_query =
            Some("SELECT * FROM vehicles WHERE LOWER(brand) = 'toyota'".to_string());

        let report = run(&ctx, &mut session).await;

        assert!(report.advanced());
        let rows = session.result_rows.expect("rows recorded");
        assert_eq!(rows.len(), 1, "refined query should win over the candidate");
        assert_eq!(session.origin_tag, OriginTag::FromExecution);

        pool.close().await;
    }

    #[tokio::test]
    async fn failure_leaves_rows_unset_but_moves_origin() {
        let (ctx, pool) = context_with_pool(scripted()).await;

        let mut session = SessionRecord::new();
        session.candidate_query = Some("SELECT * FROM nonexistent_table".to_string());

        let report = run(&ctx, &mut session).await;

        assert!(matches!(report.status, StepStatus::ContainedFailure { .. }));
        assert_eq!(session.result_rows, None);
        assert_eq!(session.origin_tag, OriginTag::FromExecution);

        pool.close().await;
    }

    #[tokio::test]
    async fn missing_query_is_a_noop_apart_from_origin() {
        let (ctx, pool) = context_with_pool(scripted()).await;

        let mut session = SessionRecord::new();
        let report = run(&ctx, &mut session).await;

        assert!(matches!(report.status, StepStatus::Skipped { reason: "no_query" }));
        assert_eq!(session.origin_tag, OriginTag::FromExecution);

        pool.close().await;
    }
}

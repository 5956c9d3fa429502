use async_trait::async_trait;

use carseek_db::QueryExecutor;

use super::StepError;

/// A failed dry-run: the query that was tried and the database's message,
/// fed verbatim into the next fix-mode generation.
#[derive(Clone, Debug)]
pub struct DryRunFailure {
    pub query_text: String,
    pub message: String,
}

/// One generate-and-test attempt inside the capped loop. `propose` renders
/// and parses a candidate, optionally seeded with the previous failure.
#[async_trait]
pub trait DryRunAttempt: Send {
    type Candidate: Send;

    async fn propose(
        &mut self,
        prior_failure: Option<&DryRunFailure>,
    ) -> Result<Self::Candidate, StepError>;

    fn query_text<'a>(&self, candidate: &'a Self::Candidate) -> &'a str;
}

#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// The candidate's dry-run succeeded.
    Passed(T),
    /// The attempt ceiling was reached; the last candidate is kept anyway.
    Exhausted(T),
}

impl<T> RetryOutcome<T> {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Self::Passed(candidate) | Self::Exhausted(candidate) => candidate,
        }
    }
}

/// Capped generate → dry-run loop shared by synthesis and refinement.
///
/// `counter` is the session's attempt counter: it moves by one per failed
/// dry-run and never passes `ceiling`, so the ceiling bound holds across
/// this loop and the reflect stage combined. On exhaustion the last
/// candidate is returned rather than an error; execution decides its fate.
pub async fn dry_run_loop<A: DryRunAttempt>(
    attempt: &mut A,
    executor: &dyn QueryExecutor,
    counter: &mut u32,
    ceiling: u32,
) -> Result<RetryOutcome<A::Candidate>, StepError> {
    let mut prior_failure: Option<DryRunFailure> = None;

    loop {
        let candidate = attempt.propose(prior_failure.as_ref()).await?;
        let query_text = attempt.query_text(&candidate);

        match executor.execute(query_text).await {
            Ok(_) => return Ok(RetryOutcome::Passed(candidate)),
            Err(error) => {
                let failure =
                    DryRunFailure { query_text: query_text.to_string(), message: error.to_string() };
                if *counter < ceiling {
                    *counter += 1;
                }
                tracing::debug!(
                    event_name = "step.dry_run_failed",
                    attempt = *counter,
                    error = %failure.message,
                    "dry-run rejected candidate query"
                );
                if *counter >= ceiling {
                    return Ok(RetryOutcome::Exhausted(candidate));
                }
                prior_failure = Some(failure);
            }
        }
    }
}

//! End-to-end turn scenarios: scripted model replies driven through the
//! full workflow runtime against an in-memory database.

use std::sync::Arc;

use carseek_agent::steps::respond::NO_MATCHES_REPLY;
use carseek_agent::{ScriptedLlmClient, WorkflowRuntime};
use carseek_core::config::WorkflowConfig;
use carseek_core::{
    Decision, InMemoryTraceSink, OriginTag, SessionRecord, TraceEvent, Turn,
};
use carseek_db::{connect_with_settings, migrations, DbPool, SqliteQueryExecutor};

async fn runtime_with_inventory(
    llm: Arc<ScriptedLlmClient>,
) -> (WorkflowRuntime, Arc<InMemoryTraceSink>, DbPool) {
    let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect test pool");
    migrations::run_pending(&pool).await.expect("run migrations");

    for (brand, model, price) in [
        ("Toyota", "Corolla", 24500.0),
        ("Toyota", "Camry", 27000.0),
        ("Ford", "Focus", 19000.0),
    ] {
        sqlx::query(
            "INSERT INTO vehicles (
                brand, model, year, engine_type, fuel_type, color,
                mileage, number_of_doors, transmission, price
             ) VALUES (?, ?, 2021, 'inline_4', 'gasoline', 'Blue', 30500.0, 4, 'automatic', ?)",
        )
        .bind(brand)
        .bind(model)
        .bind(price)
        .execute(&pool)
        .await
        .expect("insert vehicle");
    }

    let trace = Arc::new(InMemoryTraceSink::default());
    let runtime = WorkflowRuntime::new(
        llm,
        Arc::new(SqliteQueryExecutor::new(pool.clone())),
        trace.clone(),
        WorkflowConfig {
            max_query_attempts: 5,
            max_refine_attempts: 5,
            rejudge_interval: 2,
            history_window: 10,
        },
    )
    .expect("build runtime");

    (runtime, trace, pool)
}

fn transitions(trace: &InMemoryTraceSink) -> Vec<TraceEvent> {
    trace
        .events()
        .into_iter()
        .filter(|event| event.event_type == "workflow.stage_transition")
        .collect()
}

fn assist_reply(extracted: &str, confidence: &str) -> String {
    format!(r#"{{"extracted_info": "{extracted}", "confidence": "{confidence}"}}"#)
}

fn sql_reply(query: &str, confidence: &str) -> String {
    format!(
        r#"{{"rationale": "filters the inventory", "query_text": "{query}", "confidence": "{confidence}"}}"#
    )
}

/// A session paused on an outstanding confirmation, as judging leaves it
/// after a PROCEED decision.
fn confirmed_pending_session() -> SessionRecord {
    let mut session = SessionRecord::new();
    session.turn_history = vec![
        Turn::user("Looking for a Toyota Corolla under $25000"),
        Turn::assistant("Toyota, Corolla, $25000\nReply YES to confirm or NO to cancel."),
    ];
    session.origin_tag = OriginTag::AwaitingConfirmation;
    session.decision = Decision::Proceed;
    session.pending_summary = Some("Toyota, Corolla, $25000".to_string());
    session.pending_validation_question = Some("Reply YES to confirm or NO to cancel.".to_string());
    session.interaction_count = 1;
    session
}

#[tokio::test]
async fn fresh_message_is_classified_and_the_turn_ends() {
    let llm = Arc::new(ScriptedLlmClient::new());
    llm.push_reply(assist_reply("Brand Toyota, budget under $30000. Which model?", "medium"));
    let (runtime, trace, pool) = runtime_with_inventory(llm.clone()).await;

    let mut session = SessionRecord::new();
    let reply = runtime.run_turn(&mut session, "Looking for a Toyota under $30000").await;

    assert!(reply.contains("Toyota"));
    assert!(session.confidence.is_some());
    assert_eq!(session.origin_tag, OriginTag::Fresh);
    assert_eq!(session.interaction_count, 1);
    assert_eq!(llm.pending(), 0);

    let transitions = transitions(&trace);
    assert_eq!(transitions.len(), 1);
    assert_eq!(transitions[0].metadata.get("rule").map(String::as_str), Some("await_next_turn"));

    pool.close().await;
}

#[tokio::test]
async fn interaction_interval_forces_judging_with_no_explicit_trigger() {
    let llm = Arc::new(ScriptedLlmClient::new());
    // Turn 1 and 2: classification only.
    llm.push_reply(assist_reply("Brand Toyota noted. Which model?", "medium"));
    llm.push_reply(assist_reply("Toyota Corolla, 2020 or newer, under $25000.", "high"));
    // Turn 3: classification, then judging fires on the interval.
    llm.push_reply(assist_reply("All criteria captured.", "high"));
    llm.push_reply(
        r#"{"decision": "proceed", "summary": "Toyota, Corolla, 2020, $25000",
            "validation_question": "Reply YES to confirm or NO to cancel.",
            "issues_detected": "", "confidence": "high"}"#,
    );
    let (runtime, trace, pool) = runtime_with_inventory(llm.clone()).await;

    let mut session = SessionRecord::new();
    runtime.run_turn(&mut session, "Looking for a Toyota").await;
    runtime.run_turn(&mut session, "A Corolla, 2020 or newer, under $25000").await;
    let reply = runtime.run_turn(&mut session, "that's everything").await;

    assert!(reply.contains("Toyota, Corolla, 2020, $25000"));
    assert!(reply.contains("YES"));
    assert_eq!(session.decision, Decision::Proceed);
    assert_eq!(session.origin_tag, OriginTag::AwaitingConfirmation);
    assert_eq!(session.pending_summary.as_deref(), Some("Toyota, Corolla, 2020, $25000"));
    assert_eq!(llm.pending(), 0);

    assert!(transitions(&trace).iter().any(|event| {
        event.metadata.get("rule").map(String::as_str) == Some("interaction_interval_reached")
    }));

    // The interval wraps after the judged turn.
    assert_eq!(session.interaction_count, 1);

    pool.close().await;
}

#[tokio::test]
async fn confirmed_search_generates_executes_and_renders_results() {
    let llm = Arc::new(ScriptedLlmClient::new());
    llm.push_reply(r#"{"decision": "positive", "confidence": "high"}"#);
    llm.push_reply(sql_reply(
        "SELECT brand, model, price FROM vehicles WHERE LOWER(brand) = 'toyota' AND price <= 25000",
        "high",
    ));
    llm.push_reply("I found a Toyota Corolla at $24,500. Want more details?");
    let (runtime, trace, pool) = runtime_with_inventory(llm.clone()).await;

    let mut session = confirmed_pending_session();
    let reply = runtime.run_turn(&mut session, "YES").await;

    assert_eq!(reply, "I found a Toyota Corolla at $24,500. Want more details?");
    assert_eq!(session.decision, Decision::Positive);
    assert_eq!(session.origin_tag, OriginTag::FromExecution);
    assert_eq!(session.query_attempt_count, 0);
    assert_eq!(session.cycle_marker.count, 1);
    assert_eq!(session.result_rows.as_ref().map(Vec::len), Some(1));
    let query = session.candidate_query.expect("candidate query recorded");
    assert!(query.starts_with("SELECT"));
    assert!(query.contains("vehicles"));
    assert_eq!(llm.pending(), 0);

    let rules: Vec<_> = transitions(&trace)
        .iter()
        .filter_map(|event| event.metadata.get("rule").cloned())
        .collect();
    assert!(rules.contains(&"confirmation_outstanding".to_string()));
    assert!(rules.contains(&"search_confirmed".to_string()));
    assert!(rules.contains(&"execution_complete".to_string()));

    pool.close().await;
}

#[tokio::test]
async fn failed_dry_run_consumes_one_attempt_and_regenerates() {
    let llm = Arc::new(ScriptedLlmClient::new());
    llm.push_reply(r#"{"decision": "positive", "confidence": "high"}"#);
    llm.push_reply(sql_reply("SELECT * FROM nonexistent_table", "medium"));
    llm.push_reply(sql_reply("SELECT brand, model, price FROM vehicles", "high"));
    llm.push_reply("Here are all vehicles on the lot.");
    let (runtime, _trace, pool) = runtime_with_inventory(llm.clone()).await;

    let mut session = confirmed_pending_session();
    let reply = runtime.run_turn(&mut session, "yes").await;

    assert_eq!(reply, "Here are all vehicles on the lot.");
    assert_eq!(session.query_attempt_count, 1, "one failed dry-run consumed one attempt");
    assert_eq!(
        session.candidate_query.as_deref(),
        Some("SELECT brand, model, price FROM vehicles")
    );
    assert_eq!(llm.pending(), 0);

    pool.close().await;
}

#[tokio::test]
async fn zero_row_search_replies_with_the_exact_no_matches_message() {
    let llm = Arc::new(ScriptedLlmClient::new());
    llm.push_reply(r#"{"decision": "positive", "confidence": "high"}"#);
    llm.push_reply(sql_reply("SELECT * FROM vehicles WHERE price < 1", "high"));
    let (runtime, _trace, pool) = runtime_with_inventory(llm.clone()).await;

    let mut session = confirmed_pending_session();
    let reply = runtime.run_turn(&mut session, "yes").await;

    assert_eq!(reply, NO_MATCHES_REPLY);
    assert!(!reply.is_empty());
    assert_eq!(session.cycle_marker.count, 1);
    assert_eq!(llm.pending(), 0, "the empty result set is rendered without a generation call");

    pool.close().await;
}

#[tokio::test]
async fn low_confidence_loop_stops_exactly_at_the_attempt_ceiling() {
    let llm = Arc::new(ScriptedLlmClient::new());
    llm.push_reply(r#"{"decision": "positive", "confidence": "high"}"#);
    // Every candidate passes its dry run but reports low confidence, so the
    // reflect loop alone drives the counter to the ceiling.
    for _ in 0..6 {
        llm.push_reply(sql_reply("SELECT brand, model, price FROM vehicles", "low"));
    }
    llm.push_reply("Here is the full inventory.");
    let (runtime, trace, pool) = runtime_with_inventory(llm.clone()).await;

    let mut session = confirmed_pending_session();
    let reply = runtime.run_turn(&mut session, "yes").await;

    assert_eq!(reply, "Here is the full inventory.");
    assert_eq!(session.query_attempt_count, 5, "counter stops exactly at the ceiling");
    assert_eq!(llm.pending(), 0);

    let reflect_passes = transitions(&trace)
        .iter()
        .filter(|event| event.metadata.get("to").map(String::as_str) == Some("reflect"))
        .count();
    assert_eq!(reflect_passes, 5);
    assert!(transitions(&trace).iter().any(|event| {
        event.metadata.get("from").map(String::as_str) == Some("sql_generate")
            && event.metadata.get("rule").map(String::as_str)
                == Some("confidence_settled_or_ceiling")
    }));

    pool.close().await;
}

#[tokio::test]
async fn rejected_confirmation_returns_to_general_assistance() {
    let llm = Arc::new(ScriptedLlmClient::new());
    llm.push_reply(r#"{"decision": "negative", "confidence": "high"}"#);
    llm.push_reply(assist_reply("Understood, let's start over. What are you looking for?", "low"));
    let (runtime, trace, pool) = runtime_with_inventory(llm.clone()).await;

    let mut session = confirmed_pending_session();
    let reply = runtime.run_turn(&mut session, "no, actually something else").await;

    assert!(reply.contains("start over"));
    assert_eq!(session.decision, Decision::Negative);
    assert_eq!(session.pending_summary, None);
    assert_eq!(session.pending_validation_question, None);
    assert_eq!(llm.pending(), 0);

    assert!(transitions(&trace)
        .iter()
        .any(|event| event.metadata.get("rule").map(String::as_str) == Some("search_rejected")));

    pool.close().await;
}

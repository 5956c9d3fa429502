use carseek_core::{SessionRecord, Turn};

/// What the formatter emits when there is nothing to format. Callers treat
/// this as valid transcript text, not as an error.
pub const NO_HISTORY_PLACEHOLDER: &str = "NO conversation history";

/// Renders turns as a single `role: content` block, one line per turn, with
/// an optional trailing assistant answer. Pure and idempotent.
pub fn format_transcript(turns: &[Turn], trailing_answer: Option<&str>) -> String {
    let mut lines: Vec<String> =
        turns.iter().map(|turn| format!("{}: {}", turn.role.as_str(), turn.content)).collect();

    if let Some(answer) = trailing_answer {
        lines.push(format!("assistant: {answer}"));
    }

    if lines.is_empty() {
        return NO_HISTORY_PLACEHOLDER.to_string();
    }

    lines.join("\n")
}

/// Turns added since the last completed search cycle. Falls back to the full
/// history when the cycle marker points past everything new, so the judging
/// step always sees a non-trivial transcript.
pub fn judging_window(session: &SessionRecord) -> &[Turn] {
    let offset = session.cycle_marker.offset.min(session.turn_history.len());
    let window = &session.turn_history[offset..];
    if window.is_empty() {
        &session.turn_history
    } else {
        window
    }
}

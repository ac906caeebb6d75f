use crate::metadata::ConversationSession;

pub const EMPTY_HISTORY: &str = "No conversation history yet";

/// Render a session as display text: a metadata header, then every retained
/// turn in order. Evicted turns are simply not shown.
pub fn format_history(session: &ConversationSession) -> String {
    let mut out = format!(
        "**Session ID:** {}\n**Created:** {}\n**Total turns:** {}\n\n",
        session.session_id,
        session.created_at.to_rfc3339(),
        session.turns.len()
    );

    for turn in &session.turns {
        out.push_str(&format!(
            "**Turn {}:**\n**User:** {}\n**Assistant:** {}\n",
            turn.turn_number, turn.user_query, turn.ai_response
        ));
        if turn.error_occurred {
            out.push_str(&format!("**⚠️ Error:** {}\n", turn.error_message));
        }
        out.push_str(&format!("**Processing time:** {:.2}s\n", turn.processing_time));
        out.push_str("---\n\n");
    }

    out
}

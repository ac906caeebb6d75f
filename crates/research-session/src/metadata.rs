use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// One query/response exchange. Never modified once it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    #[serde(alias = "user_message")]
    pub user_query: String,
    pub ai_response: String,
    pub timestamp: DateTime<Utc>,
    /// 1-based position at creation time; kept as-is when older turns are evicted.
    pub turn_number: u32,
    /// Seconds spent answering; a missing or null value reads as 0.0.
    #[serde(default, deserialize_with = "null_as_zero")]
    pub processing_time: f64,
    #[serde(default)]
    pub error_occurred: bool,
    #[serde(default)]
    pub error_message: String,
}

impl ConversationTurn {
    pub(crate) fn with_turn_number(self, turn_number: u32) -> Self {
        Self {
            turn_number,
            ..self
        }
    }
}

fn null_as_zero<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(0.0))
}

/// One continuous dialogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub turns: VecDeque<ConversationTurn>,
    pub last_activity: DateTime<Utc>,
    /// Reserved; no operation fills it in yet.
    #[serde(default)]
    pub total_tokens: u64,
}

impl ConversationSession {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            session_id: generate_session_id(now),
            created_at: now,
            turns: VecDeque::new(),
            last_activity: now,
            total_tokens: 0,
        }
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn next_turn_number(&self) -> u32 {
        u32::try_from(self.turns.len()).map_or(u32::MAX, |n| n.saturating_add(1))
    }

    pub fn latest_turn(&self) -> Option<&ConversationTurn> {
        self.turns.back()
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats::from(self)
    }
}

/// `session_<utc timestamp>_<random suffix>`: the prefix keeps ids readable,
/// the suffix keeps ids created within the same second apart.
fn generate_session_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("session_{}_{}", now.format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// Statistics computed on demand from a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub total_turns: usize,
    pub last_activity: DateTime<Utc>,
    pub total_processing_time: f64,
    pub average_processing_time: f64,
    pub error_count: usize,
}

impl From<&ConversationSession> for SessionStats {
    fn from(session: &ConversationSession) -> Self {
        let total_turns = session.turns.len();
        let total_processing_time: f64 = session.turns.iter().map(|t| t.processing_time).sum();
        let average_processing_time = if total_turns == 0 {
            0.0
        } else {
            total_processing_time / total_turns as f64
        };

        Self {
            session_id: session.session_id.clone(),
            created_at: session.created_at,
            total_turns,
            last_activity: session.last_activity,
            total_processing_time,
            average_processing_time,
            error_count: session.turns.iter().filter(|t| t.error_occurred).count(),
        }
    }
}

/// Document produced by an export: the full session plus when it was taken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionExport {
    pub export_timestamp: DateTime<Utc>,
    pub session: ConversationSession,
}

impl SessionExport {
    pub fn new(session: &ConversationSession, now: DateTime<Utc>) -> Self {
        Self {
            export_timestamp: now,
            session: session.clone(),
        }
    }

    pub fn suggested_filename(&self) -> String {
        format!(
            "conversation_export_{}_{}.json",
            self.session.session_id,
            self.export_timestamp.format("%Y%m%d_%H%M%S")
        )
    }
}

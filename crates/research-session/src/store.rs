use chrono::{DateTime, TimeDelta, Utc};
use research_config::SessionSettings;
use research_core::{PriorTurn, ResearchError, Result};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::format::{format_history, EMPTY_HISTORY};
use crate::metadata::{ConversationSession, ConversationTurn, SessionExport, SessionStats};

/// Owns every live session and the single active-session pointer.
///
/// Invariant: `active_session_id`, when set, names a key of `sessions`.
/// Callers that share a store between tasks must hold one lock around each
/// mutating call; the store itself is a plain `&mut self` state machine.
///
/// Every time-dependent operation has an `_at` variant taking an explicit
/// `now`; the plain variant passes `Utc::now()`.
#[derive(Debug, Default)]
pub struct SessionStore {
    settings: SessionSettings,
    sessions: HashMap<String, ConversationSession>,
    active_session_id: Option<String>,
}

impl SessionStore {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            sessions: HashMap::new(),
            active_session_id: None,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Start an empty session and make it the active one.
    pub fn create_session(&mut self) -> String {
        self.create_session_at(Utc::now())
    }

    pub fn create_session_at(&mut self, now: DateTime<Utc>) -> String {
        let session = ConversationSession::new(now);
        let session_id = session.session_id.clone();
        self.sessions.insert(session_id.clone(), session);
        self.active_session_id = Some(session_id.clone());

        info!("Created new session: {}", session_id);
        session_id
    }

    /// Active session id, creating a session when none is active.
    pub fn ensure_session(&mut self) -> String {
        self.ensure_session_at(Utc::now())
    }

    pub fn ensure_session_at(&mut self, now: DateTime<Utc>) -> String {
        match self.active_session_id() {
            Some(id) => id.to_string(),
            None => self.create_session_at(now),
        }
    }

    /// The active session. A dangling active id reads as no session.
    pub fn get_active_session(&self) -> Option<&ConversationSession> {
        self.active_session_id
            .as_deref()
            .and_then(|id| self.sessions.get(id))
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.get_active_session().map(|s| s.session_id.as_str())
    }

    pub fn get_session(&self, session_id: &str) -> Option<&ConversationSession> {
        self.sessions.get(session_id)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Append a turn to the active session.
    ///
    /// An expired active session is replaced by a fresh one first, and the
    /// turn is renumbered against it. When the session grows past
    /// `max_history_length` the oldest turn is evicted.
    pub fn append_turn(&mut self, turn: ConversationTurn) -> Result<()> {
        self.append_turn_at(turn, Utc::now())
    }

    pub fn append_turn_at(&mut self, turn: ConversationTurn, now: DateTime<Utc>) -> Result<()> {
        let (session_id, rotated) = self.prepare_active_at(now)?;
        let turn = if rotated {
            turn.with_turn_number(1)
        } else {
            turn
        };
        self.push_turn(&session_id, turn, now)
    }

    /// Resolve the session the next turn lands in, rotating away from an
    /// expired one. Returns the id and whether a rotation happened.
    pub(crate) fn prepare_active_at(&mut self, now: DateTime<Utc>) -> Result<(String, bool)> {
        let Some(session) = self.get_active_session() else {
            warn!("No active session, cannot append turn");
            return Err(ResearchError::NoActiveSession);
        };

        if self.is_expired_at(session, now) {
            info!("Session {} expired, starting a new session", session.session_id);
            return Ok((self.create_session_at(now), true));
        }

        Ok((session.session_id.clone(), false))
    }

    pub(crate) fn push_turn(
        &mut self,
        session_id: &str,
        turn: ConversationTurn,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let max_history_length = self.settings.max_history_length;
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or(ResearchError::NoActiveSession)?;

        let turn_number = turn.turn_number;
        session.turns.push_back(turn);
        session.last_activity = now;

        while session.turns.len() > max_history_length {
            if let Some(evicted) = session.turns.pop_front() {
                debug!(
                    "Session {} reached max history length, evicted turn {}",
                    session.session_id, evicted.turn_number
                );
            }
        }

        debug!("Appended turn {} to session {}", turn_number, session.session_id);
        Ok(())
    }

    /// Remove the active session entirely. Returns false when nothing was active.
    pub fn clear_session(&mut self) -> bool {
        match self.active_session_id.take() {
            Some(session_id) => {
                self.sessions.remove(&session_id);
                info!("Cleared session {}", session_id);
                true
            }
            None => false,
        }
    }

    /// Delete every expired session and return how many were removed.
    pub fn cleanup_expired_sessions(&mut self) -> usize {
        self.cleanup_expired_sessions_at(Utc::now())
    }

    pub fn cleanup_expired_sessions_at(&mut self, now: DateTime<Utc>) -> usize {
        let max_age = self.max_age();
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !age_exceeds(session, max_age, now));
        let removed = before - self.sessions.len();

        if let Some(active) = self.active_session_id.as_deref() {
            if !self.sessions.contains_key(active) {
                self.active_session_id = None;
            }
        }

        info!("Cleaned up {} expired sessions", removed);
        removed
    }

    /// Expiry is measured from `created_at`, not from the last activity.
    pub fn is_expired(&self, session: &ConversationSession) -> bool {
        self.is_expired_at(session, Utc::now())
    }

    pub fn is_expired_at(&self, session: &ConversationSession, now: DateTime<Utc>) -> bool {
        age_exceeds(session, self.max_age(), now)
    }

    fn max_age(&self) -> TimeDelta {
        i64::try_from(self.settings.max_session_age_hours)
            .ok()
            .and_then(TimeDelta::try_hours)
            .unwrap_or(TimeDelta::MAX)
    }

    pub fn export_session(&self, session: &ConversationSession) -> SessionExport {
        SessionExport::new(session, Utc::now())
    }

    pub fn export_active(&self) -> Option<SessionExport> {
        self.get_active_session().map(|s| self.export_session(s))
    }

    pub fn format_history(&self, session: &ConversationSession) -> String {
        format_history(session)
    }

    /// Formatted active history, or a placeholder when there is nothing to show.
    pub fn format_active_history(&self) -> String {
        match self.get_active_session() {
            Some(session) if !session.turns.is_empty() => format_history(session),
            _ => EMPTY_HISTORY.to_string(),
        }
    }

    /// `(query, response)` pairs of the active session, oldest first.
    pub fn conversation_history(&self) -> Vec<PriorTurn> {
        self.get_active_session()
            .map(|session| {
                session
                    .turns
                    .iter()
                    .map(|t| PriorTurn::new(t.user_query.clone(), t.ai_response.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn session_stats(&self, session: &ConversationSession) -> SessionStats {
        session.stats()
    }

    pub fn active_stats(&self) -> Option<SessionStats> {
        self.get_active_session().map(ConversationSession::stats)
    }
}

// A created_at in the future (clock skew) gives a negative age: never expired.
fn age_exceeds(session: &ConversationSession, max_age: TimeDelta, now: DateTime<Utc>) -> bool {
    now.signed_duration_since(session.created_at) > max_age
}

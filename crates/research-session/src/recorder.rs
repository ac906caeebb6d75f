use chrono::{DateTime, Utc};
use research_core::{ResearchError, Result};
use tracing::info;

use crate::metadata::{ConversationSession, ConversationTurn};
use crate::store::SessionStore;

/// Result of one external query, ready to become a turn.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub ai_response: String,
    pub processing_time: f64,
    pub error: Option<String>,
}

impl TurnOutcome {
    pub fn success(ai_response: impl Into<String>, processing_time: f64) -> Self {
        Self {
            ai_response: ai_response.into(),
            processing_time,
            error: None,
        }
    }

    /// A failed query. The error text doubles as the displayed response.
    pub fn failure(error: impl Into<String>, processing_time: f64) -> Self {
        let error = error.into();
        Self {
            ai_response: error.clone(),
            processing_time,
            error: Some(error),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Builds turns and appends them through a [`SessionStore`].
pub struct TurnRecorder<'a> {
    store: &'a mut SessionStore,
}

impl<'a> TurnRecorder<'a> {
    pub fn new(store: &'a mut SessionStore) -> Self {
        Self { store }
    }

    /// Build a turn numbered against `session`. Fails when there is no session.
    pub fn build_turn(
        session: Option<&ConversationSession>,
        user_query: impl Into<String>,
        ai_response: impl Into<String>,
        processing_time: f64,
        error_occurred: bool,
        error_message: impl Into<String>,
    ) -> Result<ConversationTurn> {
        Self::build_turn_at(
            session,
            user_query,
            ai_response,
            processing_time,
            error_occurred,
            error_message,
            Utc::now(),
        )
    }

    pub fn build_turn_at(
        session: Option<&ConversationSession>,
        user_query: impl Into<String>,
        ai_response: impl Into<String>,
        processing_time: f64,
        error_occurred: bool,
        error_message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<ConversationTurn> {
        let session = session.ok_or(ResearchError::NoActiveSession)?;

        Ok(ConversationTurn {
            user_query: user_query.into(),
            ai_response: ai_response.into(),
            timestamp: now,
            turn_number: session.next_turn_number(),
            processing_time: sanitize_seconds(processing_time),
            error_occurred,
            error_message: error_message.into(),
        })
    }

    /// Build and append in one step, so the turn is numbered against the
    /// session it actually lands in (after any expiry rotation).
    pub fn record(&mut self, user_query: impl Into<String>, outcome: TurnOutcome) -> Result<ConversationTurn> {
        self.record_at(user_query, outcome, Utc::now())
    }

    pub fn record_at(
        &mut self,
        user_query: impl Into<String>,
        outcome: TurnOutcome,
        now: DateTime<Utc>,
    ) -> Result<ConversationTurn> {
        let (session_id, _) = self.store.prepare_active_at(now)?;
        let error_occurred = outcome.is_error();
        let turn = Self::build_turn_at(
            self.store.get_session(&session_id),
            user_query,
            outcome.ai_response,
            outcome.processing_time,
            error_occurred,
            outcome.error.unwrap_or_default(),
            now,
        )?;

        self.store.push_turn(&session_id, turn.clone(), now)?;
        info!(
            "Recorded turn {} in session {} ({:.2}s{})",
            turn.turn_number,
            session_id,
            turn.processing_time,
            if error_occurred { ", error" } else { "" }
        );
        Ok(turn)
    }
}

// Failed or nonsensical measurements are stored as 0.0.
fn sanitize_seconds(seconds: f64) -> f64 {
    if seconds.is_finite() && seconds >= 0.0 {
        seconds
    } else {
        0.0
    }
}

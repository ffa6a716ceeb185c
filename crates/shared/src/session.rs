use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::document::DocumentContext;
use crate::history::ConversationHistory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Empty,
    AwaitingResponse,
    Idle,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} is already waiting for a model response")]
    Busy(Uuid),
    #[error("turn belongs to session {turn_session}, not {session}")]
    ForeignTurn { session: Uuid, turn_session: Uuid },
    #[error("query is empty")]
    EmptyQuery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub session_id: Uuid,
    pub state: SessionState,
    pub turns: usize,
    pub document_name: Option<String>,
}

impl SessionStatus {
    pub fn has_document(&self) -> bool {
        self.document_name.is_some()
    }
}

/// Held by an in-flight turn. Dropping it releases the session.
#[derive(Debug)]
pub(crate) struct TurnGuard {
    in_flight: Arc<AtomicBool>,
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

/// Everything one chat session owns. Created at session start, reset by
/// "new chat", dropped at session end.
#[derive(Debug)]
pub struct SessionContext {
    id: Uuid,
    state: SessionState,
    in_flight: Arc<AtomicBool>,
    history: ConversationHistory,
    document: Option<DocumentContext>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Empty,
            in_flight: Arc::new(AtomicBool::new(false)),
            history: ConversationHistory::new(),
            document: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// `AwaitingResponse` while a turn is in flight, otherwise the state the
    /// last finished turn or reset left behind.
    pub fn state(&self) -> SessionState {
        if self.in_flight.load(Ordering::Acquire) {
            SessionState::AwaitingResponse
        } else {
            self.state
        }
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn document(&self) -> Option<&DocumentContext> {
        self.document.as_ref()
    }

    pub fn attach_document(&mut self, document: DocumentContext) {
        self.document = Some(document);
    }

    pub fn detach_document(&mut self) -> Option<DocumentContext> {
        self.document.take()
    }

    /// Clears history and document context in one step.
    pub fn reset(&mut self) {
        self.history.clear();
        self.document = None;
        self.state = SessionState::Empty;
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.id,
            state: self.state(),
            turns: self.history.turn_count(),
            document_name: self.document.as_ref().map(|document| document.name.clone()),
        }
    }

    pub(crate) fn start_turn(&mut self) -> Result<TurnGuard, SessionError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(SessionError::Busy(self.id));
        }
        Ok(TurnGuard {
            in_flight: Arc::clone(&self.in_flight),
        })
    }

    pub(crate) fn finish_turn(&mut self, guard: TurnGuard, user: String, assistant: String) {
        self.history.push_turn(user, assistant);
        self.state = SessionState::Idle;
        drop(guard);
    }
}

#[cfg(test)]
mod tests {
    use super::{SessionContext, SessionError, SessionState};
    use crate::document::DocumentContext;

    #[test]
    fn turns_move_through_states() {
        let mut session = SessionContext::new();
        assert_eq!(session.state(), SessionState::Empty);

        let guard = session.start_turn().expect("first turn should start");
        assert_eq!(session.state(), SessionState::AwaitingResponse);
        assert!(matches!(
            session.start_turn(),
            Err(SessionError::Busy(id)) if id == session.id()
        ));

        session.finish_turn(guard, "q".to_string(), "a".to_string());
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.status().turns, 1);
    }

    #[test]
    fn reset_clears_history_and_document() {
        let mut session = SessionContext::new();
        let id = session.id();
        session.attach_document(DocumentContext::from_text("doc.txt", "내용"));
        let guard = session.start_turn().expect("turn should start");
        session.finish_turn(guard, "q".to_string(), "a".to_string());

        session.reset();
        let status = session.status();

        assert_eq!(status.session_id, id);
        assert_eq!(status.state, SessionState::Empty);
        assert_eq!(status.turns, 0);
        assert!(!status.has_document());
        assert!(session.history().is_empty());
    }

    #[test]
    fn abandoned_turn_releases_the_session() {
        let mut session = SessionContext::new();
        let guard = session.start_turn().expect("turn should start");
        drop(guard);

        assert_eq!(session.state(), SessionState::Empty);
        assert_eq!(session.status().state, SessionState::Empty);
        assert!(session.start_turn().is_ok());
    }
}

//! Multi-turn chat sessions.
//!
//! Each session is an explicit value owned by whoever holds its id; there
//! is no process-wide "current" session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::{Role, Turn};
use crate::provider::GenerateRequest;

/// Unique identifier for a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One conversation with the model and its recent history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: SessionId,

    /// Prompt under test, applied as the system instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,

    pub history: Vec<Turn>,

    /// Turns kept in `history` (0 = unlimited)
    #[serde(default)]
    pub max_history: usize,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn new(system_instruction: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            system_instruction: system_instruction.filter(|s| !s.trim().is_empty()),
            history: Vec::new(),
            max_history: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    /// Append a turn and bump the update timestamp.
    ///
    /// Past `max_history`, the oldest turns are dropped and the history
    /// always starts on a user turn.
    pub fn push(&mut self, turn: Turn) {
        self.updated_at = Utc::now();
        self.history.push(turn);

        if self.max_history > 0 && self.history.len() > self.max_history {
            let excess = self.history.len() - self.max_history;
            self.history.drain(..excess);
            let leading_model = self
                .history
                .iter()
                .take_while(|t| t.role != Role::User)
                .count();
            self.history.drain(..leading_model);
        }
    }

    /// Build a request carrying the whole history plus the pending message.
    pub fn request_for(&self, model: &str, message: &str) -> GenerateRequest {
        let mut turns = self.history.clone();
        turns.push(Turn::user(message));
        GenerateRequest {
            model: model.to_string(),
            system_instruction: self.system_instruction.clone(),
            turns,
            ..GenerateRequest::text(model, "")
        }
    }

    /// Number of completed user/model exchanges still in history.
    pub fn exchange_count(&self) -> usize {
        self.history
            .iter()
            .filter(|t| t.role == Role::Model)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_get_distinct_ids() {
        let a = ChatSession::new(None);
        let b = ChatSession::new(None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn blank_system_instruction_is_dropped() {
        let s = ChatSession::new(Some("   ".into()));
        assert!(s.system_instruction.is_none());
    }

    #[test]
    fn request_carries_history_and_pending_message() {
        let mut s = ChatSession::new(Some("You are a barista.".into()));
        s.push(Turn::user("hi"));
        s.push(Turn::model("hello!"));

        let req = s.request_for("gemini-2.5-flash", "a latte please");
        assert_eq!(req.turns.len(), 3);
        assert_eq!(req.turns[2].text, "a latte please");
        assert_eq!(req.system_instruction.as_deref(), Some("You are a barista."));
        assert_eq!(s.exchange_count(), 1);
        // The session itself is untouched until the reply is recorded.
        assert_eq!(s.history.len(), 2);
    }

    #[test]
    fn history_is_capped_from_the_front() {
        let mut s = ChatSession::new(None).with_max_history(4);
        for i in 0..5 {
            s.push(Turn::user(format!("q{i}")));
            s.push(Turn::model(format!("a{i}")));
        }

        assert_eq!(s.history.len(), 4);
        assert_eq!(s.history[0].role, Role::User);
        assert_eq!(s.history[0].text, "q3");
        assert_eq!(s.history[3].text, "a4");
        assert_eq!(s.exchange_count(), 2);
    }

    #[test]
    fn odd_cap_never_leaves_a_model_turn_first() {
        let mut s = ChatSession::new(None).with_max_history(3);
        s.push(Turn::user("q0"));
        s.push(Turn::model("a0"));
        s.push(Turn::user("q1"));
        s.push(Turn::model("a1"));

        assert_eq!(s.history.len(), 2);
        assert_eq!(s.history[0].text, "q1");
        assert!(s.request_for("m", "q2").turns[0].role == Role::User);
    }

    #[test]
    fn zero_cap_keeps_everything() {
        let mut s = ChatSession::new(None);
        for i in 0..100 {
            s.push(Turn::user(format!("q{i}")));
        }
        assert_eq!(s.history.len(), 100);
    }
}

//! Session persistence collaborator.
//!
//! The pipeline never stores anything itself. Callers that keep sessions
//! implement [`SessionStore`] and call [`persist_turn`] after a successful
//! round-trip.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::depth::ConversationState;
use crate::error::SessionError;
use crate::input::validate_session_id;
use crate::provider::ChatMessage;

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_session_history(&self, session_id: &str) -> Result<Vec<ChatMessage>, SessionError>;

    /// Returns the new session id.
    async fn create_session(&self, first_message: &str) -> Result<String, SessionError>;

    async fn append_message(&self, session_id: &str, message: ChatMessage) -> Result<(), SessionError>;

    async fn mark_session_complete(&self, session_id: &str, core_belief: &str) -> Result<(), SessionError>;
}

/// Append the user/assistant pair and, when this turn completed the session,
/// mark it complete with the core-belief insight. Returns whether the session
/// was marked complete.
pub async fn persist_turn(
    store: &dyn SessionStore,
    session_id: &str,
    user_message: &str,
    assistant_message: &str,
    state: &ConversationState,
    newly_completed: bool,
) -> Result<bool, SessionError> {
    let session_id = validate_session_id(session_id)?;
    store
        .append_message(&session_id, ChatMessage::user(user_message))
        .await?;
    store
        .append_message(&session_id, ChatMessage::assistant(assistant_message))
        .await?;

    match (newly_completed, state.insights_by_layer.core_belief.as_deref()) {
        (true, Some(core_belief)) => {
            store.mark_session_complete(&session_id, core_belief).await?;
            tracing::info!(target: "optimism::session", session = %session_id, "session complete");
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Snapshot of one stored session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub title: String,
    pub messages: Vec<ChatMessage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub core_belief: Option<String>,
}

/// Process-local store for local runs and tests.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<String, SessionRecord>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.get(session_id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

fn title_from(first_message: &str) -> String {
    let trimmed = first_message.trim();
    let mut title: String = trimmed.chars().take(50).collect();
    if trimmed.chars().count() > 50 {
        title.push_str("...");
    }
    title
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_session_history(&self, session_id: &str) -> Result<Vec<ChatMessage>, SessionError> {
        self.sessions
            .get(session_id)
            .map(|r| r.messages.clone())
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    async fn create_session(&self, first_message: &str) -> Result<String, SessionError> {
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        self.sessions.insert(
            id.clone(),
            SessionRecord {
                id: id.clone(),
                title: title_from(first_message),
                messages: Vec::new(),
                created_at: now,
                updated_at: now,
                completed_at: None,
                core_belief: None,
            },
        );
        Ok(id)
    }

    async fn append_message(&self, session_id: &str, message: ChatMessage) -> Result<(), SessionError> {
        let mut record = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        record.messages.push(message);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_session_complete(&self, session_id: &str, core_belief: &str) -> Result<(), SessionError> {
        let mut record = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        let now = Utc::now();
        record.completed_at = Some(now);
        record.updated_at = now;
        record.core_belief = Some(core_belief.to_string());
        Ok(())
    }
}

// SPDX-FileCopyrightText: 2026 Kiosk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation store: append-only history with a bounded LLM-visible
//! window.
//!
//! Storage is authoritative and unbounded; the window handed to the LLM is
//! at most [`CONTEXT_WINDOW`] turns. Appends on one conversation are
//! serialized by a per-conversation async lock so timestamps assign in
//! arrival order.

use std::sync::Arc;

use dashmap::DashMap;
use kiosk_core::{Conversation, KioskError, Message, Role};
use kiosk_storage::{queries, Database};
use tokio::sync::Mutex;

/// Maximum number of stored turns the LLM ever sees.
pub const CONTEXT_WINDOW: usize = 20;

pub struct ConversationStore {
    db: Database,
    append_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ConversationStore {
    pub fn new(db: Database) -> Arc<Self> {
        Arc::new(Self {
            db,
            append_locks: DashMap::new(),
        })
    }

    /// The user's open conversation, opened on first contact.
    pub async fn open_or_get(
        &self,
        chat_id: &str,
        platform: &str,
    ) -> Result<Conversation, KioskError> {
        queries::conversations::open_or_get(&self.db, chat_id, platform).await
    }

    /// Append a message, serialized per conversation. Returns the stored row.
    pub async fn append(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
        metadata: Option<String>,
    ) -> Result<Message, KioskError> {
        let lock = self
            .append_locks
            .entry(conversation_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;
        queries::messages::append_message(&self.db, conversation_id, role, content, metadata).await
    }

    /// The last [`CONTEXT_WINDOW`] messages in chronological order.
    pub async fn recent_window(&self, conversation_id: &str) -> Result<Vec<Message>, KioskError> {
        queries::messages::recent_window(&self.db, conversation_id, CONTEXT_WINDOW).await
    }

    /// Timestamp of the user's most recent message, if any.
    pub async fn latest_activity(&self, chat_id: &str) -> Result<Option<String>, KioskError> {
        queries::messages::latest_activity(&self.db, chat_id).await
    }
}

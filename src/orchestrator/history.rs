//! Per-chat conversation history
//!
//! Requests for one chat may execute concurrently, but their turns are
//! appended in submission order. Each submission reserves a ticket; a
//! completion commits only once every earlier ticket for that chat has
//! committed (successfully or not).

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use crate::types::ChatMessage;

struct ChatLog {
    messages: Vec<ChatMessage>,
    next_ticket: u64,
    /// Next ticket allowed to commit.
    committed: watch::Sender<u64>,
}

impl ChatLog {
    fn new() -> Self {
        let (committed, _) = watch::channel(0);
        Self {
            messages: Vec::new(),
            next_ticket: 0,
            committed,
        }
    }
}

#[derive(Default)]
pub struct ConversationHistory {
    chats: Mutex<HashMap<String, ChatLog>>,
}

impl std::fmt::Debug for ConversationHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationHistory")
            .field("chats", &self.lock().len())
            .finish()
    }
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ChatLog>> {
        self.chats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve the next commit slot for `chat_id`.
    pub(crate) fn reserve(&self, chat_id: &str) -> u64 {
        let mut chats = self.lock();
        let log = chats.entry(chat_id.to_string()).or_insert_with(ChatLog::new);
        let ticket = log.next_ticket;
        log.next_ticket += 1;
        ticket
    }

    /// Wait for `ticket`'s turn, append `turns` (if any) and trim to
    /// `window`, then release the next ticket.
    pub(crate) async fn commit(&self, chat_id: &str, ticket: u64, turns: Option<[ChatMessage; 2]>, window: usize) {
        let mut rx = {
            let mut chats = self.lock();
            let log = chats.entry(chat_id.to_string()).or_insert_with(ChatLog::new);
            log.committed.subscribe()
        };
        if rx.wait_for(|next| *next >= ticket).await.is_err() {
            tracing::warn!(chat_id, ticket, "history log dropped while waiting to commit");
            return;
        }

        let mut chats = self.lock();
        let Some(log) = chats.get_mut(chat_id) else {
            return;
        };
        if let Some(turns) = turns {
            log.messages.extend(turns);
            trim(&mut log.messages, window);
        }
        log.committed.send_modify(|next| *next = (*next).max(ticket + 1));
    }

    /// Last `window` messages of `chat_id`.
    pub fn context(&self, chat_id: &str, window: usize) -> Vec<ChatMessage> {
        self.lock()
            .get(chat_id)
            .map(|log| {
                let skip = log.messages.len().saturating_sub(window);
                log.messages[skip..].to_vec()
            })
            .unwrap_or_default()
    }

    pub fn messages(&self, chat_id: &str) -> Vec<ChatMessage> {
        self.lock()
            .get(chat_id)
            .map(|log| log.messages.clone())
            .unwrap_or_default()
    }

    /// Forget the messages of `chat_id`. Pending tickets still commit in
    /// order.
    pub fn clear(&self, chat_id: &str) {
        if let Some(log) = self.lock().get_mut(chat_id) {
            log.messages.clear();
        }
    }

    pub fn message_counts(&self) -> BTreeMap<String, usize> {
        self.lock()
            .iter()
            .map(|(id, log)| (id.clone(), log.messages.len()))
            .collect()
    }
}

fn trim(messages: &mut Vec<ChatMessage>, window: usize) {
    if messages.len() > window {
        messages.drain(..messages.len() - window);
    }
}

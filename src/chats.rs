use std::collections::HashSet;

use tracing::debug;

use crate::engine::{Chat, ChatCursor, ChatId, Engine, EngineError};

/// Chats fetched so far, in fetch order.
///
/// The directory only grows. Once the engine returns an empty page it is
/// marked complete and never asks again.
#[derive(Debug, Default)]
pub struct ChatDirectory {
    chats: Vec<Chat>,
    known: HashSet<ChatId>,
    complete: bool,
}

impl ChatDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chats(&self) -> &[Chat] {
        &self.chats
    }

    pub fn len(&self) -> usize {
        self.chats.len()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    fn cursor(&self) -> ChatCursor {
        self.chats
            .last()
            .map(ChatCursor::after)
            .unwrap_or(ChatCursor::START)
    }

    /// Pages through the engine until `target` chats are held or the list is
    /// exhausted. A failed detail lookup stops the fill and is returned; chats
    /// appended before it are kept.
    pub async fn fill<E>(&mut self, engine: &E, target: usize) -> Result<(), EngineError>
    where
        E: Engine + ?Sized,
    {
        while !self.complete && self.chats.len() < target {
            let cursor = self.cursor();
            let limit = target - self.chats.len();
            let ids = engine.chat_page(cursor, limit).await?;
            debug!(?cursor, limit, returned = ids.len(), "fetched chat page");

            if ids.is_empty() {
                self.complete = true;
                break;
            }

            let before = self.chats.len();
            for id in ids {
                if self.known.contains(&id) {
                    continue;
                }
                let chat = engine.chat(id).await?;
                self.known.insert(chat.id);
                self.chats.push(chat);
            }

            if self.chats.len() == before {
                debug!("chat page repeated known chats; treating list as complete");
                self.complete = true;
            }
        }
        Ok(())
    }
}

//! Chat storage

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::model::{Message, User};
use crate::error::Result;

/// Default cap on retained messages
pub const DEFAULT_MAX_MESSAGES: usize = 1000;

/// Users and the message log
#[async_trait]
pub trait Store: Send + Sync {
    /// Look up a user by id
    async fn user(&self, id: &str) -> Result<Option<User>>;

    /// Look up a user by nickname
    async fn user_by_nickname(&self, nickname: &str) -> Result<Option<User>>;

    /// Insert `user` unless its nickname is taken; returns the stored user
    async fn insert_user(&self, user: User) -> Result<User>;

    /// Append a message to the log
    async fn append_message(&self, message: Message) -> Result<()>;

    /// All retained messages, oldest first
    async fn messages(&self) -> Result<Vec<Message>>;
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<String, User>,
    nicknames: HashMap<String, String>,
    messages: VecDeque<Message>,
}

/// In-memory [`Store`]
///
/// Keeps at most `max_messages` messages, evicting the oldest.
#[derive(Debug)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    max_messages: usize,
}

impl MemoryStore {
    /// Empty store with the default message cap
    pub fn new() -> Self {
        Self::with_max_messages(DEFAULT_MAX_MESSAGES)
    }

    /// Empty store keeping at most `max_messages` messages
    pub fn with_max_messages(max_messages: usize) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            max_messages: max_messages.max(1),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn user(&self, id: &str) -> Result<Option<User>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.users.get(id).cloned())
    }

    async fn user_by_nickname(&self, nickname: &str) -> Result<Option<User>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables
            .nicknames
            .get(nickname)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn insert_user(&self, user: User) -> Result<User> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = tables
            .nicknames
            .get(&user.nickname)
            .and_then(|id| tables.users.get(id))
        {
            return Ok(existing.clone());
        }

        tables.nicknames.insert(user.nickname.clone(), user.id.clone());
        tables.users.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    async fn append_message(&self, message: Message) -> Result<()> {
        let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);

        tables.messages.push_back(message);
        while tables.messages.len() > self.max_messages {
            tables.messages.pop_front();
        }
        Ok(())
    }

    async fn messages(&self) -> Result<Vec<Message>> {
        let tables = self.tables.read().unwrap_or_else(PoisonError::into_inner);
        Ok(tables.messages.iter().cloned().collect())
    }
}

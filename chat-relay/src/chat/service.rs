//! Chat services
//!
//! [`UserService`] handles nickname logins. [`MessageService`] stores new
//! messages and publishes them to every subscriber.

use std::sync::Arc;

use super::model::{Message, User};
use super::store::Store;
use crate::error::{Error, Result};
use crate::ids::SubscriberId;
use crate::pubsub::{PubSub, SubscriberChannel};

/// Nickname-based login
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn Store>,
}

impl UserService {
    /// Create a service over `store`
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Return the user with `nickname`, creating it on first login
    pub async fn login(&self, nickname: &str) -> Result<User> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(Error::ValidationError("nickname must not be empty".to_string()));
        }

        if let Some(user) = self.store.user_by_nickname(nickname).await? {
            tracing::debug!(user_id = %user.id, "Existing user logged in");
            return Ok(user);
        }

        let user = self.store.insert_user(User::new(nickname)).await?;
        tracing::info!(user_id = %user.id, nickname = %user.nickname, "User created");
        Ok(user)
    }

    /// Look up a user by id
    pub async fn user(&self, id: &str) -> Result<Option<User>> {
        self.store.user(id).await
    }
}

/// Message log and live fan-out
#[derive(Clone)]
pub struct MessageService {
    store: Arc<dyn Store>,
    bus: Arc<dyn PubSub<Message>>,
}

impl MessageService {
    /// Create a service storing into `store` and publishing on `bus`
    pub fn new(store: Arc<dyn Store>, bus: Arc<dyn PubSub<Message>>) -> Self {
        Self { store, bus }
    }

    /// Store and publish a new message from `user_id`
    ///
    /// A failed publish is logged; the message is still stored and returned.
    pub async fn send_message(&self, user_id: &str, content: &str) -> Result<Message> {
        if content.trim().is_empty() {
            return Err(Error::ValidationError("content must not be empty".to_string()));
        }

        let user = self
            .store
            .user(user_id)
            .await?
            .ok_or_else(|| Error::NotFound("user not found".to_string()))?;

        let message = Message::new(user, content);
        self.store.append_message(message.clone()).await?;

        if let Err(e) = self.bus.publish(Arc::new(message.clone())).await {
            tracing::error!(
                message_id = %message.id,
                backend = %self.bus.backend(),
                error = %e,
                "Failed to publish message"
            );
        }

        Ok(message)
    }

    /// Message history, oldest first
    pub async fn messages(&self) -> Result<Vec<Message>> {
        self.store.messages().await
    }

    /// Open a live subscription for new messages
    pub fn subscribe(&self, id: SubscriberId) -> SubscriberChannel<Message> {
        self.bus.subscribe(id)
    }

    /// Close a live subscription
    pub fn unsubscribe(&self, id: &SubscriberId) {
        self.bus.unsubscribe(id)
    }
}

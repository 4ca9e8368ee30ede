//! Redis-backed chat storage
//!
//! Layout under the key prefix:
//!
//! - `<prefix>:user:<id>`: user as JSON
//! - `<prefix>:nicknames`: hash of nickname to user id
//! - `<prefix>:messages`: sorted set of JSON messages scored by insert time,
//!   trimmed to the newest `max_messages` and expiring a day after the last write

use std::ops::DerefMut;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::Pool;

use super::model::{Message, User};
use super::store::{Store, DEFAULT_MAX_MESSAGES};
use crate::error::Result;

/// Default key prefix
pub const DEFAULT_KEY_PREFIX: &str = "chat:store";

/// Message log lifetime after the most recent append
pub const MESSAGE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// [`Store`] shared by every process connected to the same Redis
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    key_prefix: String,
    max_messages: usize,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("key_prefix", &self.key_prefix)
            .field("max_messages", &self.max_messages)
            .finish()
    }
}

impl RedisStore {
    /// Store on `pool` with the default prefix and message cap
    pub fn new(pool: Pool) -> Self {
        Self {
            pool,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            max_messages: DEFAULT_MAX_MESSAGES,
        }
    }

    /// Use a different key prefix
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Keep at most `max_messages` messages
    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = max_messages.max(1);
        self
    }

    fn user_key(&self, id: &str) -> String {
        format!("{}:user:{}", self.key_prefix, id)
    }

    fn nicknames_key(&self) -> String {
        format!("{}:nicknames", self.key_prefix)
    }

    fn messages_key(&self) -> String {
        format!("{}:messages", self.key_prefix)
    }

    /// `ZREMRANGEBYRANK` stop index that keeps the newest `max_messages`
    fn trim_stop(&self) -> i64 {
        -(self.max_messages as i64) - 1
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn user(&self, id: &str) -> Result<Option<User>> {
        let mut conn = self.connection().await?;

        let raw: Option<String> = redis::cmd("GET")
            .arg(self.user_key(id))
            .query_async(conn.deref_mut())
            .await?;

        Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
    }

    async fn user_by_nickname(&self, nickname: &str) -> Result<Option<User>> {
        let id: Option<String> = {
            let mut conn = self.connection().await?;
            redis::cmd("HGET")
                .arg(self.nicknames_key())
                .arg(nickname)
                .query_async(conn.deref_mut())
                .await?
        };

        match id {
            Some(id) => self.user(&id).await,
            None => Ok(None),
        }
    }

    async fn insert_user(&self, user: User) -> Result<User> {
        let payload = serde_json::to_string(&user)?;
        let user_key = self.user_key(&user.id);

        {
            let mut conn = self.connection().await?;

            let _: () = redis::cmd("SET")
                .arg(&user_key)
                .arg(&payload)
                .query_async(conn.deref_mut())
                .await?;

            let claimed: bool = redis::cmd("HSETNX")
                .arg(self.nicknames_key())
                .arg(&user.nickname)
                .arg(&user.id)
                .query_async(conn.deref_mut())
                .await?;

            if claimed {
                tracing::debug!(user_id = %user.id, "Stored user in Redis");
                return Ok(user);
            }

            let _: () = redis::cmd("DEL")
                .arg(&user_key)
                .query_async(conn.deref_mut())
                .await?;
        }

        match self.user_by_nickname(&user.nickname).await? {
            Some(existing) => Ok(existing),
            None => Ok(user),
        }
    }

    async fn append_message(&self, message: Message) -> Result<()> {
        let payload = serde_json::to_string(&message)?;
        let key = self.messages_key();
        let score = Utc::now().timestamp_micros();

        let mut conn = self.connection().await?;

        let _: () = redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(&key)
            .arg(score)
            .arg(&payload)
            .ignore()
            .cmd("ZREMRANGEBYRANK")
            .arg(&key)
            .arg(0)
            .arg(self.trim_stop())
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(MESSAGE_TTL.as_secs() as i64)
            .ignore()
            .query_async(conn.deref_mut())
            .await?;

        Ok(())
    }

    async fn messages(&self) -> Result<Vec<Message>> {
        let mut conn = self.connection().await?;

        let raw: Vec<String> = redis::cmd("ZRANGE")
            .arg(self.messages_key())
            .arg(0)
            .arg(-1)
            .query_async(conn.deref_mut())
            .await?;

        Ok(raw
            .iter()
            .filter_map(|entry| match serde_json::from_str(entry) {
                Ok(message) => Some(message),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping undecodable message in Redis log");
                    None
                }
            })
            .collect())
    }
}

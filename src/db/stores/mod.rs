use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::DatabaseError;
use super::models::{Channel, NotificationThread, Standup, Standuper};

#[async_trait]
pub trait ChannelStore: Send + Sync {
    /// Channels with a standup deadline, in insertion order.
    async fn list_channels_with_deadline(&self) -> Result<Vec<Channel>, DatabaseError>;
    async fn create_channel(&self, channel: &Channel) -> Result<Channel, DatabaseError>;
}

#[async_trait]
pub trait StanduperStore: Send + Sync {
    async fn list_standupers(&self, channel_id: &str) -> Result<Vec<Standuper>, DatabaseError>;
    async fn list_all_standupers(&self) -> Result<Vec<Standuper>, DatabaseError>;
    async fn create_standuper(&self, standuper: &Standuper) -> Result<Standuper, DatabaseError>;
}

#[async_trait]
pub trait StandupStore: Send + Sync {
    /// Distinct user ids with a standup in `channel_id` during `[start, end)`.
    async fn list_submitters_in_window(
        &self,
        channel_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>, DatabaseError>;
    async fn create_standup(&self, standup: &Standup) -> Result<Standup, DatabaseError>;
}

#[async_trait]
pub trait NotificationThreadStore: Send + Sync {
    async fn get_notification_thread(
        &self,
        channel_id: &str,
    ) -> Result<Option<NotificationThread>, DatabaseError>;
    async fn create_notification_thread(
        &self,
        thread: &NotificationThread,
    ) -> Result<NotificationThread, DatabaseError>;
    /// Increments the reminder counter and stores `notification_time`.
    async fn update_notification_thread(
        &self,
        id: i64,
        channel_id: &str,
        notification_time: i64,
    ) -> Result<(), DatabaseError>;
    async fn delete_notification_thread(&self, id: i64) -> Result<(), DatabaseError>;
}

/// The store handles the notifier works against.
#[derive(Clone)]
pub struct Stores {
    pub channels: Arc<dyn ChannelStore>,
    pub standupers: Arc<dyn StanduperStore>,
    pub standups: Arc<dyn StandupStore>,
    pub threads: Arc<dyn NotificationThreadStore>,
}

impl Stores {
    /// Reads a channel's thread, treating a missing row as the zero thread.
    pub async fn notification_thread_or_zero(
        &self,
        channel_id: &str,
    ) -> Result<NotificationThread, DatabaseError> {
        Ok(self
            .threads
            .get_notification_thread(channel_id)
            .await?
            .unwrap_or_else(NotificationThread::zero))
    }
}

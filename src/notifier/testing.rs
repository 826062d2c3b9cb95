//! In-memory stores and a recording chat gateway for notifier tests.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::chat::{ChatGateway, DeliveryError};
use crate::db::{
    Channel, ChannelStore, DatabaseError, NotificationThread, NotificationThreadStore, Standup,
    StandupStore, Standuper, StanduperRole, StanduperStore, Stores,
};
use crate::utils::clock;

pub fn standuper(user_id: &str, channel_id: &str) -> Standuper {
    Standuper {
        id: 0,
        team_id: "T1".to_string(),
        user_id: user_id.to_string(),
        username: user_id.to_lowercase(),
        channel_id: channel_id.to_string(),
        role: StanduperRole::Developer,
        submitted_standup_today: false,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

pub fn channel(channel_id: &str, deadline: &str) -> Channel {
    Channel {
        id: 0,
        team_id: "T1".to_string(),
        channel_id: channel_id.to_string(),
        channel_name: channel_id.to_lowercase(),
        standup_time: clock::parse_clock(deadline),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    }
}

#[derive(Default)]
struct State {
    channels: Vec<Channel>,
    standupers: Vec<Standuper>,
    standups: Vec<Standup>,
    threads: Vec<NotificationThread>,
    next_id: i64,
    failing: HashSet<String>,
    stalled: HashSet<String>,
    fail_channel_listing: bool,
    fail_workspace_listing: bool,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn check(&self, channel_id: &str) -> Result<(), DatabaseError> {
        if self.failing.contains(channel_id) {
            Err(DatabaseError::Query(format!("{channel_id} is unavailable")))
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<State>>,
}

impl FakeStore {
    pub fn stores(&self) -> Stores {
        Stores {
            channels: Arc::new(self.clone()),
            standupers: Arc::new(self.clone()),
            standups: Arc::new(self.clone()),
            threads: Arc::new(self.clone()),
        }
    }

    pub fn add_channel(&self, mut channel: Channel) -> Channel {
        let mut state = self.state.lock();
        channel.id = state.next_id();
        state.channels.push(channel.clone());
        channel
    }

    pub fn add_standuper(&self, user_id: &str, channel_id: &str) {
        let mut state = self.state.lock();
        let mut member = standuper(user_id, channel_id);
        member.id = state.next_id();
        state.standupers.push(member);
    }

    pub fn add_standup(&self, user_id: &str, channel_id: &str, at: DateTime<Utc>) {
        let mut state = self.state.lock();
        let id = state.next_id();
        state.standups.push(Standup {
            id,
            team_id: "T1".to_string(),
            user_id: user_id.to_string(),
            channel_id: channel_id.to_string(),
            comment: "yesterday: things, today: more things".to_string(),
            created_at: at,
        });
    }

    pub fn put_thread(&self, mut thread: NotificationThread) {
        let mut state = self.state.lock();
        thread.id = state.next_id();
        state.threads.push(thread);
    }

    pub fn thread(&self, channel_id: &str) -> Option<NotificationThread> {
        self.state
            .lock()
            .threads
            .iter()
            .find(|t| t.channel_id == channel_id)
            .cloned()
    }

    /// Every per-channel read for `channel_id` fails from now on.
    pub fn fail_channel(&self, channel_id: &str) {
        self.state.lock().failing.insert(channel_id.to_string());
    }

    /// Per-channel standuper reads for `channel_id` hang for a long time.
    pub fn stall_channel(&self, channel_id: &str) {
        self.state.lock().stalled.insert(channel_id.to_string());
    }

    pub fn fail_channel_listing(&self) {
        self.state.lock().fail_channel_listing = true;
    }

    pub fn fail_workspace_listing(&self) {
        self.state.lock().fail_workspace_listing = true;
    }
}

#[async_trait]
impl ChannelStore for FakeStore {
    async fn list_channels_with_deadline(&self) -> Result<Vec<Channel>, DatabaseError> {
        let state = self.state.lock();
        if state.fail_channel_listing {
            return Err(DatabaseError::Connection("store offline".to_string()));
        }
        Ok(state
            .channels
            .iter()
            .filter(|c| c.standup_time.is_some())
            .cloned()
            .collect())
    }

    async fn create_channel(&self, channel: &Channel) -> Result<Channel, DatabaseError> {
        Ok(self.add_channel(channel.clone()))
    }
}

#[async_trait]
impl StanduperStore for FakeStore {
    async fn list_standupers(&self, channel_id: &str) -> Result<Vec<Standuper>, DatabaseError> {
        let stalled = self.state.lock().stalled.contains(channel_id);
        if stalled {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        let state = self.state.lock();
        state.check(channel_id)?;
        Ok(state
            .standupers
            .iter()
            .filter(|s| s.channel_id == channel_id)
            .cloned()
            .collect())
    }

    async fn list_all_standupers(&self) -> Result<Vec<Standuper>, DatabaseError> {
        let state = self.state.lock();
        if state.fail_workspace_listing {
            return Err(DatabaseError::Connection("store offline".to_string()));
        }
        Ok(state.standupers.clone())
    }

    async fn create_standuper(&self, standuper: &Standuper) -> Result<Standuper, DatabaseError> {
        let mut state = self.state.lock();
        let mut member = standuper.clone();
        member.id = state.next_id();
        state.standupers.push(member.clone());
        Ok(member)
    }
}

#[async_trait]
impl StandupStore for FakeStore {
    async fn list_submitters_in_window(
        &self,
        channel_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>, DatabaseError> {
        let state = self.state.lock();
        state.check(channel_id)?;
        let mut users: Vec<String> = Vec::new();
        for standup in state.standups.iter().filter(|s| {
            s.channel_id == channel_id && s.created_at >= start && s.created_at < end
        }) {
            if !users.contains(&standup.user_id) {
                users.push(standup.user_id.clone());
            }
        }
        Ok(users)
    }

    async fn create_standup(&self, standup: &Standup) -> Result<Standup, DatabaseError> {
        let mut state = self.state.lock();
        let mut standup = standup.clone();
        standup.id = state.next_id();
        state.standups.push(standup.clone());
        Ok(standup)
    }
}

#[async_trait]
impl NotificationThreadStore for FakeStore {
    async fn get_notification_thread(
        &self,
        channel_id: &str,
    ) -> Result<Option<NotificationThread>, DatabaseError> {
        let state = self.state.lock();
        state.check(channel_id)?;
        Ok(state
            .threads
            .iter()
            .find(|t| t.channel_id == channel_id)
            .cloned())
    }

    async fn create_notification_thread(
        &self,
        thread: &NotificationThread,
    ) -> Result<NotificationThread, DatabaseError> {
        let mut state = self.state.lock();
        if state.threads.iter().any(|t| t.channel_id == thread.channel_id) {
            return Err(DatabaseError::Query(format!(
                "duplicate notification thread for {}",
                thread.channel_id
            )));
        }
        let mut thread = thread.clone();
        thread.id = state.next_id();
        state.threads.push(thread.clone());
        Ok(thread)
    }

    async fn update_notification_thread(
        &self,
        id: i64,
        channel_id: &str,
        notification_time: i64,
    ) -> Result<(), DatabaseError> {
        let mut state = self.state.lock();
        let thread = state
            .threads
            .iter_mut()
            .find(|t| t.id == id && t.channel_id == channel_id)
            .ok_or_else(|| DatabaseError::Query(format!("thread {id} not found")))?;
        thread.notification_time = notification_time;
        thread.reminder_counter += 1;
        Ok(())
    }

    async fn delete_notification_thread(&self, id: i64) -> Result<(), DatabaseError> {
        self.state.lock().threads.retain(|t| t.id != id);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Channel { channel_id: String, text: String },
    Direct { user_id: String, text: String },
}

#[derive(Default)]
pub struct RecordingChat {
    sent: Mutex<Vec<Sent>>,
    rejected: Mutex<HashSet<String>>,
    channel_delay: Mutex<Option<Duration>>,
    direct_delay: Mutex<Option<Duration>>,
}

impl RecordingChat {
    /// Channel sends to `channel_id` fail with an API error.
    pub fn reject_channel(&self, channel_id: &str) {
        self.rejected.lock().insert(channel_id.to_string());
    }

    /// Every channel send waits `delay` before it is recorded.
    pub fn delay_channel_sends(&self, delay: Duration) {
        *self.channel_delay.lock() = Some(delay);
    }

    /// Every direct send waits `delay` before it is recorded.
    pub fn delay_direct_sends(&self, delay: Duration) {
        *self.direct_delay.lock() = Some(delay);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    pub fn channel_messages(&self, channel_id: &str) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|sent| match sent {
                Sent::Channel {
                    channel_id: id,
                    text,
                } if id == channel_id => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn direct_recipients(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter_map(|sent| match sent {
                Sent::Direct { user_id, .. } => Some(user_id.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatGateway for RecordingChat {
    async fn send_channel_message(
        &self,
        channel_id: &str,
        text: &str,
    ) -> Result<(), DeliveryError> {
        let delay = *self.channel_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.rejected.lock().contains(channel_id) {
            return Err(DeliveryError::Api("channel_not_found".to_string()));
        }
        self.sent.lock().push(Sent::Channel {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_direct_message(&self, user_id: &str, text: &str) -> Result<(), DeliveryError> {
        let delay = *self.direct_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().push(Sent::Direct {
            user_id: user_id.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }
}

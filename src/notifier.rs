//! Reminder and escalation engine.
//!
//! Two jobs run on the same check interval: the reminder job walks every
//! monitored channel through the escalation tracker, and the digest job sends
//! the manager summary once a day at the configured minute.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::chat::{ChatGateway, DeliveryError};
use crate::config::{ConfigError, NotifierConfig};
use crate::db::{Channel, DatabaseError, Stores};
use crate::web::metrics::Metrics;

pub mod digest;
pub mod escalation;
pub mod messages;
pub mod resolver;

#[cfg(test)]
pub(crate) mod testing;

use self::digest::{DigestReport, DigestSettings, ManagerDigest};
use self::escalation::{EscalationPolicy, EscalationTracker, Transition};

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error(transparent)]
    Store(#[from] DatabaseError),
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone)]
pub struct NotifierSettings {
    pub check_interval: Duration,
    pub report_time: NaiveTime,
    pub manager_channel_id: String,
    pub manager_user_id: Option<String>,
    pub repeat_interval: Duration,
    pub max_repeats: u32,
    pub call_timeout: Duration,
    pub max_concurrent_channels: usize,
}

impl NotifierSettings {
    pub fn from_config(config: &NotifierConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            check_interval: config.check_interval(),
            report_time: config.report_time()?,
            manager_channel_id: config.manager_channel_id.clone(),
            manager_user_id: config
                .manager_user_id
                .clone()
                .filter(|id| !id.trim().is_empty()),
            repeat_interval: config.reminder_repeat_interval(),
            max_repeats: config.reminder_repeat_count,
            call_timeout: config.call_timeout(),
            max_concurrent_channels: config.max_concurrent_channels,
        })
    }

    fn escalation_policy(&self) -> EscalationPolicy {
        EscalationPolicy {
            repeat_interval_secs: i64::try_from(self.repeat_interval.as_secs())
                .unwrap_or(i64::MAX),
            max_repeats: i32::try_from(self.max_repeats).unwrap_or(i32::MAX),
        }
    }

    fn digest_settings(&self) -> DigestSettings {
        DigestSettings {
            report_time: self.report_time,
            manager_channel_id: self.manager_channel_id.clone(),
            manager_user_id: self.manager_user_id.clone(),
            call_timeout: self.call_timeout,
        }
    }
}

/// Outcome of one reminder job tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub channels: usize,
    pub transitions: Vec<(String, Transition)>,
    pub failed: usize,
}

pub struct Notifier {
    settings: NotifierSettings,
    stores: Stores,
    tracker: EscalationTracker,
    digest: ManagerDigest,
    channel_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Notifier {
    pub fn new(settings: NotifierSettings, stores: Stores, chat: Arc<dyn ChatGateway>) -> Self {
        Self {
            tracker: EscalationTracker::new(
                stores.clone(),
                chat.clone(),
                settings.escalation_policy(),
                settings.call_timeout,
            ),
            digest: ManagerDigest::new(stores.clone(), chat, settings.digest_settings()),
            channel_locks: Mutex::new(HashMap::new()),
            stores,
            settings,
        }
    }

    /// Evaluates every monitored channel once. A failing channel is logged
    /// and counted; it never stops the others.
    pub async fn run_reminder_tick(&self, now: DateTime<Utc>) -> TickReport {
        Metrics::reminder_tick();

        let channels = match self.stores.channels.list_channels_with_deadline().await {
            Ok(channels) => channels,
            Err(err) => {
                Metrics::store_failed();
                error!("failed to list monitored channels: {}", err);
                return TickReport::default();
            }
        };

        let outcomes: Vec<(String, Result<Transition, NotifierError>)> = stream::iter(channels)
            .map(|channel| async move {
                let outcome = self.evaluate_channel(&channel, now).await;
                (channel.channel_id, outcome)
            })
            .buffered(self.settings.max_concurrent_channels.max(1))
            .collect()
            .await;

        let mut report = TickReport {
            channels: outcomes.len(),
            ..TickReport::default()
        };
        for (channel_id, outcome) in outcomes {
            match outcome {
                Ok(transition) => report.transitions.push((channel_id, transition)),
                Err(NotifierError::Timeout(after)) => {
                    Metrics::step_timed_out();
                    warn!(channel_id = %channel_id, "store call timed out after {:?}", after);
                    report.failed += 1;
                }
                Err(err) => {
                    Metrics::store_failed();
                    error!(channel_id = %channel_id, "channel step failed: {}", err);
                    report.failed += 1;
                }
            }
        }
        report
    }

    pub async fn run_digest_tick(&self, now: DateTime<Utc>) -> Option<DigestReport> {
        match self.digest.run(now).await {
            Ok(report) => report,
            Err(err) => {
                Metrics::store_failed();
                error!("manager digest failed: {}", err);
                None
            }
        }
    }

    async fn evaluate_channel(
        &self,
        channel: &Channel,
        now: DateTime<Utc>,
    ) -> Result<Transition, NotifierError> {
        let lock = self.channel_lock(&channel.channel_id);
        let _guard = lock.lock().await;
        self.tracker.evaluate(channel, now).await
    }

    fn channel_lock(&self, channel_id: &str) -> Arc<AsyncMutex<()>> {
        self.channel_locks
            .lock()
            .entry(channel_id.to_string())
            .or_default()
            .clone()
    }

    /// Starts both jobs. They stop after the in-flight tick once `shutdown`
    /// flips to `true` or its sender is dropped.
    pub fn spawn(self: &Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(self.clone().reminder_job(shutdown.clone())),
            tokio::spawn(self.clone().digest_job(shutdown)),
        ]
    }

    async fn reminder_job(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval = ?self.settings.check_interval, "reminder job started");

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.run_reminder_tick(Utc::now()).await;
                    debug!(channels = report.channels, failed = report.failed, "reminder tick finished");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("reminder job stopped");
    }

    async fn digest_job(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.settings.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(report_time = %self.settings.report_time, "digest job started");

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_digest_tick(Utc::now()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("digest job stopped");
    }
}

/// Runs one store call, giving up after `limit`.
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, DatabaseError>>,
) -> Result<T, NotifierError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| NotifierError::Timeout(limit))?
        .map_err(NotifierError::from)
}

async fn send_bounded(
    limit: Duration,
    send: impl Future<Output = Result<(), DeliveryError>>,
) -> Result<(), DeliveryError> {
    tokio::time::timeout(limit, send)
        .await
        .unwrap_or(Err(DeliveryError::Timeout))
}

async fn deliver_to_channel(
    chat: &dyn ChatGateway,
    limit: Duration,
    channel_id: &str,
    text: &str,
) -> bool {
    match send_bounded(limit, chat.send_channel_message(channel_id, text)).await {
        Ok(()) => true,
        Err(err) => {
            Metrics::delivery_failed();
            warn!(channel_id = %channel_id, "failed to deliver channel message: {}", err);
            false
        }
    }
}

async fn deliver_direct(
    chat: &dyn ChatGateway,
    limit: Duration,
    user_id: &str,
    text: &str,
) -> bool {
    match send_bounded(limit, chat.send_direct_message(user_id, text)).await {
        Ok(()) => true,
        Err(err) => {
            Metrics::delivery_failed();
            warn!(user_id = %user_id, "failed to deliver direct message: {}", err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{DateTime, NaiveTime, TimeZone, Utc};
    use tokio::sync::watch;

    use super::escalation::Transition;
    use super::testing::{FakeStore, RecordingChat, Sent, channel};
    use super::{Notifier, NotifierSettings};
    use crate::config::NotifierConfig;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, hour, minute, 0).unwrap()
    }

    fn settings() -> NotifierSettings {
        NotifierSettings {
            check_interval: Duration::from_secs(60),
            report_time: NaiveTime::from_hms_opt(18, 0, 0).expect("time"),
            manager_channel_id: "CMGR".to_string(),
            manager_user_id: None,
            repeat_interval: Duration::from_secs(60),
            max_repeats: 5,
            call_timeout: Duration::from_millis(200),
            max_concurrent_channels: 1,
        }
    }

    fn notifier(store: &FakeStore, chat: &Arc<RecordingChat>, settings: NotifierSettings) -> Notifier {
        Notifier::new(settings, store.stores(), chat.clone())
    }

    #[test]
    fn settings_from_config() {
        let config: NotifierConfig = serde_yaml::from_str(
            "manager_report_time: \"17:30\"\nmanager_channel_id: CMGR\nmanager_user_id: \" \"\nreminder_repeat_count: 3",
        )
        .expect("parse");
        let settings = NotifierSettings::from_config(&config).expect("settings");

        assert_eq!(settings.report_time, NaiveTime::from_hms_opt(17, 30, 0).expect("time"));
        assert_eq!(settings.manager_user_id, None);
        assert_eq!(settings.max_repeats, 3);
        assert_eq!(settings.repeat_interval, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn deadline_scenario_across_channels() {
        let store = FakeStore::default();
        let chat = Arc::new(RecordingChat::default());
        store.add_channel(channel("C1", "12:00"));
        store.add_channel(channel("C2", "12:00"));
        store.add_channel(channel("C3", "09:00"));
        store.add_standuper("UA", "C1");
        store.add_standuper("UB", "C1");
        store.add_standuper("UC", "C2");
        store.add_standup("UA", "C1", at(8, 15));
        store.add_standup("UC", "C2", at(8, 20));

        let notifier = notifier(&store, &chat, settings());
        let report = notifier.run_reminder_tick(at(12, 0)).await;

        assert_eq!(report.channels, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(
            report.transitions,
            vec![
                ("C1".to_string(), Transition::Notify),
                ("C2".to_string(), Transition::Congratulate),
                ("C3".to_string(), Transition::Idle),
            ]
        );
        assert_eq!(chat.direct_recipients(), vec!["UB".to_string()]);
        assert!(chat.channel_messages("C3").is_empty());
    }

    #[tokio::test]
    async fn failing_channel_does_not_stop_the_tick() {
        let store = FakeStore::default();
        let chat = Arc::new(RecordingChat::default());
        store.add_channel(channel("C1", "12:00"));
        store.add_channel(channel("C2", "12:00"));
        store.add_standuper("UA", "C1");
        store.add_standuper("UB", "C2");
        store.fail_channel("C1");

        let notifier = notifier(&store, &chat, settings());
        let report = notifier.run_reminder_tick(at(12, 0)).await;

        assert_eq!(report.failed, 1);
        assert_eq!(
            report.transitions,
            vec![("C2".to_string(), Transition::Notify)]
        );
        assert!(chat.channel_messages("C1").is_empty());
        assert_eq!(chat.channel_messages("C2").len(), 1);
    }

    #[tokio::test]
    async fn slow_channel_times_out_without_blocking_others() {
        let store = FakeStore::default();
        let chat = Arc::new(RecordingChat::default());
        store.add_channel(channel("C1", "12:00"));
        store.add_channel(channel("C2", "12:00"));
        store.add_standuper("UA", "C1");
        store.add_standuper("UB", "C2");
        store.stall_channel("C1");

        let notifier = notifier(&store, &chat, settings());
        let report = notifier.run_reminder_tick(at(12, 0)).await;

        assert_eq!(report.failed, 1);
        assert_eq!(chat.channel_messages("C2").len(), 1);
        assert!(store.thread("C1").is_none());
    }

    #[tokio::test]
    async fn slow_direct_messages_all_reach_their_users() {
        let store = FakeStore::default();
        let chat = Arc::new(RecordingChat::default());
        store.add_channel(channel("C1", "12:00"));
        for user in ["UA", "UB", "UC", "UD"] {
            store.add_standuper(user, "C1");
        }
        chat.delay_direct_sends(Duration::from_millis(120));

        let notifier = notifier(&store, &chat, settings());
        let report = notifier.run_reminder_tick(at(12, 0)).await;

        assert_eq!(report.failed, 0);
        assert_eq!(
            report.transitions,
            vec![("C1".to_string(), Transition::Notify)]
        );
        assert_eq!(chat.channel_messages("C1").len(), 1);
        assert_eq!(
            chat.direct_recipients(),
            vec!["UA", "UB", "UC", "UD"]
                .into_iter()
                .map(str::to_string)
                .collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn hung_direct_message_is_dropped_and_the_thread_kept() {
        let store = FakeStore::default();
        let chat = Arc::new(RecordingChat::default());
        store.add_channel(channel("C1", "12:00"));
        store.add_standuper("UA", "C1");
        store.add_standuper("UB", "C1");
        chat.delay_direct_sends(Duration::from_secs(5));

        let notifier = notifier(&store, &chat, settings());
        let report = notifier.run_reminder_tick(at(12, 0)).await;

        assert_eq!(report.failed, 0);
        assert_eq!(
            report.transitions,
            vec![("C1".to_string(), Transition::Notify)]
        );
        assert_eq!(chat.channel_messages("C1").len(), 1);
        assert!(chat.direct_recipients().is_empty());
        assert!(store.thread("C1").is_some());
    }

    #[tokio::test]
    async fn channel_listing_failure_ends_the_tick_quietly() {
        let store = FakeStore::default();
        let chat = Arc::new(RecordingChat::default());
        store.add_channel(channel("C1", "12:00"));
        store.fail_channel_listing();

        let notifier = notifier(&store, &chat, settings());
        let report = notifier.run_reminder_tick(at(12, 0)).await;

        assert_eq!(report.channels, 0);
        assert!(chat.sent().is_empty());
    }

    #[tokio::test]
    async fn concurrent_channels_each_notify_once() {
        let store = FakeStore::default();
        let chat = Arc::new(RecordingChat::default());
        for id in ["C1", "C2", "C3", "C4"] {
            store.add_channel(channel(id, "12:00"));
            store.add_standuper("UX", id);
        }

        let mut settings = settings();
        settings.max_concurrent_channels = 4;
        let notifier = Arc::new(notifier(&store, &chat, settings));

        let (a, b) = tokio::join!(
            notifier.run_reminder_tick(at(12, 0)),
            notifier.run_reminder_tick(at(12, 0))
        );

        assert_eq!(a.failed + b.failed, 0);
        let channel_sends = chat
            .sent()
            .into_iter()
            .filter(|sent| matches!(sent, Sent::Channel { .. }))
            .count();
        assert_eq!(channel_sends, 4);
    }

    #[tokio::test]
    async fn digest_tick_goes_to_manager_channel() {
        let store = FakeStore::default();
        let chat = Arc::new(RecordingChat::default());
        store.add_standuper("UA", "C1");

        let notifier = notifier(&store, &chat, settings());
        assert!(notifier.run_digest_tick(at(12, 0)).await.is_none());
        let report = notifier.run_digest_tick(at(18, 0)).await.expect("due");

        assert_eq!(report.sent, 1);
        assert_eq!(chat.channel_messages("CMGR").len(), 1);
    }

    #[tokio::test]
    async fn jobs_stop_on_shutdown() {
        let store = FakeStore::default();
        let chat = Arc::new(RecordingChat::default());
        let notifier = Arc::new(notifier(&store, &chat, settings()));

        let (tx, rx) = watch::channel(false);
        let handles = notifier.spawn(rx);
        tx.send(true).expect("send");

        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("job stopped")
                .expect("join");
        }
    }
}

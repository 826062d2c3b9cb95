//! Per-channel escalation state machine.
//!
//! A channel without a thread for today is idle. At the deadline minute a
//! thread is created (counter 0) and the channel plus every missing user is
//! reminded. While users are still missing, one repeat reminder is posted per
//! elapsed repeat interval until the counter reaches the cap. The thread is
//! deleted as soon as nobody is missing, and threads left over from a previous
//! day are dropped before anything else happens.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info};

use super::resolver::{MissList, NonReporterResolver};
use super::{NotifierError, bounded, deliver_direct, deliver_to_channel, messages};
use crate::chat::ChatGateway;
use crate::db::{Channel, NotificationThread, Stores};
use crate::utils::clock;
use crate::web::metrics::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing is due.
    Idle,
    /// Deadline passed with users missing; a thread was opened.
    Notify,
    /// Deadline passed and every standuper had reported.
    Congratulate,
    /// A repeat reminder was posted; `counter` is the value after the bump.
    Escalate { thread_id: i64, counter: i32 },
    /// Everybody reported after the deadline; the thread was removed.
    Resolve { thread_id: i64 },
}

/// What the tracker knows about a channel at one instant.
#[derive(Debug)]
pub struct Observation<'a> {
    pub now: DateTime<Utc>,
    pub deadline: NaiveTime,
    pub thread: Option<&'a NotificationThread>,
    pub misses: &'a MissList,
    /// The deadline transition already ran for this channel today.
    pub fired_today: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscalationPolicy {
    pub repeat_interval_secs: i64,
    pub max_repeats: i32,
}

impl EscalationPolicy {
    pub fn decide(&self, observation: &Observation<'_>) -> Transition {
        let misses = observation.misses;

        if let Some(thread) = observation.thread {
            if misses.is_empty() {
                return Transition::Resolve {
                    thread_id: thread.id,
                };
            }
            if thread.reminder_counter >= self.max_repeats {
                return Transition::Idle;
            }
            // Measured from the last reminder, so a late tick still sends the
            // next step and a repeated tick at the same instant sends nothing.
            let elapsed = observation.now.timestamp() - thread.notification_time;
            if elapsed >= self.repeat_interval_secs {
                return Transition::Escalate {
                    thread_id: thread.id,
                    counter: thread.reminder_counter + 1,
                };
            }
            return Transition::Idle;
        }

        if observation.fired_today || !clock::is_same_minute(observation.deadline, observation.now)
        {
            return Transition::Idle;
        }

        if !misses.is_empty() {
            Transition::Notify
        } else if misses.assigned > 0 {
            Transition::Congratulate
        } else {
            Transition::Idle
        }
    }
}

pub struct EscalationTracker {
    stores: Stores,
    chat: Arc<dyn ChatGateway>,
    resolver: NonReporterResolver,
    policy: EscalationPolicy,
    /// Limit for each store call and each send.
    call_timeout: Duration,
    /// Day on which each channel last ran its deadline transition.
    fired: Mutex<HashMap<String, NaiveDate>>,
}

impl EscalationTracker {
    pub fn new(
        stores: Stores,
        chat: Arc<dyn ChatGateway>,
        policy: EscalationPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            resolver: NonReporterResolver::new(stores.clone()),
            stores,
            chat,
            policy,
            call_timeout,
            fired: Mutex::new(HashMap::new()),
        }
    }

    /// Runs one evaluation of `channel` at `now` and applies the resulting
    /// transition. Store errors and store timeouts abort the step before any
    /// message is sent; a slow send only loses that one message.
    pub async fn evaluate(
        &self,
        channel: &Channel,
        now: DateTime<Utc>,
    ) -> Result<Transition, NotifierError> {
        let Some(deadline) = channel.standup_time else {
            return Ok(Transition::Idle);
        };
        let channel_id = channel.channel_id.as_str();
        let today = now.date_naive();

        let limit = self.call_timeout;
        let mut thread = Some(
            bounded(limit, self.stores.notification_thread_or_zero(channel_id)).await?,
        )
        .filter(|t| !t.is_zero());

        if thread
            .as_ref()
            .is_some_and(|t| clock::day_of(t.notification_time) != Some(today))
        {
            if let Some(stale) = thread.take() {
                debug!(channel_id = %channel_id, thread_id = stale.id, "dropping notification thread from a previous day");
                bounded(limit, self.stores.threads.delete_notification_thread(stale.id))
                    .await?;
            }
        }

        let fired_today = self.fired_on(channel_id) == Some(today);
        if thread.is_none() && (fired_today || !clock::is_same_minute(deadline, now)) {
            return Ok(Transition::Idle);
        }

        let (start, end) = clock::day_window(now);
        let misses = bounded(limit, self.resolver.resolve(channel_id, start, end)).await?;

        let transition = self.policy.decide(&Observation {
            now,
            deadline,
            thread: thread.as_ref(),
            misses: &misses,
            fired_today,
        });

        self.apply(channel_id, transition, &misses, now).await?;
        Ok(transition)
    }

    async fn apply(
        &self,
        channel_id: &str,
        transition: Transition,
        misses: &MissList,
        now: DateTime<Utc>,
    ) -> Result<(), NotifierError> {
        let limit = self.call_timeout;
        match transition {
            Transition::Idle => {}
            Transition::Notify => {
                let thread = NotificationThread::new(channel_id, now.timestamp());
                let thread = bounded(
                    limit,
                    self.stores.threads.create_notification_thread(&thread),
                )
                .await?;
                self.mark_fired(channel_id, now.date_naive());
                info!(
                    channel_id = %channel_id,
                    thread_id = thread.id,
                    missing = misses.missing.len(),
                    "standup deadline passed with missing reports"
                );

                let text = messages::deadline_reminder(&misses.mentions());
                if deliver_to_channel(self.chat.as_ref(), limit, channel_id, &text).await {
                    Metrics::channel_reminder_sent();
                }
                for standuper in &misses.missing {
                    let text = messages::direct_reminder(&standuper.user_id, channel_id);
                    if deliver_direct(self.chat.as_ref(), limit, &standuper.user_id, &text).await {
                        Metrics::direct_reminder_sent();
                    }
                }
            }
            Transition::Congratulate => {
                self.mark_fired(channel_id, now.date_naive());
                info!(channel_id = %channel_id, "everybody reported before the deadline");
                if deliver_to_channel(
                    self.chat.as_ref(),
                    limit,
                    channel_id,
                    &messages::everyone_reported(),
                )
                .await
                {
                    Metrics::channel_reminder_sent();
                }
            }
            Transition::Escalate { thread_id, counter } => {
                bounded(
                    limit,
                    self.stores.threads.update_notification_thread(
                        thread_id,
                        channel_id,
                        now.timestamp(),
                    ),
                )
                .await?;
                info!(
                    channel_id = %channel_id,
                    counter,
                    missing = misses.missing.len(),
                    "repeating standup reminder"
                );
                let text = messages::escalation(&misses.mentions());
                if deliver_to_channel(self.chat.as_ref(), limit, channel_id, &text).await {
                    Metrics::escalation_sent();
                }
            }
            Transition::Resolve { thread_id } => {
                bounded(limit, self.stores.threads.delete_notification_thread(thread_id))
                    .await?;
                info!(channel_id = %channel_id, "all standups in, closing notification thread");
            }
        }
        Ok(())
    }

    fn fired_on(&self, channel_id: &str) -> Option<NaiveDate> {
        self.fired.lock().get(channel_id).copied()
    }

    fn mark_fired(&self, channel_id: &str, day: NaiveDate) {
        self.fired.lock().insert(channel_id.to_string(), day);
    }
}

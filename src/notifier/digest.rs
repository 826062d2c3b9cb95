use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};

use super::resolver::missing_standupers;
use super::{NotifierError, deliver_to_channel, messages};
use crate::chat::ChatGateway;
use crate::db::{Standuper, Stores};
use crate::utils::clock;
use crate::web::metrics::Metrics;

#[derive(Debug, Clone)]
pub struct DigestSettings {
    pub report_time: NaiveTime,
    pub manager_channel_id: String,
    pub manager_user_id: Option<String>,
    pub call_timeout: Duration,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DigestReport {
    /// Distinct channels with at least one standuper.
    pub channels: usize,
    pub sent: usize,
    pub failed: usize,
}

/// Groups standupers by channel, channels in order of first appearance.
pub fn group_by_channel(standupers: &[Standuper]) -> Vec<(String, Vec<Standuper>)> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<Standuper>)> = Vec::new();

    for standuper in standupers {
        let slot = *index
            .entry(standuper.channel_id.as_str())
            .or_insert_with(|| {
                groups.push((standuper.channel_id.clone(), Vec::new()));
                groups.len() - 1
            });
        groups[slot].1.push(standuper.clone());
    }

    groups
}

/// Daily per-channel compliance summary sent to the manager channel.
pub struct ManagerDigest {
    stores: Stores,
    chat: Arc<dyn ChatGateway>,
    settings: DigestSettings,
    last_sent: Mutex<Option<NaiveDate>>,
}

impl ManagerDigest {
    pub fn new(stores: Stores, chat: Arc<dyn ChatGateway>, settings: DigestSettings) -> Self {
        Self {
            stores,
            chat,
            settings,
            last_sent: Mutex::new(None),
        }
    }

    /// Sends the digest if `now` is the report minute and it has not gone
    /// out today. Returns `None` when nothing was due.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<Option<DigestReport>, NotifierError> {
        if !clock::is_same_minute(self.settings.report_time, now) {
            return Ok(None);
        }
        let today = now.date_naive();
        if *self.last_sent.lock() == Some(today) {
            return Ok(None);
        }

        let standupers = self.stores.standupers.list_all_standupers().await?;
        *self.last_sent.lock() = Some(today);

        let groups = group_by_channel(&standupers);
        let (start, end) = clock::day_window(now);
        let mut report = DigestReport {
            channels: groups.len(),
            ..DigestReport::default()
        };

        for (channel_id, members) in &groups {
            let lookup = self
                .stores
                .standups
                .list_submitters_in_window(channel_id, start, end);
            let submitted = match tokio::time::timeout(self.settings.call_timeout, lookup).await {
                Ok(Ok(submitted)) => submitted,
                Ok(Err(err)) => {
                    Metrics::store_failed();
                    warn!(channel_id = %channel_id, "skipping channel in digest: {}", err);
                    report.failed += 1;
                    continue;
                }
                Err(_) => {
                    Metrics::step_timed_out();
                    warn!(channel_id = %channel_id, "skipping channel in digest: lookup timed out");
                    report.failed += 1;
                    continue;
                }
            };

            let misses = missing_standupers(members, &submitted);
            let manager = self.settings.manager_user_id.as_deref();
            let text = if misses.is_empty() {
                messages::digest_all_reported(manager, channel_id)
            } else {
                messages::digest_missing(manager, channel_id, &misses.mentions())
            };

            if deliver_to_channel(
                self.chat.as_ref(),
                self.settings.call_timeout,
                &self.settings.manager_channel_id,
                &text,
            )
            .await
            {
                Metrics::digest_message_sent();
                report.sent += 1;
            } else {
                report.failed += 1;
            }
        }

        info!(
            channels = report.channels,
            sent = report.sent,
            failed = report.failed,
            "manager digest sent"
        );
        Ok(Some(report))
    }
}

use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use salvo::http::header::{CONTENT_TYPE, HeaderValue};
use salvo::prelude::*;
use std::time::Instant;

static STARTED_AT: Lazy<Instant> = Lazy::new(Instant::now);
static REMINDER_TICKS: AtomicU64 = AtomicU64::new(0);
static CHANNEL_REMINDERS_SENT: AtomicU64 = AtomicU64::new(0);
static DIRECT_REMINDERS_SENT: AtomicU64 = AtomicU64::new(0);
static ESCALATIONS_SENT: AtomicU64 = AtomicU64::new(0);
static DIGEST_MESSAGES_SENT: AtomicU64 = AtomicU64::new(0);
static DELIVERY_FAILURES: AtomicU64 = AtomicU64::new(0);
static STORE_FAILURES: AtomicU64 = AtomicU64::new(0);
static STEP_TIMEOUTS: AtomicU64 = AtomicU64::new(0);

pub struct Metrics;

impl Metrics {
    pub fn mark_started() {
        Lazy::force(&STARTED_AT);
    }

    pub fn uptime_seconds() -> u64 {
        STARTED_AT.elapsed().as_secs()
    }

    pub fn reminder_tick() {
        REMINDER_TICKS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn channel_reminder_sent() {
        CHANNEL_REMINDERS_SENT.fetch_add(1, Ordering::Relaxed);
    }

    pub fn direct_reminder_sent() {
        DIRECT_REMINDERS_SENT.fetch_add(1, Ordering::Relaxed);
    }

    pub fn escalation_sent() {
        ESCALATIONS_SENT.fetch_add(1, Ordering::Relaxed);
    }

    pub fn digest_message_sent() {
        DIGEST_MESSAGES_SENT.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delivery_failed() {
        DELIVERY_FAILURES.fetch_add(1, Ordering::Relaxed);
    }

    pub fn store_failed() {
        STORE_FAILURES.fetch_add(1, Ordering::Relaxed);
    }

    pub fn step_timed_out() {
        STEP_TIMEOUTS.fetch_add(1, Ordering::Relaxed);
    }
}

pub fn format_prometheus() -> String {
    format!(
        r#"# HELP standup_uptime_seconds Number of seconds the notifier has been running
# TYPE standup_uptime_seconds gauge
standup_uptime_seconds {}

# HELP standup_reminder_ticks_total Reminder job ticks evaluated
# TYPE standup_reminder_ticks_total counter
standup_reminder_ticks_total {}

# HELP standup_channel_reminders_total Deadline messages posted to channels
# TYPE standup_channel_reminders_total counter
standup_channel_reminders_total {}

# HELP standup_direct_reminders_total Direct reminders sent to missing standupers
# TYPE standup_direct_reminders_total counter
standup_direct_reminders_total {}

# HELP standup_escalations_total Repeat reminders posted to channels
# TYPE standup_escalations_total counter
standup_escalations_total {}

# HELP standup_digest_messages_total Manager digest messages sent
# TYPE standup_digest_messages_total counter
standup_digest_messages_total {}

# HELP standup_delivery_failures_total Chat messages that failed to send
# TYPE standup_delivery_failures_total counter
standup_delivery_failures_total {}

# HELP standup_store_failures_total Channel steps aborted by a store error
# TYPE standup_store_failures_total counter
standup_store_failures_total {}

# HELP standup_step_timeouts_total Channel steps aborted by the call timeout
# TYPE standup_step_timeouts_total counter
standup_step_timeouts_total {}
"#,
        Metrics::uptime_seconds(),
        REMINDER_TICKS.load(Ordering::Relaxed),
        CHANNEL_REMINDERS_SENT.load(Ordering::Relaxed),
        DIRECT_REMINDERS_SENT.load(Ordering::Relaxed),
        ESCALATIONS_SENT.load(Ordering::Relaxed),
        DIGEST_MESSAGES_SENT.load(Ordering::Relaxed),
        DELIVERY_FAILURES.load(Ordering::Relaxed),
        STORE_FAILURES.load(Ordering::Relaxed),
        STEP_TIMEOUTS.load(Ordering::Relaxed),
    )
}

#[handler]
pub async fn metrics_endpoint(res: &mut Response) {
    res.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
    );
    res.body(format_prometheus());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment() {
        let before = ESCALATIONS_SENT.load(Ordering::Relaxed);
        Metrics::escalation_sent();
        Metrics::escalation_sent();
        assert!(ESCALATIONS_SENT.load(Ordering::Relaxed) >= before + 2);
    }

    #[test]
    fn format_prometheus_includes_all_metrics() {
        let output = format_prometheus();
        for name in [
            "standup_uptime_seconds",
            "standup_reminder_ticks_total",
            "standup_channel_reminders_total",
            "standup_direct_reminders_total",
            "standup_escalations_total",
            "standup_digest_messages_total",
            "standup_delivery_failures_total",
            "standup_store_failures_total",
            "standup_step_timeouts_total",
        ] {
            assert!(output.contains(name), "missing {name}");
        }
    }
}

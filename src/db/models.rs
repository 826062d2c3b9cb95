use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::utils::clock;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub team_id: String,
    pub channel_id: String,
    pub channel_name: String,
    /// `None` means the channel is not monitored.
    pub standup_time: Option<NaiveTime>,
    pub created_at: DateTime<Utc>,
}

/// Decodes a stored `HH:MM` deadline. Blank means unmonitored; garbage is
/// logged and treated the same way.
pub(crate) fn parse_standup_time(channel_id: &str, raw: Option<&str>) -> Option<NaiveTime> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    let parsed = clock::parse_clock(raw);
    if parsed.is_none() {
        warn!(channel_id = %channel_id, standup_time = %raw, "ignoring malformed standup time");
    }
    parsed
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StanduperRole {
    Admin,
    Pm,
    Developer,
    Member,
}

impl StanduperRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StanduperRole::Admin => "admin",
            StanduperRole::Pm => "pm",
            StanduperRole::Developer => "developer",
            StanduperRole::Member => "",
        }
    }

    /// Stored roles are free text; anything unrecognised is a plain member.
    pub fn from_db(value: &str) -> Self {
        value.parse().unwrap_or(StanduperRole::Member)
    }
}

impl FromStr for StanduperRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(StanduperRole::Admin),
            "pm" => Ok(StanduperRole::Pm),
            "developer" => Ok(StanduperRole::Developer),
            "" => Ok(StanduperRole::Member),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

impl fmt::Display for StanduperRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StanduperRole::Member => f.write_str("member"),
            role => f.write_str(role.as_str()),
        }
    }
}

/// A user's obligation to report in one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standuper {
    pub id: i64,
    pub team_id: String,
    pub user_id: String,
    pub username: String,
    pub channel_id: String,
    pub role: StanduperRole,
    pub submitted_standup_today: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Standup {
    pub id: i64,
    pub team_id: String,
    pub user_id: String,
    pub channel_id: String,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

/// Escalation state of one channel for the current day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationThread {
    pub id: i64,
    pub channel_id: String,
    pub user_id: String,
    /// Unix seconds of the last reminder sent in this cycle.
    pub notification_time: i64,
    pub reminder_counter: i32,
}

impl NotificationThread {
    pub fn new(channel_id: &str, notification_time: i64) -> Self {
        Self {
            id: 0,
            channel_id: channel_id.to_string(),
            user_id: String::new(),
            notification_time,
            reminder_counter: 0,
        }
    }

    /// The value a missing row reads as.
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::{NotificationThread, StanduperRole, parse_standup_time};

    #[test]
    fn standup_time_decoding() {
        assert_eq!(
            parse_standup_time("C1", Some("12:00")),
            NaiveTime::from_hms_opt(12, 0, 0)
        );
        assert_eq!(parse_standup_time("C1", Some("  ")), None);
        assert_eq!(parse_standup_time("C1", Some("25:99")), None);
        assert_eq!(parse_standup_time("C1", None), None);
    }

    #[test]
    fn role_parsing_falls_back_to_member() {
        assert_eq!(StanduperRole::from_db("PM"), StanduperRole::Pm);
        assert_eq!(StanduperRole::from_db("developer"), StanduperRole::Developer);
        assert_eq!(StanduperRole::from_db(""), StanduperRole::Member);
        assert_eq!(StanduperRole::from_db("intern"), StanduperRole::Member);
        assert_eq!(StanduperRole::Member.as_str(), "");
    }

    #[test]
    fn zero_thread_matches_missing_row() {
        let zero = NotificationThread::zero();
        assert!(zero.is_zero());
        assert_eq!(zero.reminder_counter, 0);
        assert_eq!(zero.notification_time, 0);
        assert!(zero.channel_id.is_empty());

        assert!(!NotificationThread::new("C1", 10).is_zero());
    }
}

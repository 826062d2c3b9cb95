//! Outgoing message texts.

pub fn mention(user_id: &str) -> String {
    format!("<@{}>", user_id)
}

pub fn channel_link(channel_id: &str) -> String {
    format!("<#{}>", channel_id)
}

pub fn deadline_reminder(mentions: &[String]) -> String {
    format!(
        "Hey! We are still waiting for today's standup from: {}",
        mentions.join(", ")
    )
}

pub fn direct_reminder(user_id: &str, channel_id: &str) -> String {
    format!(
        "Hello, {}! You missed the standup deadline in {}. Please write your standup as soon as possible!",
        mention(user_id),
        channel_link(channel_id)
    )
}

pub fn everyone_reported() -> String {
    "Congratulations! Everybody wrote their standups today!".to_string()
}

pub fn escalation(mentions: &[String]) -> String {
    format!(
        "Not all standupers in this channel have written their standup today: {}.",
        mentions.join(", ")
    )
}

fn manager_prefix(manager_user_id: Option<&str>) -> String {
    match manager_user_id {
        Some(id) if !id.is_empty() => format!("{}, in", mention(id)),
        _ => "In".to_string(),
    }
}

pub fn digest_all_reported(manager_user_id: Option<&str>, channel_id: &str) -> String {
    format!(
        "{} channel {} all standupers have written their standup today.",
        manager_prefix(manager_user_id),
        channel_link(channel_id)
    )
}

pub fn digest_missing(
    manager_user_id: Option<&str>,
    channel_id: &str,
    mentions: &[String],
) -> String {
    format!(
        "{} channel {} the following standupers did not report today: {}.",
        manager_prefix(manager_user_id),
        channel_link(channel_id),
        mentions.join(", ")
    )
}

// SQLite keeps timestamps as fixed-width RFC 3339 text so range filters can
// compare them as strings.

diesel::table! {
    channels (id) {
        id -> Integer,
        team_id -> Text,
        channel_id -> Text,
        channel_name -> Text,
        standup_time -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    channel_members (id) {
        id -> Integer,
        team_id -> Text,
        user_id -> Text,
        username -> Text,
        channel_id -> Text,
        role_in_channel -> Text,
        submitted_standup_today -> Bool,
        created_at -> Text,
    }
}

diesel::table! {
    standups (id) {
        id -> Integer,
        team_id -> Text,
        user_id -> Text,
        channel_id -> Text,
        comment -> Text,
        created_at -> Text,
    }
}

diesel::table! {
    notifications_thread (id) {
        id -> Integer,
        channel_id -> Text,
        user_id -> Text,
        notification_time -> BigInt,
        reminder_counter -> Integer,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    channels,
    channel_members,
    standups,
    notifications_thread,
);

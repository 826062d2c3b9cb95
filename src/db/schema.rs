diesel::table! {
    channels (id) {
        id -> BigInt,
        team_id -> Text,
        channel_id -> Text,
        channel_name -> Text,
        standup_time -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    channel_members (id) {
        id -> BigInt,
        team_id -> Text,
        user_id -> Text,
        username -> Text,
        channel_id -> Text,
        role_in_channel -> Text,
        submitted_standup_today -> Bool,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    standups (id) {
        id -> BigInt,
        team_id -> Text,
        user_id -> Text,
        channel_id -> Text,
        comment -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    notifications_thread (id) {
        id -> BigInt,
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

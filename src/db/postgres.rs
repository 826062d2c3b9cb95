use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::pg::PgConnection;
use diesel::prelude::*;

use crate::db::manager::Pool;
use crate::db::schema::{channel_members, channels, notifications_thread, standups};

use super::{
    DatabaseError,
    models::{Channel, NotificationThread, Standup, Standuper, StanduperRole, parse_standup_time},
};

fn query_error(e: diesel::result::Error) -> DatabaseError {
    DatabaseError::Query(e.to_string())
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = channels)]
struct DbChannel {
    id: i64,
    team_id: String,
    channel_id: String,
    channel_name: String,
    standup_time: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<DbChannel> for Channel {
    fn from(value: DbChannel) -> Self {
        Self {
            standup_time: parse_standup_time(&value.channel_id, value.standup_time.as_deref()),
            id: value.id,
            team_id: value.team_id,
            channel_id: value.channel_id,
            channel_name: value.channel_name,
            created_at: value.created_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = channels)]
struct NewChannel<'a> {
    team_id: &'a str,
    channel_id: &'a str,
    channel_name: &'a str,
    standup_time: Option<String>,
    created_at: &'a DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = channel_members)]
struct DbStanduper {
    id: i64,
    team_id: String,
    user_id: String,
    username: String,
    channel_id: String,
    role_in_channel: String,
    submitted_standup_today: bool,
    created_at: DateTime<Utc>,
}

impl From<DbStanduper> for Standuper {
    fn from(value: DbStanduper) -> Self {
        Self {
            id: value.id,
            team_id: value.team_id,
            user_id: value.user_id,
            username: value.username,
            channel_id: value.channel_id,
            role: StanduperRole::from_db(&value.role_in_channel),
            submitted_standup_today: value.submitted_standup_today,
            created_at: value.created_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = channel_members)]
struct NewStanduper<'a> {
    team_id: &'a str,
    user_id: &'a str,
    username: &'a str,
    channel_id: &'a str,
    role_in_channel: &'a str,
    submitted_standup_today: bool,
    created_at: &'a DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = standups)]
struct DbStandup {
    id: i64,
    team_id: String,
    user_id: String,
    channel_id: String,
    comment: String,
    created_at: DateTime<Utc>,
}

impl From<DbStandup> for Standup {
    fn from(value: DbStandup) -> Self {
        Self {
            id: value.id,
            team_id: value.team_id,
            user_id: value.user_id,
            channel_id: value.channel_id,
            comment: value.comment,
            created_at: value.created_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = standups)]
struct NewStandup<'a> {
    team_id: &'a str,
    user_id: &'a str,
    channel_id: &'a str,
    comment: &'a str,
    created_at: &'a DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = notifications_thread)]
struct DbNotificationThread {
    id: i64,
    channel_id: String,
    user_id: String,
    notification_time: i64,
    reminder_counter: i32,
}

impl From<DbNotificationThread> for NotificationThread {
    fn from(value: DbNotificationThread) -> Self {
        Self {
            id: value.id,
            channel_id: value.channel_id,
            user_id: value.user_id,
            notification_time: value.notification_time,
            reminder_counter: value.reminder_counter,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = notifications_thread)]
struct NewNotificationThread<'a> {
    channel_id: &'a str,
    user_id: &'a str,
    notification_time: i64,
    reminder_counter: i32,
}

async fn with_connection<T, F>(pool: Pool, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = pool
            .get()
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

pub struct PostgresChannelStore {
    pool: Pool,
}

impl PostgresChannelStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::ChannelStore for PostgresChannelStore {
    async fn list_channels_with_deadline(&self) -> Result<Vec<Channel>, DatabaseError> {
        with_connection(self.pool.clone(), |conn| {
            let rows = channels::table
                .filter(channels::standup_time.is_not_null())
                .order(channels::id.asc())
                .select(DbChannel::as_select())
                .load::<DbChannel>(conn)
                .map_err(query_error)?;

            Ok(rows
                .into_iter()
                .map(Channel::from)
                .filter(|channel| channel.standup_time.is_some())
                .collect())
        })
        .await
    }

    async fn create_channel(&self, channel: &Channel) -> Result<Channel, DatabaseError> {
        let channel = channel.clone();
        with_connection(self.pool.clone(), move |conn| {
            let new_channel = NewChannel {
                team_id: &channel.team_id,
                channel_id: &channel.channel_id,
                channel_name: &channel.channel_name,
                standup_time: channel.standup_time.map(crate::utils::clock::format_clock),
                created_at: &channel.created_at,
            };

            diesel::insert_into(channels::table)
                .values(&new_channel)
                .returning(DbChannel::as_returning())
                .get_result::<DbChannel>(conn)
                .map(Channel::from)
                .map_err(query_error)
        })
        .await
    }
}

pub struct PostgresStanduperStore {
    pool: Pool,
}

impl PostgresStanduperStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::StanduperStore for PostgresStanduperStore {
    async fn list_standupers(&self, channel_id: &str) -> Result<Vec<Standuper>, DatabaseError> {
        let channel_id = channel_id.to_string();
        with_connection(self.pool.clone(), move |conn| {
            channel_members::table
                .filter(channel_members::channel_id.eq(channel_id))
                .order(channel_members::id.asc())
                .select(DbStanduper::as_select())
                .load::<DbStanduper>(conn)
                .map(|rows| rows.into_iter().map(Standuper::from).collect())
                .map_err(query_error)
        })
        .await
    }

    async fn list_all_standupers(&self) -> Result<Vec<Standuper>, DatabaseError> {
        with_connection(self.pool.clone(), |conn| {
            channel_members::table
                .order(channel_members::id.asc())
                .select(DbStanduper::as_select())
                .load::<DbStanduper>(conn)
                .map(|rows| rows.into_iter().map(Standuper::from).collect())
                .map_err(query_error)
        })
        .await
    }

    async fn create_standuper(&self, standuper: &Standuper) -> Result<Standuper, DatabaseError> {
        let standuper = standuper.clone();
        with_connection(self.pool.clone(), move |conn| {
            let new_standuper = NewStanduper {
                team_id: &standuper.team_id,
                user_id: &standuper.user_id,
                username: &standuper.username,
                channel_id: &standuper.channel_id,
                role_in_channel: standuper.role.as_str(),
                submitted_standup_today: standuper.submitted_standup_today,
                created_at: &standuper.created_at,
            };

            diesel::insert_into(channel_members::table)
                .values(&new_standuper)
                .returning(DbStanduper::as_returning())
                .get_result::<DbStanduper>(conn)
                .map(Standuper::from)
                .map_err(query_error)
        })
        .await
    }
}

pub struct PostgresStandupStore {
    pool: Pool,
}

impl PostgresStandupStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::StandupStore for PostgresStandupStore {
    async fn list_submitters_in_window(
        &self,
        channel_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>, DatabaseError> {
        let channel_id = channel_id.to_string();
        with_connection(self.pool.clone(), move |conn| {
            standups::table
                .filter(standups::channel_id.eq(channel_id))
                .filter(standups::created_at.ge(start))
                .filter(standups::created_at.lt(end))
                .select(standups::user_id)
                .distinct()
                .load::<String>(conn)
                .map_err(query_error)
        })
        .await
    }

    async fn create_standup(&self, standup: &Standup) -> Result<Standup, DatabaseError> {
        let standup = standup.clone();
        with_connection(self.pool.clone(), move |conn| {
            let new_standup = NewStandup {
                team_id: &standup.team_id,
                user_id: &standup.user_id,
                channel_id: &standup.channel_id,
                comment: &standup.comment,
                created_at: &standup.created_at,
            };

            diesel::insert_into(standups::table)
                .values(&new_standup)
                .returning(DbStandup::as_returning())
                .get_result::<DbStandup>(conn)
                .map(Standup::from)
                .map_err(query_error)
        })
        .await
    }
}

pub struct PostgresNotificationThreadStore {
    pool: Pool,
}

impl PostgresNotificationThreadStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl super::NotificationThreadStore for PostgresNotificationThreadStore {
    async fn get_notification_thread(
        &self,
        channel_id: &str,
    ) -> Result<Option<NotificationThread>, DatabaseError> {
        let channel_id = channel_id.to_string();
        with_connection(self.pool.clone(), move |conn| {
            notifications_thread::table
                .filter(notifications_thread::channel_id.eq(channel_id))
                .select(DbNotificationThread::as_select())
                .first::<DbNotificationThread>(conn)
                .optional()
                .map(|row| row.map(NotificationThread::from))
                .map_err(query_error)
        })
        .await
    }

    async fn create_notification_thread(
        &self,
        thread: &NotificationThread,
    ) -> Result<NotificationThread, DatabaseError> {
        let thread = thread.clone();
        with_connection(self.pool.clone(), move |conn| {
            let new_thread = NewNotificationThread {
                channel_id: &thread.channel_id,
                user_id: &thread.user_id,
                notification_time: thread.notification_time,
                reminder_counter: thread.reminder_counter,
            };

            diesel::insert_into(notifications_thread::table)
                .values(&new_thread)
                .returning(DbNotificationThread::as_returning())
                .get_result::<DbNotificationThread>(conn)
                .map(NotificationThread::from)
                .map_err(query_error)
        })
        .await
    }

    async fn update_notification_thread(
        &self,
        id: i64,
        channel_id: &str,
        notification_time: i64,
    ) -> Result<(), DatabaseError> {
        let channel_id = channel_id.to_string();
        with_connection(self.pool.clone(), move |conn| {
            let updated = diesel::update(
                notifications_thread::table
                    .filter(notifications_thread::id.eq(id))
                    .filter(notifications_thread::channel_id.eq(channel_id.as_str())),
            )
            .set((
                notifications_thread::notification_time.eq(notification_time),
                notifications_thread::reminder_counter
                    .eq(notifications_thread::reminder_counter + 1),
            ))
            .execute(conn)
            .map_err(query_error)?;

            if updated == 0 {
                return Err(DatabaseError::Query(format!(
                    "notification thread {id} for channel {channel_id} not found"
                )));
            }
            Ok(())
        })
        .await
    }

    async fn delete_notification_thread(&self, id: i64) -> Result<(), DatabaseError> {
        with_connection(self.pool.clone(), move |conn| {
            diesel::delete(notifications_thread::table.filter(notifications_thread::id.eq(id)))
                .execute(conn)
                .map(|_| ())
                .map_err(query_error)
        })
        .await
    }
}

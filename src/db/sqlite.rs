use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use std::sync::Arc;

use crate::db::schema_sqlite::{channel_members, channels, notifications_thread, standups};

use super::{
    DatabaseError,
    models::{Channel, NotificationThread, Standup, Standuper, StanduperRole, parse_standup_time},
};

// Fixed width so that text comparison orders timestamps correctly.
fn datetime_to_string(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn string_to_datetime(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Query(format!("invalid datetime format: {}", e)))
}

fn query_error(e: diesel::result::Error) -> DatabaseError {
    DatabaseError::Query(e.to_string())
}

// SQLite uses i32 for INTEGER primary keys, the public models use i64.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = channels)]
struct DbChannel {
    id: i32,
    team_id: String,
    channel_id: String,
    channel_name: String,
    standup_time: Option<String>,
    created_at: String,
}

impl DbChannel {
    fn to_channel(&self) -> Result<Channel, DatabaseError> {
        Ok(Channel {
            id: self.id as i64,
            team_id: self.team_id.clone(),
            channel_id: self.channel_id.clone(),
            channel_name: self.channel_name.clone(),
            standup_time: parse_standup_time(&self.channel_id, self.standup_time.as_deref()),
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = channels)]
struct NewChannel<'a> {
    team_id: &'a str,
    channel_id: &'a str,
    channel_name: &'a str,
    standup_time: Option<String>,
    created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = channel_members)]
struct DbStanduper {
    id: i32,
    team_id: String,
    user_id: String,
    username: String,
    channel_id: String,
    role_in_channel: String,
    submitted_standup_today: bool,
    created_at: String,
}

impl DbStanduper {
    fn to_standuper(&self) -> Result<Standuper, DatabaseError> {
        Ok(Standuper {
            id: self.id as i64,
            team_id: self.team_id.clone(),
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            channel_id: self.channel_id.clone(),
            role: StanduperRole::from_db(&self.role_in_channel),
            submitted_standup_today: self.submitted_standup_today,
            created_at: string_to_datetime(&self.created_at)?,
        })
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
    created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = standups)]
struct DbStandup {
    id: i32,
    team_id: String,
    user_id: String,
    channel_id: String,
    comment: String,
    created_at: String,
}

impl DbStandup {
    fn to_standup(&self) -> Result<Standup, DatabaseError> {
        Ok(Standup {
            id: self.id as i64,
            team_id: self.team_id.clone(),
            user_id: self.user_id.clone(),
            channel_id: self.channel_id.clone(),
            comment: self.comment.clone(),
            created_at: string_to_datetime(&self.created_at)?,
        })
    }
}

#[derive(Insertable)]
#[diesel(table_name = standups)]
struct NewStandup<'a> {
    team_id: &'a str,
    user_id: &'a str,
    channel_id: &'a str,
    comment: &'a str,
    created_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = notifications_thread)]
struct DbNotificationThread {
    id: i32,
    channel_id: String,
    user_id: String,
    notification_time: i64,
    reminder_counter: i32,
}

impl From<DbNotificationThread> for NotificationThread {
    fn from(value: DbNotificationThread) -> Self {
        Self {
            id: value.id as i64,
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

fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    let mut conn =
        SqliteConnection::establish(path).map_err(|e| DatabaseError::Connection(e.to_string()))?;
    diesel::sql_query("PRAGMA busy_timeout = 5000")
        .execute(&mut conn)
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    Ok(conn)
}

async fn with_connection<T, F>(db_path: Arc<String>, operation: F) -> Result<T, DatabaseError>
where
    T: Send + 'static,
    F: FnOnce(&mut SqliteConnection) -> Result<T, DatabaseError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = establish_connection(&db_path)?;
        operation(&mut conn)
    })
    .await
    .map_err(|e| DatabaseError::Query(format!("database task failed: {e}")))?
}

pub struct SqliteChannelStore {
    db_path: Arc<String>,
}

impl SqliteChannelStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::ChannelStore for SqliteChannelStore {
    async fn list_channels_with_deadline(&self) -> Result<Vec<Channel>, DatabaseError> {
        with_connection(self.db_path.clone(), |conn| {
            let rows = channels::table
                .filter(channels::standup_time.is_not_null())
                .order(channels::id.asc())
                .select(DbChannel::as_select())
                .load::<DbChannel>(conn)
                .map_err(query_error)?;

            let mut result = Vec::with_capacity(rows.len());
            for row in rows {
                let channel = row.to_channel()?;
                if channel.standup_time.is_some() {
                    result.push(channel);
                }
            }
            Ok(result)
        })
        .await
    }

    async fn create_channel(&self, channel: &Channel) -> Result<Channel, DatabaseError> {
        let channel = channel.clone();
        with_connection(self.db_path.clone(), move |conn| {
            let new_channel = NewChannel {
                team_id: &channel.team_id,
                channel_id: &channel.channel_id,
                channel_name: &channel.channel_name,
                standup_time: channel.standup_time.map(crate::utils::clock::format_clock),
                created_at: datetime_to_string(&channel.created_at),
            };

            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::insert_into(channels::table)
                    .values(&new_channel)
                    .execute(conn)?;
                channels::table
                    .order(channels::id.desc())
                    .select(DbChannel::as_select())
                    .first::<DbChannel>(conn)
            })
            .map_err(query_error)?
            .to_channel()
        })
        .await
    }
}

pub struct SqliteStanduperStore {
    db_path: Arc<String>,
}

impl SqliteStanduperStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::StanduperStore for SqliteStanduperStore {
    async fn list_standupers(&self, channel_id: &str) -> Result<Vec<Standuper>, DatabaseError> {
        let channel_id = channel_id.to_string();
        with_connection(self.db_path.clone(), move |conn| {
            let rows = channel_members::table
                .filter(channel_members::channel_id.eq(channel_id))
                .order(channel_members::id.asc())
                .select(DbStanduper::as_select())
                .load::<DbStanduper>(conn)
                .map_err(query_error)?;
            rows.iter().map(DbStanduper::to_standuper).collect()
        })
        .await
    }

    async fn list_all_standupers(&self) -> Result<Vec<Standuper>, DatabaseError> {
        with_connection(self.db_path.clone(), |conn| {
            let rows = channel_members::table
                .order(channel_members::id.asc())
                .select(DbStanduper::as_select())
                .load::<DbStanduper>(conn)
                .map_err(query_error)?;
            rows.iter().map(DbStanduper::to_standuper).collect()
        })
        .await
    }

    async fn create_standuper(&self, standuper: &Standuper) -> Result<Standuper, DatabaseError> {
        let standuper = standuper.clone();
        with_connection(self.db_path.clone(), move |conn| {
            let new_standuper = NewStanduper {
                team_id: &standuper.team_id,
                user_id: &standuper.user_id,
                username: &standuper.username,
                channel_id: &standuper.channel_id,
                role_in_channel: standuper.role.as_str(),
                submitted_standup_today: standuper.submitted_standup_today,
                created_at: datetime_to_string(&standuper.created_at),
            };

            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::insert_into(channel_members::table)
                    .values(&new_standuper)
                    .execute(conn)?;
                channel_members::table
                    .order(channel_members::id.desc())
                    .select(DbStanduper::as_select())
                    .first::<DbStanduper>(conn)
            })
            .map_err(query_error)?
            .to_standuper()
        })
        .await
    }
}

pub struct SqliteStandupStore {
    db_path: Arc<String>,
}

impl SqliteStandupStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::StandupStore for SqliteStandupStore {
    async fn list_submitters_in_window(
        &self,
        channel_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<String>, DatabaseError> {
        let channel_id = channel_id.to_string();
        let start = datetime_to_string(&start);
        let end = datetime_to_string(&end);
        with_connection(self.db_path.clone(), move |conn| {
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
        with_connection(self.db_path.clone(), move |conn| {
            let new_standup = NewStandup {
                team_id: &standup.team_id,
                user_id: &standup.user_id,
                channel_id: &standup.channel_id,
                comment: &standup.comment,
                created_at: datetime_to_string(&standup.created_at),
            };

            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::insert_into(standups::table)
                    .values(&new_standup)
                    .execute(conn)?;
                standups::table
                    .order(standups::id.desc())
                    .select(DbStandup::as_select())
                    .first::<DbStandup>(conn)
            })
            .map_err(query_error)?
            .to_standup()
        })
        .await
    }
}

pub struct SqliteNotificationThreadStore {
    db_path: Arc<String>,
}

impl SqliteNotificationThreadStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl super::NotificationThreadStore for SqliteNotificationThreadStore {
    async fn get_notification_thread(
        &self,
        channel_id: &str,
    ) -> Result<Option<NotificationThread>, DatabaseError> {
        let channel_id = channel_id.to_string();
        with_connection(self.db_path.clone(), move |conn| {
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
        with_connection(self.db_path.clone(), move |conn| {
            let new_thread = NewNotificationThread {
                channel_id: &thread.channel_id,
                user_id: &thread.user_id,
                notification_time: thread.notification_time,
                reminder_counter: thread.reminder_counter,
            };

            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::insert_into(notifications_thread::table)
                    .values(&new_thread)
                    .execute(conn)?;
                notifications_thread::table
                    .filter(notifications_thread::channel_id.eq(thread.channel_id.as_str()))
                    .select(DbNotificationThread::as_select())
                    .first::<DbNotificationThread>(conn)
            })
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
        with_connection(self.db_path.clone(), move |conn| {
            let updated = diesel::update(
                notifications_thread::table
                    .filter(notifications_thread::id.eq(id as i32))
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
        with_connection(self.db_path.clone(), move |conn| {
            diesel::delete(notifications_thread::table.filter(notifications_thread::id.eq(id as i32)))
                .execute(conn)
                .map(|_| ())
                .map_err(query_error)
        })
        .await
    }
}

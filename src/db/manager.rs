use crate::config::{DatabaseConfig as ConfigDatabaseConfig, DbType as ConfigDbType};
use crate::db::{
    ChannelStore, DatabaseError, NotificationThreadStore, StandupStore, StanduperStore, Stores,
};
use std::sync::Arc;

#[cfg(feature = "postgres")]
use crate::db::postgres::{
    PostgresChannelStore, PostgresNotificationThreadStore, PostgresStandupStore,
    PostgresStanduperStore,
};
#[cfg(feature = "postgres")]
use diesel::pg::PgConnection;
#[cfg(feature = "postgres")]
use diesel::r2d2::{self, ConnectionManager};

#[cfg(feature = "postgres")]
pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[cfg(feature = "sqlite")]
use crate::db::sqlite::{
    SqliteChannelStore, SqliteNotificationThreadStore, SqliteStandupStore, SqliteStanduperStore,
};
#[cfg(feature = "sqlite")]
use diesel::Connection;
#[cfg(feature = "sqlite")]
use diesel::sqlite::SqliteConnection;

#[cfg(any(feature = "postgres", feature = "sqlite"))]
use diesel::RunQueryDsl;

#[derive(Clone)]
pub struct DatabaseManager {
    #[cfg(feature = "postgres")]
    postgres_pool: Option<Pool>,
    #[cfg(feature = "sqlite")]
    sqlite_path: Option<String>,
    channel_store: Arc<dyn ChannelStore>,
    standuper_store: Arc<dyn StanduperStore>,
    standup_store: Arc<dyn StandupStore>,
    thread_store: Arc<dyn NotificationThreadStore>,
    db_type: DbType,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

impl From<ConfigDbType> for DbType {
    fn from(value: ConfigDbType) -> Self {
        match value {
            ConfigDbType::Postgres => DbType::Postgres,
            ConfigDbType::Sqlite => DbType::Sqlite,
        }
    }
}

#[cfg(feature = "postgres")]
const POSTGRES_MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS channels (
        id BIGSERIAL PRIMARY KEY,
        team_id TEXT NOT NULL,
        channel_id TEXT NOT NULL UNIQUE,
        channel_name TEXT NOT NULL,
        standup_time TEXT,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS channel_members (
        id BIGSERIAL PRIMARY KEY,
        team_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        username TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        role_in_channel TEXT NOT NULL DEFAULT '',
        submitted_standup_today BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
        UNIQUE (user_id, channel_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS standups (
        id BIGSERIAL PRIMARY KEY,
        team_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        comment TEXT NOT NULL,
        created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notifications_thread (
        id BIGSERIAL PRIMARY KEY,
        channel_id TEXT NOT NULL UNIQUE,
        user_id TEXT NOT NULL DEFAULT '',
        notification_time BIGINT NOT NULL,
        reminder_counter INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_channel_members_channel ON channel_members(channel_id)",
    "CREATE INDEX IF NOT EXISTS idx_standups_channel_created ON standups(channel_id, created_at)",
];

#[cfg(feature = "sqlite")]
const SQLITE_MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS channels (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        team_id TEXT NOT NULL,
        channel_id TEXT NOT NULL UNIQUE,
        channel_name TEXT NOT NULL,
        standup_time TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS channel_members (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        team_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        username TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        role_in_channel TEXT NOT NULL DEFAULT '',
        submitted_standup_today BOOLEAN NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        UNIQUE (user_id, channel_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS standups (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        team_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        channel_id TEXT NOT NULL,
        comment TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notifications_thread (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        channel_id TEXT NOT NULL UNIQUE,
        user_id TEXT NOT NULL DEFAULT '',
        notification_time BIGINT NOT NULL,
        reminder_counter INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_channel_members_channel ON channel_members(channel_id)",
    "CREATE INDEX IF NOT EXISTS idx_standups_channel_created ON standups(channel_id, created_at)",
];

impl DatabaseManager {
    pub async fn new(config: &ConfigDatabaseConfig) -> Result<Self, DatabaseError> {
        let db_type = DbType::from(config.db_type());

        match db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => {
                let manager = ConnectionManager::<PgConnection>::new(config.connection_string());

                let pool = r2d2::Pool::builder()
                    .max_size(config.max_connections().unwrap_or(10))
                    .min_idle(Some(config.min_connections().unwrap_or(1)))
                    .build(manager)
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?;

                Ok(Self {
                    channel_store: Arc::new(PostgresChannelStore::new(pool.clone())),
                    standuper_store: Arc::new(PostgresStanduperStore::new(pool.clone())),
                    standup_store: Arc::new(PostgresStandupStore::new(pool.clone())),
                    thread_store: Arc::new(PostgresNotificationThreadStore::new(pool.clone())),
                    postgres_pool: Some(pool),
                    #[cfg(feature = "sqlite")]
                    sqlite_path: None,
                    db_type,
                })
            }
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => {
                let path = config.sqlite_path().ok_or_else(|| {
                    DatabaseError::Connection("sqlite path is not configured".to_string())
                })?;
                let path_arc = Arc::new(path.clone());

                Ok(Self {
                    #[cfg(feature = "postgres")]
                    postgres_pool: None,
                    channel_store: Arc::new(SqliteChannelStore::new(path_arc.clone())),
                    standuper_store: Arc::new(SqliteStanduperStore::new(path_arc.clone())),
                    standup_store: Arc::new(SqliteStandupStore::new(path_arc.clone())),
                    thread_store: Arc::new(SqliteNotificationThreadStore::new(path_arc)),
                    sqlite_path: Some(path),
                    db_type,
                })
            }
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Connection(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Connection(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        match self.db_type {
            #[cfg(feature = "postgres")]
            DbType::Postgres => match self.postgres_pool.as_ref() {
                Some(pool) => Self::migrate_postgres(pool).await,
                None => Err(DatabaseError::Migration(
                    "postgres pool is not initialized".to_string(),
                )),
            },
            #[cfg(feature = "sqlite")]
            DbType::Sqlite => match self.sqlite_path.as_ref() {
                Some(path) => Self::migrate_sqlite(path).await,
                None => Err(DatabaseError::Migration(
                    "sqlite path is not initialized".to_string(),
                )),
            },
            #[cfg(not(feature = "postgres"))]
            DbType::Postgres => Err(DatabaseError::Migration(
                "PostgreSQL feature not enabled".to_string(),
            )),
            #[cfg(not(feature = "sqlite"))]
            DbType::Sqlite => Err(DatabaseError::Migration(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    #[cfg(feature = "postgres")]
    async fn migrate_postgres(pool: &Pool) -> Result<(), DatabaseError> {
        let pool = pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;

            for statement in POSTGRES_MIGRATIONS {
                diesel::sql_query(*statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    #[cfg(feature = "sqlite")]
    async fn migrate_sqlite(path: &str) -> Result<(), DatabaseError> {
        let path = path.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = SqliteConnection::establish(&path)
                .map_err(|e| DatabaseError::Connection(e.to_string()))?;

            for statement in SQLITE_MIGRATIONS {
                diesel::sql_query(*statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    pub fn stores(&self) -> Stores {
        Stores {
            channels: self.channel_store.clone(),
            standupers: self.standuper_store.clone(),
            standups: self.standup_store.clone(),
            threads: self.thread_store.clone(),
        }
    }

    pub fn db_type(&self) -> DbType {
        self.db_type
    }
}

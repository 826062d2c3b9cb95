pub use self::error::DatabaseError;
pub use self::manager::DatabaseManager;
pub use self::models::{Channel, NotificationThread, Standup, Standuper, StanduperRole};
pub use self::stores::{
    ChannelStore, NotificationThreadStore, StandupStore, StanduperStore, Stores,
};

pub mod error;
pub mod manager;
pub mod models;
pub mod stores;

#[cfg(feature = "postgres")]
pub mod schema;

#[cfg(feature = "postgres")]
pub mod postgres;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub mod schema_sqlite;

pub use self::parser::{
    Config, DatabaseConfig, DbType, LoggingConfig, NotifierConfig, SlackConfig, WebConfig,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;

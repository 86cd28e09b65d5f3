// SQLite database connection and migrations
pub mod connection;
pub mod models;
pub(crate) mod queries;

pub use connection::{init_database, DbConnection, DbPool};
pub use models::{
    format_timestamp, parse_timestamp, AppSettings, GitRepository, NewGitRepository, PrRecord,
    PrState,
};
pub use queries::get_repository_by_id;

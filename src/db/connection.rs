use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use std::path::Path;

use crate::error::AppError;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Embedded migrations using refinery
mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("src/db/migrations");
}

/// Create a new database connection pool
pub fn create_pool(db_path: &Path) -> Result<DbPool, AppError> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
        // Connection-level settings, applied to every pooled connection
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
    });

    let pool = Pool::builder().max_size(5).build(manager)?;

    Ok(pool)
}

/// Run database migrations
pub fn run_migrations(pool: &DbPool) -> Result<(), AppError> {
    let mut conn = pool.get()?;

    embedded::migrations::runner().run(&mut *conn)?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}

/// Get default database path
pub fn default_db_path() -> Result<std::path::PathBuf, AppError> {
    let project_dirs =
        directories::ProjectDirs::from("com", "git-project-manager", "GitProjectManager")
            .ok_or_else(|| AppError::Config("Cannot determine data directory".into()))?;

    let data_dir = project_dirs.data_local_dir();
    Ok(data_dir.join("git-project-manager.db"))
}

/// Initialize database: create pool and run migrations
pub fn init_database(db_path: Option<&Path>) -> Result<DbPool, AppError> {
    let path = match db_path {
        Some(p) => p.to_path_buf(),
        None => default_db_path()?,
    };

    tracing::info!("Initializing database at {:?}", path);

    let pool = create_pool(&path)?;
    run_migrations(&pool)?;

    Ok(pool)
}

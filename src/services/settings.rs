use serde::Deserialize;

use crate::db::{AppSettings, DbConnection, DbPool};
use crate::error::{AppError, AppResult};

/// Partial settings update; `None` keeps the stored value
#[derive(Debug, Default, Deserialize)]
pub struct UpdateSettingsRequest {
    pub draft_provider: Option<String>,
    pub report_provider: Option<String>,
}

/// Singleton application settings row
#[derive(Clone)]
pub struct SettingsStore {
    db: DbPool,
}

fn fetch_settings(conn: &DbConnection) -> AppResult<AppSettings> {
    let settings = conn.query_row(
        "SELECT id, draft_provider, report_provider, created_at, updated_at
         FROM app_settings WHERE id = 1",
        [],
        |row| {
            Ok(AppSettings {
                id: row.get(0)?,
                draft_provider: row.get(1)?,
                report_provider: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        },
    )?;
    Ok(settings)
}

fn validated_provider(value: Option<&String>, field: &str) -> AppResult<Option<String>> {
    match value {
        Some(provider) => {
            let trimmed = provider.trim();
            if trimmed.is_empty() {
                return Err(AppError::InvalidInput(format!("{} cannot be empty", field)));
            }
            Ok(Some(trimmed.to_string()))
        }
        None => Ok(None),
    }
}

impl SettingsStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn get(&self) -> AppResult<AppSettings> {
        let conn = self.db.get()?;
        fetch_settings(&conn)
    }

    pub fn update(&self, request: UpdateSettingsRequest) -> AppResult<AppSettings> {
        let draft_provider = validated_provider(request.draft_provider.as_ref(), "draft_provider")?;
        let report_provider =
            validated_provider(request.report_provider.as_ref(), "report_provider")?;

        let conn = self.db.get()?;
        if draft_provider.is_none() && report_provider.is_none() {
            return fetch_settings(&conn);
        }

        // NULL parameters keep the existing value
        conn.execute(
            "UPDATE app_settings SET
                draft_provider = COALESCE(:draft_provider, draft_provider),
                report_provider = COALESCE(:report_provider, report_provider),
                updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
             WHERE id = 1",
            rusqlite::named_params! {
                ":draft_provider": draft_provider,
                ":report_provider": report_provider,
            },
        )?;

        fetch_settings(&conn)
    }
}

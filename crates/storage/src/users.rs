//! User accessors

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use sentinel_common::{Result, SentinelError, User, UserPreferences};

use crate::store::{db_err, from_json, is_unique_violation, parse_ts, to_json, ts, SqliteStore};

#[derive(Debug, Clone)]
pub struct NewUser {
    pub handle: String,
    pub email: String,
    pub display_name: Option<String>,
    pub api_token: Option<String>,
}

fn map_user(row: SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id").map_err(db_err)?,
        handle: row.try_get("handle").map_err(db_err)?,
        email: row.try_get("email").map_err(db_err)?,
        display_name: row.try_get("display_name").map_err(db_err)?,
        active: row.try_get::<i64, _>("active").map_err(db_err)? != 0,
        preferences: from_json::<UserPreferences>(
            &row.try_get::<String, _>("preferences").map_err(db_err)?,
        ),
        created_at: parse_ts(&row.try_get::<String, _>("created_at").map_err(db_err)?)?,
    })
}

impl SqliteStore {
    pub async fn create_user(&self, user: NewUser) -> Result<User> {
        let result = sqlx::query(
            "INSERT INTO users (handle, email, display_name, api_token, preferences, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&user.handle)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.api_token)
        .bind(to_json(&UserPreferences::default())?)
        .bind(ts(Utc::now()))
        .execute(self.pool())
        .await;

        let id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(e) if is_unique_violation(&e) => {
                return Err(SentinelError::Conflict(format!(
                    "user {} already exists",
                    user.handle
                )))
            }
            Err(e) => return Err(db_err(e)),
        };
        self.get_user(id).await
    }

    pub async fn get_user(&self, id: i64) -> Result<User> {
        sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?
            .ok_or_else(|| SentinelError::NotFound(format!("user {id}")))
            .and_then(map_user)
    }

    pub async fn get_user_by_token(&self, token: &str) -> Result<User> {
        sqlx::query("SELECT * FROM users WHERE api_token = ?1 AND active = 1")
            .bind(token)
            .fetch_optional(self.pool())
            .await
            .map_err(db_err)?
            .ok_or_else(|| SentinelError::Unauthorized("unknown bearer token".to_string()))
            .and_then(map_user)
    }

    pub async fn list_users(&self, limit: i64, offset: i64) -> Result<Vec<User>> {
        sqlx::query("SELECT * FROM users ORDER BY id LIMIT ?1 OFFSET ?2")
            .bind(limit)
            .bind(offset)
            .fetch_all(self.pool())
            .await
            .map_err(db_err)?
            .into_iter()
            .map(map_user)
            .collect()
    }

    pub async fn update_user(
        &self,
        id: i64,
        display_name: Option<String>,
        active: Option<bool>,
        preferences: Option<UserPreferences>,
    ) -> Result<User> {
        // Read-modify-write keeps the partial update logic in one place.
        let current = self.get_user(id).await?;
        let display_name = display_name.or(current.display_name);
        let active = active.unwrap_or(current.active);
        let preferences = preferences.unwrap_or(current.preferences);

        sqlx::query(
            "UPDATE users SET display_name = ?2, active = ?3, preferences = ?4 WHERE id = ?1",
        )
        .bind(id)
        .bind(&display_name)
        .bind(active as i64)
        .bind(to_json(&preferences)?)
        .execute(self.pool())
        .await
        .map_err(db_err)?;
        self.get_user(id).await
    }

    pub async fn delete_user(&self, id: i64) -> Result<()> {
        let done = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(db_err)?;
        if done.rows_affected() == 0 {
            return Err(SentinelError::NotFound(format!("user {id}")));
        }
        Ok(())
    }

    /// (total, active)
    pub async fn count_users(&self) -> Result<(i64, i64)> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total, COALESCE(SUM(active), 0) AS active FROM users",
        )
        .fetch_one(self.pool())
        .await
        .map_err(db_err)?;
        Ok((
            row.try_get("total").map_err(db_err)?,
            row.try_get("active").map_err(db_err)?,
        ))
    }
}

use chrono::Utc;
use rusqlite::params;

use agora_shared::models::format_timestamp;
use agora_shared::{User, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};

impl Database {
    pub fn insert_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, email, created_at) VALUES (?1, ?2, ?3)",
            params![
                user.id.to_string(),
                user.email,
                format_timestamp(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<User> {
        let (id, email): (String, String) = self
            .conn()
            .query_row(
                "SELECT id, email FROM users WHERE email = ?1",
                params![email],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })?;
        Ok(User {
            id: UserId::parse(&id)?,
            email,
        })
    }
}

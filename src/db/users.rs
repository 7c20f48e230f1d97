//! Users, password checks and bearer tokens.

use super::{Database, now_ms};
use crate::error::{AppError, AppResult};
use crate::types::{Role, User, UserSummary};
use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Stored form of a bearer token.
fn token_digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Argon2id PHC string; the salt travels inside it.
fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(AppError::internal)?;
    Ok(hash.to_string())
}

fn verify_password(password: &str, stored: &str) -> AppResult<bool> {
    let parsed = PasswordHash::new(stored).map_err(AppError::internal)?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn parse_user_row(row: &Row) -> rusqlite::Result<User> {
    let role: String = row.get("role")?;
    Ok(User {
        id: row.get("id")?,
        name: row.get("name")?,
        email: row.get("email")?,
        role: Role::parse(&role).unwrap_or(Role::User),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn get_user_internal(conn: &Connection, user_id: i64) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            "SELECT * FROM users WHERE id = ?1",
            params![user_id],
            parse_user_row,
        )
        .optional()?;
    Ok(user)
}

/// Assigned-user relation for a task.
pub(crate) fn user_summary(conn: &Connection, user_id: i64) -> AppResult<Option<UserSummary>> {
    let summary = conn
        .query_row(
            "SELECT id, name FROM users WHERE id = ?1",
            params![user_id],
            |row| {
                Ok(UserSummary {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(summary)
}

/// A freshly issued bearer token. The plain value is never stored.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: i64,
}

impl Database {
    /// Register a user. Emails are unique.
    pub fn create_user(&self, name: &str, email: &str, password: &str, role: Role) -> AppResult<User> {
        self.with_conn(|conn| {
            let taken = conn
                .prepare("SELECT 1 FROM users WHERE email = ?1")?
                .exists(params![email])?;
            if taken {
                return Err(AppError::validation("email", "The email has already been taken."));
            }

            let hash = hash_password(password)?;
            let now = now_ms();
            conn.execute(
                "INSERT INTO users (name, email, role, password_hash, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![name, email, role.as_str(), hash, now],
            )?;
            let id = conn.last_insert_rowid();
            tracing::info!(user_id = id, role = role.as_str(), "Created user");
            get_user_internal(conn, id)?.ok_or_else(|| AppError::user_not_found(id))
        })
    }

    pub fn get_user(&self, user_id: i64) -> AppResult<Option<User>> {
        self.with_conn(|conn| get_user_internal(conn, user_id))
    }

    pub fn find_user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.with_conn(|conn| {
            let user = conn
                .query_row(
                    "SELECT * FROM users WHERE email = ?1",
                    params![email],
                    parse_user_row,
                )
                .optional()?;
            Ok(user)
        })
    }

    /// `{id, name}` for every user, by name.
    pub fn list_users(&self) -> AppResult<Vec<UserSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM users ORDER BY name, id")?;
            let users = stmt
                .query_map([], |row| {
                    Ok(UserSummary {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(users)
        })
    }

    /// The user owning these credentials, if they match.
    pub fn authenticate(&self, email: &str, password: &str) -> AppResult<Option<User>> {
        self.with_conn(|conn| {
            let found = conn
                .query_row(
                    "SELECT * FROM users WHERE email = ?1",
                    params![email],
                    |row| {
                        let hash: String = row.get("password_hash")?;
                        Ok((parse_user_row(row)?, hash))
                    },
                )
                .optional()?;
            match found {
                Some((user, hash)) if verify_password(password, &hash)? => Ok(Some(user)),
                _ => Ok(None),
            }
        })
    }

    /// Issue a bearer token for a user, valid for `ttl_seconds`.
    pub fn issue_token(&self, user_id: i64, ttl_seconds: i64) -> AppResult<IssuedToken> {
        self.with_conn(|conn| {
            let token = Uuid::new_v4().simple().to_string();
            let now = now_ms();
            let expires_at = now + ttl_seconds.saturating_mul(1000);
            conn.execute(
                "INSERT INTO api_tokens (token_hash, user_id, created_at, expires_at) VALUES (?1, ?2, ?3, ?4)",
                params![token_digest(&token), user_id, now, expires_at],
            )?;
            tracing::debug!(user_id, expires_at, "Issued token");
            Ok(IssuedToken { token, expires_at })
        })
    }

    /// The user a live token belongs to. Expired tokens are purged on sight.
    pub fn resolve_token(&self, token: &str) -> AppResult<Option<User>> {
        self.with_conn(|conn| {
            let hash = token_digest(token);
            let found: Option<(i64, i64)> = conn
                .query_row(
                    "SELECT user_id, expires_at FROM api_tokens WHERE token_hash = ?1",
                    params![hash],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            match found {
                Some((user_id, expires_at)) if expires_at > now_ms() => get_user_internal(conn, user_id),
                Some(_) => {
                    conn.execute("DELETE FROM api_tokens WHERE token_hash = ?1", params![hash])?;
                    Ok(None)
                }
                None => Ok(None),
            }
        })
    }

    /// Revoke a token. Returns whether it existed.
    pub fn revoke_token(&self, token: &str) -> AppResult<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM api_tokens WHERE token_hash = ?1",
                params![token_digest(token)],
            )?;
            Ok(removed > 0)
        })
    }
}

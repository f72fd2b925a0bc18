use crate::models::{MessageRow, UserRow, parse_uuid};
use crate::{Database, format_timestamp, parse_timestamp};
use anyhow::Result;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, name, email, password, profile_pic, join_date, last_active, is_active";

impl Database {
    // -- Users --

    /// Insert a user. Returns `false` without inserting when the email is
    /// already taken; the UNIQUE index decides, so this holds even when two
    /// registrations race past the caller's pre-check.
    pub fn create_user(&self, user: &UserRow) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (id, name, email, password, profile_pic, join_date, last_active, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    user.id,
                    user.name,
                    user.email,
                    user.password,
                    user.profile_pic,
                    user.join_date,
                    user.last_active,
                    user.is_active,
                ],
            );

            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation
                        && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
                {
                    debug!("email unique constraint hit for user {}", user.id);
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    /// All users in insertion order.
    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY rowid");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns `false` if no user has that id.
    pub fn touch_last_active(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE users SET last_active = ?1 WHERE id = ?2",
                (format_timestamp(at), id),
            )?;
            Ok(updated > 0)
        })
    }

    // -- Messages --

    /// Insert a message stamped with `now` and return the stored timestamp.
    ///
    /// Timestamps are strictly increasing in insertion order: if `now` is not
    /// after the newest stored message it is moved one microsecond past it.
    pub fn insert_message(
        &self,
        id: &str,
        sender_id: &str,
        receiver_id: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>> {
        self.with_conn(|conn| {
            let mut timestamp = now.trunc_subsecs(6);

            let newest: Option<String> = conn
                .query_row(
                    "SELECT timestamp FROM messages ORDER BY seq DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(newest) = newest {
                let newest = parse_timestamp(&newest)?;
                if timestamp <= newest {
                    timestamp = newest + Duration::microseconds(1);
                }
            }

            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, content, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
                (id, sender_id, receiver_id, content, format_timestamp(timestamp)),
            )?;
            Ok(timestamp)
        })
    }

    /// Every message between `a` and `b`, in either direction, oldest first.
    pub fn get_conversation(&self, a: &str, b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, receiver_id, content, timestamp
                 FROM messages
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 ORDER BY seq ASC",
            )?;

            let rows = stmt
                .query_map((a, b), |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        sender_id: row.get(1)?,
                        receiver_id: row.get(2)?,
                        content: row.get(3)?,
                        timestamp: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            debug!("conversation {} <-> {}: {} messages", a, b, rows.len());
            Ok(rows)
        })
    }

    /// Distinct `receiver_id` values over messages sent by `sender_id`.
    pub fn distinct_receivers_of(&self, sender_id: &str) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            query_distinct(
                conn,
                "SELECT DISTINCT receiver_id FROM messages WHERE sender_id = ?1",
                sender_id,
            )
        })
    }

    /// Distinct `sender_id` values over messages received by `receiver_id`.
    pub fn distinct_senders_to(&self, receiver_id: &str) -> Result<Vec<Uuid>> {
        self.with_conn(|conn| {
            query_distinct(
                conn,
                "SELECT DISTINCT sender_id FROM messages WHERE receiver_id = ?1",
                receiver_id,
            )
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        profile_pic: row.get(4)?,
        join_date: row.get(5)?,
        last_active: row.get(6)?,
        is_active: row.get(7)?,
    })
}

fn query_distinct(conn: &Connection, sql: &str, value: &str) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(sql)?;
    let raw = stmt
        .query_map([value], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    raw.iter().map(|id| parse_uuid(id, "peer id")).collect()
}

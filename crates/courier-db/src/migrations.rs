use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);"
    )?;

    let version: i64 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (users and messages)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                email       TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL,
                profile_pic TEXT NOT NULL,
                join_date   TEXT NOT NULL,
                last_active TEXT NOT NULL,
                is_active   INTEGER NOT NULL DEFAULT 1
            );

            -- sender_id and receiver_id are weak references: no FOREIGN KEY on purpose
            CREATE TABLE messages (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                id          TEXT NOT NULL UNIQUE,
                sender_id   TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                content     TEXT NOT NULL,
                timestamp   TEXT NOT NULL
            );

            CREATE INDEX idx_messages_pair
                ON messages(sender_id, receiver_id);

            CREATE INDEX idx_messages_receiver
                ON messages(receiver_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}

use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            callsign    TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS channels (
            id            TEXT PRIMARY KEY,
            creator_id    TEXT REFERENCES users(id),
            kind          TEXT NOT NULL,
            code          TEXT NOT NULL UNIQUE,
            name          TEXT NOT NULL,
            description   TEXT,
            is_active     INTEGER NOT NULL DEFAULT 1,
            member_count  INTEGER NOT NULL DEFAULT 0,
            anchor_lat    REAL,
            anchor_lon    REAL,
            created_at    TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at    TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS subscriptions (
            user_id     TEXT NOT NULL REFERENCES users(id),
            channel_id  TEXT NOT NULL REFERENCES channels(id),
            muted       INTEGER NOT NULL DEFAULT 0,
            joined_at   TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(user_id, channel_id)
        );

        CREATE INDEX IF NOT EXISTS idx_subscriptions_channel
            ON subscriptions(channel_id);

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            channel_id  TEXT NOT NULL REFERENCES channels(id),
            sender_id   TEXT REFERENCES users(id),
            callsign    TEXT NOT NULL,
            body        TEXT NOT NULL,
            lat         REAL,
            lon         REAL,
            device      TEXT,
            category    TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_channel
            ON messages(channel_id, created_at);

        CREATE TABLE IF NOT EXISTS user_devices (
            user_id      TEXT NOT NULL REFERENCES users(id),
            kind         TEXT NOT NULL,
            is_unlocked  INTEGER NOT NULL DEFAULT 0,
            is_current   INTEGER NOT NULL DEFAULT 0,
            UNIQUE(user_id, kind)
        );

        -- Resource/territory adapter tables. In a full deployment these are
        -- owned by the inventory and territory systems; here they back the
        -- ledger/territory provider traits for a single-node install.
        CREATE TABLE IF NOT EXISTS resources (
            user_id   TEXT NOT NULL REFERENCES users(id),
            resource  TEXT NOT NULL,
            quantity  INTEGER NOT NULL DEFAULT 0,
            UNIQUE(user_id, resource)
        );

        CREATE TABLE IF NOT EXISTS territories (
            user_id      TEXT PRIMARY KEY REFERENCES users(id),
            owned_count  INTEGER NOT NULL DEFAULT 0
        );

        -- Seed the system broadcast channel
        INSERT OR IGNORE INTO channels (id, kind, code, name, description)
            VALUES (
                '00000000-0000-0000-0000-000000000001',
                'official',
                'EMERGENCY-1',
                'Emergency Broadcast',
                'System-wide alerts. Audible on every device.'
            );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}

use crate::Database;
use crate::models::{ChannelRow, DeviceRow, MessageRow, SubscriptionRow, UserRow};
use anyhow::Result;
use breaker_types::models::DeviceKind;
use rusqlite::{Connection, Row, params};

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                (id, username, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn set_callsign(&self, user_id: &str, callsign: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE users SET callsign = ?2 WHERE id = ?1",
                (user_id, callsign),
            )?;
            Ok(n > 0)
        })
    }

    // -- Channels --

    /// Insert a channel and subscribe its creator in one transaction, so a
    /// freshly created channel is never reachable as owned-but-not-joined.
    /// Returns false when the generated code collided with an existing one.
    #[allow(clippy::too_many_arguments)]
    pub fn create_channel(
        &self,
        id: &str,
        creator_id: &str,
        kind: &str,
        code: &str,
        name: &str,
        description: Option<&str>,
        anchor: Option<(f64, f64)>,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO channels
                     (id, creator_id, kind, code, name, description,
                      member_count, anchor_lat, anchor_lon)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?8)",
                params![
                    id,
                    creator_id,
                    kind,
                    code,
                    name,
                    description,
                    anchor.map(|a| a.0),
                    anchor.map(|a| a.1),
                ],
            )?;
            if inserted == 0 {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO subscriptions (user_id, channel_id) VALUES (?1, ?2)",
                (creator_id, id),
            )?;

            tx.commit()?;
            Ok(true)
        })
    }

    pub fn get_channel(&self, id: &str) -> Result<Option<ChannelRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{CHANNEL_SELECT} WHERE id = ?1"))?;
            stmt.query_row([id], map_channel_row).optional()
        })
    }

    pub fn list_channels(&self) -> Result<Vec<ChannelRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("{CHANNEL_SELECT} WHERE is_active = 1 ORDER BY name"))?;
            let rows = stmt
                .query_map([], map_channel_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn deactivate_channel(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE channels SET is_active = 0, updated_at = datetime('now') WHERE id = ?1",
                [id],
            )?;
            Ok(n > 0)
        })
    }

    /// Remove a channel with all its subscriptions and messages.
    /// Authorization (creator-only, never official) is the caller's job.
    pub fn delete_channel(&self, id: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM subscriptions WHERE channel_id = ?1", [id])?;
            tx.execute("DELETE FROM messages WHERE channel_id = ?1", [id])?;
            tx.execute("DELETE FROM channels WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(())
        })
    }

    // -- Subscriptions --

    /// Idempotent: returns true if a membership was created, false if it
    /// already existed. member_count is advisory and only moves on a real
    /// state change.
    pub fn subscribe(&self, user_id: &str, channel_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO subscriptions (user_id, channel_id) VALUES (?1, ?2)",
                (user_id, channel_id),
            )?;
            if inserted > 0 {
                tx.execute(
                    "UPDATE channels SET member_count = member_count + 1 WHERE id = ?1",
                    [channel_id],
                )?;
            }
            tx.commit()?;
            Ok(inserted > 0)
        })
    }

    /// Idempotent: unsubscribing a non-member is a no-op.
    pub fn unsubscribe(&self, user_id: &str, channel_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM subscriptions WHERE user_id = ?1 AND channel_id = ?2",
                (user_id, channel_id),
            )?;
            if removed > 0 {
                tx.execute(
                    "UPDATE channels SET member_count = MAX(member_count - 1, 0) WHERE id = ?1",
                    [channel_id],
                )?;
            }
            tx.commit()?;
            Ok(removed > 0)
        })
    }

    pub fn is_subscribed(&self, user_id: &str, channel_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM subscriptions WHERE user_id = ?1 AND channel_id = ?2",
                    (user_id, channel_id),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn set_muted(&self, user_id: &str, channel_id: &str, muted: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE subscriptions SET muted = ?3 WHERE user_id = ?1 AND channel_id = ?2",
                params![user_id, channel_id, muted],
            )?;
            Ok(n > 0)
        })
    }

    pub fn subscriptions_for_user(&self, user_id: &str) -> Result<Vec<SubscriptionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, channel_id, muted, joined_at
                 FROM subscriptions WHERE user_id = ?1 ORDER BY joined_at",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(SubscriptionRow {
                        user_id: row.get(0)?,
                        channel_id: row.get(1)?,
                        muted: row.get(2)?,
                        joined_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Insert a transmission. The id is client-generated and stable across
    /// retries: a duplicate insert is reported as `false` so the caller can
    /// skip re-publishing, and the stored row stays untouched (immutable).
    #[allow(clippy::too_many_arguments)]
    pub fn insert_message(
        &self,
        id: &str,
        channel_id: &str,
        sender_id: &str,
        callsign: &str,
        body: &str,
        location: Option<(f64, f64)>,
        device: Option<&str>,
        category: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO messages
                     (id, channel_id, sender_id, callsign, body, lat, lon, device, category)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id,
                    channel_id,
                    sender_id,
                    callsign,
                    body,
                    location.map(|l| l.0),
                    location.map(|l| l.1),
                    device,
                    category,
                ],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Newest-first page of a channel's history. Pass the `created_at` of the
    /// oldest message from the previous page as `before` to go further back.
    pub fn get_messages(
        &self,
        channel_id: &str,
        limit: u32,
        before: Option<&str>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            // rowid breaks ties within datetime('now') second resolution
            let (sql, params): (String, Vec<&dyn rusqlite::types::ToSql>) = match &before {
                Some(b) => (
                    format!(
                        "{MESSAGE_SELECT} WHERE channel_id = ?1 AND created_at < ?2
                         ORDER BY created_at DESC, rowid DESC LIMIT ?3"
                    ),
                    vec![&channel_id, b, &limit],
                ),
                None => (
                    format!(
                        "{MESSAGE_SELECT} WHERE channel_id = ?1
                         ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                    ),
                    vec![&channel_id, &limit],
                ),
            };

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params.as_slice(), map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{MESSAGE_SELECT} WHERE id = ?1"))?;
            stmt.query_row([id], map_message_row).optional()
        })
    }

    /// Authorization (sender-only) is the caller's job.
    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    // -- Device ownership --

    /// Lazily seed the per-kind rows for a user: every kind locked except the
    /// default, which starts unlocked and current.
    pub fn ensure_device_rows(&self, user_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            for kind in DeviceKind::ALL {
                let default = kind == breaker_radio::device::DEFAULT_KIND;
                conn.execute(
                    "INSERT OR IGNORE INTO user_devices (user_id, kind, is_unlocked, is_current)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![user_id, kind.as_str(), default, default],
                )?;
            }
            Ok(())
        })
    }

    pub fn device_states(&self, user_id: &str) -> Result<Vec<DeviceRow>> {
        self.ensure_device_rows(user_id)?;
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, kind, is_unlocked, is_current
                 FROM user_devices WHERE user_id = ?1",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(DeviceRow {
                        user_id: row.get(0)?,
                        kind: row.get(1)?,
                        is_unlocked: row.get(2)?,
                        is_current: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn set_device_unlocked(&self, user_id: &str, kind: &str) -> Result<()> {
        self.ensure_device_rows(user_id)?;
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE user_devices SET is_unlocked = 1 WHERE user_id = ?1 AND kind = ?2",
                (user_id, kind),
            )?;
            Ok(())
        })
    }

    /// Atomic current-device swap: exactly one row ends up current. Returns
    /// false (and changes nothing) when the target kind is not unlocked.
    pub fn switch_current_device(&self, user_id: &str, kind: &str) -> Result<bool> {
        self.ensure_device_rows(user_id)?;
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let claimed = tx.execute(
                "UPDATE user_devices SET is_current = 1
                 WHERE user_id = ?1 AND kind = ?2 AND is_unlocked = 1",
                (user_id, kind),
            )?;
            if claimed == 0 {
                return Ok(false);
            }
            tx.execute(
                "UPDATE user_devices SET is_current = 0 WHERE user_id = ?1 AND kind != ?2",
                (user_id, kind),
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn current_device(&self, user_id: &str) -> Result<Option<String>> {
        self.ensure_device_rows(user_id)?;
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT kind FROM user_devices WHERE user_id = ?1 AND is_current = 1",
                [user_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    // -- Resources & territories (provider adapter tables) --

    pub fn resource_quantity(&self, user_id: &str, resource: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let qty: Option<i64> = conn
                .query_row(
                    "SELECT quantity FROM resources WHERE user_id = ?1 AND resource = ?2",
                    (user_id, resource),
                    |row| row.get(0),
                )
                .optional()?;
            Ok(qty.unwrap_or(0))
        })
    }

    /// Guarded deduction: fails without changing anything if the held
    /// quantity is below `amount`.
    pub fn resource_deduct(&self, user_id: &str, resource: &str, amount: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE resources SET quantity = quantity - ?3
                 WHERE user_id = ?1 AND resource = ?2 AND quantity >= ?3",
                params![user_id, resource, amount],
            )?;
            Ok(n > 0)
        })
    }

    pub fn resource_add(&self, user_id: &str, resource: &str, amount: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO resources (user_id, resource, quantity) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id, resource) DO UPDATE SET quantity = quantity + ?3",
                params![user_id, resource, amount],
            )?;
            Ok(())
        })
    }

    pub fn territory_count(&self, user_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count: Option<i64> = conn
                .query_row(
                    "SELECT owned_count FROM territories WHERE user_id = ?1",
                    [user_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(count.unwrap_or(0))
        })
    }

    pub fn set_territory_count(&self, user_id: &str, count: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO territories (user_id, owned_count) VALUES (?1, ?2)
                 ON CONFLICT(user_id) DO UPDATE SET owned_count = ?2",
                (user_id, count),
            )?;
            Ok(())
        })
    }
}

const CHANNEL_SELECT: &str = "SELECT id, creator_id, kind, code, name, description, is_active,
        member_count, anchor_lat, anchor_lon, created_at, updated_at
 FROM channels";

const MESSAGE_SELECT: &str = "SELECT id, channel_id, sender_id, callsign, body, lat, lon, device, category, created_at
 FROM messages";

fn map_channel_row(row: &Row) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get(0)?,
        creator_id: row.get(1)?,
        kind: row.get(2)?,
        code: row.get(3)?,
        name: row.get(4)?,
        description: row.get(5)?,
        is_active: row.get(6)?,
        member_count: row.get(7)?,
        anchor_lat: row.get(8)?,
        anchor_lon: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn map_message_row(row: &Row) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        sender_id: row.get(2)?,
        callsign: row.get(3)?,
        body: row.get(4)?,
        lat: row.get(5)?,
        lon: row.get(6)?,
        device: row.get(7)?,
        category: row.get(8)?,
        created_at: row.get(9)?,
    })
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, username, password, callsign, created_at FROM users WHERE {column} = ?1"
    ))?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                callsign: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn db_with_user(username: &str) -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let id = Uuid::new_v4().to_string();
        db.create_user(&id, username, "hash").unwrap();
        (db, id)
    }

    fn make_channel(db: &Database, creator: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let code = format!("TEST-{}", &id[..8]);
        assert!(
            db.create_channel(&id, creator, "public", &code, "test channel", None, None)
                .unwrap()
        );
        id
    }

    #[test]
    fn official_channel_is_seeded() {
        let db = Database::open_in_memory().unwrap();
        let row = db
            .get_channel("00000000-0000-0000-0000-000000000001")
            .unwrap()
            .unwrap();
        assert_eq!(row.kind, "official");
        assert!(row.creator_id.is_none());
    }

    #[test]
    fn create_channel_auto_subscribes_creator() {
        let (db, user) = db_with_user("alice");
        let channel = make_channel(&db, &user);

        assert!(db.is_subscribed(&user, &channel).unwrap());
        let row = db.get_channel(&channel).unwrap().unwrap();
        assert_eq!(row.member_count, 1);
    }

    #[test]
    fn create_channel_reports_code_collision() {
        let (db, user) = db_with_user("alice");
        let a = Uuid::new_v4().to_string();
        let b = Uuid::new_v4().to_string();
        assert!(
            db.create_channel(&a, &user, "public", "DUPE", "one", None, None)
                .unwrap()
        );
        assert!(
            !db.create_channel(&b, &user, "public", "DUPE", "two", None, None)
                .unwrap()
        );
        assert!(db.get_channel(&b).unwrap().is_none());
    }

    #[test]
    fn subscribe_is_idempotent() {
        let (db, alice) = db_with_user("alice");
        let channel = make_channel(&db, &alice);

        let bob = Uuid::new_v4().to_string();
        db.create_user(&bob, "bob", "hash").unwrap();

        assert!(db.subscribe(&bob, &channel).unwrap());
        assert!(!db.subscribe(&bob, &channel).unwrap());

        let row = db.get_channel(&channel).unwrap().unwrap();
        assert_eq!(row.member_count, 2);
    }

    #[test]
    fn unsubscribe_non_member_is_noop() {
        let (db, alice) = db_with_user("alice");
        let channel = make_channel(&db, &alice);

        let bob = Uuid::new_v4().to_string();
        db.create_user(&bob, "bob", "hash").unwrap();

        assert!(!db.unsubscribe(&bob, &channel).unwrap());
        let row = db.get_channel(&channel).unwrap().unwrap();
        assert_eq!(row.member_count, 1);

        db.subscribe(&bob, &channel).unwrap();
        assert!(db.unsubscribe(&bob, &channel).unwrap());
        let row = db.get_channel(&channel).unwrap().unwrap();
        assert_eq!(row.member_count, 1);
    }

    #[test]
    fn delete_channel_cascades() {
        let (db, alice) = db_with_user("alice");
        let channel = make_channel(&db, &alice);
        let msg = Uuid::new_v4().to_string();
        db.insert_message(&msg, &channel, &alice, "ALICE", "hello", None, None, None)
            .unwrap();

        db.delete_channel(&channel).unwrap();

        assert!(db.get_channel(&channel).unwrap().is_none());
        assert!(db.get_message(&msg).unwrap().is_none());
        assert!(!db.is_subscribed(&alice, &channel).unwrap());
    }

    #[test]
    fn message_insert_is_stable_across_retries() {
        let (db, alice) = db_with_user("alice");
        let channel = make_channel(&db, &alice);
        let msg = Uuid::new_v4().to_string();

        assert!(
            db.insert_message(&msg, &channel, &alice, "ALICE", "first", None, None, None)
                .unwrap()
        );
        // Retry with the same id: no-op, original body retained.
        assert!(
            !db.insert_message(&msg, &channel, &alice, "ALICE", "second", None, None, None)
                .unwrap()
        );
        let row = db.get_message(&msg).unwrap().unwrap();
        assert_eq!(row.body, "first");
    }

    #[test]
    fn messages_page_newest_first() {
        let (db, alice) = db_with_user("alice");
        let channel = make_channel(&db, &alice);

        for i in 0..5 {
            let id = Uuid::new_v4().to_string();
            db.insert_message(
                &id,
                &channel,
                &alice,
                "ALICE",
                &format!("msg {i}"),
                None,
                None,
                None,
            )
            .unwrap();
        }

        let rows = db.get_messages(&channel, 3, None).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].body, "msg 4");
        assert_eq!(rows[2].body, "msg 2");
    }

    #[test]
    fn message_stores_location_and_device() {
        let (db, alice) = db_with_user("alice");
        let channel = make_channel(&db, &alice);
        let msg = Uuid::new_v4().to_string();
        db.insert_message(
            &msg,
            &channel,
            &alice,
            "ALICE",
            "pos check",
            Some((52.52, 13.405)),
            Some("handheld"),
            None,
        )
        .unwrap();

        let t = db.get_message(&msg).unwrap().unwrap().into_transmission().unwrap();
        assert_eq!(t.device, Some(DeviceKind::Handheld));
        let loc = t.location.unwrap();
        assert!((loc.lat - 52.52).abs() < 1e-9);
        assert!((loc.lon - 13.405).abs() < 1e-9);
    }

    #[test]
    fn device_rows_seed_lazily_with_default_current() {
        let (db, alice) = db_with_user("alice");
        let states = db.device_states(&alice).unwrap();
        assert_eq!(states.len(), DeviceKind::ALL.len());

        let current: Vec<_> = states.iter().filter(|s| s.is_current).collect();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].kind, "receiver");
        assert!(current[0].is_unlocked);
    }

    #[test]
    fn switch_requires_unlocked_and_keeps_one_current() {
        let (db, alice) = db_with_user("alice");
        db.ensure_device_rows(&alice).unwrap();

        assert!(!db.switch_current_device(&alice, "handheld").unwrap());
        assert_eq!(db.current_device(&alice).unwrap().as_deref(), Some("receiver"));

        db.set_device_unlocked(&alice, "handheld").unwrap();
        assert!(db.switch_current_device(&alice, "handheld").unwrap());
        assert_eq!(db.current_device(&alice).unwrap().as_deref(), Some("handheld"));

        let current: Vec<_> = db
            .device_states(&alice)
            .unwrap()
            .into_iter()
            .filter(|s| s.is_current)
            .collect();
        assert_eq!(current.len(), 1);
    }

    #[test]
    fn resource_deduct_is_guarded() {
        let (db, alice) = db_with_user("alice");
        db.resource_add(&alice, "scrap", 30).unwrap();

        assert!(!db.resource_deduct(&alice, "scrap", 50).unwrap());
        assert_eq!(db.resource_quantity(&alice, "scrap").unwrap(), 30);

        assert!(db.resource_deduct(&alice, "scrap", 30).unwrap());
        assert_eq!(db.resource_quantity(&alice, "scrap").unwrap(), 0);
    }
}

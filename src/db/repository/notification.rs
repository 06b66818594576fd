use std::str::FromStr;

use rusqlite::{params, Connection};

use crate::db::DatabaseError;
use crate::models::enums::NotificationKind;
use crate::models::notification::Notification;

pub fn create_notification(
    conn: &Connection,
    user_id: i64,
    message: &str,
    kind: NotificationKind,
) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO notifications (user_id, message, kind) VALUES (?1, ?2, ?3)",
        params![user_id, message, kind.as_str()],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Latest 10 notifications for a user, newest first.
pub fn list_for_user(conn: &Connection, user_id: i64) -> Result<Vec<Notification>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, message, kind, is_read, created_at
         FROM notifications
         WHERE user_id = ?1
         ORDER BY created_at DESC, id DESC
         LIMIT 10",
    )?;

    let rows = stmt.query_map(params![user_id], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, i32>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut notifications = Vec::new();
    for row in rows {
        let (id, user_id, message, kind, is_read, created_at) = row?;
        notifications.push(Notification {
            id,
            user_id,
            message,
            kind: NotificationKind::from_str(&kind)?,
            is_read: is_read != 0,
            created_at,
        });
    }
    Ok(notifications)
}

/// Mark a notification read, scoped to its owner. Returns `false` when the
/// id does not exist or belongs to someone else.
pub fn mark_read(conn: &Connection, id: i64, user_id: i64) -> Result<bool, DatabaseError> {
    let changed = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    Ok(changed > 0)
}

pub fn unread_count(conn: &Connection, user_id: i64) -> Result<i64, DatabaseError> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

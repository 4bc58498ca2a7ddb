use rusqlite::params;

use super::{DbError, DbNotification, GovDb};

const NOTIFICATION_COLUMNS: &str = "id, recipient_id, sender_id, notification_type, title,
        message, meeting_id, is_read, read_at, created_at";

fn map_notification(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbNotification> {
    Ok(DbNotification {
        id: row.get(0)?,
        recipient_id: row.get(1)?,
        sender_id: row.get(2)?,
        notification_type: row.get(3)?,
        title: row.get(4)?,
        message: row.get(5)?,
        meeting_id: row.get(6)?,
        is_read: row.get::<_, i64>(7)? != 0,
        read_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

impl GovDb {
    pub fn insert_notification(&self, n: &DbNotification) -> Result<(), DbError> {
        self.conn_ref().execute(
            "INSERT INTO notifications
                (id, recipient_id, sender_id, notification_type, title, message,
                 meeting_id, is_read, read_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                n.id,
                n.recipient_id,
                n.sender_id,
                n.notification_type,
                n.title,
                n.message,
                n.meeting_id,
                n.is_read as i64,
                n.read_at,
                n.created_at,
            ],
        )?;
        Ok(())
    }

    /// Most recent notifications correlated with a meeting, newest first.
    /// The archive engine copies up to 50 of these into its snapshot.
    pub fn recent_notifications_for_meeting(
        &self,
        meeting_id: &str,
        limit: i64,
    ) -> Result<Vec<DbNotification>, DbError> {
        let mut stmt = self.conn_ref().prepare(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE meeting_id = ?1
             ORDER BY created_at DESC
             LIMIT ?2"
        ))?;
        let rows = stmt.query_map(params![meeting_id, limit], map_notification)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    pub fn list_notifications_for_user(
        &self,
        recipient_id: &str,
        unread_only: bool,
    ) -> Result<Vec<DbNotification>, DbError> {
        let mut stmt = self.conn_ref().prepare(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications
             WHERE recipient_id = ?1 AND (?2 = 0 OR is_read = 0)
             ORDER BY created_at DESC"
        ))?;
        let rows = stmt.query_map(params![recipient_id, unread_only as i64], map_notification)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Returns false if the notification does not belong to the recipient.
    pub fn mark_notification_read(
        &self,
        id: &str,
        recipient_id: &str,
        now: &str,
    ) -> Result<bool, DbError> {
        let affected = self.conn_ref().execute(
            "UPDATE notifications SET is_read = 1, read_at = ?1
             WHERE id = ?2 AND recipient_id = ?3",
            params![now, id, recipient_id],
        )?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_utils::test_db;
    use super::*;

    fn sample_notification(id: &str, recipient: &str, created_at: &str) -> DbNotification {
        DbNotification {
            id: id.to_string(),
            recipient_id: recipient.to_string(),
            sender_id: Some("org-1".to_string()),
            notification_type: "vote_request".to_string(),
            title: "Vote requested".to_string(),
            message: "Please vote on the minutes".to_string(),
            meeting_id: Some("mtg-1".to_string()),
            is_read: false,
            read_at: None,
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn test_recent_for_meeting_orders_and_limits() {
        let db = test_db();
        for i in 0..5 {
            db.insert_notification(&sample_notification(
                &format!("n{i}"),
                "u1",
                &format!("2025-01-10T0{i}:00:00+00:00"),
            ))
            .expect("insert");
        }

        let recent = db
            .recent_notifications_for_meeting("mtg-1", 3)
            .expect("query");
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, "n4");
        assert_eq!(recent[2].id, "n2");
    }

    #[test]
    fn test_mark_read_scoped_to_recipient() {
        let db = test_db();
        db.insert_notification(&sample_notification("n1", "u1", "2025-01-10T09:00:00+00:00"))
            .expect("insert");

        assert!(!db
            .mark_notification_read("n1", "someone-else", "2025-01-10T10:00:00+00:00")
            .expect("mark"));
        assert!(db
            .mark_notification_read("n1", "u1", "2025-01-10T10:00:00+00:00")
            .expect("mark"));

        let unread = db.list_notifications_for_user("u1", true).expect("list");
        assert!(unread.is_empty());
        let all = db.list_notifications_for_user("u1", false).expect("list");
        assert_eq!(all.len(), 1);
        assert!(all[0].is_read);
    }
}

//! Notification recording and best-effort delivery.
//!
//! The engine records every notification in the database (the archive
//! engine copies them into snapshots) and hands it to a transport for
//! asynchronous delivery. Delivery failures are logged and never roll back
//! the write that triggered them.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{fmt_ts, DbNotification, GovDb};

/// External delivery collaborator. Implementations are expected to fail
/// fast; the engine treats any error as non-fatal.
pub trait NotificationTransport: Send + Sync {
    fn deliver(&self, notification: &DbNotification) -> Result<(), String>;
}

/// Default transport: writes the notification to the log and succeeds.
pub struct LogTransport;

impl NotificationTransport for LogTransport {
    fn deliver(&self, n: &DbNotification) -> Result<(), String> {
        log::info!(
            "notification [{}] to {}: {}",
            n.notification_type,
            n.recipient_id,
            n.title
        );
        Ok(())
    }
}

pub struct OutgoingNotification<'a> {
    pub recipient_id: &'a str,
    pub sender_id: Option<&'a str>,
    pub notification_type: &'a str,
    pub title: &'a str,
    pub message: &'a str,
    pub meeting_id: Option<&'a str>,
}

/// Record and deliver a notification, best-effort on both counts.
pub fn send(
    db: &GovDb,
    transport: &dyn NotificationTransport,
    now: DateTime<Utc>,
    outgoing: OutgoingNotification<'_>,
) {
    let n = DbNotification {
        id: Uuid::new_v4().to_string(),
        recipient_id: outgoing.recipient_id.to_string(),
        sender_id: outgoing.sender_id.map(|s| s.to_string()),
        notification_type: outgoing.notification_type.to_string(),
        title: outgoing.title.to_string(),
        message: outgoing.message.to_string(),
        meeting_id: outgoing.meeting_id.map(|m| m.to_string()),
        is_read: false,
        read_at: None,
        created_at: fmt_ts(now),
    };

    if let Err(e) = db.insert_notification(&n) {
        log::warn!("Failed to record notification for {}: {}", n.recipient_id, e);
    }
    if let Err(e) = transport.deliver(&n) {
        log::warn!("Notification delivery to {} failed: {}", n.recipient_id, e);
    }
}

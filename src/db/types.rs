//! Shared type definitions for the database layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::GovernError;
use crate::types::{
    ArchiveStatus, ArchiveType, AttendeeResponse, MeetingStatus, MeetingType, MinutesStatus,
    VoteType,
};

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Malformed JSON column: {0}")]
    Json(#[from] serde_json::Error),
}

impl DbError {
    /// True when the underlying failure is a UNIQUE/CHECK/FK violation.
    /// The service layer maps these onto `GovernError::Conflict` for the
    /// uniqueness keys that guard check-then-act races.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            DbError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

/// Format a timestamp for storage. All writes go through here so stored
/// values stay lexicographically comparable.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

/// Parse a stored RFC 3339 timestamp.
pub fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A row from the `meeting_rooms` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbRoom {
    pub id: String,
    pub name: String,
    pub capacity: i64,
    pub floor: Option<String>,
    pub building: Option<String>,
    /// JSON array of facility labels ("projector", "vc", ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facilities_json: Option<String>,
    pub active: bool,
    pub created_at: String,
}

/// A row from the `meetings` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbMeeting {
    pub id: String,
    pub title: String,
    pub start_time: String,
    pub end_time: String,
    /// Free-text venue. Display only; never used for conflict detection.
    pub location: Option<String>,
    pub room_id: Option<String>,
    pub meeting_type: MeetingType,
    pub status: MeetingStatus,
    pub organizer_id: String,
    pub secretary_id: Option<String>,
    pub is_private: bool,
    pub department: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DbMeeting {
    pub fn starts_at(&self) -> Option<DateTime<Utc>> {
        parse_ts(&self.start_time)
    }

    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        parse_ts(&self.end_time)
    }
}

/// A row from the `meeting_attendees` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbAttendee {
    pub meeting_id: String,
    pub user_id: String,
    pub response: AttendeeResponse,
    pub responded_at: Option<String>,
}

/// A row from the `minutes` table.
///
/// `status`, `is_voting_closed`, `is_approved`, and `active` are kept
/// consistent by the transition methods below; callers never write them
/// directly. The booleans are persisted projections for wire compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbMinutes {
    pub id: String,
    pub meeting_id: String,
    pub title: String,
    pub content: String,
    pub status: MinutesStatus,
    pub is_voting_closed: bool,
    pub is_approved: bool,
    pub active: bool,
    pub vote_deadline: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<String>,
    pub secretary_id: String,
    /// JSON array of reviewer user ids.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewers_json: Option<String>,
    /// JSON array of `Decision`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decisions_json: Option<String>,
    /// JSON array of `DocumentRef` attachments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments_json: Option<String>,
    pub required_vote_count: i64,
    pub version: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl DbMinutes {
    /// Active = voting open AND status not terminal. This is the predicate
    /// behind the one-active-minutes-per-meeting unique index.
    fn compute_active(&self) -> bool {
        !self.is_voting_closed && !self.status.is_terminal()
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = fmt_ts(now);
        self.active = self.compute_active();
    }

    /// Whether a vote can currently be cast or amended.
    pub fn can_vote(&self, now: DateTime<Utc>) -> bool {
        if self.is_voting_closed || self.status == MinutesStatus::Approved {
            return false;
        }
        match self.vote_deadline.as_deref().and_then(parse_ts) {
            Some(deadline) => now <= deadline,
            None => true,
        }
    }

    /// Whether the vote deadline has passed without voting being closed.
    pub fn voting_expired(&self, now: DateTime<Utc>) -> bool {
        if self.is_voting_closed {
            return false;
        }
        matches!(
            self.vote_deadline.as_deref().and_then(parse_ts),
            Some(deadline) if now > deadline
        )
    }

    pub fn submit_for_review(&mut self, now: DateTime<Utc>) -> Result<(), GovernError> {
        if self.status != MinutesStatus::Draft {
            return Err(GovernError::State(format!(
                "cannot submit minutes for review from status {}",
                self.status.as_str()
            )));
        }
        self.status = MinutesStatus::PendingReview;
        self.touch(now);
        Ok(())
    }

    pub fn submit_for_approval(&mut self, now: DateTime<Utc>) -> Result<(), GovernError> {
        if self.status != MinutesStatus::PendingReview {
            return Err(GovernError::State(format!(
                "cannot submit minutes for approval from status {}",
                self.status.as_str()
            )));
        }
        self.status = MinutesStatus::PendingApproval;
        self.touch(now);
        Ok(())
    }

    /// Close voting and approve, unconditionally of the tally. This is the
    /// no-quorum policy: closing with zero votes still approves.
    ///
    /// `approver` is the closing user for an explicit close, or `None` for
    /// a deadline-triggered close.
    pub fn close_voting(
        &mut self,
        approver: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), GovernError> {
        if self.is_voting_closed {
            return Err(GovernError::Conflict("voting is already closed".into()));
        }
        if self.status == MinutesStatus::Rejected {
            return Err(GovernError::State(
                "cannot close voting on rejected minutes".into(),
            ));
        }
        self.is_voting_closed = true;
        self.status = MinutesStatus::Approved;
        self.approved_by = approver.map(|a| a.to_string());
        self.approved_at = Some(fmt_ts(now));
        self.touch(now);
        Ok(())
    }

    /// Separate approval transition. May run while voting is still open;
    /// converges on the same terminal state as `close_voting`.
    pub fn approve(&mut self, approver: &str, now: DateTime<Utc>) -> Result<(), GovernError> {
        if self.status == MinutesStatus::Rejected {
            return Err(GovernError::State("minutes were rejected".into()));
        }
        if self.is_approved {
            return Err(GovernError::Conflict("minutes are already approved".into()));
        }
        self.is_approved = true;
        self.status = MinutesStatus::Approved;
        self.approved_by = Some(approver.to_string());
        self.approved_at = Some(fmt_ts(now));
        self.touch(now);
        Ok(())
    }

    pub fn reject(&mut self, now: DateTime<Utc>) -> Result<(), GovernError> {
        if self.status.is_terminal() {
            return Err(GovernError::State(format!(
                "cannot reject minutes in status {}",
                self.status.as_str()
            )));
        }
        self.status = MinutesStatus::Rejected;
        self.is_voting_closed = true;
        self.touch(now);
        Ok(())
    }

    /// Record that the vote ledger changed (bumps version/updated_at).
    pub fn note_vote_mutation(&mut self, now: DateTime<Utc>) {
        self.touch(now);
    }
}

/// A row from the `minutes_votes` table. Unique per (minutes, voter).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbVote {
    pub id: String,
    pub minutes_id: String,
    pub voter_id: String,
    pub vote_type: VoteType,
    pub comment: Option<String>,
    pub voted_at: String,
    pub updated_at: String,
}

/// A row from the `notifications` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbNotification {
    pub id: String,
    pub recipient_id: String,
    pub sender_id: Option<String>,
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub meeting_id: Option<String>,
    pub is_read: bool,
    pub read_at: Option<String>,
    pub created_at: String,
}

/// A row from the `archives` table. Snapshot columns are frozen at creation;
/// only the resync operation may rewrite `minutes_snapshots_json`, and only
/// the append operations may grow notes/documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbArchive {
    pub id: String,
    pub meeting_id: String,
    pub title: String,
    pub archive_type: ArchiveType,
    pub status: ArchiveStatus,
    pub created_by: String,
    pub meeting_snapshot_json: String,
    pub minutes_snapshots_json: String,
    pub documents_json: String,
    pub summary_json: Option<String>,
    pub notifications_json: String,
    pub notes_json: String,
    pub tags_json: String,
    pub is_public: bool,
    pub allowed_departments_json: String,
    pub allowed_users_json: String,
    pub restricted_users_json: String,
    pub total_documents: i64,
    pub total_size: i64,
    pub view_count: i64,
    pub download_count: i64,
    pub retain_until: String,
    pub auto_delete: bool,
    pub archived_at: String,
    pub updated_at: String,
}

/// A row from the `archive_sync_log` audit table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbSyncLog {
    pub id: String,
    pub archive_id: String,
    pub synced_by: String,
    pub synced_at: String,
    pub snapshots_before: i64,
    pub snapshots_after: i64,
    pub documents_added: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_minutes() -> DbMinutes {
        let now = Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap();
        DbMinutes {
            id: "min-1".to_string(),
            meeting_id: "mtg-1".to_string(),
            title: "Weekly sync".to_string(),
            content: String::new(),
            status: MinutesStatus::Draft,
            is_voting_closed: false,
            is_approved: false,
            active: true,
            vote_deadline: Some(fmt_ts(
                Utc.with_ymd_and_hms(2025, 1, 12, 9, 0, 0).unwrap(),
            )),
            approved_by: None,
            approved_at: None,
            secretary_id: "sec-1".to_string(),
            reviewers_json: None,
            decisions_json: None,
            attachments_json: None,
            required_vote_count: 5,
            version: 1,
            created_at: fmt_ts(now),
            updated_at: fmt_ts(now),
        }
    }

    #[test]
    fn test_close_voting_approves_and_deactivates() {
        let mut m = sample_minutes();
        let now = Utc.with_ymd_and_hms(2025, 1, 11, 9, 0, 0).unwrap();
        m.close_voting(Some("sec-1"), now).expect("close");
        assert!(m.is_voting_closed);
        assert_eq!(m.status, MinutesStatus::Approved);
        assert_eq!(m.approved_by.as_deref(), Some("sec-1"));
        assert!(!m.active);
        assert_eq!(m.version, 2);

        // Second close is a conflict
        let err = m.close_voting(Some("sec-1"), now).unwrap_err();
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn test_approve_runs_without_closing_voting() {
        let mut m = sample_minutes();
        let now = Utc.with_ymd_and_hms(2025, 1, 11, 9, 0, 0).unwrap();
        m.approve("mgr-1", now).expect("approve");
        assert!(m.is_approved);
        assert_eq!(m.status, MinutesStatus::Approved);
        // Voting was not closed by the approval path
        assert!(!m.is_voting_closed);
        // But the record is no longer active, and votes are barred
        assert!(!m.active);
        assert!(!m.can_vote(now));
    }

    #[test]
    fn test_both_entry_points_converge() {
        let mut m = sample_minutes();
        let now = Utc.with_ymd_and_hms(2025, 1, 11, 9, 0, 0).unwrap();
        m.close_voting(Some("sec-1"), now).expect("close");
        // Approval after closure must still be possible
        m.approve("mgr-1", now).expect("approve after close");
        assert!(m.is_voting_closed && m.is_approved);
        assert_eq!(m.status, MinutesStatus::Approved);
    }

    #[test]
    fn test_can_vote_respects_deadline() {
        let m = sample_minutes();
        let before = Utc.with_ymd_and_hms(2025, 1, 11, 9, 0, 0).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 1, 13, 9, 0, 0).unwrap();
        assert!(m.can_vote(before));
        assert!(!m.can_vote(after));
        assert!(m.voting_expired(after));
        assert!(!m.voting_expired(before));
    }

    #[test]
    fn test_review_chain() {
        let mut m = sample_minutes();
        let now = Utc.with_ymd_and_hms(2025, 1, 10, 10, 0, 0).unwrap();
        m.submit_for_review(now).expect("to review");
        assert_eq!(m.status, MinutesStatus::PendingReview);
        m.submit_for_approval(now).expect("to approval");
        assert_eq!(m.status, MinutesStatus::PendingApproval);
        // Still active through the review chain
        assert!(m.active);
        // Cannot re-submit for review
        assert_eq!(m.submit_for_review(now).unwrap_err().kind(), "state");
    }

    #[test]
    fn test_reject_is_terminal() {
        let mut m = sample_minutes();
        let now = Utc.with_ymd_and_hms(2025, 1, 10, 10, 0, 0).unwrap();
        m.reject(now).expect("reject");
        assert_eq!(m.status, MinutesStatus::Rejected);
        assert!(m.is_voting_closed);
        assert!(!m.active);
        assert_eq!(m.approve("mgr-1", now).unwrap_err().kind(), "state");
        assert_eq!(
            m.close_voting(Some("sec-1"), now).unwrap_err().kind(),
            "conflict"
        );
    }
}

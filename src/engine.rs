//! The operation surface.
//!
//! `Engine` owns the database behind a mutex and a notification transport,
//! and stamps each call with a single `now`. Callers authenticate out of
//! band and pass a `Principal`; everything else is enforced here and in
//! the service layer.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::context::OpCtx;
use crate::db::{
    fmt_ts, DbArchive, DbError, DbMeeting, DbMinutes, DbNotification, DbRoom, DbSyncLog, DbVote,
    GovDb,
};
use crate::error::GovernError;
use crate::notify::{LogTransport, NotificationTransport};
use crate::services::{archives, meetings, minutes, rooms};
use crate::types::{
    ArchiveStatus, AttendeeResponse, DocumentRef, Page, Principal, VoteTally, VoteType,
};

pub use crate::services::archives::{ArchiveSummary, NewArchive};
pub use crate::services::meetings::NewMeeting;
pub use crate::services::minutes::NewMinutes;
pub use crate::services::rooms::NewRoom;

pub struct Engine {
    db: Mutex<GovDb>,
    transport: Box<dyn NotificationTransport>,
}

/// Counts from a maintenance sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub meetings_completed: usize,
    pub archives_deleted: usize,
}

impl Engine {
    pub fn open(path: PathBuf) -> Result<Self, DbError> {
        Self::open_with_transport(path, Box::new(LogTransport))
    }

    pub fn open_with_transport(
        path: PathBuf,
        transport: Box<dyn NotificationTransport>,
    ) -> Result<Self, DbError> {
        let db = GovDb::open(path)?;
        Ok(Self {
            db: Mutex::new(db),
            transport,
        })
    }

    fn with_ctx<T>(
        &self,
        principal: &Principal,
        f: impl FnOnce(&OpCtx<'_>) -> Result<T, GovernError>,
    ) -> Result<T, GovernError> {
        let db = self.db.lock();
        let ctx = OpCtx {
            db: &db,
            principal,
            now: Utc::now(),
            transport: self.transport.as_ref(),
        };
        f(&ctx)
    }

    // =========================================================================
    // Rooms
    // =========================================================================

    pub fn register_room(&self, principal: &Principal, input: NewRoom) -> Result<DbRoom, GovernError> {
        self.with_ctx(principal, |ctx| rooms::register_room(ctx, input))
    }

    pub fn deactivate_room(&self, principal: &Principal, room_id: &str) -> Result<(), GovernError> {
        self.with_ctx(principal, |ctx| rooms::deactivate_room(ctx, room_id))
    }

    pub fn room_is_available(
        &self,
        principal: &Principal,
        room_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_meeting_id: Option<&str>,
    ) -> Result<bool, GovernError> {
        self.with_ctx(principal, |ctx| {
            rooms::is_available(ctx, room_id, start, end, exclude_meeting_id)
        })
    }

    pub fn find_available_rooms(
        &self,
        principal: &Principal,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_capacity: i64,
    ) -> Result<Vec<DbRoom>, GovernError> {
        self.with_ctx(principal, |ctx| {
            rooms::find_available_rooms(ctx, start, end, min_capacity)
        })
    }

    pub fn list_rooms(&self, _principal: &Principal) -> Result<Vec<DbRoom>, GovernError> {
        let db = self.db.lock();
        db.list_active_rooms(0).map_err(GovernError::from)
    }

    // =========================================================================
    // Meetings
    // =========================================================================

    pub fn create_meeting(
        &self,
        principal: &Principal,
        input: NewMeeting,
    ) -> Result<DbMeeting, GovernError> {
        self.with_ctx(principal, |ctx| meetings::create_meeting(ctx, input))
    }

    pub fn get_meeting(&self, principal: &Principal, id: &str) -> Result<DbMeeting, GovernError> {
        self.with_ctx(principal, |ctx| meetings::get_meeting(ctx, id))
    }

    pub fn list_meetings(
        &self,
        principal: &Principal,
        page: Page,
    ) -> Result<Vec<DbMeeting>, GovernError> {
        self.with_ctx(principal, |ctx| meetings::list_meetings(ctx, page))
    }

    pub fn cancel_meeting(&self, principal: &Principal, id: &str) -> Result<DbMeeting, GovernError> {
        self.with_ctx(principal, |ctx| meetings::cancel_meeting(ctx, id))
    }

    pub fn postpone_meeting(
        &self,
        principal: &Principal,
        id: &str,
    ) -> Result<DbMeeting, GovernError> {
        self.with_ctx(principal, |ctx| meetings::postpone_meeting(ctx, id))
    }

    pub fn respond_to_invite(
        &self,
        principal: &Principal,
        meeting_id: &str,
        response: AttendeeResponse,
    ) -> Result<(), GovernError> {
        self.with_ctx(principal, |ctx| {
            meetings::respond_to_invite(ctx, meeting_id, response)
        })
    }

    // =========================================================================
    // Minutes and voting
    // =========================================================================

    pub fn create_minutes(
        &self,
        principal: &Principal,
        input: NewMinutes,
    ) -> Result<DbMinutes, GovernError> {
        self.with_ctx(principal, |ctx| minutes::create_minutes(ctx, input))
    }

    pub fn get_minutes(&self, principal: &Principal, id: &str) -> Result<DbMinutes, GovernError> {
        self.with_ctx(principal, |ctx| minutes::get_minutes(ctx, id))
    }

    pub fn active_minutes(
        &self,
        principal: &Principal,
        meeting_id: &str,
    ) -> Result<Option<DbMinutes>, GovernError> {
        self.with_ctx(principal, |ctx| minutes::active_minutes(ctx, meeting_id))
    }

    pub fn submit_vote(
        &self,
        principal: &Principal,
        minutes_id: &str,
        vote_type: VoteType,
        comment: Option<String>,
    ) -> Result<DbVote, GovernError> {
        self.with_ctx(principal, |ctx| {
            minutes::submit_vote(ctx, minutes_id, vote_type, comment)
        })
    }

    pub fn amend_vote(
        &self,
        principal: &Principal,
        minutes_id: &str,
        vote_type: VoteType,
        comment: Option<String>,
    ) -> Result<(), GovernError> {
        self.with_ctx(principal, |ctx| {
            minutes::amend_vote(ctx, minutes_id, vote_type, comment)
        })
    }

    pub fn close_voting(
        &self,
        principal: &Principal,
        minutes_id: &str,
    ) -> Result<DbMinutes, GovernError> {
        self.with_ctx(principal, |ctx| minutes::close_voting(ctx, minutes_id))
    }

    pub fn approve_minutes(
        &self,
        principal: &Principal,
        minutes_id: &str,
    ) -> Result<DbMinutes, GovernError> {
        self.with_ctx(principal, |ctx| minutes::approve_minutes(ctx, minutes_id))
    }

    pub fn reject_minutes(
        &self,
        principal: &Principal,
        minutes_id: &str,
        reason: Option<&str>,
    ) -> Result<DbMinutes, GovernError> {
        self.with_ctx(principal, |ctx| minutes::reject_minutes(ctx, minutes_id, reason))
    }

    pub fn submit_for_review(
        &self,
        principal: &Principal,
        minutes_id: &str,
    ) -> Result<DbMinutes, GovernError> {
        self.with_ctx(principal, |ctx| minutes::submit_for_review(ctx, minutes_id))
    }

    pub fn submit_for_approval(
        &self,
        principal: &Principal,
        minutes_id: &str,
    ) -> Result<DbMinutes, GovernError> {
        self.with_ctx(principal, |ctx| minutes::submit_for_approval(ctx, minutes_id))
    }

    pub fn vote_tally(
        &self,
        principal: &Principal,
        minutes_id: &str,
    ) -> Result<VoteTally, GovernError> {
        self.with_ctx(principal, |ctx| minutes::tally(ctx, minutes_id))
    }

    // =========================================================================
    // Archives
    // =========================================================================

    pub fn create_archive(
        &self,
        principal: &Principal,
        input: NewArchive,
    ) -> Result<DbArchive, GovernError> {
        self.with_ctx(principal, |ctx| archives::create_archive(ctx, input))
    }

    pub fn get_archive(&self, principal: &Principal, id: &str) -> Result<DbArchive, GovernError> {
        self.with_ctx(principal, |ctx| archives::get_archive(ctx, id))
    }

    pub fn list_archives(
        &self,
        principal: &Principal,
        page: Page,
    ) -> Result<Vec<DbArchive>, GovernError> {
        self.with_ctx(principal, |ctx| archives::list_archives(ctx, page))
    }

    pub fn resync_archive_minutes(
        &self,
        principal: &Principal,
        id: &str,
    ) -> Result<DbArchive, GovernError> {
        self.with_ctx(principal, |ctx| archives::resync_minutes(ctx, id))
    }

    pub fn archive_sync_history(
        &self,
        principal: &Principal,
        id: &str,
    ) -> Result<Vec<DbSyncLog>, GovernError> {
        self.with_ctx(principal, |ctx| archives::sync_history(ctx, id))
    }

    pub fn append_archive_note(
        &self,
        principal: &Principal,
        id: &str,
        text: &str,
    ) -> Result<DbArchive, GovernError> {
        self.with_ctx(principal, |ctx| archives::append_note(ctx, id, text))
    }

    pub fn append_archive_document(
        &self,
        principal: &Principal,
        id: &str,
        document: DocumentRef,
    ) -> Result<DbArchive, GovernError> {
        self.with_ctx(principal, |ctx| archives::append_document(ctx, id, document))
    }

    pub fn record_archive_download(
        &self,
        principal: &Principal,
        id: &str,
    ) -> Result<(), GovernError> {
        self.with_ctx(principal, |ctx| archives::record_download(ctx, id))
    }

    pub fn set_archive_status(
        &self,
        principal: &Principal,
        id: &str,
        status: ArchiveStatus,
    ) -> Result<DbArchive, GovernError> {
        self.with_ctx(principal, |ctx| archives::set_archive_status(ctx, id, status))
    }

    // =========================================================================
    // Notifications
    // =========================================================================

    pub fn notifications(
        &self,
        principal: &Principal,
        unread_only: bool,
    ) -> Result<Vec<DbNotification>, GovernError> {
        let db = self.db.lock();
        db.list_notifications_for_user(&principal.id, unread_only)
            .map_err(GovernError::from)
    }

    pub fn mark_notification_read(
        &self,
        principal: &Principal,
        id: &str,
    ) -> Result<(), GovernError> {
        let db = self.db.lock();
        if !db.mark_notification_read(id, &principal.id, &fmt_ts(Utc::now()))? {
            return Err(GovernError::not_found("notification", id));
        }
        Ok(())
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Run the time-based sweeps: completed meetings and expired archives.
    pub fn sweep(&self) -> Result<SweepReport, GovernError> {
        let db = self.db.lock();
        let now = fmt_ts(Utc::now());
        let meetings_completed = db.sweep_completed_meetings(&now)?;
        let archives_deleted = db.sweep_expired_archives(&now)?;
        if meetings_completed > 0 || archives_deleted > 0 {
            log::info!(
                "Sweep completed {} meetings, deleted {} expired archives",
                meetings_completed,
                archives_deleted
            );
        }
        Ok(SweepReport {
            meetings_completed,
            archives_deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MeetingType, Role};
    use chrono::Duration;

    fn test_engine() -> Engine {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("engine.db");
        std::mem::forget(dir);
        Engine::open(path).expect("open")
    }

    #[test]
    fn test_end_to_end_meeting_flow() {
        let engine = test_engine();
        let admin = Principal::new("root", Role::Admin, None);
        let organizer = Principal::new("org-1", Role::Secretary, Some("engineering"));

        let room = engine
            .register_room(
                &admin,
                NewRoom {
                    name: "Boardroom".into(),
                    capacity: 12,
                    floor: Some("5".into()),
                    building: None,
                    facilities: vec!["vc".into()],
                },
            )
            .expect("room");

        // A meeting that already ended, so the sweep completes it
        let start = Utc::now() - Duration::hours(2);
        let end = Utc::now() - Duration::hours(1);
        let meeting = engine
            .create_meeting(
                &organizer,
                NewMeeting {
                    title: "Retro".into(),
                    start_time: start,
                    end_time: end,
                    location: None,
                    room_id: Some(room.id.clone()),
                    meeting_type: MeetingType::Hybrid,
                    secretary_id: Some("org-1".into()),
                    is_private: false,
                    department: None,
                    attendee_ids: vec!["u1".into(), "u2".into()],
                },
            )
            .expect("meeting");

        let minutes = engine
            .create_minutes(
                &organizer,
                NewMinutes {
                    meeting_id: meeting.id.clone(),
                    title: "Retro minutes".into(),
                    content: "went well".into(),
                    vote_deadline: None,
                    reviewers: vec![],
                    decisions: vec![],
                },
            )
            .expect("minutes");
        // u1, u2, and the organizer
        assert_eq!(minutes.required_vote_count, 3);

        let voter = Principal::new("u1", Role::Employee, None);
        engine
            .submit_vote(&voter, &minutes.id, VoteType::Agree, None)
            .expect("vote");
        let closed = engine.close_voting(&organizer, &minutes.id).expect("close");
        assert!(closed.is_voting_closed);

        let report = engine.sweep().expect("sweep");
        assert_eq!(report.meetings_completed, 1);

        let archive = engine
            .create_archive(
                &organizer,
                NewArchive {
                    meeting_id: meeting.id.clone(),
                    title: None,
                    archive_type: crate::types::ArchiveType::Complete,
                    summary: None,
                    tags: vec![],
                    is_public: true,
                    allowed_departments: vec![],
                    allowed_users: vec![],
                    restricted_users: vec![],
                    retention_years: None,
                    auto_delete: false,
                },
            )
            .expect("archive");
        let fetched = engine.get_archive(&voter, &archive.id).expect("read");
        assert_eq!(fetched.view_count, 1);

        // The invite and the vote request both landed in u1's inbox
        let inbox = engine.notifications(&voter, true).expect("inbox");
        assert!(inbox.len() >= 2);
        engine
            .mark_notification_read(&voter, &inbox[0].id)
            .expect("mark read");
        let unread = engine.notifications(&voter, true).expect("inbox");
        assert_eq!(unread.len(), inbox.len() - 1);
    }
}

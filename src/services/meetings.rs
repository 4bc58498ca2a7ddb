//! Meeting scheduling and lifecycle.
//!
//! The room conflict check and the insert run inside one transaction so a
//! racing double-booking cannot slip between check and write.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::context::OpCtx;
use crate::db::{fmt_ts, DbAttendee, DbMeeting};
use crate::error::GovernError;
use crate::notify::OutgoingNotification;
use crate::services::rooms::validate_window;
use crate::services::visibility;
use crate::types::{AttendeeResponse, MeetingStatus, MeetingType, Page, Role};

pub struct NewMeeting {
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub location: Option<String>,
    pub room_id: Option<String>,
    pub meeting_type: MeetingType,
    pub secretary_id: Option<String>,
    pub is_private: bool,
    pub department: Option<String>,
    pub attendee_ids: Vec<String>,
}

pub fn create_meeting(ctx: &OpCtx<'_>, input: NewMeeting) -> Result<DbMeeting, GovernError> {
    if input.title.trim().is_empty() {
        return Err(GovernError::validation("title", "must not be empty"));
    }
    validate_window(input.start_time, input.end_time)?;

    if let Some(room_id) = &input.room_id {
        let room = ctx
            .db
            .get_room(room_id)?
            .ok_or_else(|| GovernError::not_found("room", room_id.clone()))?;
        if !room.active {
            return Err(GovernError::Conflict(format!(
                "room '{}' is no longer in service",
                room.name
            )));
        }
    }

    let now = ctx.ts();
    let meeting = DbMeeting {
        id: Uuid::new_v4().to_string(),
        title: input.title.trim().to_string(),
        start_time: fmt_ts(input.start_time),
        end_time: fmt_ts(input.end_time),
        location: input.location,
        room_id: input.room_id,
        meeting_type: input.meeting_type,
        status: MeetingStatus::Scheduled,
        organizer_id: ctx.principal.id.clone(),
        secretary_id: input.secretary_id,
        is_private: input.is_private,
        department: input.department.or_else(|| ctx.principal.department.clone()),
        created_at: now.clone(),
        updated_at: now.clone(),
    };

    ctx.db.with_transaction(|db| {
        if let Some(room_id) = &meeting.room_id {
            if db.room_has_conflict(room_id, &meeting.start_time, &meeting.end_time, None)? {
                return Err(GovernError::Conflict(
                    "room is already booked for an overlapping time".into(),
                ));
            }
        }
        db.insert_meeting(&meeting)?;
        for user_id in &input.attendee_ids {
            db.insert_attendee(&DbAttendee {
                meeting_id: meeting.id.clone(),
                user_id: user_id.clone(),
                response: AttendeeResponse::Invited,
                responded_at: None,
            })?;
        }
        Ok(())
    })?;

    log::info!("Scheduled meeting {} ({})", meeting.title, meeting.id);
    for user_id in &input.attendee_ids {
        ctx.notify(OutgoingNotification {
            recipient_id: user_id,
            sender_id: Some(&ctx.principal.id),
            notification_type: "meeting_invite",
            title: "Meeting invitation",
            message: &format!("You are invited to '{}'", meeting.title),
            meeting_id: Some(&meeting.id),
        });
    }
    Ok(meeting)
}

pub fn get_meeting(ctx: &OpCtx<'_>, id: &str) -> Result<DbMeeting, GovernError> {
    let meeting = ctx
        .db
        .get_meeting(id)?
        .ok_or_else(|| GovernError::not_found("meeting", id))?;
    let is_attendee = ctx
        .db
        .get_attendees(id)?
        .iter()
        .any(|a| a.user_id == ctx.principal.id);
    if !visibility::can_see_meeting(ctx.principal, &meeting, is_attendee) {
        return Err(GovernError::Authorization(
            "meeting is not visible to you".into(),
        ));
    }
    Ok(meeting)
}

pub fn list_meetings(ctx: &OpCtx<'_>, page: Page) -> Result<Vec<DbMeeting>, GovernError> {
    let filter = visibility::meetings_filter(ctx.principal);
    ctx.db
        .list_meetings_where(&filter.clause, filter.params, page.limit, page.offset)
        .map_err(GovernError::from)
}

pub fn cancel_meeting(ctx: &OpCtx<'_>, id: &str) -> Result<DbMeeting, GovernError> {
    finish_early(ctx, id, MeetingStatus::Cancelled, "meeting_cancelled", "cancelled")
}

pub fn postpone_meeting(ctx: &OpCtx<'_>, id: &str) -> Result<DbMeeting, GovernError> {
    finish_early(ctx, id, MeetingStatus::Postponed, "meeting_postponed", "postponed")
}

fn finish_early(
    ctx: &OpCtx<'_>,
    id: &str,
    status: MeetingStatus,
    notification_type: &str,
    verb: &str,
) -> Result<DbMeeting, GovernError> {
    let mut meeting = ctx
        .db
        .get_meeting(id)?
        .ok_or_else(|| GovernError::not_found("meeting", id))?;

    if meeting.organizer_id != ctx.principal.id && ctx.principal.role != Role::Admin {
        return Err(GovernError::Authorization(
            "only the organizer or an admin may change a meeting".into(),
        ));
    }
    if !meeting.status.is_editable() {
        return Err(GovernError::State(format!(
            "meeting is {} and can no longer be changed",
            meeting.status.as_str()
        )));
    }
    if matches!(meeting.starts_at(), Some(start) if ctx.now >= start) {
        return Err(GovernError::State(
            "meeting has already started".into(),
        ));
    }

    ctx.db.update_meeting_status(id, status, &ctx.ts())?;
    meeting.status = status;
    meeting.updated_at = ctx.ts();

    for attendee in ctx.db.get_attendees(id)? {
        ctx.notify(OutgoingNotification {
            recipient_id: &attendee.user_id,
            sender_id: Some(&ctx.principal.id),
            notification_type,
            title: "Meeting update",
            message: &format!("'{}' has been {verb}", meeting.title),
            meeting_id: Some(id),
        });
    }
    Ok(meeting)
}

/// Record the caller's response to an invitation.
pub fn respond_to_invite(
    ctx: &OpCtx<'_>,
    meeting_id: &str,
    response: AttendeeResponse,
) -> Result<(), GovernError> {
    if !matches!(
        response,
        AttendeeResponse::Accepted | AttendeeResponse::Declined | AttendeeResponse::Tentative
    ) {
        return Err(GovernError::validation(
            "response",
            "must be accepted, declined, or tentative",
        ));
    }
    let meeting = ctx
        .db
        .get_meeting(meeting_id)?
        .ok_or_else(|| GovernError::not_found("meeting", meeting_id))?;
    if !meeting.status.occupies_room() {
        return Err(GovernError::State(format!(
            "meeting is {}",
            meeting.status.as_str()
        )));
    }
    if !ctx
        .db
        .set_attendee_response(meeting_id, &ctx.principal.id, response, &ctx.ts())?
    {
        return Err(GovernError::Authorization(
            "you are not invited to this meeting".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::test_db;
    use crate::db::GovDb;
    use crate::notify::LogTransport;
    use crate::types::Principal;
    use chrono::TimeZone;

    fn at(day: u32, h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, day, h, m, 0).unwrap()
    }

    fn ctx<'a>(db: &'a GovDb, principal: &'a Principal, now: DateTime<Utc>) -> OpCtx<'a> {
        OpCtx {
            db,
            principal,
            now,
            transport: &LogTransport,
        }
    }

    fn new_meeting(room_id: Option<String>, attendees: &[&str]) -> NewMeeting {
        NewMeeting {
            title: "Quarterly review".into(),
            start_time: at(10, 9, 0),
            end_time: at(10, 10, 0),
            location: Some("HQ".into()),
            room_id,
            meeting_type: MeetingType::Offline,
            secretary_id: Some("sec-1".into()),
            is_private: false,
            department: None,
            attendee_ids: attendees.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn seed_room(db: &GovDb, id: &str) {
        db.insert_room(&crate::db::rooms::tests::sample_room(id, id, 10))
            .expect("room");
    }

    #[test]
    fn test_create_checks_room_conflict_atomically() {
        let db = test_db();
        let organizer = Principal::new("org-1", Role::Manager, Some("engineering"));
        let c = ctx(&db, &organizer, at(5, 8, 0));
        seed_room(&db, "r1");

        let first = create_meeting(&c, new_meeting(Some("r1".into()), &["u1", "u2"]))
            .expect("first booking");
        assert_eq!(first.status, MeetingStatus::Scheduled);
        assert_eq!(db.get_attendees(&first.id).expect("attendees").len(), 2);

        // Same room, overlapping window
        let mut second = new_meeting(Some("r1".into()), &[]);
        second.start_time = at(10, 9, 30);
        second.end_time = at(10, 10, 30);
        assert_eq!(create_meeting(&c, second).unwrap_err().kind(), "conflict");

        // Touching window is fine
        let mut touching = new_meeting(Some("r1".into()), &[]);
        touching.start_time = at(10, 10, 0);
        touching.end_time = at(10, 11, 0);
        create_meeting(&c, touching).expect("touching booking");

        // Invite notifications were recorded
        let invites = db
            .recent_notifications_for_meeting(&first.id, 50)
            .expect("notifications");
        assert_eq!(invites.len(), 2);
        assert_eq!(invites[0].notification_type, "meeting_invite");
    }

    #[test]
    fn test_create_rejects_bad_window_and_dead_room() {
        let db = test_db();
        let organizer = Principal::new("org-1", Role::Manager, None);
        let c = ctx(&db, &organizer, at(5, 8, 0));

        let mut inverted = new_meeting(None, &[]);
        inverted.end_time = inverted.start_time;
        assert_eq!(create_meeting(&c, inverted).unwrap_err().kind(), "validation");

        seed_room(&db, "r1");
        db.deactivate_room("r1").expect("deactivate");
        assert_eq!(
            create_meeting(&c, new_meeting(Some("r1".into()), &[]))
                .unwrap_err()
                .kind(),
            "conflict"
        );

        assert_eq!(
            create_meeting(&c, new_meeting(Some("ghost".into()), &[]))
                .unwrap_err()
                .kind(),
            "not_found"
        );
    }

    #[test]
    fn test_cancel_rules() {
        let db = test_db();
        let organizer = Principal::new("org-1", Role::Employee, None);
        let c = ctx(&db, &organizer, at(5, 8, 0));
        let meeting = create_meeting(&c, new_meeting(None, &["u1"])).expect("create");

        // A stranger may not cancel
        let stranger = Principal::new("u9", Role::Manager, None);
        let sc = ctx(&db, &stranger, at(5, 9, 0));
        assert_eq!(
            cancel_meeting(&sc, &meeting.id).unwrap_err().kind(),
            "authorization"
        );

        // After the start time the organizer may not either
        let late = ctx(&db, &organizer, at(10, 9, 30));
        assert_eq!(cancel_meeting(&late, &meeting.id).unwrap_err().kind(), "state");

        // Before the start it works, and is terminal
        let cancelled = cancel_meeting(&c, &meeting.id).expect("cancel");
        assert_eq!(cancelled.status, MeetingStatus::Cancelled);
        assert_eq!(cancel_meeting(&c, &meeting.id).unwrap_err().kind(), "state");

        // An admin can postpone someone else's meeting
        let other = create_meeting(&c, new_meeting(None, &[])).expect("create");
        let admin = Principal::new("root", Role::Admin, None);
        let ac = ctx(&db, &admin, at(5, 9, 0));
        let postponed = postpone_meeting(&ac, &other.id).expect("postpone");
        assert_eq!(postponed.status, MeetingStatus::Postponed);
    }

    #[test]
    fn test_respond_to_invite() {
        let db = test_db();
        let organizer = Principal::new("org-1", Role::Manager, None);
        let c = ctx(&db, &organizer, at(5, 8, 0));
        let meeting = create_meeting(&c, new_meeting(None, &["u1"])).expect("create");

        let attendee = Principal::new("u1", Role::Employee, None);
        let uc = ctx(&db, &attendee, at(6, 8, 0));
        respond_to_invite(&uc, &meeting.id, AttendeeResponse::Accepted).expect("respond");
        let attendees = db.get_attendees(&meeting.id).expect("attendees");
        assert_eq!(attendees[0].response, AttendeeResponse::Accepted);
        assert!(attendees[0].responded_at.is_some());

        // Not invited
        let outsider = Principal::new("u2", Role::Employee, None);
        let oc = ctx(&db, &outsider, at(6, 8, 0));
        assert_eq!(
            respond_to_invite(&oc, &meeting.id, AttendeeResponse::Declined)
                .unwrap_err()
                .kind(),
            "authorization"
        );

        // Responses are constrained
        assert_eq!(
            respond_to_invite(&uc, &meeting.id, AttendeeResponse::Attended)
                .unwrap_err()
                .kind(),
            "validation"
        );

        // Cancelled meetings no longer take responses
        cancel_meeting(&c, &meeting.id).expect("cancel");
        assert_eq!(
            respond_to_invite(&uc, &meeting.id, AttendeeResponse::Declined)
                .unwrap_err()
                .kind(),
            "state"
        );
    }

    #[test]
    fn test_get_meeting_enforces_visibility() {
        let db = test_db();
        let organizer = Principal::new("org-1", Role::Manager, Some("engineering"));
        let c = ctx(&db, &organizer, at(5, 8, 0));
        let mut input = new_meeting(None, &["u1"]);
        input.is_private = true;
        let meeting = create_meeting(&c, input).expect("create");

        // Attendee sees it
        let attendee = Principal::new("u1", Role::Employee, Some("finance"));
        let uc = ctx(&db, &attendee, at(6, 8, 0));
        get_meeting(&uc, &meeting.id).expect("attendee read");

        // Unrelated employee in the same department does not
        let peer = Principal::new("u2", Role::Employee, Some("engineering"));
        let pc = ctx(&db, &peer, at(6, 8, 0));
        assert_eq!(
            get_meeting(&pc, &meeting.id).unwrap_err().kind(),
            "authorization"
        );

        // A manager in the department does
        let mgr = Principal::new("mgr-2", Role::Manager, Some("engineering"));
        let mc = ctx(&db, &mgr, at(6, 8, 0));
        get_meeting(&mc, &meeting.id).expect("manager read");

        assert_eq!(get_meeting(&c, "ghost").unwrap_err().kind(), "not_found");
    }

    #[test]
    fn test_list_is_paged_under_the_filter() {
        let db = test_db();
        let organizer = Principal::new("org-1", Role::Manager, None);
        let c = ctx(&db, &organizer, at(5, 8, 0));
        for i in 0..3 {
            let mut input = new_meeting(None, &[]);
            input.title = format!("m{i}");
            input.start_time = at(10 + i, 9, 0);
            input.end_time = at(10 + i, 10, 0);
            create_meeting(&c, input).expect("create");
        }

        let page = list_meetings(&c, Page { limit: 2, offset: 0 }).expect("list");
        assert_eq!(page.len(), 2);
        // Newest first
        assert_eq!(page[0].title, "m2");
        let rest = list_meetings(&c, Page { limit: 2, offset: 2 }).expect("list");
        assert_eq!(rest.len(), 1);
    }
}

use rusqlite::{params, types::ToSql};

use super::{DbAttendee, DbError, DbMeeting, GovDb};
use crate::types::{AttendeeResponse, MeetingStatus, MeetingType};

const MEETING_COLUMNS: &str = "m.id, m.title, m.start_time, m.end_time, m.location, m.room_id,
        m.meeting_type, m.status, m.organizer_id, m.secretary_id,
        m.is_private, m.department, m.created_at, m.updated_at";

fn map_meeting(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbMeeting> {
    Ok(DbMeeting {
        id: row.get(0)?,
        title: row.get(1)?,
        start_time: row.get(2)?,
        end_time: row.get(3)?,
        location: row.get(4)?,
        room_id: row.get(5)?,
        meeting_type: MeetingType::from_str_lossy(&row.get::<_, String>(6)?),
        status: MeetingStatus::from_str_lossy(&row.get::<_, String>(7)?),
        organizer_id: row.get(8)?,
        secretary_id: row.get(9)?,
        is_private: row.get::<_, i64>(10)? != 0,
        department: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

impl GovDb {
    pub fn insert_meeting(&self, meeting: &DbMeeting) -> Result<(), DbError> {
        self.conn_ref().execute(
            "INSERT INTO meetings (
                id, title, start_time, end_time, location, room_id,
                meeting_type, status, organizer_id, secretary_id,
                is_private, department, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                meeting.id,
                meeting.title,
                meeting.start_time,
                meeting.end_time,
                meeting.location,
                meeting.room_id,
                meeting.meeting_type.as_str(),
                meeting.status.as_str(),
                meeting.organizer_id,
                meeting.secretary_id,
                meeting.is_private as i64,
                meeting.department,
                meeting.created_at,
                meeting.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_meeting(&self, id: &str) -> Result<Option<DbMeeting>, DbError> {
        let mut stmt = self.conn_ref().prepare(&format!(
            "SELECT {MEETING_COLUMNS} FROM meetings m WHERE m.id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id], map_meeting)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Rewrite the mutable meeting fields. Status changes go through
    /// `update_meeting_status` so the sweep can stay a single statement.
    pub fn update_meeting(&self, meeting: &DbMeeting) -> Result<(), DbError> {
        self.conn_ref().execute(
            "UPDATE meetings SET
                title = ?1, start_time = ?2, end_time = ?3, location = ?4,
                room_id = ?5, meeting_type = ?6, status = ?7, secretary_id = ?8,
                is_private = ?9, department = ?10, updated_at = ?11
             WHERE id = ?12",
            params![
                meeting.title,
                meeting.start_time,
                meeting.end_time,
                meeting.location,
                meeting.room_id,
                meeting.meeting_type.as_str(),
                meeting.status.as_str(),
                meeting.secretary_id,
                meeting.is_private as i64,
                meeting.department,
                meeting.updated_at,
                meeting.id,
            ],
        )?;
        Ok(())
    }

    pub fn update_meeting_status(
        &self,
        id: &str,
        status: MeetingStatus,
        now: &str,
    ) -> Result<(), DbError> {
        self.conn_ref().execute(
            "UPDATE meetings SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now, id],
        )?;
        Ok(())
    }

    pub fn insert_attendee(&self, attendee: &DbAttendee) -> Result<(), DbError> {
        self.conn_ref().execute(
            "INSERT OR REPLACE INTO meeting_attendees (meeting_id, user_id, response, responded_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                attendee.meeting_id,
                attendee.user_id,
                attendee.response.as_str(),
                attendee.responded_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_attendees(&self, meeting_id: &str) -> Result<Vec<DbAttendee>, DbError> {
        let mut stmt = self.conn_ref().prepare(
            "SELECT meeting_id, user_id, response, responded_at
             FROM meeting_attendees WHERE meeting_id = ?1 ORDER BY user_id",
        )?;
        let rows = stmt.query_map(params![meeting_id], |row| {
            Ok(DbAttendee {
                meeting_id: row.get(0)?,
                user_id: row.get(1)?,
                response: AttendeeResponse::from_str_lossy(&row.get::<_, String>(2)?),
                responded_at: row.get(3)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Returns false if the user is not an attendee of the meeting.
    pub fn set_attendee_response(
        &self,
        meeting_id: &str,
        user_id: &str,
        response: AttendeeResponse,
        now: &str,
    ) -> Result<bool, DbError> {
        let affected = self.conn_ref().execute(
            "UPDATE meeting_attendees SET response = ?1, responded_at = ?2
             WHERE meeting_id = ?3 AND user_id = ?4",
            params![response.as_str(), now, meeting_id, user_id],
        )?;
        Ok(affected > 0)
    }

    /// True when some scheduled/ongoing meeting in the room overlaps
    /// [start, end). Touching boundaries do not overlap.
    pub fn room_has_conflict(
        &self,
        room_id: &str,
        start: &str,
        end: &str,
        exclude_meeting_id: Option<&str>,
    ) -> Result<bool, DbError> {
        let count: i64 = self.conn_ref().query_row(
            "SELECT COUNT(*) FROM meetings
             WHERE room_id = ?1
               AND status IN ('scheduled', 'ongoing')
               AND start_time < ?3
               AND end_time > ?2
               AND (?4 IS NULL OR id != ?4)",
            params![room_id, start, end, exclude_meeting_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Paged listing under a caller-supplied predicate (the compiled
    /// visibility filter). `clause` references the meeting row as `m`.
    pub fn list_meetings_where(
        &self,
        clause: &str,
        mut filter_params: Vec<Box<dyn ToSql>>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DbMeeting>, DbError> {
        let sql = format!(
            "SELECT {MEETING_COLUMNS} FROM meetings m
             WHERE {clause}
             ORDER BY m.start_time DESC
             LIMIT ? OFFSET ?"
        );
        filter_params.push(Box::new(limit));
        filter_params.push(Box::new(offset));

        let mut stmt = self.conn_ref().prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(filter_params.iter().map(|p| p.as_ref())),
            map_meeting,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Flip every scheduled/ongoing meeting whose end time has passed to
    /// completed. The sole source of automatic status advancement.
    pub fn sweep_completed_meetings(&self, now: &str) -> Result<usize, DbError> {
        let affected = self.conn_ref().execute(
            "UPDATE meetings SET status = 'completed', updated_at = ?1
             WHERE end_time <= ?1 AND status IN ('scheduled', 'ongoing')",
            params![now],
        )?;
        Ok(affected)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::super::test_utils::test_db;
    use super::*;

    pub(crate) fn sample_meeting(id: &str, start: &str, end: &str) -> DbMeeting {
        DbMeeting {
            id: id.to_string(),
            title: format!("Meeting {id}"),
            start_time: start.to_string(),
            end_time: end.to_string(),
            location: None,
            room_id: None,
            meeting_type: MeetingType::Offline,
            status: MeetingStatus::Scheduled,
            organizer_id: "org-1".to_string(),
            secretary_id: None,
            is_private: false,
            department: None,
            created_at: "2025-01-01T00:00:00+00:00".to_string(),
            updated_at: "2025-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_insert_and_get_meeting() {
        let db = test_db();
        let meeting = sample_meeting(
            "mtg-1",
            "2025-01-10T09:00:00+00:00",
            "2025-01-10T10:00:00+00:00",
        );
        db.insert_meeting(&meeting).expect("insert");

        let got = db.get_meeting("mtg-1").expect("get").expect("exists");
        assert_eq!(got.title, "Meeting mtg-1");
        assert_eq!(got.status, MeetingStatus::Scheduled);
        assert!(db.get_meeting("missing").expect("get").is_none());
    }

    #[test]
    fn test_attendee_roundtrip_and_response() {
        let db = test_db();
        db.insert_meeting(&sample_meeting(
            "mtg-1",
            "2025-01-10T09:00:00+00:00",
            "2025-01-10T10:00:00+00:00",
        ))
        .expect("insert meeting");

        for user in ["u1", "u2"] {
            db.insert_attendee(&DbAttendee {
                meeting_id: "mtg-1".to_string(),
                user_id: user.to_string(),
                response: AttendeeResponse::Invited,
                responded_at: None,
            })
            .expect("insert attendee");
        }

        let updated = db
            .set_attendee_response(
                "mtg-1",
                "u1",
                AttendeeResponse::Accepted,
                "2025-01-05T00:00:00+00:00",
            )
            .expect("respond");
        assert!(updated);

        let not_attendee = db
            .set_attendee_response(
                "mtg-1",
                "stranger",
                AttendeeResponse::Accepted,
                "2025-01-05T00:00:00+00:00",
            )
            .expect("respond");
        assert!(!not_attendee);

        let attendees = db.get_attendees("mtg-1").expect("attendees");
        assert_eq!(attendees.len(), 2);
        assert_eq!(attendees[0].response, AttendeeResponse::Accepted);
        assert_eq!(attendees[1].response, AttendeeResponse::Invited);
    }

    #[test]
    fn test_room_conflict_boundaries() {
        let db = test_db();
        db.insert_room(&super::super::rooms::tests::sample_room("r1", "Blue", 10))
            .expect("room");
        let mut meeting = sample_meeting(
            "mtg-1",
            "2025-01-10T09:00:00+00:00",
            "2025-01-10T10:00:00+00:00",
        );
        meeting.room_id = Some("r1".to_string());
        db.insert_meeting(&meeting).expect("insert");

        // Overlapping window conflicts
        assert!(db
            .room_has_conflict(
                "r1",
                "2025-01-10T09:30:00+00:00",
                "2025-01-10T10:30:00+00:00",
                None
            )
            .expect("query"));

        // Touching boundary does not
        assert!(!db
            .room_has_conflict(
                "r1",
                "2025-01-10T10:00:00+00:00",
                "2025-01-10T11:00:00+00:00",
                None
            )
            .expect("query"));

        // The meeting itself can be excluded (reschedule checks)
        assert!(!db
            .room_has_conflict(
                "r1",
                "2025-01-10T09:30:00+00:00",
                "2025-01-10T10:30:00+00:00",
                Some("mtg-1")
            )
            .expect("query"));
    }

    #[test]
    fn test_cancelled_meetings_never_conflict() {
        let db = test_db();
        db.insert_room(&super::super::rooms::tests::sample_room("r1", "Blue", 10))
            .expect("room");
        let mut meeting = sample_meeting(
            "mtg-1",
            "2025-01-10T09:00:00+00:00",
            "2025-01-10T10:00:00+00:00",
        );
        meeting.room_id = Some("r1".to_string());
        db.insert_meeting(&meeting).expect("insert");
        db.update_meeting_status("mtg-1", MeetingStatus::Cancelled, "2025-01-09T00:00:00+00:00")
            .expect("cancel");

        assert!(!db
            .room_has_conflict(
                "r1",
                "2025-01-10T09:00:00+00:00",
                "2025-01-10T10:00:00+00:00",
                None
            )
            .expect("query"));
    }

    #[test]
    fn test_sweep_completes_past_meetings() {
        let db = test_db();
        db.insert_meeting(&sample_meeting(
            "past",
            "2025-01-10T09:00:00+00:00",
            "2025-01-10T10:00:00+00:00",
        ))
        .expect("insert");
        db.insert_meeting(&sample_meeting(
            "future",
            "2025-06-10T09:00:00+00:00",
            "2025-06-10T10:00:00+00:00",
        ))
        .expect("insert");
        let mut cancelled = sample_meeting(
            "cancelled",
            "2025-01-10T09:00:00+00:00",
            "2025-01-10T10:00:00+00:00",
        );
        cancelled.status = MeetingStatus::Cancelled;
        db.insert_meeting(&cancelled).expect("insert");

        let swept = db
            .sweep_completed_meetings("2025-02-01T00:00:00+00:00")
            .expect("sweep");
        assert_eq!(swept, 1);

        let past = db.get_meeting("past").expect("get").expect("exists");
        assert_eq!(past.status, MeetingStatus::Completed);
        let future = db.get_meeting("future").expect("get").expect("exists");
        assert_eq!(future.status, MeetingStatus::Scheduled);
        let cancelled = db.get_meeting("cancelled").expect("get").expect("exists");
        assert_eq!(cancelled.status, MeetingStatus::Cancelled);
    }
}

use rusqlite::params;

use super::{DbError, DbMinutes, DbVote, GovDb};
use crate::types::{MinutesStatus, VoteType};

const MINUTES_COLUMNS: &str = "id, meeting_id, title, content, status, is_voting_closed,
        is_approved, active, vote_deadline, approved_by, approved_at, secretary_id,
        reviewers_json, decisions_json, attachments_json, required_vote_count,
        version, created_at, updated_at";

fn map_minutes(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbMinutes> {
    Ok(DbMinutes {
        id: row.get(0)?,
        meeting_id: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        status: MinutesStatus::from_str_lossy(&row.get::<_, String>(4)?),
        is_voting_closed: row.get::<_, i64>(5)? != 0,
        is_approved: row.get::<_, i64>(6)? != 0,
        active: row.get::<_, i64>(7)? != 0,
        vote_deadline: row.get(8)?,
        approved_by: row.get(9)?,
        approved_at: row.get(10)?,
        secretary_id: row.get(11)?,
        reviewers_json: row.get(12)?,
        decisions_json: row.get(13)?,
        attachments_json: row.get(14)?,
        required_vote_count: row.get(15)?,
        version: row.get(16)?,
        created_at: row.get(17)?,
        updated_at: row.get(18)?,
    })
}

fn map_vote(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbVote> {
    Ok(DbVote {
        id: row.get(0)?,
        minutes_id: row.get(1)?,
        voter_id: row.get(2)?,
        vote_type: VoteType::from_str_lossy(&row.get::<_, String>(3)?),
        comment: row.get(4)?,
        voted_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

const VOTE_COLUMNS: &str = "id, minutes_id, voter_id, vote_type, comment, voted_at, updated_at";

impl GovDb {
    /// Insert a minutes row. The partial unique index on
    /// `minutes(meeting_id) WHERE active = 1` makes this the atomic guard
    /// for the one-active-minutes rule; a second active insert fails with
    /// a constraint violation.
    pub fn insert_minutes(&self, minutes: &DbMinutes) -> Result<(), DbError> {
        self.conn_ref().execute(
            "INSERT INTO minutes (
                id, meeting_id, title, content, status, is_voting_closed,
                is_approved, active, vote_deadline, approved_by, approved_at,
                secretary_id, reviewers_json, decisions_json, attachments_json,
                required_vote_count, version, created_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            params![
                minutes.id,
                minutes.meeting_id,
                minutes.title,
                minutes.content,
                minutes.status.as_str(),
                minutes.is_voting_closed as i64,
                minutes.is_approved as i64,
                minutes.active as i64,
                minutes.vote_deadline,
                minutes.approved_by,
                minutes.approved_at,
                minutes.secretary_id,
                minutes.reviewers_json,
                minutes.decisions_json,
                minutes.attachments_json,
                minutes.required_vote_count,
                minutes.version,
                minutes.created_at,
                minutes.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_minutes_by_id(&self, id: &str) -> Result<Option<DbMinutes>, DbError> {
        let mut stmt = self.conn_ref().prepare(&format!(
            "SELECT {MINUTES_COLUMNS} FROM minutes WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id], map_minutes)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn get_active_minutes(&self, meeting_id: &str) -> Result<Option<DbMinutes>, DbError> {
        let mut stmt = self.conn_ref().prepare(&format!(
            "SELECT {MINUTES_COLUMNS} FROM minutes WHERE meeting_id = ?1 AND active = 1"
        ))?;
        let mut rows = stmt.query_map(params![meeting_id], map_minutes)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Every historical minutes for a meeting, oldest first.
    pub fn list_minutes_for_meeting(&self, meeting_id: &str) -> Result<Vec<DbMinutes>, DbError> {
        let mut stmt = self.conn_ref().prepare(&format!(
            "SELECT {MINUTES_COLUMNS} FROM minutes WHERE meeting_id = ?1 ORDER BY created_at"
        ))?;
        let rows = stmt.query_map(params![meeting_id], map_minutes)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Persist the mutable minutes fields after a transition or vote.
    pub fn update_minutes(&self, minutes: &DbMinutes) -> Result<(), DbError> {
        self.conn_ref().execute(
            "UPDATE minutes SET
                title = ?1, content = ?2, status = ?3, is_voting_closed = ?4,
                is_approved = ?5, active = ?6, vote_deadline = ?7, approved_by = ?8,
                approved_at = ?9, reviewers_json = ?10, decisions_json = ?11,
                attachments_json = ?12, version = ?13, updated_at = ?14
             WHERE id = ?15",
            params![
                minutes.title,
                minutes.content,
                minutes.status.as_str(),
                minutes.is_voting_closed as i64,
                minutes.is_approved as i64,
                minutes.active as i64,
                minutes.vote_deadline,
                minutes.approved_by,
                minutes.approved_at,
                minutes.reviewers_json,
                minutes.decisions_json,
                minutes.attachments_json,
                minutes.version,
                minutes.updated_at,
                minutes.id,
            ],
        )?;
        Ok(())
    }

    /// Insert a vote. UNIQUE(minutes_id, voter_id) rejects a racing
    /// duplicate create by the same voter.
    pub fn insert_vote(&self, vote: &DbVote) -> Result<(), DbError> {
        self.conn_ref().execute(
            "INSERT INTO minutes_votes (id, minutes_id, voter_id, vote_type, comment, voted_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                vote.id,
                vote.minutes_id,
                vote.voter_id,
                vote.vote_type.as_str(),
                vote.comment,
                vote.voted_at,
                vote.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Amend an existing vote in place. Returns false when the voter has no
    /// vote on these minutes.
    pub fn update_vote(
        &self,
        minutes_id: &str,
        voter_id: &str,
        vote_type: VoteType,
        comment: Option<&str>,
        now: &str,
    ) -> Result<bool, DbError> {
        let affected = self.conn_ref().execute(
            "UPDATE minutes_votes SET vote_type = ?1, comment = ?2, updated_at = ?3
             WHERE minutes_id = ?4 AND voter_id = ?5",
            params![vote_type.as_str(), comment, now, minutes_id, voter_id],
        )?;
        Ok(affected > 0)
    }

    pub fn get_vote(&self, minutes_id: &str, voter_id: &str) -> Result<Option<DbVote>, DbError> {
        let mut stmt = self.conn_ref().prepare(&format!(
            "SELECT {VOTE_COLUMNS} FROM minutes_votes WHERE minutes_id = ?1 AND voter_id = ?2"
        ))?;
        let mut rows = stmt.query_map(params![minutes_id, voter_id], map_vote)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    pub fn list_votes(&self, minutes_id: &str) -> Result<Vec<DbVote>, DbError> {
        let mut stmt = self.conn_ref().prepare(&format!(
            "SELECT {VOTE_COLUMNS} FROM minutes_votes WHERE minutes_id = ?1 ORDER BY voted_at"
        ))?;
        let rows = stmt.query_map(params![minutes_id], map_vote)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::super::meetings::tests::sample_meeting;
    use super::super::test_utils::test_db;
    use super::super::types::fmt_ts;
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample_minutes(id: &str, meeting_id: &str) -> DbMinutes {
        let now = fmt_ts(Utc.with_ymd_and_hms(2025, 1, 10, 11, 0, 0).unwrap());
        DbMinutes {
            id: id.to_string(),
            meeting_id: meeting_id.to_string(),
            title: "Minutes".to_string(),
            content: String::new(),
            status: MinutesStatus::Draft,
            is_voting_closed: false,
            is_approved: false,
            active: true,
            vote_deadline: None,
            approved_by: None,
            approved_at: None,
            secretary_id: "sec-1".to_string(),
            reviewers_json: None,
            decisions_json: None,
            attachments_json: None,
            required_vote_count: 3,
            version: 1,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn test_one_active_minutes_index() {
        let db = test_db();
        db.insert_meeting(&sample_meeting(
            "mtg-1",
            "2025-01-10T09:00:00+00:00",
            "2025-01-10T10:00:00+00:00",
        ))
        .expect("meeting");

        db.insert_minutes(&sample_minutes("min-1", "mtg-1"))
            .expect("first insert");

        let err = db
            .insert_minutes(&sample_minutes("min-2", "mtg-1"))
            .unwrap_err();
        assert!(err.is_constraint_violation());

        // An inactive row does not collide
        let mut closed = sample_minutes("min-3", "mtg-1");
        closed.active = false;
        closed.is_voting_closed = true;
        closed.status = MinutesStatus::Approved;
        db.insert_minutes(&closed).expect("inactive insert");
    }

    #[test]
    fn test_vote_unique_per_voter() {
        let db = test_db();
        db.insert_meeting(&sample_meeting(
            "mtg-1",
            "2025-01-10T09:00:00+00:00",
            "2025-01-10T10:00:00+00:00",
        ))
        .expect("meeting");
        db.insert_minutes(&sample_minutes("min-1", "mtg-1"))
            .expect("minutes");

        let vote = DbVote {
            id: "v1".to_string(),
            minutes_id: "min-1".to_string(),
            voter_id: "u1".to_string(),
            vote_type: VoteType::Agree,
            comment: None,
            voted_at: "2025-01-10T12:00:00+00:00".to_string(),
            updated_at: "2025-01-10T12:00:00+00:00".to_string(),
        };
        db.insert_vote(&vote).expect("first vote");

        let dup = DbVote {
            id: "v2".to_string(),
            ..vote.clone()
        };
        assert!(db.insert_vote(&dup).unwrap_err().is_constraint_violation());

        // Updating instead works
        let updated = db
            .update_vote(
                "min-1",
                "u1",
                VoteType::Disagree,
                Some("changed my mind"),
                "2025-01-10T13:00:00+00:00",
            )
            .expect("update");
        assert!(updated);

        let stored = db.get_vote("min-1", "u1").expect("get").expect("exists");
        assert_eq!(stored.vote_type, VoteType::Disagree);
        assert_eq!(stored.comment.as_deref(), Some("changed my mind"));
        assert_eq!(stored.voted_at, "2025-01-10T12:00:00+00:00");
    }

    #[test]
    fn test_active_lookup_follows_transitions() {
        let db = test_db();
        db.insert_meeting(&sample_meeting(
            "mtg-1",
            "2025-01-10T09:00:00+00:00",
            "2025-01-10T10:00:00+00:00",
        ))
        .expect("meeting");
        db.insert_minutes(&sample_minutes("min-1", "mtg-1"))
            .expect("minutes");

        let mut m = db
            .get_active_minutes("mtg-1")
            .expect("query")
            .expect("active exists");
        assert_eq!(m.id, "min-1");

        let now = Utc.with_ymd_and_hms(2025, 1, 11, 9, 0, 0).unwrap();
        m.close_voting(Some("sec-1"), now).expect("close");
        db.update_minutes(&m).expect("save");

        assert!(db.get_active_minutes("mtg-1").expect("query").is_none());
        let all = db.list_minutes_for_meeting("mtg-1").expect("list");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].version, 2);
    }
}

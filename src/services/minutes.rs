//! Minutes lifecycle and voting.
//!
//! Status transitions live on `DbMinutes`; this layer adds authorization,
//! voter eligibility, the lazy deadline closure, and the derived tally.
//! The tally is always recomputed from the vote ledger.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::context::OpCtx;
use crate::db::{fmt_ts, DbMeeting, DbMinutes, DbVote, GovDb};
use crate::error::GovernError;
use crate::notify::OutgoingNotification;
use crate::services::visibility;
use crate::types::{Decision, MinutesStatus, Role, VoteTally, VoteType};

pub struct NewMinutes {
    pub meeting_id: String,
    pub title: String,
    pub content: String,
    pub vote_deadline: Option<DateTime<Utc>>,
    pub reviewers: Vec<String>,
    pub decisions: Vec<Decision>,
}

/// Attendees plus the organizer when the organizer is not already listed.
/// This set defines both vote eligibility and the required vote count.
fn eligible_voters(db: &GovDb, meeting: &DbMeeting) -> Result<Vec<String>, GovernError> {
    let mut voters: Vec<String> = db
        .get_attendees(&meeting.id)?
        .into_iter()
        .map(|a| a.user_id)
        .collect();
    if !voters.iter().any(|v| v == &meeting.organizer_id) {
        voters.push(meeting.organizer_id.clone());
    }
    Ok(voters)
}

pub fn create_minutes(ctx: &OpCtx<'_>, input: NewMinutes) -> Result<DbMinutes, GovernError> {
    if !ctx.principal.role.can_create_minutes() {
        return Err(GovernError::Authorization(
            "your role may not author minutes".into(),
        ));
    }
    if input.title.trim().is_empty() {
        return Err(GovernError::validation("title", "must not be empty"));
    }
    if let Some(deadline) = input.vote_deadline {
        if deadline <= ctx.now {
            return Err(GovernError::validation(
                "voteDeadline",
                "must be in the future",
            ));
        }
    }

    let meeting = ctx
        .db
        .get_meeting(&input.meeting_id)?
        .ok_or_else(|| GovernError::not_found("meeting", input.meeting_id.clone()))?;
    let voters = eligible_voters(ctx.db, &meeting)?;

    let now = ctx.ts();
    let minutes = DbMinutes {
        id: Uuid::new_v4().to_string(),
        meeting_id: meeting.id.clone(),
        title: input.title.trim().to_string(),
        content: input.content,
        status: MinutesStatus::Draft,
        is_voting_closed: false,
        is_approved: false,
        active: true,
        vote_deadline: input.vote_deadline.map(fmt_ts),
        approved_by: None,
        approved_at: None,
        secretary_id: ctx.principal.id.clone(),
        reviewers_json: Some(serde_json::to_string(&input.reviewers).map_err(crate::db::DbError::from)?),
        decisions_json: Some(serde_json::to_string(&input.decisions).map_err(crate::db::DbError::from)?),
        attachments_json: None,
        required_vote_count: voters.len() as i64,
        version: 1,
        created_at: now.clone(),
        updated_at: now,
    };

    match ctx.db.insert_minutes(&minutes) {
        Ok(()) => {}
        Err(e) if e.is_constraint_violation() => {
            return Err(GovernError::Conflict(
                "meeting already has active minutes".into(),
            ))
        }
        Err(e) => return Err(e.into()),
    }

    log::info!(
        "Created minutes {} for meeting {} (requires {} votes)",
        minutes.id,
        meeting.id,
        minutes.required_vote_count
    );
    for voter in &voters {
        ctx.notify(OutgoingNotification {
            recipient_id: voter,
            sender_id: Some(&ctx.principal.id),
            notification_type: "vote_request",
            title: "Vote requested",
            message: &format!("Please vote on the minutes of '{}'", meeting.title),
            meeting_id: Some(&meeting.id),
        });
    }
    Ok(minutes)
}

/// Close voting on a deadline that passed unobserved. The stored record is
/// only brought up to date when someone looks at it; there is no timer.
fn close_if_expired(ctx: &OpCtx<'_>, minutes: &mut DbMinutes) -> Result<bool, GovernError> {
    if !minutes.voting_expired(ctx.now) {
        return Ok(false);
    }
    minutes.close_voting(None, ctx.now)?;
    ctx.db.update_minutes(minutes)?;
    log::info!("Voting on minutes {} closed at its deadline", minutes.id);
    Ok(true)
}

fn load_minutes(ctx: &OpCtx<'_>, id: &str) -> Result<(DbMinutes, DbMeeting), GovernError> {
    let minutes = ctx
        .db
        .get_minutes_by_id(id)?
        .ok_or_else(|| GovernError::not_found("minutes", id))?;
    let meeting = ctx
        .db
        .get_meeting(&minutes.meeting_id)?
        .ok_or_else(|| GovernError::not_found("meeting", minutes.meeting_id.clone()))?;
    Ok((minutes, meeting))
}

pub fn get_minutes(ctx: &OpCtx<'_>, id: &str) -> Result<DbMinutes, GovernError> {
    let (mut minutes, meeting) = load_minutes(ctx, id)?;
    let is_attendee = ctx
        .db
        .get_attendees(&meeting.id)?
        .iter()
        .any(|a| a.user_id == ctx.principal.id);
    if !visibility::can_see_meeting(ctx.principal, &meeting, is_attendee) {
        return Err(GovernError::Authorization(
            "minutes are not visible to you".into(),
        ));
    }
    close_if_expired(ctx, &mut minutes)?;
    Ok(minutes)
}

pub fn active_minutes(ctx: &OpCtx<'_>, meeting_id: &str) -> Result<Option<DbMinutes>, GovernError> {
    match ctx.db.get_active_minutes(meeting_id)? {
        Some(m) => Ok(Some(get_minutes(ctx, &m.id)?)),
        None => Ok(None),
    }
}

pub fn submit_vote(
    ctx: &OpCtx<'_>,
    minutes_id: &str,
    vote_type: VoteType,
    comment: Option<String>,
) -> Result<DbVote, GovernError> {
    let (mut minutes, meeting) = load_minutes(ctx, minutes_id)?;
    close_if_expired(ctx, &mut minutes)?;

    if !eligible_voters(ctx.db, &meeting)?.contains(&ctx.principal.id) {
        return Err(GovernError::Authorization(
            "only meeting participants may vote".into(),
        ));
    }
    if !minutes.can_vote(ctx.now) {
        return Err(GovernError::Conflict("voting is closed".into()));
    }
    if comment.is_none() && vote_type == VoteType::AgreeWithComments {
        return Err(GovernError::validation(
            "comment",
            "required for agree_with_comments",
        ));
    }

    let now = ctx.ts();
    let vote = DbVote {
        id: Uuid::new_v4().to_string(),
        minutes_id: minutes_id.to_string(),
        voter_id: ctx.principal.id.clone(),
        vote_type,
        comment,
        voted_at: now.clone(),
        updated_at: now,
    };
    match ctx.db.insert_vote(&vote) {
        Ok(()) => {}
        Err(e) if e.is_constraint_violation() => {
            return Err(GovernError::Conflict(
                "you have already voted; amend your vote instead".into(),
            ))
        }
        Err(e) => return Err(e.into()),
    }

    minutes.note_vote_mutation(ctx.now);
    ctx.db.update_minutes(&minutes)?;
    Ok(vote)
}

pub fn amend_vote(
    ctx: &OpCtx<'_>,
    minutes_id: &str,
    vote_type: VoteType,
    comment: Option<String>,
) -> Result<(), GovernError> {
    let (mut minutes, _meeting) = load_minutes(ctx, minutes_id)?;
    close_if_expired(ctx, &mut minutes)?;
    if !minutes.can_vote(ctx.now) {
        return Err(GovernError::Conflict("voting is closed".into()));
    }

    if !ctx.db.update_vote(
        minutes_id,
        &ctx.principal.id,
        vote_type,
        comment.as_deref(),
        &ctx.ts(),
    )? {
        return Err(GovernError::not_found("vote", minutes_id));
    }
    minutes.note_vote_mutation(ctx.now);
    ctx.db.update_minutes(&minutes)?;
    Ok(())
}

/// Explicitly close voting. Approves whatever the tally says, including a
/// tally of zero votes.
pub fn close_voting(ctx: &OpCtx<'_>, minutes_id: &str) -> Result<DbMinutes, GovernError> {
    if !ctx.principal.role.can_close_voting() {
        return Err(GovernError::Authorization(
            "only secretaries and admins close voting".into(),
        ));
    }
    let (mut minutes, meeting) = load_minutes(ctx, minutes_id)?;
    minutes.close_voting(Some(&ctx.principal.id), ctx.now)?;
    ctx.db.update_minutes(&minutes)?;

    let tally = compute_tally(ctx.db, &minutes)?;
    log::info!(
        "Voting on minutes {} closed by {}: {}/{} votes, {}% agreement",
        minutes.id,
        ctx.principal.id,
        tally.received_vote_count,
        tally.required_vote_count,
        tally.agreement_rate
    );
    for voter in eligible_voters(ctx.db, &meeting)? {
        ctx.notify(OutgoingNotification {
            recipient_id: &voter,
            sender_id: Some(&ctx.principal.id),
            notification_type: "voting_closed",
            title: "Voting closed",
            message: &format!(
                "Voting on the minutes of '{}' has closed ({}% agreement)",
                meeting.title, tally.agreement_rate
            ),
            meeting_id: Some(&meeting.id),
        });
    }
    Ok(minutes)
}

pub fn approve_minutes(ctx: &OpCtx<'_>, minutes_id: &str) -> Result<DbMinutes, GovernError> {
    if !ctx.principal.role.can_approve_minutes() {
        return Err(GovernError::Authorization(
            "only managers and admins approve minutes".into(),
        ));
    }
    let (mut minutes, meeting) = load_minutes(ctx, minutes_id)?;
    minutes.approve(&ctx.principal.id, ctx.now)?;
    ctx.db.update_minutes(&minutes)?;

    ctx.notify(OutgoingNotification {
        recipient_id: &minutes.secretary_id,
        sender_id: Some(&ctx.principal.id),
        notification_type: "minutes_approved",
        title: "Minutes approved",
        message: &format!("The minutes of '{}' were approved", meeting.title),
        meeting_id: Some(&meeting.id),
    });
    Ok(minutes)
}

pub fn reject_minutes(
    ctx: &OpCtx<'_>,
    minutes_id: &str,
    reason: Option<&str>,
) -> Result<DbMinutes, GovernError> {
    if !ctx.principal.role.can_approve_minutes() {
        return Err(GovernError::Authorization(
            "only managers and admins reject minutes".into(),
        ));
    }
    let (mut minutes, meeting) = load_minutes(ctx, minutes_id)?;
    minutes.reject(ctx.now)?;
    ctx.db.update_minutes(&minutes)?;

    let message = match reason {
        Some(reason) => format!("The minutes of '{}' were rejected: {reason}", meeting.title),
        None => format!("The minutes of '{}' were rejected", meeting.title),
    };
    ctx.notify(OutgoingNotification {
        recipient_id: &minutes.secretary_id,
        sender_id: Some(&ctx.principal.id),
        notification_type: "minutes_rejected",
        title: "Minutes rejected",
        message: &message,
        meeting_id: Some(&meeting.id),
    });
    Ok(minutes)
}

pub fn submit_for_review(ctx: &OpCtx<'_>, minutes_id: &str) -> Result<DbMinutes, GovernError> {
    let (mut minutes, _meeting) = load_minutes(ctx, minutes_id)?;
    require_author(ctx, &minutes)?;
    minutes.submit_for_review(ctx.now)?;
    ctx.db.update_minutes(&minutes)?;
    Ok(minutes)
}

pub fn submit_for_approval(ctx: &OpCtx<'_>, minutes_id: &str) -> Result<DbMinutes, GovernError> {
    let (mut minutes, _meeting) = load_minutes(ctx, minutes_id)?;
    require_author(ctx, &minutes)?;
    minutes.submit_for_approval(ctx.now)?;
    ctx.db.update_minutes(&minutes)?;
    Ok(minutes)
}

fn require_author(ctx: &OpCtx<'_>, minutes: &DbMinutes) -> Result<(), GovernError> {
    if minutes.secretary_id != ctx.principal.id && ctx.principal.role != Role::Admin {
        return Err(GovernError::Authorization(
            "only the author or an admin may advance these minutes".into(),
        ));
    }
    Ok(())
}

pub fn tally(ctx: &OpCtx<'_>, minutes_id: &str) -> Result<VoteTally, GovernError> {
    let minutes = get_minutes(ctx, minutes_id)?;
    compute_tally(ctx.db, &minutes)
}

fn rate(numerator: i64, denominator: i64) -> i64 {
    if denominator == 0 {
        return 0;
    }
    ((numerator as f64 / denominator as f64) * 100.0).round() as i64
}

/// Derive the tally from the vote ledger. The agreement rate counts plain
/// `agree` votes only; `agree_with_comments` is tracked separately.
pub(crate) fn compute_tally(db: &GovDb, minutes: &DbMinutes) -> Result<VoteTally, GovernError> {
    let votes = db.list_votes(&minutes.id)?;
    let agree = votes.iter().filter(|v| v.vote_type == VoteType::Agree).count() as i64;
    let agree_with_comments = votes
        .iter()
        .filter(|v| v.vote_type == VoteType::AgreeWithComments)
        .count() as i64;
    let disagree = votes
        .iter()
        .filter(|v| v.vote_type == VoteType::Disagree)
        .count() as i64;
    let received = votes.len() as i64;

    Ok(VoteTally {
        required_vote_count: minutes.required_vote_count,
        received_vote_count: received,
        agree_count: agree,
        agree_with_comments_count: agree_with_comments,
        disagree_count: disagree,
        agreement_rate: rate(agree, received),
        participation_rate: rate(received, minutes.required_vote_count),
    })
}

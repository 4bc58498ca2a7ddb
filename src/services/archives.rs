//! Archive snapshot engine.
//!
//! Archiving freezes a completed meeting into self-contained JSON
//! snapshots. After creation the meeting snapshot is immutable; only the
//! audited resync operation may rewrite the minutes snapshots, and the
//! append operations may grow notes and documents. Nothing else touches
//! the frozen payloads.

use chrono::Months;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::OpCtx;
use crate::db::{fmt_ts, DbArchive, DbMeeting, DbNotification, DbSyncLog, GovDb};
use crate::error::GovernError;
use crate::notify::OutgoingNotification;
use crate::services::minutes::compute_tally;
use crate::services::visibility;
use crate::types::{
    ArchiveStatus, ArchiveType, AttendeeResponse, Decision, DocumentRef, MeetingStatus,
    MeetingType, MinutesStatus, Page, Role, VoteTally, VoteType,
};

const DEFAULT_RETENTION_YEARS: u32 = 7;
const SNAPSHOT_NOTIFICATION_LIMIT: i64 = 50;

// =============================================================================
// Snapshot payloads
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingSnapshot {
    pub id: String,
    pub title: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_minutes: i64,
    pub location: Option<String>,
    pub room_id: Option<String>,
    pub meeting_type: MeetingType,
    pub organizer_id: String,
    pub secretary_id: Option<String>,
    pub department: Option<String>,
    pub attendees: Vec<AttendeeSnapshot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendeeSnapshot {
    pub user_id: String,
    pub response: AttendeeResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinutesSnapshot {
    pub id: String,
    pub title: String,
    pub content: String,
    pub status: MinutesStatus,
    pub secretary_id: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<String>,
    pub decisions: Vec<Decision>,
    pub votes: Vec<VoteSnapshot>,
    pub tally: VoteTally,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteSnapshot {
    pub voter_id: String,
    pub vote_type: VoteType,
    pub comment: Option<String>,
    pub voted_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveNote {
    pub author_id: String,
    pub text: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveSummary {
    pub text: String,
    #[serde(default)]
    pub key_points: Vec<String>,
}

pub struct NewArchive {
    pub meeting_id: String,
    pub title: Option<String>,
    pub archive_type: ArchiveType,
    pub summary: Option<ArchiveSummary>,
    pub tags: Vec<String>,
    pub is_public: bool,
    pub allowed_departments: Vec<String>,
    pub allowed_users: Vec<String>,
    pub restricted_users: Vec<String>,
    pub retention_years: Option<u32>,
    pub auto_delete: bool,
}

// =============================================================================
// Snapshot construction
// =============================================================================

fn duration_minutes(meeting: &DbMeeting) -> i64 {
    match (meeting.starts_at(), meeting.ends_at()) {
        (Some(start), Some(end)) => {
            (((end - start).num_seconds()) as f64 / 60.0).round() as i64
        }
        _ => 0,
    }
}

fn build_meeting_snapshot(db: &GovDb, meeting: &DbMeeting) -> Result<MeetingSnapshot, GovernError> {
    let attendees = db
        .get_attendees(&meeting.id)?
        .into_iter()
        .map(|a| AttendeeSnapshot {
            user_id: a.user_id,
            response: a.response,
        })
        .collect();
    Ok(MeetingSnapshot {
        id: meeting.id.clone(),
        title: meeting.title.clone(),
        start_time: meeting.start_time.clone(),
        end_time: meeting.end_time.clone(),
        duration_minutes: duration_minutes(meeting),
        location: meeting.location.clone(),
        room_id: meeting.room_id.clone(),
        meeting_type: meeting.meeting_type,
        organizer_id: meeting.organizer_id.clone(),
        secretary_id: meeting.secretary_id.clone(),
        department: meeting.department.clone(),
        attendees,
    })
}

/// Snapshot every minutes of the meeting with its full vote ledger and
/// derived tally. Approved minutes sort first; within each group the most
/// recently approved (or created) comes first.
fn build_minutes_snapshots(
    db: &GovDb,
    meeting_id: &str,
) -> Result<Vec<MinutesSnapshot>, GovernError> {
    let mut snapshots = Vec::new();
    for minutes in db.list_minutes_for_meeting(meeting_id)? {
        let votes = db
            .list_votes(&minutes.id)?
            .into_iter()
            .map(|v| VoteSnapshot {
                voter_id: v.voter_id,
                vote_type: v.vote_type,
                comment: v.comment,
                voted_at: v.voted_at,
            })
            .collect();
        let tally = compute_tally(db, &minutes)?;
        let decisions: Vec<Decision> = match &minutes.decisions_json {
            Some(json) => serde_json::from_str(json).map_err(crate::db::DbError::from)?,
            None => Vec::new(),
        };
        snapshots.push(MinutesSnapshot {
            id: minutes.id,
            title: minutes.title,
            content: minutes.content,
            status: minutes.status,
            secretary_id: minutes.secretary_id,
            approved_by: minutes.approved_by,
            approved_at: minutes.approved_at,
            decisions,
            votes,
            tally,
            created_at: minutes.created_at,
        });
    }
    snapshots.sort_by(|a, b| {
        let a_approved = a.status == MinutesStatus::Approved;
        let b_approved = b.status == MinutesStatus::Approved;
        let a_key = a.approved_at.as_deref().unwrap_or(&a.created_at);
        let b_key = b.approved_at.as_deref().unwrap_or(&b.created_at);
        b_approved.cmp(&a_approved).then_with(|| b_key.cmp(a_key))
    });
    Ok(snapshots)
}

/// Collect attachments from every minutes, deduplicated by original path.
fn collect_documents(db: &GovDb, meeting_id: &str) -> Result<Vec<DocumentRef>, GovernError> {
    let mut documents: Vec<DocumentRef> = Vec::new();
    for minutes in db.list_minutes_for_meeting(meeting_id)? {
        if let Some(json) = &minutes.attachments_json {
            let attachments: Vec<DocumentRef> =
                serde_json::from_str(json).map_err(crate::db::DbError::from)?;
            for doc in attachments {
                if !documents.iter().any(|d| d.original_path == doc.original_path) {
                    documents.push(doc);
                }
            }
        }
    }
    Ok(documents)
}

fn document_totals(documents: &[DocumentRef]) -> (i64, i64) {
    (
        documents.len() as i64,
        documents.iter().map(|d| d.size_bytes).sum(),
    )
}

// =============================================================================
// Operations
// =============================================================================

pub fn create_archive(ctx: &OpCtx<'_>, input: NewArchive) -> Result<DbArchive, GovernError> {
    let meeting = ctx
        .db
        .get_meeting(&input.meeting_id)?
        .ok_or_else(|| GovernError::not_found("meeting", input.meeting_id.clone()))?;
    // Admins and managers may archive any meeting; otherwise the caller
    // must be this meeting's organizer or secretary. Role alone is not
    // enough.
    let related = meeting.organizer_id == ctx.principal.id
        || meeting.secretary_id.as_deref() == Some(ctx.principal.id.as_str());
    if !matches!(ctx.principal.role, Role::Admin | Role::Manager) && !related {
        return Err(GovernError::Authorization(
            "only admins, managers, or this meeting's organizer or secretary may archive it"
                .into(),
        ));
    }
    if meeting.status != MeetingStatus::Completed {
        return Err(GovernError::State(format!(
            "only completed meetings can be archived; this one is {}",
            meeting.status.as_str()
        )));
    }

    let (with_minutes, with_documents, with_summary, with_notifications) =
        match input.archive_type {
            ArchiveType::Complete => (true, true, true, true),
            ArchiveType::MinutesOnly => (true, false, false, false),
            ArchiveType::DocumentsOnly => (false, true, false, false),
            ArchiveType::SummaryOnly => (false, false, true, false),
            ArchiveType::Custom => (true, true, true, false),
        };

    let meeting_snapshot = build_meeting_snapshot(ctx.db, &meeting)?;
    let minutes_snapshots = if with_minutes {
        build_minutes_snapshots(ctx.db, &meeting.id)?
    } else {
        Vec::new()
    };
    let documents = if with_documents {
        collect_documents(ctx.db, &meeting.id)?
    } else {
        Vec::new()
    };
    let notifications: Vec<DbNotification> = if with_notifications {
        ctx.db
            .recent_notifications_for_meeting(&meeting.id, SNAPSHOT_NOTIFICATION_LIMIT)?
    } else {
        Vec::new()
    };
    let summary = if with_summary { input.summary } else { None };

    let retention_years = input.retention_years.unwrap_or(DEFAULT_RETENTION_YEARS);
    let retain_until = retention_years
        .checked_mul(12)
        .and_then(|months| ctx.now.checked_add_months(Months::new(months)))
        .ok_or_else(|| GovernError::validation("retentionYears", "out of range"))?;

    let (total_documents, total_size) = document_totals(&documents);
    let now = ctx.ts();

    let archive = DbArchive {
        id: Uuid::new_v4().to_string(),
        meeting_id: meeting.id.clone(),
        title: input
            .title
            .unwrap_or_else(|| format!("Archive of {}", meeting.title)),
        archive_type: input.archive_type,
        status: ArchiveStatus::Active,
        created_by: ctx.principal.id.clone(),
        meeting_snapshot_json: serde_json::to_string(&meeting_snapshot)
            .map_err(crate::db::DbError::from)?,
        minutes_snapshots_json: serde_json::to_string(&minutes_snapshots)
            .map_err(crate::db::DbError::from)?,
        documents_json: serde_json::to_string(&documents).map_err(crate::db::DbError::from)?,
        summary_json: match &summary {
            Some(s) => Some(serde_json::to_string(s).map_err(crate::db::DbError::from)?),
            None => None,
        },
        notifications_json: serde_json::to_string(&notifications)
            .map_err(crate::db::DbError::from)?,
        notes_json: "[]".to_string(),
        tags_json: serde_json::to_string(&input.tags).map_err(crate::db::DbError::from)?,
        is_public: input.is_public,
        allowed_departments_json: serde_json::to_string(&input.allowed_departments)
            .map_err(crate::db::DbError::from)?,
        allowed_users_json: serde_json::to_string(&input.allowed_users)
            .map_err(crate::db::DbError::from)?,
        restricted_users_json: serde_json::to_string(&input.restricted_users)
            .map_err(crate::db::DbError::from)?,
        total_documents,
        total_size,
        view_count: 0,
        download_count: 0,
        retain_until: fmt_ts(retain_until),
        auto_delete: input.auto_delete,
        archived_at: now.clone(),
        updated_at: now,
    };

    ctx.db.insert_archive(&archive)?;
    log::info!(
        "Archived meeting {} as {} ({} minutes, {} documents)",
        meeting.id,
        archive.id,
        minutes_snapshots.len(),
        total_documents
    );
    ctx.notify(OutgoingNotification {
        recipient_id: &meeting.organizer_id,
        sender_id: Some(&ctx.principal.id),
        notification_type: "archive_created",
        title: "Meeting archived",
        message: &format!("'{}' has been archived", meeting.title),
        meeting_id: Some(&meeting.id),
    });
    Ok(archive)
}

fn is_participant(db: &GovDb, meeting_id: &str, user_id: &str) -> Result<bool, GovernError> {
    if let Some(meeting) = db.get_meeting(meeting_id)? {
        if meeting.organizer_id == user_id {
            return Ok(true);
        }
    }
    Ok(db
        .get_attendees(meeting_id)?
        .iter()
        .any(|a| a.user_id == user_id))
}

fn load_accessible(
    ctx: &OpCtx<'_>,
    id: &str,
) -> Result<DbArchive, GovernError> {
    let archive = ctx
        .db
        .get_archive(id)?
        .ok_or_else(|| GovernError::not_found("archive", id))?;
    let participant = is_participant(ctx.db, &archive.meeting_id, &ctx.principal.id)?;
    if !visibility::can_access_archive(ctx.principal, &archive, participant) {
        return Err(GovernError::Authorization(
            "archive is not accessible to you".into(),
        ));
    }
    Ok(archive)
}

/// Read an archive, counting the view.
pub fn get_archive(ctx: &OpCtx<'_>, id: &str) -> Result<DbArchive, GovernError> {
    let mut archive = load_accessible(ctx, id)?;
    ctx.db.bump_archive_view_count(id)?;
    archive.view_count += 1;
    Ok(archive)
}

pub fn list_archives(ctx: &OpCtx<'_>, page: Page) -> Result<Vec<DbArchive>, GovernError> {
    let filter = visibility::archives_filter(ctx.principal);
    ctx.db
        .list_archives_where(&filter.clause, filter.params, page.limit, page.offset)
        .map_err(GovernError::from)
}

fn require_curator(ctx: &OpCtx<'_>, archive: &DbArchive) -> Result<(), GovernError> {
    if archive.created_by != ctx.principal.id && ctx.principal.role != Role::Admin {
        return Err(GovernError::Authorization(
            "only the archive's creator or an admin may change it".into(),
        ));
    }
    Ok(())
}

/// Rebuild the minutes snapshots from the live minutes and merge any new
/// attachments into the document list. The meeting snapshot stays frozen.
/// Every run is recorded in the sync audit log; running it twice without
/// intervening changes leaves the archive byte-identical.
pub fn resync_minutes(ctx: &OpCtx<'_>, id: &str) -> Result<DbArchive, GovernError> {
    let archive = ctx
        .db
        .get_archive(id)?
        .ok_or_else(|| GovernError::not_found("archive", id))?;
    require_curator(ctx, &archive)?;
    if archive.status == ArchiveStatus::Deleted {
        return Err(GovernError::State("archive has been deleted".into()));
    }

    let previous: Vec<MinutesSnapshot> = serde_json::from_str(&archive.minutes_snapshots_json)
        .map_err(crate::db::DbError::from)?;
    let rebuilt = build_minutes_snapshots(ctx.db, &archive.meeting_id)?;
    let rebuilt_json = serde_json::to_string(&rebuilt).map_err(crate::db::DbError::from)?;

    let mut documents: Vec<DocumentRef> =
        serde_json::from_str(&archive.documents_json).map_err(crate::db::DbError::from)?;
    let mut documents_added = 0i64;
    for doc in collect_documents(ctx.db, &archive.meeting_id)? {
        if !documents.iter().any(|d| d.original_path == doc.original_path) {
            documents.push(doc);
            documents_added += 1;
        }
    }
    let documents_json = serde_json::to_string(&documents).map_err(crate::db::DbError::from)?;
    let (total_documents, total_size) = document_totals(&documents);

    let entry = DbSyncLog {
        id: Uuid::new_v4().to_string(),
        archive_id: id.to_string(),
        synced_by: ctx.principal.id.clone(),
        synced_at: ctx.ts(),
        snapshots_before: previous.len() as i64,
        snapshots_after: rebuilt.len() as i64,
        documents_added,
    };

    let now = ctx.ts();
    ctx.db.with_transaction(|db| {
        db.update_archive_minutes_snapshots(id, &rebuilt_json, &now)?;
        db.update_archive_documents(id, &documents_json, total_documents, total_size, &now)?;
        db.insert_sync_log(&entry)?;
        Ok::<_, crate::db::DbError>(())
    })?;

    log::info!(
        "Resynced archive {}: {} -> {} minutes snapshots, {} documents added",
        id,
        entry.snapshots_before,
        entry.snapshots_after,
        documents_added
    );
    ctx.db
        .get_archive(id)?
        .ok_or_else(|| GovernError::not_found("archive", id))
}

pub fn sync_history(ctx: &OpCtx<'_>, id: &str) -> Result<Vec<DbSyncLog>, GovernError> {
    let archive = ctx
        .db
        .get_archive(id)?
        .ok_or_else(|| GovernError::not_found("archive", id))?;
    require_curator(ctx, &archive)?;
    ctx.db.list_sync_log(id).map_err(GovernError::from)
}

/// Append a note. Anyone with read access may annotate.
pub fn append_note(ctx: &OpCtx<'_>, id: &str, text: &str) -> Result<DbArchive, GovernError> {
    if text.trim().is_empty() {
        return Err(GovernError::validation("text", "must not be empty"));
    }
    let mut archive = load_accessible(ctx, id)?;
    if archive.status == ArchiveStatus::Deleted {
        return Err(GovernError::State("archive has been deleted".into()));
    }

    let mut notes: Vec<ArchiveNote> =
        serde_json::from_str(&archive.notes_json).map_err(crate::db::DbError::from)?;
    notes.push(ArchiveNote {
        author_id: ctx.principal.id.clone(),
        text: text.trim().to_string(),
        created_at: ctx.ts(),
    });
    let notes_json = serde_json::to_string(&notes).map_err(crate::db::DbError::from)?;
    ctx.db.update_archive_notes(id, &notes_json, &ctx.ts())?;
    archive.notes_json = notes_json;
    archive.updated_at = ctx.ts();
    Ok(archive)
}

/// Attach a late-arriving document. Duplicate paths are rejected.
pub fn append_document(
    ctx: &OpCtx<'_>,
    id: &str,
    document: DocumentRef,
) -> Result<DbArchive, GovernError> {
    let mut archive = ctx
        .db
        .get_archive(id)?
        .ok_or_else(|| GovernError::not_found("archive", id))?;
    require_curator(ctx, &archive)?;
    if archive.status == ArchiveStatus::Deleted {
        return Err(GovernError::State("archive has been deleted".into()));
    }

    let mut documents: Vec<DocumentRef> =
        serde_json::from_str(&archive.documents_json).map_err(crate::db::DbError::from)?;
    if documents
        .iter()
        .any(|d| d.original_path == document.original_path)
    {
        return Err(GovernError::Conflict(format!(
            "document '{}' is already archived",
            document.original_path
        )));
    }
    documents.push(document);
    let documents_json = serde_json::to_string(&documents).map_err(crate::db::DbError::from)?;
    let (total_documents, total_size) = document_totals(&documents);
    ctx.db
        .update_archive_documents(id, &documents_json, total_documents, total_size, &ctx.ts())?;
    archive.documents_json = documents_json;
    archive.total_documents = total_documents;
    archive.total_size = total_size;
    archive.updated_at = ctx.ts();
    Ok(archive)
}

pub fn record_download(ctx: &OpCtx<'_>, id: &str) -> Result<(), GovernError> {
    load_accessible(ctx, id)?;
    ctx.db.bump_archive_download_count(id)?;
    Ok(())
}

/// Move an archive between active and archived, or soft-delete it.
/// Deletion is terminal.
pub fn set_archive_status(
    ctx: &OpCtx<'_>,
    id: &str,
    status: ArchiveStatus,
) -> Result<DbArchive, GovernError> {
    let mut archive = ctx
        .db
        .get_archive(id)?
        .ok_or_else(|| GovernError::not_found("archive", id))?;
    require_curator(ctx, &archive)?;
    if archive.status == ArchiveStatus::Deleted {
        return Err(GovernError::State(
            "deleted archives cannot change status".into(),
        ));
    }
    ctx.db.update_archive_status(id, status, &ctx.ts())?;
    archive.status = status;
    archive.updated_at = ctx.ts();
    Ok(archive)
}

//! Role-based visibility, compiled two ways.
//!
//! Listings push the predicate into SQL as a WHERE fragment so paging
//! happens after filtering. Point reads evaluate the same rules as pure
//! functions over the loaded row. Both forms must agree; the tests pin
//! them against each other.

use rusqlite::types::ToSql;

use crate::db::{DbArchive, DbMeeting};
use crate::types::{ArchiveStatus, Principal, Role};

/// A WHERE fragment plus its bind parameters, in `?` placeholder order.
pub struct VisibilityFilter {
    pub clause: String,
    pub params: Vec<Box<dyn ToSql>>,
}

impl VisibilityFilter {
    fn all() -> Self {
        Self {
            clause: "1 = 1".to_string(),
            params: Vec::new(),
        }
    }
}

/// Compile the meeting visibility predicate for a principal. The clause
/// references the meeting row as `m`.
///
/// A non-admin sees a meeting when they organize it, act as its secretary,
/// attend it, when it is public, or when it is a private meeting of their
/// own department and their role carries department visibility.
pub fn meetings_filter(principal: &Principal) -> VisibilityFilter {
    if principal.role == Role::Admin {
        return VisibilityFilter::all();
    }

    let mut clause = String::from(
        "(m.organizer_id = ?
          OR m.secretary_id = ?
          OR m.is_private = 0
          OR EXISTS (SELECT 1 FROM meeting_attendees a
                     WHERE a.meeting_id = m.id AND a.user_id = ?)",
    );
    let mut params: Vec<Box<dyn ToSql>> = vec![
        Box::new(principal.id.clone()),
        Box::new(principal.id.clone()),
        Box::new(principal.id.clone()),
    ];

    if principal.role.has_department_visibility() {
        if let Some(department) = &principal.department {
            clause.push_str(" OR (m.is_private = 1 AND m.department = ?)");
            params.push(Box::new(department.clone()));
        }
    }
    clause.push(')');

    VisibilityFilter { clause, params }
}

/// Point-read form of `meetings_filter`. `is_attendee` is the caller's
/// membership in the meeting's attendee set.
pub fn can_see_meeting(principal: &Principal, meeting: &DbMeeting, is_attendee: bool) -> bool {
    if principal.role == Role::Admin {
        return true;
    }
    if meeting.organizer_id == principal.id
        || meeting.secretary_id.as_deref() == Some(principal.id.as_str())
    {
        return true;
    }
    if !meeting.is_private || is_attendee {
        return true;
    }
    principal.role.has_department_visibility()
        && principal.department.is_some()
        && meeting.department == principal.department
}

/// Compile the archive visibility predicate. The clause references the
/// archive row as `ar`. Restriction is subtractive: a restricted user is
/// denied even when the archive is public or their department is allowed.
/// Creators bypass restriction; deleted archives are invisible to everyone
/// but admins.
pub fn archives_filter(principal: &Principal) -> VisibilityFilter {
    if principal.role == Role::Admin {
        return VisibilityFilter::all();
    }

    let mut clause = String::from(
        "(ar.status != 'deleted' AND (
            ar.created_by = ?
            OR (
              NOT EXISTS (SELECT 1 FROM json_each(ar.restricted_users_json)
                          WHERE json_each.value = ?)
              AND (
                ar.is_public = 1
                OR EXISTS (SELECT 1 FROM json_each(ar.allowed_users_json)
                           WHERE json_each.value = ?)",
    );
    let mut params: Vec<Box<dyn ToSql>> = vec![
        Box::new(principal.id.clone()),
        Box::new(principal.id.clone()),
        Box::new(principal.id.clone()),
    ];

    if let Some(department) = &principal.department {
        clause.push_str(
            "
                OR EXISTS (SELECT 1 FROM json_each(ar.allowed_departments_json)
                           WHERE json_each.value = ?)",
        );
        params.push(Box::new(department.clone()));
    }

    clause.push_str(
        "
                OR EXISTS (SELECT 1 FROM meetings m
                           JOIN meeting_attendees a ON a.meeting_id = m.id
                           WHERE m.id = ar.meeting_id AND a.user_id = ?)
              )
            )
          ))",
    );
    params.push(Box::new(principal.id.clone()));

    VisibilityFilter { clause, params }
}

fn json_list(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

/// Point-read access check for a single archive, evaluated in a fixed
/// order: admin and creator first, then the restriction denial, then the
/// grant arms. `is_participant` covers organizer and attendees of the
/// archived meeting.
pub fn can_access_archive(
    principal: &Principal,
    archive: &DbArchive,
    is_participant: bool,
) -> bool {
    if principal.role == Role::Admin {
        return true;
    }
    if archive.status == ArchiveStatus::Deleted {
        return false;
    }
    if archive.created_by == principal.id {
        return true;
    }
    if json_list(&archive.restricted_users_json).contains(&principal.id) {
        return false;
    }
    if archive.is_public {
        return true;
    }
    if json_list(&archive.allowed_users_json).contains(&principal.id) {
        return true;
    }
    if let Some(department) = &principal.department {
        if json_list(&archive.allowed_departments_json).contains(department) {
            return true;
        }
    }
    is_participant
}

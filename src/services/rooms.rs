//! Room registry and availability.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::context::OpCtx;
use crate::db::{fmt_ts, DbRoom};
use crate::error::GovernError;
use crate::types::Role;

pub struct NewRoom {
    pub name: String,
    pub capacity: i64,
    pub floor: Option<String>,
    pub building: Option<String>,
    pub facilities: Vec<String>,
}

pub fn register_room(ctx: &OpCtx<'_>, input: NewRoom) -> Result<DbRoom, GovernError> {
    if ctx.principal.role != Role::Admin {
        return Err(GovernError::Authorization(
            "only admins manage the room registry".into(),
        ));
    }
    if input.name.trim().is_empty() {
        return Err(GovernError::validation("name", "must not be empty"));
    }
    if input.capacity <= 0 {
        return Err(GovernError::validation("capacity", "must be positive"));
    }

    let room = DbRoom {
        id: Uuid::new_v4().to_string(),
        name: input.name.trim().to_string(),
        capacity: input.capacity,
        floor: input.floor,
        building: input.building,
        facilities_json: Some(serde_json::to_string(&input.facilities).map_err(crate::db::DbError::from)?),
        active: true,
        created_at: ctx.ts(),
    };

    match ctx.db.insert_room(&room) {
        Ok(()) => {
            log::info!("Registered room {} ({})", room.name, room.id);
            Ok(room)
        }
        Err(e) if e.is_constraint_violation() => Err(GovernError::Conflict(format!(
            "a room named '{}' already exists",
            room.name
        ))),
        Err(e) => Err(e.into()),
    }
}

pub fn deactivate_room(ctx: &OpCtx<'_>, room_id: &str) -> Result<(), GovernError> {
    if ctx.principal.role != Role::Admin {
        return Err(GovernError::Authorization(
            "only admins manage the room registry".into(),
        ));
    }
    if !ctx.db.deactivate_room(room_id)? {
        return Err(GovernError::not_found("room", room_id));
    }
    Ok(())
}

/// Whether a room is free over [start, end). Touching bookings do not
/// count as overlap. `exclude_meeting_id` lets a reschedule check ignore
/// the meeting's own booking.
pub fn is_available(
    ctx: &OpCtx<'_>,
    room_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude_meeting_id: Option<&str>,
) -> Result<bool, GovernError> {
    validate_window(start, end)?;
    let room = ctx
        .db
        .get_room(room_id)?
        .ok_or_else(|| GovernError::not_found("room", room_id))?;
    if !room.active {
        return Ok(false);
    }
    let conflict =
        ctx.db
            .room_has_conflict(room_id, &fmt_ts(start), &fmt_ts(end), exclude_meeting_id)?;
    Ok(!conflict)
}

/// All active rooms with enough capacity that are free over the window.
pub fn find_available_rooms(
    ctx: &OpCtx<'_>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    min_capacity: i64,
) -> Result<Vec<DbRoom>, GovernError> {
    validate_window(start, end)?;
    let mut free = Vec::new();
    for room in ctx.db.list_active_rooms(min_capacity)? {
        if !ctx
            .db
            .room_has_conflict(&room.id, &fmt_ts(start), &fmt_ts(end), None)?
        {
            free.push(room);
        }
    }
    Ok(free)
}

pub(crate) fn validate_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), GovernError> {
    if end <= start {
        return Err(GovernError::validation(
            "endTime",
            "must be after startTime",
        ));
    }
    Ok(())
}

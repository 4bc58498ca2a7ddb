use rusqlite::params;

use super::{DbError, DbRoom, GovDb};

fn map_room(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbRoom> {
    Ok(DbRoom {
        id: row.get(0)?,
        name: row.get(1)?,
        capacity: row.get(2)?,
        floor: row.get(3)?,
        building: row.get(4)?,
        facilities_json: row.get(5)?,
        active: row.get::<_, i64>(6)? != 0,
        created_at: row.get(7)?,
    })
}

const ROOM_COLUMNS: &str =
    "id, name, capacity, floor, building, facilities_json, active, created_at";

impl GovDb {
    pub fn insert_room(&self, room: &DbRoom) -> Result<(), DbError> {
        self.conn_ref().execute(
            "INSERT INTO meeting_rooms
                (id, name, capacity, floor, building, facilities_json, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                room.id,
                room.name,
                room.capacity,
                room.floor,
                room.building,
                room.facilities_json,
                room.active as i64,
                room.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_room(&self, id: &str) -> Result<Option<DbRoom>, DbError> {
        let mut stmt = self.conn_ref().prepare(&format!(
            "SELECT {ROOM_COLUMNS} FROM meeting_rooms WHERE id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id], map_room)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// All active rooms with at least `min_capacity` seats, by name.
    pub fn list_active_rooms(&self, min_capacity: i64) -> Result<Vec<DbRoom>, DbError> {
        let mut stmt = self.conn_ref().prepare(&format!(
            "SELECT {ROOM_COLUMNS} FROM meeting_rooms
             WHERE active = 1 AND capacity >= ?1
             ORDER BY name"
        ))?;
        let rows = stmt.query_map(params![min_capacity], map_room)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Returns false if no room matched.
    pub fn deactivate_room(&self, id: &str) -> Result<bool, DbError> {
        let affected = self.conn_ref().execute(
            "UPDATE meeting_rooms SET active = 0 WHERE id = ?1",
            params![id],
        )?;
        Ok(affected > 0)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::super::test_utils::test_db;
    use super::*;

    pub(crate) fn sample_room(id: &str, name: &str, capacity: i64) -> DbRoom {
        DbRoom {
            id: id.to_string(),
            name: name.to_string(),
            capacity,
            floor: Some("3".to_string()),
            building: None,
            facilities_json: Some(r#"["projector"]"#.to_string()),
            active: true,
            created_at: "2025-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_insert_and_get_room() {
        let db = test_db();
        db.insert_room(&sample_room("r1", "Blue Room", 10))
            .expect("insert");

        let room = db.get_room("r1").expect("get").expect("exists");
        assert_eq!(room.name, "Blue Room");
        assert_eq!(room.capacity, 10);
        assert!(room.active);

        assert!(db.get_room("nope").expect("get").is_none());
    }

    #[test]
    fn test_room_name_is_unique() {
        let db = test_db();
        db.insert_room(&sample_room("r1", "Blue Room", 10))
            .expect("insert");
        let err = db
            .insert_room(&sample_room("r2", "Blue Room", 4))
            .unwrap_err();
        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_list_active_rooms_filters_capacity_and_active() {
        let db = test_db();
        db.insert_room(&sample_room("r1", "Small", 4)).expect("insert");
        db.insert_room(&sample_room("r2", "Large", 20)).expect("insert");
        db.insert_room(&sample_room("r3", "Retired", 30))
            .expect("insert");
        db.deactivate_room("r3").expect("deactivate");

        let rooms = db.list_active_rooms(10).expect("list");
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].id, "r2");
    }
}

use rusqlite::{params, types::ToSql};

use super::{DbArchive, DbError, DbSyncLog, GovDb};
use crate::types::{ArchiveStatus, ArchiveType};

const ARCHIVE_COLUMNS: &str = "ar.id, ar.meeting_id, ar.title, ar.archive_type, ar.status,
        ar.created_by, ar.meeting_snapshot_json, ar.minutes_snapshots_json,
        ar.documents_json, ar.summary_json, ar.notifications_json, ar.notes_json,
        ar.tags_json, ar.is_public, ar.allowed_departments_json, ar.allowed_users_json,
        ar.restricted_users_json, ar.total_documents, ar.total_size, ar.view_count,
        ar.download_count, ar.retain_until, ar.auto_delete, ar.archived_at, ar.updated_at";

fn map_archive(row: &rusqlite::Row<'_>) -> rusqlite::Result<DbArchive> {
    Ok(DbArchive {
        id: row.get(0)?,
        meeting_id: row.get(1)?,
        title: row.get(2)?,
        archive_type: ArchiveType::from_str_lossy(&row.get::<_, String>(3)?),
        status: ArchiveStatus::from_str_lossy(&row.get::<_, String>(4)?),
        created_by: row.get(5)?,
        meeting_snapshot_json: row.get(6)?,
        minutes_snapshots_json: row.get(7)?,
        documents_json: row.get(8)?,
        summary_json: row.get(9)?,
        notifications_json: row.get(10)?,
        notes_json: row.get(11)?,
        tags_json: row.get(12)?,
        is_public: row.get::<_, i64>(13)? != 0,
        allowed_departments_json: row.get(14)?,
        allowed_users_json: row.get(15)?,
        restricted_users_json: row.get(16)?,
        total_documents: row.get(17)?,
        total_size: row.get(18)?,
        view_count: row.get(19)?,
        download_count: row.get(20)?,
        retain_until: row.get(21)?,
        auto_delete: row.get::<_, i64>(22)? != 0,
        archived_at: row.get(23)?,
        updated_at: row.get(24)?,
    })
}

impl GovDb {
    pub fn insert_archive(&self, archive: &DbArchive) -> Result<(), DbError> {
        self.conn_ref().execute(
            "INSERT INTO archives (
                id, meeting_id, title, archive_type, status, created_by,
                meeting_snapshot_json, minutes_snapshots_json, documents_json,
                summary_json, notifications_json, notes_json, tags_json,
                is_public, allowed_departments_json, allowed_users_json,
                restricted_users_json, total_documents, total_size, view_count,
                download_count, retain_until, auto_delete, archived_at, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13,
                       ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)",
            params![
                archive.id,
                archive.meeting_id,
                archive.title,
                archive.archive_type.as_str(),
                archive.status.as_str(),
                archive.created_by,
                archive.meeting_snapshot_json,
                archive.minutes_snapshots_json,
                archive.documents_json,
                archive.summary_json,
                archive.notifications_json,
                archive.notes_json,
                archive.tags_json,
                archive.is_public as i64,
                archive.allowed_departments_json,
                archive.allowed_users_json,
                archive.restricted_users_json,
                archive.total_documents,
                archive.total_size,
                archive.view_count,
                archive.download_count,
                archive.retain_until,
                archive.auto_delete as i64,
                archive.archived_at,
                archive.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_archive(&self, id: &str) -> Result<Option<DbArchive>, DbError> {
        let mut stmt = self.conn_ref().prepare(&format!(
            "SELECT {ARCHIVE_COLUMNS} FROM archives ar WHERE ar.id = ?1"
        ))?;
        let mut rows = stmt.query_map(params![id], map_archive)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Replace the minutes snapshots after a resync. The meeting snapshot
    /// column is deliberately not touchable here.
    pub fn update_archive_minutes_snapshots(
        &self,
        id: &str,
        minutes_snapshots_json: &str,
        now: &str,
    ) -> Result<(), DbError> {
        self.conn_ref().execute(
            "UPDATE archives SET minutes_snapshots_json = ?1, updated_at = ?2 WHERE id = ?3",
            params![minutes_snapshots_json, now, id],
        )?;
        Ok(())
    }

    /// Rewrite the documents list together with its recomputed statistics.
    pub fn update_archive_documents(
        &self,
        id: &str,
        documents_json: &str,
        total_documents: i64,
        total_size: i64,
        now: &str,
    ) -> Result<(), DbError> {
        self.conn_ref().execute(
            "UPDATE archives SET documents_json = ?1, total_documents = ?2,
                    total_size = ?3, updated_at = ?4
             WHERE id = ?5",
            params![documents_json, total_documents, total_size, now, id],
        )?;
        Ok(())
    }

    pub fn update_archive_notes(&self, id: &str, notes_json: &str, now: &str) -> Result<(), DbError> {
        self.conn_ref().execute(
            "UPDATE archives SET notes_json = ?1, updated_at = ?2 WHERE id = ?3",
            params![notes_json, now, id],
        )?;
        Ok(())
    }

    pub fn update_archive_status(
        &self,
        id: &str,
        status: ArchiveStatus,
        now: &str,
    ) -> Result<(), DbError> {
        self.conn_ref().execute(
            "UPDATE archives SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now, id],
        )?;
        Ok(())
    }

    pub fn bump_archive_view_count(&self, id: &str) -> Result<(), DbError> {
        self.conn_ref().execute(
            "UPDATE archives SET view_count = view_count + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    pub fn bump_archive_download_count(&self, id: &str) -> Result<(), DbError> {
        self.conn_ref().execute(
            "UPDATE archives SET download_count = download_count + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }

    /// Paged listing under the compiled visibility filter. `clause`
    /// references the archive row as `ar`.
    pub fn list_archives_where(
        &self,
        clause: &str,
        mut filter_params: Vec<Box<dyn ToSql>>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DbArchive>, DbError> {
        let sql = format!(
            "SELECT {ARCHIVE_COLUMNS} FROM archives ar
             WHERE {clause}
             ORDER BY ar.archived_at DESC
             LIMIT ? OFFSET ?"
        );
        filter_params.push(Box::new(limit));
        filter_params.push(Box::new(offset));

        let mut stmt = self.conn_ref().prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(filter_params.iter().map(|p| p.as_ref())),
            map_archive,
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }

    /// Soft-delete archives whose retention horizon passed with auto-delete
    /// enabled. Returns the number of archives flipped.
    pub fn sweep_expired_archives(&self, now: &str) -> Result<usize, DbError> {
        let affected = self.conn_ref().execute(
            "UPDATE archives SET status = 'deleted', updated_at = ?1
             WHERE auto_delete = 1 AND retain_until <= ?1 AND status != 'deleted'",
            params![now],
        )?;
        Ok(affected)
    }

    pub fn insert_sync_log(&self, entry: &DbSyncLog) -> Result<(), DbError> {
        self.conn_ref().execute(
            "INSERT INTO archive_sync_log
                (id, archive_id, synced_by, synced_at, snapshots_before, snapshots_after, documents_added)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.id,
                entry.archive_id,
                entry.synced_by,
                entry.synced_at,
                entry.snapshots_before,
                entry.snapshots_after,
                entry.documents_added,
            ],
        )?;
        Ok(())
    }

    pub fn list_sync_log(&self, archive_id: &str) -> Result<Vec<DbSyncLog>, DbError> {
        let mut stmt = self.conn_ref().prepare(
            "SELECT id, archive_id, synced_by, synced_at, snapshots_before, snapshots_after, documents_added
             FROM archive_sync_log WHERE archive_id = ?1 ORDER BY synced_at",
        )?;
        let rows = stmt.query_map(params![archive_id], |row| {
            Ok(DbSyncLog {
                id: row.get(0)?,
                archive_id: row.get(1)?,
                synced_by: row.get(2)?,
                synced_at: row.get(3)?,
                snapshots_before: row.get(4)?,
                snapshots_after: row.get(5)?,
                documents_added: row.get(6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    }
}

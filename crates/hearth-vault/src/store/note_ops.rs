//! Note CRUD operations. Notes are user-authored and kept in plaintext so the
//! FTS5 index can see them.

use rusqlite::params;
use tracing::debug;

use crate::error::{Result, VaultError};
use crate::types::{Note, NoteId};

use super::{Db, Vault, now, parse_timestamp, timestamp};

const NOTE_COLUMNS: &str = "id, title, content, tags, created_at, updated_at";

impl Db<'_> {
    pub(crate) fn insert_note(&self, note: &Note) -> Result<()> {
        let tags_json = serde_json::to_string(&note.tags)?;

        self.conn.execute(
            r#"
            INSERT INTO notes (id, title, content, tags, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                note.id.to_string(),
                note.title,
                note.content,
                tags_json,
                timestamp(&note.created_at),
                timestamp(&note.updated_at),
            ],
        )?;

        debug!("Inserted note {}", note.id);
        Ok(())
    }

    pub(crate) fn get_note(&self, id: NoteId) -> Result<Option<Note>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM notes WHERE id = ?1", NOTE_COLUMNS))?;
        let mut rows = stmt.query(params![id.to_string()])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::row_to_note(row)?))
        } else {
            Ok(None)
        }
    }

    pub(crate) fn update_note(&self, note: &Note) -> Result<()> {
        let tags_json = serde_json::to_string(&note.tags)?;

        let rows_affected = self.conn.execute(
            r#"
            UPDATE notes
            SET title = ?2, content = ?3, tags = ?4, updated_at = ?5
            WHERE id = ?1
            "#,
            params![
                note.id.to_string(),
                note.title,
                note.content,
                tags_json,
                timestamp(&note.updated_at),
            ],
        )?;

        if rows_affected == 0 {
            return Err(VaultError::NotFound(format!("Note {}", note.id)));
        }
        Ok(())
    }

    pub(crate) fn list_notes(&self, limit: usize) -> Result<Vec<Note>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM notes ORDER BY updated_at DESC, id ASC LIMIT ?1",
            NOTE_COLUMNS
        ))?;
        let mut rows = stmt.query(params![i64::try_from(limit).unwrap_or(i64::MAX)])?;

        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            notes.push(Self::row_to_note(row)?);
        }
        Ok(notes)
    }

    pub(crate) fn all_notes(&self) -> Result<Vec<Note>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM notes ORDER BY created_at ASC, id ASC",
            NOTE_COLUMNS
        ))?;
        let mut rows = stmt.query([])?;

        let mut notes = Vec::new();
        while let Some(row) = rows.next()? {
            notes.push(Self::row_to_note(row)?);
        }
        Ok(notes)
    }

    pub(crate) fn row_to_note(row: &rusqlite::Row) -> Result<Note> {
        let id: String = row.get(0)?;
        let tags_json: String = row.get(3)?;
        let created_at: String = row.get(4)?;
        let updated_at: String = row.get(5)?;

        Ok(Note {
            id: NoteId::parse(&id)?,
            title: row.get(1)?,
            content: row.get(2)?,
            tags: serde_json::from_str(&tags_json)?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }
}

impl Vault {
    /// Insert a new note.
    pub fn insert_note(&self, note: &Note) -> Result<()> {
        self.with_db(|db| db.insert_note(note))
    }

    /// Get a note by ID.
    pub fn get_note(&self, id: NoteId) -> Result<Option<Note>> {
        self.with_db(|db| db.get_note(id))
    }

    /// Replace a note's title, content and tags. Bumps `updated_at`.
    pub fn update_note(&self, note: &Note) -> Result<Note> {
        let mut note = note.clone();
        note.updated_at = now();
        self.with_db(|db| db.update_note(&note))?;
        Ok(note)
    }

    /// Delete a note and its embedding. Returns whether a row existed.
    pub fn delete_note(&self, id: NoteId) -> Result<bool> {
        self.with_tx(|db| {
            let rows = db
                .conn
                .execute("DELETE FROM notes WHERE id = ?1", params![id.to_string()])?;
            Ok(rows > 0)
        })
    }

    /// List notes, most recently updated first.
    pub fn list_notes(&self, limit: usize) -> Result<Vec<Note>> {
        self.with_db(|db| db.list_notes(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::VaultKey;

    fn vault() -> Vault {
        Vault::open_in_memory(&VaultKey::from_bytes([6u8; 32])).unwrap()
    }

    #[test]
    fn test_note_crud() {
        let vault = vault();
        let note = Note::new("Buy an umbrella before the trip")
            .with_title("Packing")
            .with_tag("travel");
        vault.insert_note(&note).unwrap();

        let fetched = vault.get_note(note.id).unwrap().unwrap();
        assert_eq!(fetched, note);

        let mut edited = fetched.clone();
        edited.content = "Buy two umbrellas".to_string();
        let updated = vault.update_note(&edited).unwrap();
        assert!(updated.updated_at >= note.updated_at);
        assert_eq!(
            vault.get_note(note.id).unwrap().unwrap().content,
            "Buy two umbrellas"
        );

        assert!(vault.delete_note(note.id).unwrap());
        assert!(vault.get_note(note.id).unwrap().is_none());
        assert!(!vault.delete_note(note.id).unwrap());
    }

    #[test]
    fn test_update_missing_note() {
        let vault = vault();
        let err = vault.update_note(&Note::new("ghost")).unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
    }

    #[test]
    fn test_list_notes() {
        let vault = vault();
        for i in 0..3 {
            vault.insert_note(&Note::new(format!("note {}", i))).unwrap();
        }
        assert_eq!(vault.list_notes(10).unwrap().len(), 3);
        assert_eq!(vault.list_notes(2).unwrap().len(), 2);
    }
}

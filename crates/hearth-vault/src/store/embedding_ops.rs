//! Embedding storage.
//!
//! Vectors are kept as raw little-endian `f32` bytes in a plain table keyed by
//! owner row. Triggers remove them when the owner is deleted.

use rusqlite::{OptionalExtension, params};
use tracing::debug;

use crate::error::{Result, VaultError};
use crate::types::RowRef;
use crate::validation::validate_embedding;
use crate::vector;

use super::query::StoredEmbedding;
use super::{Db, Vault, now, parse_timestamp, timestamp};

impl Db<'_> {
    fn owner_exists(&self, owner: &RowRef) -> Result<bool> {
        let table = match owner {
            RowRef::Message(_) => "messages",
            RowRef::Fact(_) => "facts",
            RowRef::Note(_) => "notes",
        };
        let found: Option<i64> = self
            .conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE id = ?1", table),
                params![owner.id_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub(crate) fn set_embedding(&self, embedding: &StoredEmbedding) -> Result<()> {
        validate_embedding(&embedding.vector, None)?;
        if !self.owner_exists(&embedding.owner)? {
            return Err(VaultError::NotFound(format!(
                "{} {}",
                embedding.owner.kind(),
                embedding.owner.id_string()
            )));
        }

        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO embeddings (owner_kind, owner_id, model, dimensions, vector, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                embedding.owner.kind(),
                embedding.owner.id_string(),
                embedding.model,
                embedding.vector.len() as i64,
                vector::to_bytes(&embedding.vector),
                timestamp(&embedding.created_at),
            ],
        )?;

        debug!(
            "Stored {}-dim embedding for {} {}",
            embedding.vector.len(),
            embedding.owner.kind(),
            embedding.owner.id_string()
        );
        Ok(())
    }

    pub(crate) fn embedding(&self, owner: &RowRef) -> Result<Option<StoredEmbedding>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT owner_kind, owner_id, model, dimensions, vector, created_at
            FROM embeddings
            WHERE owner_kind = ?1 AND owner_id = ?2
            "#,
        )?;
        let mut rows = stmt.query(params![owner.kind(), owner.id_string()])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::row_to_embedding(row)?))
        } else {
            Ok(None)
        }
    }

    /// All embeddings of one owner kind, ordered by owner id.
    pub(crate) fn embeddings_of_kind(&self, kind: &str) -> Result<Vec<StoredEmbedding>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT owner_kind, owner_id, model, dimensions, vector, created_at
            FROM embeddings
            WHERE owner_kind = ?1
            ORDER BY owner_id ASC
            "#,
        )?;
        let mut rows = stmt.query(params![kind])?;

        let mut embeddings = Vec::new();
        while let Some(row) = rows.next()? {
            embeddings.push(Self::row_to_embedding(row)?);
        }
        Ok(embeddings)
    }

    pub(crate) fn all_embeddings(&self) -> Result<Vec<StoredEmbedding>> {
        let mut all = Vec::new();
        for kind in ["fact", "message", "note"] {
            all.extend(self.embeddings_of_kind(kind)?);
        }
        Ok(all)
    }

    fn row_to_embedding(row: &rusqlite::Row) -> Result<StoredEmbedding> {
        let kind: String = row.get(0)?;
        let owner_id: String = row.get(1)?;
        let dimensions: i64 = row.get(3)?;
        let bytes: Vec<u8> = row.get(4)?;
        let created_at: String = row.get(5)?;

        let owner = RowRef::parse(&kind, &owner_id).ok_or_else(|| {
            VaultError::Corrupt(format!("embedding owner '{}:{}' is invalid", kind, owner_id))
        })?;
        let vector = vector::from_bytes(&bytes)?;
        if vector.len() as i64 != dimensions {
            return Err(VaultError::Corrupt(format!(
                "embedding for {} {} has {} components, expected {}",
                kind,
                owner_id,
                vector.len(),
                dimensions
            )));
        }

        Ok(StoredEmbedding {
            owner,
            model: row.get(2)?,
            vector,
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

impl Vault {
    /// Store (or replace) the embedding of a message, fact or note.
    pub fn set_embedding(&self, owner: RowRef, model: &str, vector: &[f32]) -> Result<()> {
        let embedding = StoredEmbedding {
            owner,
            model: model.to_string(),
            vector: vector.to_vec(),
            created_at: now(),
        };
        self.with_db(|db| db.set_embedding(&embedding))
    }

    /// The stored embedding of a row, if any.
    pub fn embedding(&self, owner: RowRef) -> Result<Option<StoredEmbedding>> {
        self.with_db(|db| db.embedding(&owner))
    }
}

//! Session and message operations.

use chrono::{DateTime, Utc};
use rusqlite::params;
use tracing::debug;

use crate::error::{Result, VaultError};
use crate::types::{Message, MessageId, Role, Session, SessionId};
use crate::validation::validate_content;

use super::{Db, Vault, now, parse_opt_timestamp, parse_timestamp, timestamp};

const SESSION_COLUMNS: &str =
    "id, identity_id, goal, created_at, updated_at, ended_at, message_count";
const MESSAGE_COLUMNS: &str = "id, session_id, role, content, created_at";

impl Db<'_> {
    pub(crate) fn insert_session(&self, session: &Session) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO sessions (id, identity_id, goal, created_at, updated_at, ended_at, message_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                session.id.to_string(),
                session.identity_id.to_string(),
                session.goal,
                timestamp(&session.created_at),
                timestamp(&session.updated_at),
                session.ended_at.as_ref().map(timestamp),
                session.message_count,
            ],
        )?;

        debug!("Inserted session {}", session.id);
        Ok(())
    }

    pub(crate) fn get_session(&self, id: SessionId) -> Result<Option<Session>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM sessions WHERE id = ?1", SESSION_COLUMNS))?;
        let mut rows = stmt.query(params![id.to_string()])?;

        if let Some(row) = rows.next()? {
            Ok(Some(Self::row_to_session(row)?))
        } else {
            Ok(None)
        }
    }

    pub(crate) fn list_sessions(&self, limit: usize) -> Result<Vec<Session>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM sessions ORDER BY updated_at DESC, id ASC LIMIT ?1",
            SESSION_COLUMNS
        ))?;
        let mut rows = stmt.query(params![limit as i64])?;

        let mut sessions = Vec::new();
        while let Some(row) = rows.next()? {
            sessions.push(Self::row_to_session(row)?);
        }
        Ok(sessions)
    }

    /// Insert a message as-is. The parent's counters are not touched.
    pub(crate) fn insert_message(&self, message: &Message) -> Result<()> {
        let id = message.id.to_string();
        let content = self.seal("messages", "content", &id, &message.content)?;

        self.conn.execute(
            r#"
            INSERT INTO messages (id, session_id, role, content, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                id,
                message.session_id.to_string(),
                message.role.as_str(),
                content,
                timestamp(&message.created_at),
            ],
        )?;
        Ok(())
    }

    /// Insert a message and bump the parent session's count and timestamp.
    /// Callers run this inside a transaction.
    pub(crate) fn append_message(&self, message: &Message) -> Result<()> {
        validate_content(&message.content)?;
        let session = self
            .get_session(message.session_id)?
            .ok_or_else(|| VaultError::NotFound(format!("Session {}", message.session_id)))?;
        if session.is_ended() {
            return Err(VaultError::InvalidData(format!(
                "session {} has ended",
                session.id
            )));
        }

        self.insert_message(message)?;
        self.conn.execute(
            r#"
            UPDATE sessions
            SET message_count = message_count + 1,
                updated_at = MAX(updated_at, ?2)
            WHERE id = ?1
            "#,
            params![
                message.session_id.to_string(),
                timestamp(&message.created_at)
            ],
        )?;

        debug!(
            "Appended {} message {} to session {}",
            message.role, message.id, message.session_id
        );
        Ok(())
    }

    pub(crate) fn get_message(&self, id: MessageId) -> Result<Option<Message>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM messages WHERE id = ?1", MESSAGE_COLUMNS))?;
        let mut rows = stmt.query(params![id.to_string()])?;

        if let Some(row) = rows.next()? {
            Ok(Some(self.row_to_message(row)?))
        } else {
            Ok(None)
        }
    }

    pub(crate) fn list_messages(&self, session_id: SessionId) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM messages WHERE session_id = ?1 ORDER BY created_at ASC, id ASC",
            MESSAGE_COLUMNS
        ))?;
        let mut rows = stmt.query(params![session_id.to_string()])?;

        let mut messages = Vec::new();
        while let Some(row) = rows.next()? {
            messages.push(self.row_to_message(row)?);
        }
        Ok(messages)
    }

    /// Most recent messages across all sessions, newest first.
    pub(crate) fn recent_messages(&self, limit: usize) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM messages ORDER BY created_at DESC, id ASC LIMIT ?1",
            MESSAGE_COLUMNS
        ))?;
        let mut rows = stmt.query(params![limit as i64])?;

        let mut messages = Vec::new();
        while let Some(row) = rows.next()? {
            messages.push(self.row_to_message(row)?);
        }
        Ok(messages)
    }

    pub(crate) fn all_sessions(&self) -> Result<Vec<Session>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM sessions ORDER BY created_at ASC, id ASC",
            SESSION_COLUMNS
        ))?;
        let mut rows = stmt.query([])?;

        let mut sessions = Vec::new();
        while let Some(row) = rows.next()? {
            sessions.push(Self::row_to_session(row)?);
        }
        Ok(sessions)
    }

    pub(crate) fn all_messages(&self) -> Result<Vec<Message>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM messages ORDER BY created_at ASC, id ASC",
            MESSAGE_COLUMNS
        ))?;
        let mut rows = stmt.query([])?;

        let mut messages = Vec::new();
        while let Some(row) = rows.next()? {
            messages.push(self.row_to_message(row)?);
        }
        Ok(messages)
    }

    fn row_to_session(row: &rusqlite::Row) -> Result<Session> {
        let id: String = row.get(0)?;
        let identity_id: String = row.get(1)?;
        let created_at: String = row.get(3)?;
        let updated_at: String = row.get(4)?;
        let message_count: i64 = row.get(6)?;

        Ok(Session {
            id: SessionId::parse(&id)?,
            identity_id: crate::types::IdentityId::parse(&identity_id)?,
            goal: row.get(2)?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
            ended_at: parse_opt_timestamp(row.get(5)?)?,
            message_count: message_count.max(0) as u32,
        })
    }

    fn row_to_message(&self, row: &rusqlite::Row) -> Result<Message> {
        let id: String = row.get(0)?;
        let session_id: String = row.get(1)?;
        let role: String = row.get(2)?;
        let content: Vec<u8> = row.get(3)?;
        let created_at: String = row.get(4)?;

        Ok(Message {
            id: MessageId::parse(&id)?,
            session_id: SessionId::parse(&session_id)?,
            role: Role::parse(&role)
                .ok_or_else(|| VaultError::InvalidData(format!("unknown role '{}'", role)))?,
            content: self.open("messages", "content", &id, &content)?,
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

impl Vault {
    /// Start a new session for the vault's identity.
    pub fn create_session(&self, goal: Option<&str>) -> Result<Session> {
        self.with_tx(|db| {
            let identity = db.require_identity()?;
            let created_at = now();
            let session = Session {
                id: SessionId::new(),
                identity_id: identity.id,
                goal: goal.map(str::to_string),
                created_at,
                updated_at: created_at,
                ended_at: None,
                message_count: 0,
            };
            db.insert_session(&session)?;
            Ok(session)
        })
    }

    /// Get a session by ID.
    pub fn get_session(&self, id: SessionId) -> Result<Option<Session>> {
        self.with_db(|db| db.get_session(id))
    }

    /// Mark a session as ended. Ending twice keeps the first timestamp.
    pub fn end_session(&self, id: SessionId) -> Result<Session> {
        self.with_tx(|db| {
            let ended_at = timestamp(&now());
            let rows = db.conn.execute(
                r#"
                UPDATE sessions
                SET ended_at = COALESCE(ended_at, ?2),
                    updated_at = CASE WHEN ended_at IS NULL THEN ?2 ELSE updated_at END
                WHERE id = ?1
                "#,
                params![id.to_string(), ended_at],
            )?;
            if rows == 0 {
                return Err(VaultError::NotFound(format!("Session {}", id)));
            }
            db.get_session(id)?
                .ok_or_else(|| VaultError::NotFound(format!("Session {}", id)))
        })
    }

    /// List sessions, most recently updated first.
    pub fn list_sessions(&self, limit: usize) -> Result<Vec<Session>> {
        self.with_db(|db| db.list_sessions(limit))
    }

    /// Append a message to a session.
    ///
    /// The insert and the session's `message_count`/`updated_at` bump happen
    /// in one transaction.
    pub fn add_message(&self, session_id: SessionId, role: Role, content: &str) -> Result<Message> {
        self.add_message_at(session_id, role, content, now())
    }

    /// Append a message with an explicit timestamp.
    pub fn add_message_at(
        &self,
        session_id: SessionId,
        role: Role,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Message> {
        let message = Message {
            id: MessageId::new(),
            session_id,
            role,
            content: content.to_string(),
            created_at,
        };
        self.with_tx(|db| db.append_message(&message))?;
        Ok(message)
    }

    /// Get a message by ID.
    pub fn get_message(&self, id: MessageId) -> Result<Option<Message>> {
        self.with_db(|db| db.get_message(id))
    }

    /// All messages of a session, oldest first.
    pub fn list_messages(&self, session_id: SessionId) -> Result<Vec<Message>> {
        self.with_db(|db| db.list_messages(session_id))
    }

    /// Most recent messages across all sessions, newest first.
    pub fn recent_messages(&self, limit: usize) -> Result<Vec<Message>> {
        self.with_db(|db| db.recent_messages(limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::VaultKey;
    use crate::types::IdentityId;
    use chrono::Duration;

    fn vault() -> Vault {
        let vault = Vault::open_in_memory(&VaultKey::from_bytes([2u8; 32])).unwrap();
        vault.create_identity(IdentityId::new(), None).unwrap();
        vault
    }

    #[test]
    fn test_create_session_requires_identity() {
        let vault = Vault::open_in_memory(&VaultKey::from_bytes([2u8; 32])).unwrap();
        assert!(matches!(
            vault.create_session(None),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn test_session_crud() {
        let vault = vault();
        let session = vault.create_session(Some("plan a trip")).unwrap();

        let fetched = vault.get_session(session.id).unwrap().unwrap();
        assert_eq!(fetched, session);
        assert_eq!(fetched.goal.as_deref(), Some("plan a trip"));
        assert!(!fetched.is_ended());

        let ended = vault.end_session(session.id).unwrap();
        assert!(ended.is_ended());

        let again = vault.end_session(session.id).unwrap();
        assert_eq!(again.ended_at, ended.ended_at);
    }

    #[test]
    fn test_end_missing_session() {
        let vault = vault();
        assert!(matches!(
            vault.end_session(SessionId::new()),
            Err(VaultError::NotFound(_))
        ));
    }

    #[test]
    fn test_add_message_bumps_session() {
        let vault = vault();
        let session = vault.create_session(None).unwrap();
        let later = session.updated_at + Duration::seconds(5);

        vault
            .add_message_at(session.id, Role::User, "Hello!", later)
            .unwrap();
        vault
            .add_message(session.id, Role::Assistant, "Hi there!")
            .unwrap();

        let fetched = vault.get_session(session.id).unwrap().unwrap();
        assert_eq!(fetched.message_count, 2);
        assert!(fetched.updated_at >= later);

        let messages = vault.list_messages(session.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "Hello!");
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[test]
    fn test_add_message_to_missing_session() {
        let vault = vault();
        let err = vault
            .add_message(SessionId::new(), Role::User, "orphan")
            .unwrap_err();
        assert!(matches!(err, VaultError::NotFound(_)));
        assert_eq!(vault.stats().unwrap().message_count, 0);
    }

    #[test]
    fn test_add_message_to_ended_session() {
        let vault = vault();
        let session = vault.create_session(None).unwrap();
        vault.end_session(session.id).unwrap();

        assert!(vault.add_message(session.id, Role::User, "late").is_err());
        let fetched = vault.get_session(session.id).unwrap().unwrap();
        assert_eq!(fetched.message_count, 0);
    }

    #[test]
    fn test_recent_messages_newest_first() {
        let vault = vault();
        let session = vault.create_session(None).unwrap();
        let base = session.created_at;

        for (i, text) in ["one", "two", "three"].iter().enumerate() {
            vault
                .add_message_at(session.id, Role::User, text, base + Duration::seconds(i as i64))
                .unwrap();
        }

        let recent = vault.recent_messages(2).unwrap();
        let contents: Vec<_> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["three", "two"]);
    }

    #[test]
    fn test_list_sessions_order() {
        let vault = vault();
        let first = vault.create_session(Some("first")).unwrap();
        let second = vault.create_session(Some("second")).unwrap();
        vault
            .add_message_at(first.id, Role::User, "bump", first.created_at + Duration::hours(1))
            .unwrap();

        let sessions = vault.list_sessions(10).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].id, first.id);
        assert_eq!(sessions[1].id, second.id);
    }
}

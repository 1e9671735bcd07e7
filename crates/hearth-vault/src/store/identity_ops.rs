//! Identity operations.

use rusqlite::{OptionalExtension, params};
use tracing::{debug, info};

use crate::error::{Result, VaultError};
use crate::types::{Identity, IdentityId};

use super::{Db, Vault, now, parse_timestamp, timestamp};

impl Db<'_> {
    pub(crate) fn insert_identity(&self, identity: &Identity) -> Result<()> {
        if let Some(existing) = self.identity()? {
            if existing.id == identity.id {
                return Ok(());
            }
            return Err(VaultError::InvalidData(format!(
                "vault already belongs to identity {}",
                existing.id
            )));
        }

        self.conn.execute(
            "INSERT INTO identities (id, display_name, created_at) VALUES (?1, ?2, ?3)",
            params![
                identity.id.to_string(),
                identity.display_name,
                timestamp(&identity.created_at),
            ],
        )?;
        debug!("Inserted identity {}", identity.id);
        Ok(())
    }

    pub(crate) fn identity(&self) -> Result<Option<Identity>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, display_name, created_at FROM identities LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(id, display_name, created_at)| {
            Ok(Identity {
                id: IdentityId::parse(&id)?,
                display_name,
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .transpose()
    }

    pub(crate) fn require_identity(&self) -> Result<Identity> {
        self.identity()?
            .ok_or_else(|| VaultError::NotFound("vault has no identity".to_string()))
    }
}

impl Vault {
    /// Create the vault's identity.
    ///
    /// Idempotent for the same id; a vault already owned by a different
    /// identity is an error.
    pub fn create_identity(
        &self,
        id: IdentityId,
        display_name: Option<&str>,
    ) -> Result<Identity> {
        let identity = Identity {
            id,
            display_name: display_name.map(str::to_string),
            created_at: now(),
        };
        self.with_tx(|db| {
            db.insert_identity(&identity)?;
            db.require_identity()
        })
    }

    /// The vault's identity, if one has been created.
    pub fn identity(&self) -> Result<Option<Identity>> {
        self.with_db(|db| db.identity())
    }

    /// Change the identity's display name, the only mutable identity field.
    pub fn set_display_name(&self, display_name: Option<&str>) -> Result<Identity> {
        self.with_tx(|db| {
            let identity = db.require_identity()?;
            db.conn.execute(
                "UPDATE identities SET display_name = ?1 WHERE id = ?2",
                params![display_name, identity.id.to_string()],
            )?;
            info!("Updated display name for identity {}", identity.id);
            db.require_identity()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::VaultKey;

    fn vault() -> Vault {
        Vault::open_in_memory(&VaultKey::from_bytes([1u8; 32])).unwrap()
    }

    #[test]
    fn test_create_identity() {
        let vault = vault();
        assert!(vault.identity().unwrap().is_none());

        let id = IdentityId::new();
        let identity = vault.create_identity(id, Some("Alex")).unwrap();
        assert_eq!(identity.id, id);
        assert_eq!(identity.display_name.as_deref(), Some("Alex"));
        assert_eq!(vault.identity().unwrap(), Some(identity));
    }

    #[test]
    fn test_create_identity_is_idempotent() {
        let vault = vault();
        let id = IdentityId::new();
        let first = vault.create_identity(id, None).unwrap();
        let second = vault.create_identity(id, Some("ignored")).unwrap();
        assert_eq!(first, second);
        assert_eq!(vault.stats().unwrap().identity_count, 1);
    }

    #[test]
    fn test_second_identity_rejected() {
        let vault = vault();
        vault.create_identity(IdentityId::new(), None).unwrap();
        let err = vault.create_identity(IdentityId::new(), None).unwrap_err();
        assert!(matches!(err, VaultError::InvalidData(_)));
    }

    #[test]
    fn test_set_display_name() {
        let vault = vault();
        vault.create_identity(IdentityId::new(), None).unwrap();
        let updated = vault.set_display_name(Some("Sam")).unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Sam"));
    }

    #[test]
    fn test_set_display_name_without_identity() {
        let vault = vault();
        assert!(matches!(
            vault.set_display_name(Some("x")),
            Err(VaultError::NotFound(_))
        ));
    }
}

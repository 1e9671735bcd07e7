//! Credential backing - vault key and identity id custody.
//!
//! The symmetric vault key and the stable identity id live only in the OS
//! native credential store, under service="hearth" with accounts
//! "vault-key" and "identity-id". Losing the entry without an export makes
//! the vault unrecoverable.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::crypto::VaultKey;
use crate::error::{Result, VaultError};
use crate::types::IdentityId;

/// Keyring service name.
pub const SERVICE_NAME: &str = "hearth";

/// Keyring account holding the base64 vault key.
pub const KEY_ACCOUNT: &str = "vault-key";

/// Keyring account holding the identity id.
pub const IDENTITY_ACCOUNT: &str = "identity-id";

/// Environment variable read by [`EnvBacking`] for the base64 vault key.
pub const KEY_ENV: &str = "HEARTH_VAULT_KEY";

/// Environment variable read by [`EnvBacking`] for the identity id.
pub const IDENTITY_ENV: &str = "HEARTH_IDENTITY_ID";

/// Everything needed to open a vault.
#[derive(Debug, Clone)]
pub struct VaultCredentials {
    pub key: VaultKey,
    pub identity_id: IdentityId,
}

impl VaultCredentials {
    /// Fresh random key and identity.
    pub fn generate() -> Self {
        Self {
            key: VaultKey::generate(),
            identity_id: IdentityId::new(),
        }
    }
}

/// Storage for vault credentials.
pub trait CredentialBacking: Send + Sync {
    /// Human-readable backend name for diagnostics.
    fn name(&self) -> &'static str;

    /// Load stored credentials, `None` if nothing has been stored yet.
    fn load(&self) -> Result<Option<VaultCredentials>>;

    /// Persist credentials, replacing any previous entry.
    fn store(&self, credentials: &VaultCredentials) -> Result<()>;
}

/// Load credentials, generating and storing a fresh set on first run.
pub fn load_or_create(backing: &dyn CredentialBacking) -> Result<VaultCredentials> {
    if let Some(credentials) = backing.load()? {
        debug!("Loaded vault credentials from {}", backing.name());
        return Ok(credentials);
    }

    let credentials = VaultCredentials::generate();
    backing.store(&credentials)?;
    info!(
        "Generated new vault credentials in {} for identity {}",
        backing.name(),
        credentials.identity_id
    );
    Ok(credentials)
}

/// Base64 form of a key, as stored in the keyring and read from the environment.
pub fn encode_key(key: &VaultKey) -> String {
    BASE64_STANDARD.encode(key.expose())
}

fn decode_key(encoded: &str) -> Result<VaultKey> {
    let mut raw = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|_| VaultError::Credentials("stored vault key is not valid base64".into()))?;
    let key = VaultKey::from_slice(&raw);
    raw.iter_mut().for_each(|b| *b = 0);
    key
}

// ─────────────────────────────────────────────────────────────────────────────
// In-process backing
// ─────────────────────────────────────────────────────────────────────────────

/// Credentials held in process memory. For tests and throwaway vaults.
#[derive(Debug, Default)]
pub struct MemoryBacking {
    entry: Mutex<Option<VaultCredentials>>,
}

impl MemoryBacking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: VaultCredentials) -> Self {
        Self {
            entry: Mutex::new(Some(credentials)),
        }
    }
}

impl CredentialBacking for MemoryBacking {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&self) -> Result<Option<VaultCredentials>> {
        Ok(self.entry.lock().clone())
    }

    fn store(&self, credentials: &VaultCredentials) -> Result<()> {
        *self.entry.lock() = Some(credentials.clone());
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Environment backing
// ─────────────────────────────────────────────────────────────────────────────

/// Read-only credentials from environment variables, for headless hosts and
/// scripted use where no keyring daemon runs.
#[derive(Debug, Clone)]
pub struct EnvBacking {
    key_var: String,
    identity_var: String,
}

impl EnvBacking {
    pub fn new() -> Self {
        Self::with_vars(KEY_ENV, IDENTITY_ENV)
    }

    pub fn with_vars(key_var: impl Into<String>, identity_var: impl Into<String>) -> Self {
        Self {
            key_var: key_var.into(),
            identity_var: identity_var.into(),
        }
    }
}

impl Default for EnvBacking {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialBacking for EnvBacking {
    fn name(&self) -> &'static str {
        "environment"
    }

    fn load(&self) -> Result<Option<VaultCredentials>> {
        let Some(encoded_key) = std::env::var(&self.key_var).ok().filter(|v| !v.is_empty()) else {
            return Ok(None);
        };
        let identity = std::env::var(&self.identity_var).map_err(|_| {
            VaultError::Credentials(format!(
                "{} is set but {} is not",
                self.key_var, self.identity_var
            ))
        })?;

        Ok(Some(VaultCredentials {
            key: decode_key(&encoded_key)?,
            identity_id: IdentityId::parse(identity.trim())?,
        }))
    }

    fn store(&self, _credentials: &VaultCredentials) -> Result<()> {
        Err(VaultError::Credentials(format!(
            "environment credentials are read-only; set {} and {}",
            self.key_var, self.identity_var
        )))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OS keyring backing (feature-gated)
// ─────────────────────────────────────────────────────────────────────────────

/// OS keyring (macOS Keychain, Linux secret-service, Windows Credential Manager).
#[derive(Debug, Clone)]
pub struct KeyringBacking {
    service: String,
}

impl KeyringBacking {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    /// Use a different service name (separate vaults on one machine).
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl Default for KeyringBacking {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialBacking for KeyringBacking {
    fn name(&self) -> &'static str {
        "system keyring"
    }

    fn load(&self) -> Result<Option<VaultCredentials>> {
        let Some(encoded_key) = get_keyring_entry(&self.service, KEY_ACCOUNT)? else {
            return Ok(None);
        };
        let Some(identity) = get_keyring_entry(&self.service, IDENTITY_ACCOUNT)? else {
            return Err(VaultError::Credentials(
                "keyring holds a vault key but no identity id".into(),
            ));
        };

        Ok(Some(VaultCredentials {
            key: decode_key(&encoded_key)?,
            identity_id: IdentityId::parse(identity.trim())?,
        }))
    }

    fn store(&self, credentials: &VaultCredentials) -> Result<()> {
        store_keyring_entry(&self.service, KEY_ACCOUNT, &encode_key(&credentials.key))?;
        store_keyring_entry(
            &self.service,
            IDENTITY_ACCOUNT,
            &credentials.identity_id.to_string(),
        )
    }
}

#[cfg(feature = "keyring")]
fn get_keyring_entry(service: &str, user: &str) -> Result<Option<String>> {
    let entry = keyring::Entry::new(service, user)
        .map_err(|e| VaultError::Credentials(format!("keyring error: {}", e)))?;
    match entry.get_password() {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(VaultError::Credentials(format!(
            "failed to read from keyring: {}",
            e
        ))),
    }
}

#[cfg(feature = "keyring")]
fn store_keyring_entry(service: &str, user: &str, secret: &str) -> Result<()> {
    let entry = keyring::Entry::new(service, user)
        .map_err(|e| VaultError::Credentials(format!("keyring error: {}", e)))?;
    entry
        .set_password(secret)
        .map_err(|e| VaultError::Credentials(format!("failed to store in keyring: {}", e)))
}

#[cfg(not(feature = "keyring"))]
fn get_keyring_entry(_service: &str, _user: &str) -> Result<Option<String>> {
    Err(VaultError::Credentials(
        "keyring support not compiled in (enable the 'keyring' feature)".to_string(),
    ))
}

#[cfg(not(feature = "keyring"))]
fn store_keyring_entry(_service: &str, _user: &str, _secret: &str) -> Result<()> {
    Err(VaultError::Credentials(
        "keyring support not compiled in (enable the 'keyring' feature)".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_or_create_generates_once() {
        let backing = MemoryBacking::new();
        assert!(backing.load().unwrap().is_none());

        let first = load_or_create(&backing).unwrap();
        let second = load_or_create(&backing).unwrap();

        assert_eq!(first.identity_id, second.identity_id);
        assert_eq!(first.key.expose(), second.key.expose());
    }

    #[test]
    fn test_key_encoding_roundtrip() {
        let key = VaultKey::generate();
        let decoded = decode_key(&encode_key(&key)).unwrap();
        assert_eq!(key.expose(), decoded.expose());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(decode_key("not base64!!").is_err());
        assert!(decode_key(&BASE64_STANDARD.encode([1u8; 8])).is_err());
    }

    #[test]
    fn test_env_backing() {
        let backing = EnvBacking::with_vars("HEARTH_TEST_KEY_A", "HEARTH_TEST_ID_A");
        assert!(backing.load().unwrap().is_none());
        assert!(load_or_create(&backing).is_err());

        let key = VaultKey::generate();
        let identity = IdentityId::new();
        // SAFETY: the variable names are unique to this test.
        unsafe {
            std::env::set_var("HEARTH_TEST_KEY_A", encode_key(&key));
            std::env::set_var("HEARTH_TEST_ID_A", identity.to_string());
        }

        let loaded = backing.load().unwrap().unwrap();
        assert_eq!(loaded.identity_id, identity);
        assert_eq!(loaded.key.expose(), key.expose());
    }

    #[test]
    fn test_env_backing_requires_identity() {
        // SAFETY: the variable name is unique to this test.
        unsafe {
            std::env::set_var("HEARTH_TEST_KEY_B", encode_key(&VaultKey::generate()));
        }
        let backing = EnvBacking::with_vars("HEARTH_TEST_KEY_B", "HEARTH_TEST_ID_B");
        assert!(matches!(backing.load(), Err(VaultError::Credentials(_))));
    }

    #[cfg(not(feature = "keyring"))]
    #[test]
    fn test_keyring_disabled() {
        let backing = KeyringBacking::new();
        let err = backing.load().unwrap_err();
        assert!(err.to_string().contains("not compiled"));
    }
}

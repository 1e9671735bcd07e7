//! Field-level encryption for sensitive columns.
//!
//! Each value is sealed with AES-256-GCM under a fresh 96-bit nonce and stored
//! as `nonce || ciphertext`. The associated data names the table, column and
//! row, so a ciphertext copied onto another row fails authentication.

use std::fmt;

use aes_gcm::{
    Aes256Gcm, Key,
    aead::{Aead, KeyInit, OsRng, Payload, rand_core::RngCore},
};
use age::secrecy::{ExposeSecret, SecretBox};

use crate::error::{Result, VaultError};

/// Length of a vault key in bytes.
pub const KEY_BYTES: usize = 32;

const NONCE_BYTES: usize = 12;
const AAD_PREFIX: &str = "hearth-vault-field-v1";

// ─────────────────────────────────────────────────────────────────────────────
// Vault Key
// ─────────────────────────────────────────────────────────────────────────────

/// Symmetric vault key. Zeroed when dropped and never printed.
pub struct VaultKey(SecretBox<[u8; KEY_BYTES]>);

impl VaultKey {
    /// Wrap raw key bytes.
    pub fn from_bytes(bytes: [u8; KEY_BYTES]) -> Self {
        Self(SecretBox::new(Box::new(bytes)))
    }

    /// Build a key from a slice, rejecting the wrong length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; KEY_BYTES] = bytes.try_into().map_err(|_| {
            VaultError::Credentials(format!(
                "vault key must be {} bytes, got {}",
                KEY_BYTES,
                bytes.len()
            ))
        })?;
        Ok(Self::from_bytes(array))
    }

    /// Generate a fresh random key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    pub(crate) fn expose(&self) -> &[u8; KEY_BYTES] {
        self.0.expose_secret()
    }
}

impl Clone for VaultKey {
    fn clone(&self) -> Self {
        Self::from_bytes(*self.expose())
    }
}

impl fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("VaultKey([REDACTED])")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Field Cipher
// ─────────────────────────────────────────────────────────────────────────────

/// Location of an encrypted value, bound into the ciphertext as associated data.
#[derive(Debug, Clone, Copy)]
pub struct FieldRef<'a> {
    pub table: &'a str,
    pub column: &'a str,
    pub row_id: &'a str,
}

impl<'a> FieldRef<'a> {
    pub fn new(table: &'a str, column: &'a str, row_id: &'a str) -> Self {
        Self {
            table,
            column,
            row_id,
        }
    }

    fn aad(&self) -> Vec<u8> {
        format!(
            "{}|{}.{}:{}",
            AAD_PREFIX, self.table, self.column, self.row_id
        )
        .into_bytes()
    }
}

impl fmt::Display for FieldRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} of {}", self.table, self.column, self.row_id)
    }
}

/// Authenticated cipher for sensitive columns. Holds the key only for as long
/// as the owning vault handle lives.
pub struct FieldCipher {
    cipher: Aes256Gcm,
}

impl FieldCipher {
    pub fn new(key: &VaultKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.expose())),
        }
    }

    /// Encrypt a plaintext value for the given field.
    pub fn seal(&self, field: FieldRef<'_>, plaintext: &str) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_BYTES];
        OsRng.fill_bytes(&mut nonce);

        let aad = field.aad();
        let ciphertext = self
            .cipher
            .encrypt(
                (&nonce).into(),
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: &aad,
                },
            )
            .map_err(|_| VaultError::InvalidData(format!("failed to encrypt {}", field)))?;

        let mut sealed = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt a sealed value. Truncated or tampered input is an error, never
    /// garbled plaintext.
    pub fn open(&self, field: FieldRef<'_>, sealed: &[u8]) -> Result<String> {
        if sealed.len() <= NONCE_BYTES {
            return Err(VaultError::DecryptionFailed(format!(
                "{} (truncated ciphertext)",
                field
            )));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_BYTES);
        let aad = field.aad();
        let plaintext = self
            .cipher
            .decrypt(
                nonce.into(),
                Payload {
                    msg: ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| VaultError::DecryptionFailed(field.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| VaultError::DecryptionFailed(format!("{} (invalid UTF-8)", field)))
    }
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldCipher([REDACTED])")
    }
}

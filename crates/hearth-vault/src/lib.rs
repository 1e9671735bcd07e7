//! Encrypted local memory vault for Hearth.
//!
//! This crate persists the assistant's memory of one user in a single SQLite
//! file: the identity, conversation sessions and messages, extracted facts,
//! notes and their embeddings. Message content and fact values are sealed
//! with AES-256-GCM under a key kept in the OS credential store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CredentialBacking  ──key──▶  Vault                                     │
//! │  (OS keyring)                 - Single SQLite file, WAL, exclusive lock │
//! │                               - identities, sessions, messages, facts   │
//! │                               - notes + FTS5, embeddings                │
//! │                               - FieldCipher on sensitive columns        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use hearth_vault::{MemoryBacking, NewFact, PiiLevel, Vault, load_or_create};
//!
//! let credentials = load_or_create(&MemoryBacking::new())?;
//! let vault = Vault::open("/tmp/hearth/vault.db", &credentials.key)?;
//! vault.create_identity(credentials.identity_id, Some("Alex"))?;
//!
//! vault.set_fact(
//!     NewFact::new("location", "city", "Philadelphia").with_pii_level(PiiLevel::new(1)),
//! )?;
//! # Ok::<(), hearth_vault::VaultError>(())
//! ```

pub mod credentials;
pub mod crypto;
pub mod decay;
pub mod error;
pub mod store;
pub mod types;
pub mod validation;
pub mod vector;

// Re-export credential types
pub use credentials::{
    CredentialBacking, EnvBacking, KeyringBacking, MemoryBacking, VaultCredentials, encode_key,
    load_or_create,
};

pub use crypto::VaultKey;

pub use decay::{DecayParams, relevance, reinforced_confidence};

// Re-export error types
pub use error::{Result, VaultError};

// Re-export store
pub use store::{
    ExportSnapshot, KeywordHit, KeywordScope, MatchedRow, SCHEMA_VERSION, SemanticHit,
    SemanticScope, StoreStats, StoredEmbedding, Vault, VaultMeta, VaultTx, now,
};

// Re-export types
pub use types::{
    ConsentScope, Fact, FactFilter, FactId, FactPatch, Identity, IdentityId, Message, MessageId,
    NewFact, Note, NoteId, PiiLevel, Role, RowRef, Session, SessionId, SetFactOutcome,
};

pub use vector::{SimilarityFn, cosine_similarity};

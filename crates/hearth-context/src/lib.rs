//! Context selection for Hearth.
//!
//! Given a goal and a token budget, the [`ContextSelector`] pulls candidates
//! from the vault by keyword and embedding similarity, scores them with the
//! decay-weighted composite, drops anything the upload policy forbids and
//! packs the rest greedily into the budget. [`MemoryService`] wraps the
//! selector and the vault into the API the UI layer calls once per turn.
//!
//! ```no_run
//! use std::sync::Arc;
//! use hearth_context::{HashingEmbedder, MemoryService, ServiceSettings};
//! use hearth_vault::{Vault, VaultKey};
//!
//! let vault = Arc::new(Vault::open_in_memory(&VaultKey::generate())?);
//! let service = MemoryService::new(
//!     vault,
//!     Some(Arc::new(HashingEmbedder::default())),
//!     ServiceSettings::default(),
//! )?;
//!
//! let payload = service.build_context("what's the weather like?", 500)?;
//! // ... call the model with payload.to_prompt() ...
//! service.reinforce(&payload.fact_ids())?;
//! # Ok::<(), hearth_context::SelectError>(())
//! ```

pub mod embedder;
pub mod error;
pub mod payload;
pub mod policy;
pub mod selector;
pub mod service;
pub mod tokens;

pub use embedder::{Embedder, HashingEmbedder, SharedEmbedder};
pub use error::{Result, SelectError};
pub use payload::{
    ContextFact, ContextMessage, ContextNote, ContextPayload, ProfileSummary, SelectionStats,
};
pub use policy::{DEFAULT_MAX_PII, Exclusion, ExclusionCounts, Policy};
pub use selector::{ContextSelector, SELECTOR_VERSION, SelectOptions, SelectorSettings};
pub use service::{Health, MemoryService, ServiceSettings};
pub use tokens::{estimate_tokens, item_cost};

//! Upload policy applied to facts before packing.
//!
//! Exclusions are silent: callers only ever see aggregate counts, never which
//! fact was dropped or what it said.

use hearth_vault::{ConsentScope, Fact, PiiLevel};
use serde::Serialize;

/// Default PII ceiling for outward-facing payloads.
pub const DEFAULT_MAX_PII: u8 = 2;

/// Why a fact was kept out of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exclusion {
    /// `consent_scope` forbids leaving the vault.
    NeverUpload,
    /// `pii_level` is above the caller's ceiling.
    PiiLevel,
}

/// The caller's upload policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub max_pii: PiiLevel,
}

impl Policy {
    pub fn new(max_pii: PiiLevel) -> Self {
        Self { max_pii }
    }

    /// `None` when the fact may be sent, otherwise the first rule it breaks.
    pub fn check(&self, fact: &Fact) -> Option<Exclusion> {
        if fact.consent_scope == ConsentScope::NeverUpload {
            Some(Exclusion::NeverUpload)
        } else if fact.pii_level > self.max_pii {
            Some(Exclusion::PiiLevel)
        } else {
            None
        }
    }

    pub fn allows(&self, fact: &Fact) -> bool {
        self.check(fact).is_none()
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(PiiLevel::new(DEFAULT_MAX_PII))
    }
}

/// Aggregate exclusion counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExclusionCounts {
    pub never_upload: usize,
    pub pii_level: usize,
}

impl ExclusionCounts {
    pub fn record(&mut self, exclusion: Exclusion) {
        match exclusion {
            Exclusion::NeverUpload => self.never_upload += 1,
            Exclusion::PiiLevel => self.pii_level += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.never_upload + self.pii_level
    }
}

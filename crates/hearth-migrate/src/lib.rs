//! Legacy flat-file import for Hearth.
//!
//! On first open, [`MigrationDriver::run`] decides between an existing vault,
//! a fresh one, or a one-shot import of the legacy JSON files. The import is
//! all-or-nothing: a parse error, count mismatch or deadline expiry rolls
//! everything back and leaves the legacy files exactly as they were.

pub mod backup;
pub mod driver;
pub mod error;
pub mod legacy;

pub use backup::{BackedUpFile, Backup};
pub use driver::{MigrationDriver, MigrationOutcome, MigrationReport};
pub use error::{MigrationError, Result};
pub use legacy::{
    ExpectedCounts, LEGACY_FILES, LegacyData, LegacyFact, LegacyMessage, LegacyProfile,
    LegacySession, PREFERENCE_CATEGORY,
};

//! Core data models: raw platform records, canonical papers and recommendations.

pub mod identifiers;
mod paper;
mod recommendation;
mod record;

pub use paper::{Alert, CitationSnapshot, Paper, SyncOutcome, SyncStatus, TrackedPaper};
pub use recommendation::{Category, Priority, Recommendation};
pub use record::{AuthorRef, Platform, RawRecord, RecordBuilder};

//! fleetscale-ledger — the durable history of every check.
//!
//! # Document layout
//!
//! ```text
//! {
//!     "check_1": { "timestamp": "14.03.2025_10:21:07", ..., "action": "No Action",
//!                  "active": [...], "started": [...], "shutdown": [] },
//!     "check_2": { ... }
//! }
//! ```
//!
//! The whole document is rewritten on every check through a temporary file
//! and a rename, so readers only ever see a complete previous or complete
//! new version. Existing entries are carried through untouched, including
//! entries whose shape this version does not understand.

pub mod entry;
pub mod error;
pub mod history;
pub mod ledger;

pub use entry::{CheckEntry, NewCheck};
pub use error::{LedgerError, LedgerResult};
pub use history::History;
pub use ledger::HistoryLedger;

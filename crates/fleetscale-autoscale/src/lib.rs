//! fleetscale-autoscale — decides and applies the fleet size, once per check.
//!
//! # Check sequence
//!
//! ```text
//! load history ─► list samples ─► aggregate ─► current instances
//!      ─► decide ─► apply (if a target) ─► archive samples ─► record check
//! ```
//!
//! Aggregation and the decision happen before any sample is archived, and
//! samples are archived before the check is recorded, so a crash at any
//! point leaves either reprocessable samples or a complete history entry.
//!
//! # Decision rules
//!
//! ```text
//! check 1                    → NoAction (no baseline yet)
//! no samples                 → current - 1, floor 1 (NoAction if unchanged)
//! local:     avg > up_above  → scale_up_to
//!            avg < down_below→ scale_down_to
//!            otherwise       → baseline
//! delegated: {"action": n>0} → n
//!            anything else   → UnknownDeferred (fleet left alone)
//! ```

pub mod control_loop;
pub mod decision_service;
pub mod error;
pub mod policy;

pub use control_loop::{CheckReport, ControlLoop, Snapshot};
pub use decision_service::{DecisionClient, DecisionError, DecisionResponse};
pub use error::{ControlError, ControlResult};
pub use policy::DecisionPolicy;

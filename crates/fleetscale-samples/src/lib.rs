//! fleetscale-samples — the shared results directory.
//!
//! Workers drop one JSON file per completed request into the results
//! directory. Each check lists them through [`SampleStore`], aggregates
//! them, and finally moves them aside with [`Archiver`] so the next check
//! starts from a clean batch.
//!
//! # File naming contract
//!
//! ```text
//! <instance-id>_<timestamp>.<extension>
//! matrix-multiply-7d9f-xk2p_2025.03.14_10:21:07.json
//! ```
//!
//! The instance id is everything before the first `_` of the file stem.
//! It is the only association between a sample and the instance that
//! produced it; payload fields never override it.

pub mod archive;
pub mod error;
pub mod store;

pub use archive::{ArchiveReport, Archiver};
pub use error::{SampleError, SampleResult};
pub use store::{instance_id_from_file_name, SampleBatch, SampleFile, SampleStore};

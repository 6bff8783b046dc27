//! # shoebox-entity
//!
//! Persisted domain models for Shoebox: the per-account upload queue
//! record, its jobs, and the runner lease. Pure data plus invariant-
//! preserving mutation helpers; persistence itself lives in
//! `shoebox-store`.

pub mod upload;

pub use upload::job::UploadJob;
pub use upload::lease::RunnerLease;
pub use upload::state::UploadQueueState;

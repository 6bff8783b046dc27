//! # shoebox-uploader
//!
//! The upload engine proper:
//! - An upload scheduler that drains each account's durable queue with at
//!   most one active runner across all cooperating processes
//! - Resumable upload operations that never re-transfer an asset after a
//!   crash mid-flight
//! - A progress activity published to any observer
//! - Periodic sweeps that re-drive leftover jobs and enqueue newly
//!   captured media

pub mod activity;
pub mod instant;
pub mod operation;
pub mod scheduler;
pub mod sweeper;

pub use activity::UploadActivity;
pub use instant::InstantUploadScan;
pub use operation::{CancelFlag, UploadContext, UploadOperation, UploadOutcome, UploadTaskError};
pub use scheduler::UploadScheduler;
pub use sweeper::UploadSweeper;

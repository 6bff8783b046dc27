//! # shoebox-store
//!
//! Durable, per-account upload queue storage backed by SQLite. The store's
//! one primitive is an atomic read-modify-write of the queue record; the
//! database file is also the coordination point between cooperating
//! processes (host app and extensions), so every mutation runs inside an
//! immediate transaction guarded by SQLite's file lock.

pub mod queue_store;

pub use queue_store::QueueStore;

//! Snapshot persistence
//!
//! File-backed implementation of the `SnapshotRepository` port.

pub mod json_snapshot_repository;

pub use json_snapshot_repository::JsonSnapshotRepository;

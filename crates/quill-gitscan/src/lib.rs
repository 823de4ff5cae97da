//! Branch comparison via git2.
//!
//! Resolves two refs to commits, compares their trees, and exposes the
//! changed paths, per-path patches, and file contents at the head snapshot.

pub mod scanner;

pub use scanner::{discover_repository, eligible_changes, scan, BranchDiff};

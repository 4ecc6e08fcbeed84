//! Crate entry point for **repofetch**.
//!
//! The library clones remote Git repositories onto local storage and hands
//! back a [`RepositoryHandle`] that answers questions about the result by
//! reading it from disk. [`RepositoryAcquirer`] is the entry point; the
//! `commands` module backs the `repofetch` binary.

mod acquire;
mod commands;
mod config;
mod error;
mod git;
mod handle;
mod paths;
mod progress;
mod source;

#[cfg(test)]
mod test_support;

/// Re-export commonly used types and commands so they can be accessed from `repofetch::*`.
pub use acquire::{CloneOptions, Credentials, RepositoryAcquirer, default_destination};
pub use commands::{CloneFlags, cmd_clone, cmd_clone_all, cmd_is_bare, cmd_log, cmd_name};
pub use config::{Settings, load_settings};
pub use error::{AcquireError, Result};
pub use git::{BranchInfo, CommitInfo, TransferProgress};
pub use handle::RepositoryHandle;
pub use paths::config_home;
pub use source::{Transport, derive_default_name, validate_source};

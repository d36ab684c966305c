//! I/O helpers for shiki commands.

pub mod config;
pub mod engines;
pub mod files;
pub mod git;
pub mod init;
pub mod paths;
pub mod recovery;
pub mod schema;
pub mod session;
pub mod stack;
pub mod task_store;
pub mod worktree;

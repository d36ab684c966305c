//! Task orchestration for a fleet of coding agents sharing one project plan.
//!
//! Work is a DAG of tasks. Each task is routed to an execution engine, may run
//! in its own git worktree, and has its state reconciled between the agent
//! runtime's native team store and the project store under `.shiki/tasks/`.
//!
//! - **[`core`]**: Pure, deterministic logic (DAG checks, routing, reconciliation,
//!   budgets, conflict overlap, role suggestions). No I/O.
//! - **[`io`]**: Side-effecting operations (filesystem stores, git, config,
//!   engine probes).
//!
//! Orchestration modules ([`route`], [`sync`], [`validate`], [`dag`],
//! [`recover`], [`detect`]) coordinate core logic with I/O to implement CLI commands.

pub mod core;
pub mod dag;
pub mod detect;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod recover;
pub mod route;
pub mod sync;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;

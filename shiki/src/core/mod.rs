//! Deterministic, pure logic for shiki commands.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod conflicts;
pub mod dag;
pub mod mermaid;
pub mod reconcile;
pub mod recovery;
pub mod roles;
pub mod routing;

//! sequin-core: Pattern learning engine for multi-agent orchestration
//!
//! This crate mines, validates, and persists recurring command/workflow
//! sequences observed during orchestration sessions, so a downstream
//! suggestion mechanism can recommend previously successful sequences.
//!
//! # Architecture
//!
//! ```text
//! Task events → Capture (session buffers) → candidate Pattern
//!                                               ↓
//!                                           Validator
//!                                               ↓
//!                                    PatternStore (JSON, cached)
//!                                               ↓
//!                              findSimilar / getActivePatterns
//! ```
//!
//! # Modules
//!
//! - `capture`: Session buffering and candidate sequence extraction
//! - `validate`: Well-formedness checks, duplicate detection, thresholds
//! - `store`: Persistent pattern store with similarity search and pruning
//! - `similarity`: Shared Jaccard/order-match sequence scoring
//! - `engine`: Facade wiring capture → validation → storage
//! - `config`: Configuration management
//!
//! # Concurrency
//!
//! The engine is single-process and synchronous. Session buffers are owned
//! by the `Capture` value, not shared global state; the backing store file
//! is read-modify-written without inter-process locking (last writer wins).
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod capture;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod pattern;
pub mod similarity;
pub mod store;
pub mod validate;

pub use error::{Error, Result};
pub use pattern::{Pattern, PatternStatus, WorkflowKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}

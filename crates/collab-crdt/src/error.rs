//! Error types for the CRDT value tree and fractional index generator.

use thiserror::Error;

/// Errors raised by the fractional index generator.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// `between` was asked to produce a key between two keys where `a >= b`.
    #[error("invalid key order: expected a < b")]
    InvalidKeyOrder,

    /// No further key could be generated between two adjacent keys.
    ///
    /// Only reachable on pathological adversarial inputs (e.g. two keys
    /// that already differ by the smallest possible digit at every
    /// position up to an absurd depth); normal interleaved inserts never
    /// hit this.
    #[error("fractional index key exhaustion")]
    KeyExhaustion,
}

/// Why an op was dropped instead of applied to the tree.
///
/// This is not a library-misuse error — it's an expected outcome under the
/// op-application rules in the spec (a producer that saw a stale tree, or a
/// late write that lost LWW). Callers log and move on; they never propagate
/// this as a hard failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// A path segment did not resolve to an existing entry.
    PathNotFound,
    /// A path segment resolved to a tombstoned entry.
    Tombstoned,
    /// The resolved node was not of the kind the op expects
    /// (e.g. `list-insert` against a `Record`).
    SchemaViolation,
    /// The op's clock did not exceed the stored clock for its target entry.
    StaleOp,
}

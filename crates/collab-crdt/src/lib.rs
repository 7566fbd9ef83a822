//! Conflict-free replicated value tree, fractional indexing and undo
//! history for server-mediated real-time collaboration rooms.
//!
//! This crate is the pure, transport-agnostic core: a `CrdtTree` that
//! applies and merges ops deterministically, a fractional index generator
//! for ordered-list inserts, path-scoped subscriptions, and a per-room undo
//! stack. It knows nothing about rooms, sessions, sockets or durability —
//! those live in the binary crate that embeds it.

pub mod clock;
pub mod error;
pub mod fractional_index;
pub mod history;
pub mod node;
pub mod ops;
pub mod subscription;
pub mod tree;
pub mod value;

pub use clock::{Clock, LogicalClock};
pub use error::{DropReason, Error};
pub use history::HistoryManager;
pub use node::{Entry, Node, NodeKind};
pub use ops::{Op, Path};
pub use subscription::{SubscriptionId, SubscriptionRegistry};
pub use tree::{ApplyOutcome, CrdtTree};
pub use value::Value;

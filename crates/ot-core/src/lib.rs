//! ot-core: operational transformation engine core.
//!
//! - **core**: the error type and the trait seams (`OtOperation`, `OtSystem`,
//!   `OtNode`, `OtRemote`).
//! - **system**: the OT algebra. A registry-driven `OtSystemImpl`, its
//!   builder, and product composition of independent systems.
//! - **dag**: commits, backward search, checkpoint reconstruction and N-way
//!   merge over a commit graph.
//! - **remote**: an in-memory `OtRemote`.
//! - **client**: `OtStateManager`, which keeps a local optimistic state in
//!   sync with an `OtNode`.

pub mod client;
pub mod core;
pub mod dag;
pub mod remote;
pub mod system;

#[cfg(test)]
extern crate self as ot_core;
#[cfg(test)]
mod fixtures;

// Top-level re-exports for common usage
pub use crate::client::{ListenerId, OtStateManager, StateManagerConfig};
pub use crate::core::error::{OtError, Result};
pub use crate::core::traits::{
    CommitId, FetchData, OpVariant, OtNode, OtOperation, OtRemote, OtSystem, TaggedOperation,
};
pub use crate::dag::{
    commits_to_graphviz, find_checkpoint, find_parent_by_commit_id, find_parent_by_predicate,
    make_checkpoint_for_commit, merge, FindResult, OtCommit,
};
pub use crate::remote::InMemoryRemote;
pub use crate::system::{
    merge3, merge4, ConflictResolution, MergedOtSystem, OtSystemBuilder, OtSystemImpl,
    TransformResult,
};

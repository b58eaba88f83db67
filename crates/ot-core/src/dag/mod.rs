//! Commit DAG: the commit type and the search and merge algorithms that run
//! over an [`OtRemote`](crate::core::traits::OtRemote).
//!
//! Every algorithm takes a commit-id comparator. It must be a total order in
//! which commits nearer to the search roots sort first.

pub mod commit;
pub mod graphviz;
pub mod merge;
mod queue;
pub mod search;

pub use commit::OtCommit;
pub use graphviz::commits_to_graphviz;
pub use merge::merge;
pub use search::{
    find_checkpoint, find_parent_by_commit_id, find_parent_by_predicate,
    make_checkpoint_for_commit, FindResult,
};

//! Immutable commit DAG node.

use serde::{Deserialize, Serialize};

/// A node in the commit DAG.
///
/// `parents` keeps insertion order; each entry holds the diff that advances
/// from that parent to this commit. A root has no parents and an empty
/// checkpoint; a checkpoint commit carries the full diff from the empty
/// state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtCommit<K, O> {
    pub id: K,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Vec<O>>,
    pub parents: Vec<(K, Vec<O>)>,
}

impl<K, O> OtCommit<K, O> {
    pub fn new(id: K, checkpoint: Option<Vec<O>>, parents: Vec<(K, Vec<O>)>) -> Self {
        Self {
            id,
            checkpoint,
            parents,
        }
    }

    pub fn of_root(id: K) -> Self {
        Self::new(id, Some(Vec::new()), Vec::new())
    }

    pub fn of_commit(id: K, parent: K, ops: Vec<O>) -> Self {
        Self::new(id, None, vec![(parent, ops)])
    }

    pub fn of_merge(id: K, parents: Vec<(K, Vec<O>)>) -> Self {
        Self::new(id, None, parents)
    }

    pub fn of_checkpoint(id: K, parent: K, checkpoint: Vec<O>) -> Self {
        Self::new(id, Some(checkpoint), vec![(parent, Vec::new())])
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    #[inline]
    pub fn is_checkpoint(&self) -> bool {
        self.checkpoint.is_some()
    }

    #[inline]
    pub fn is_merge(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn parent_ids(&self) -> impl Iterator<Item = &K> {
        self.parents.iter().map(|(id, _)| id)
    }
}

impl<K: PartialEq, O> OtCommit<K, O> {
    /// Diff from `parent` to this commit, if `parent` is a direct parent.
    pub fn diff_from(&self, parent: &K) -> Option<&[O]> {
        self.parents
            .iter()
            .find(|(id, _)| id == parent)
            .map(|(_, ops)| ops.as_slice())
    }
}

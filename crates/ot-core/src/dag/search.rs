//! Backward search over the commit DAG.

use super::commit::OtCommit;
use super::queue::CmpQueue;
use crate::core::error::{OtError, Result};
use crate::core::traits::{CommitId, OtRemote, OtSystem};
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

/// A commit matched by [`find_parent_by_predicate`].
#[derive(Debug, Clone, PartialEq)]
pub struct FindResult<K, O> {
    /// The commit whose parent link led to the match, or the matched commit
    /// itself when it was one of the start ids.
    pub child_commit_id: K,
    pub commit: OtCommit<K, O>,
    /// Diffs from the matched commit down to the start commit the search
    /// came from, in application order.
    pub parent_to_child: Vec<O>,
}

struct Entry<K, O> {
    commit_id: K,
    commit: Option<OtCommit<K, O>>,
    parent_to_child: Vec<O>,
}

/// Walk parents from `start_ids` in `cmp` order until `matches` accepts a
/// commit.
///
/// Only parents accepted by `load` are fetched, so with a comparator where
/// nearer commits sort first, `load` can prune everything past a target.
/// Ids unknown to the remote are skipped.
pub async fn find_parent_by_predicate<K, O, R, C, L, M>(
    remote: &R,
    start_ids: impl IntoIterator<Item = K>,
    cmp: C,
    load: L,
    matches: M,
) -> Result<Option<FindResult<K, O>>>
where
    K: CommitId,
    O: Clone + Send + Sync + 'static,
    R: OtRemote<K, O> + ?Sized,
    C: Fn(&K, &K) -> Ordering,
    L: Fn(&K) -> bool,
    M: Fn(&OtCommit<K, O>) -> bool,
{
    let entries = start_ids
        .into_iter()
        .map(|commit_id| Entry {
            commit_id,
            commit: None,
            parent_to_child: Vec::new(),
        })
        .collect();
    let mut queue = CmpQueue::new(entries, |a: &Entry<K, O>, b: &Entry<K, O>| {
        cmp(&a.commit_id, &b.commit_id)
    });
    let mut found: HashSet<K> = HashSet::new();

    while let Some(entry) = queue.pop() {
        let Entry {
            commit_id,
            commit,
            parent_to_child,
        } = entry;

        let commit = match commit {
            Some(commit) => commit,
            None => match remote.get_commit(&commit_id).await? {
                Some(commit) => commit,
                None => continue,
            },
        };

        if matches(&commit) {
            return Ok(Some(FindResult {
                child_commit_id: commit_id,
                commit,
                parent_to_child,
            }));
        }

        for (parent_id, diff) in &commit.parents {
            if !load(parent_id) || !found.insert(parent_id.clone()) {
                continue;
            }

            let Some(parent) = remote.get_commit(parent_id).await? else {
                continue;
            };

            let mut chain = diff.clone();
            chain.extend(parent_to_child.iter().cloned());

            if matches(&parent) {
                return Ok(Some(FindResult {
                    child_commit_id: commit_id,
                    commit: parent,
                    parent_to_child: chain,
                }));
            }

            queue.push(Entry {
                commit_id: parent_id.clone(),
                commit: Some(parent),
                parent_to_child: chain,
            });
        }
    }

    Ok(None)
}

/// Find `target` among the ancestors of `start_ids`.
pub async fn find_parent_by_commit_id<K, O, R, C>(
    remote: &R,
    start_ids: impl IntoIterator<Item = K>,
    cmp: C,
    target: &K,
) -> Result<Option<FindResult<K, O>>>
where
    K: CommitId,
    O: Clone + Send + Sync + 'static,
    R: OtRemote<K, O> + ?Sized,
    C: Fn(&K, &K) -> Ordering,
{
    find_parent_by_predicate(
        remote,
        start_ids,
        &cmp,
        |id| cmp(id, target) != Ordering::Greater,
        |commit| &commit.id == target,
    )
    .await
}

/// Nearest checkpoint at or above `from`.
pub async fn find_checkpoint<K, O, R, C>(
    remote: &R,
    cmp: C,
    from: &K,
) -> Result<Option<FindResult<K, O>>>
where
    K: CommitId,
    O: Clone + Send + Sync + 'static,
    R: OtRemote<K, O> + ?Sized,
    C: Fn(&K, &K) -> Ordering,
{
    find_parent_by_predicate(
        remote,
        [from.clone()],
        &cmp,
        |id| cmp(from, id) != Ordering::Greater,
        OtCommit::is_checkpoint,
    )
    .await
}

/// Full state-reconstruction diff for `commit_id`: the nearest checkpoint
/// followed by the diffs down to the commit, squashed.
pub async fn make_checkpoint_for_commit<K, O, S, R, C>(
    system: &S,
    remote: &R,
    cmp: C,
    commit_id: &K,
) -> Result<Vec<O>>
where
    K: CommitId,
    O: Clone + Send + Sync + 'static,
    S: OtSystem<O> + ?Sized,
    R: OtRemote<K, O> + ?Sized,
    C: Fn(&K, &K) -> Ordering,
{
    let found = find_checkpoint(remote, cmp, commit_id)
        .await?
        .ok_or(OtError::CheckpointNotFound)?;
    debug!(
        "[OtSearch] checkpoint for {:?} is {:?} ({} trailing ops)",
        commit_id,
        found.commit.id,
        found.parent_to_child.len()
    );

    let mut ops = found.commit.checkpoint.unwrap_or_default();
    ops.extend(found.parent_to_child);
    Ok(system.squash(&ops))
}

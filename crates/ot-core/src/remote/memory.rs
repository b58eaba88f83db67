//! Process-local [`OtRemote`].

use crate::core::error::Result;
use crate::core::traits::{CommitId, OtRemote};
use crate::dag::OtCommit;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

type IdGenerator<K> = Box<dyn Fn() -> K + Send + Sync>;

struct Store<K, O> {
    commits: HashMap<K, OtCommit<K, O>>,
    parents: HashSet<K>,
    last_checkpoint: Option<K>,
}

/// Commit storage held in memory.
///
/// Heads are the stored commits that no stored commit names as a parent.
/// Looking up an unknown id yields `Ok(None)`.
pub struct InMemoryRemote<K, O> {
    store: Mutex<Store<K, O>>,
    next_id: IdGenerator<K>,
}

impl<K, O> InMemoryRemote<K, O>
where
    K: CommitId,
    O: Clone + Send + Sync + 'static,
{
    pub fn new(next_id: impl Fn() -> K + Send + Sync + 'static) -> Self {
        Self {
            store: Mutex::new(Store {
                commits: HashMap::new(),
                parents: HashSet::new(),
                last_checkpoint: None,
            }),
            next_id: Box::new(next_id),
        }
    }

    pub fn len(&self) -> usize {
        self.store.lock().commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().commits.is_empty()
    }

    /// Snapshot of every stored commit.
    pub fn commits(&self) -> Vec<OtCommit<K, O>> {
        self.store.lock().commits.values().cloned().collect()
    }
}

impl<O> InMemoryRemote<String, O>
where
    O: Clone + Send + Sync + 'static,
{
    /// Ids "1", "2", ... in creation order.
    pub fn with_sequential_ids() -> Self {
        let counter = AtomicU64::new(0);
        Self::new(move || (counter.fetch_add(1, Ordering::Relaxed) + 1).to_string())
    }
}

impl<K, O> std::fmt::Debug for InMemoryRemote<K, O>
where
    K: CommitId,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let store = self.store.lock();
        f.debug_struct("InMemoryRemote")
            .field("commits", &store.commits.keys().collect::<Vec<_>>())
            .field("last_checkpoint", &store.last_checkpoint)
            .finish()
    }
}

#[async_trait]
impl<K, O> OtRemote<K, O> for InMemoryRemote<K, O>
where
    K: CommitId,
    O: Clone + Send + Sync + 'static,
{
    async fn create_id(&self) -> Result<K> {
        Ok((self.next_id)())
    }

    async fn push(&self, commits: Vec<OtCommit<K, O>>) -> Result<()> {
        let mut store = self.store.lock();
        for commit in commits {
            trace!("[InMemoryRemote] storing {:?}", commit.id);
            store.parents.extend(commit.parent_ids().cloned());
            if commit.is_checkpoint() {
                store.last_checkpoint = Some(commit.id.clone());
            }
            store.commits.insert(commit.id.clone(), commit);
        }
        Ok(())
    }

    async fn get_heads(&self) -> Result<HashSet<K>> {
        let store = self.store.lock();
        Ok(store
            .commits
            .keys()
            .filter(|id| !store.parents.contains(*id))
            .cloned()
            .collect())
    }

    async fn get_checkpoint(&self) -> Result<Option<K>> {
        Ok(self.store.lock().last_checkpoint.clone())
    }

    async fn get_commit(&self, id: &K) -> Result<Option<OtCommit<K, O>>> {
        Ok(self.store.lock().commits.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_heads_exclude_parents() {
        let remote: InMemoryRemote<String, i32> = InMemoryRemote::with_sequential_ids();
        remote
            .push(vec![
                OtCommit::of_root("*".into()),
                OtCommit::of_commit("a".into(), "*".into(), vec![1]),
                OtCommit::of_commit("b".into(), "*".into(), vec![2]),
            ])
            .await
            .unwrap();

        let heads = remote.get_heads().await.unwrap();

        assert_eq!(heads, HashSet::from(["a".to_string(), "b".to_string()]));
        assert_eq!(remote.len(), 3);
    }

    #[tokio::test]
    async fn test_tracks_last_checkpoint() {
        let remote: InMemoryRemote<String, i32> = InMemoryRemote::with_sequential_ids();
        assert_eq!(remote.get_checkpoint().await.unwrap(), None);

        remote
            .push(vec![
                OtCommit::of_root("*".into()),
                OtCommit::of_checkpoint("c".into(), "*".into(), vec![1, 2]),
            ])
            .await
            .unwrap();

        assert_eq!(remote.get_checkpoint().await.unwrap(), Some("c".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_commit_is_none() {
        let remote: InMemoryRemote<String, i32> = InMemoryRemote::with_sequential_ids();
        assert!(remote.get_commit(&"x".to_string()).await.unwrap().is_none());
        assert!(remote.is_empty());
    }

    #[tokio::test]
    async fn test_sequential_ids() {
        let remote: InMemoryRemote<String, i32> = InMemoryRemote::with_sequential_ids();
        assert_eq!(remote.create_id().await.unwrap(), "1");
        assert_eq!(remote.create_id().await.unwrap(), "2");
    }
}

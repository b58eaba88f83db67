//! End-to-end sync between several managers sharing one commit DAG.

mod common;

use async_trait::async_trait;
use common::{add, commit_id_cmp, counter_system, init_tracing, CounterOp};
use futures::future::join_all;
use ot_core::{
    find_parent_by_commit_id, make_checkpoint_for_commit, merge, FetchData, InMemoryRemote,
    OtCommit, OtError, OtNode, OtRemote, OtStateManager, OtSystem, OtSystemImpl, Result,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

type Commit = OtCommit<String, CounterOp>;

struct Shared {
    remote: InMemoryRemote<String, CounterOp>,
    levels: Mutex<HashMap<String, u64>>,
    head: watch::Sender<String>,
    push_lock: tokio::sync::Mutex<()>,
}

impl Shared {
    async fn new() -> Arc<Self> {
        init_tracing();
        let counter = AtomicU64::new(0);
        let remote = InMemoryRemote::new(move || {
            format!("{:04}", counter.fetch_add(1, Ordering::Relaxed) + 1)
        });
        remote
            .push(vec![OtCommit::of_root("0000".to_string())])
            .await
            .unwrap();
        let (head, _) = watch::channel("0000".to_string());
        Arc::new(Self {
            remote,
            levels: Mutex::new(HashMap::from([("0000".to_string(), 0)])),
            head,
            push_lock: tokio::sync::Mutex::new(()),
        })
    }

    fn level(&self, id: &String) -> u64 {
        self.levels.lock().get(id).copied().unwrap_or(0)
    }
}

/// Node that commits straight into the shared DAG and merges forks on push.
struct DagNode {
    shared: Arc<Shared>,
    system: OtSystemImpl<CounterOp>,
}

impl DagNode {
    fn new(shared: &Arc<Shared>) -> Self {
        Self {
            shared: shared.clone(),
            system: counter_system(),
        }
    }

    fn head(&self) -> String {
        self.shared.head.borrow().clone()
    }
}

#[async_trait]
impl OtNode<String, CounterOp> for DagNode {
    type Commit = Commit;

    async fn checkout(&self) -> Result<FetchData<String, CounterOp>> {
        let head = self.head();
        let diffs =
            make_checkpoint_for_commit(&self.system, &self.shared.remote, commit_id_cmp, &head)
                .await?;
        let level = self.shared.level(&head);
        Ok(FetchData::new(head, level, diffs))
    }

    async fn fetch(&self, revision: &String) -> Result<FetchData<String, CounterOp>> {
        let head = self.head();
        let level = self.shared.level(&head);
        if &head == revision {
            return Ok(FetchData::new(head, level, Vec::new()));
        }

        let found = find_parent_by_commit_id(
            &self.shared.remote,
            [head.clone()],
            commit_id_cmp,
            revision,
        )
        .await?
        .ok_or_else(|| OtError::CommitNotFound(revision.clone()))?;
        let diffs = self.system.squash(&found.parent_to_child);
        Ok(FetchData::new(head, level, diffs))
    }

    async fn poll(&self, revision: &String) -> Result<FetchData<String, CounterOp>> {
        let mut head = self.shared.head.subscribe();
        let moved = head.wait_for(|head| head != revision).await.is_ok();
        if !moved {
            return Err(OtError::Aborted);
        }
        self.fetch(revision).await
    }

    async fn create_commit(
        &self,
        parent: &String,
        diffs: Vec<CounterOp>,
        level: u64,
    ) -> Result<Commit> {
        tokio::task::yield_now().await;
        let id = self.shared.remote.create_id().await?;
        self.shared.levels.lock().insert(id.clone(), level);
        Ok(OtCommit::of_commit(id, parent.clone(), diffs))
    }

    async fn push(&self, commit: &Commit) -> Result<FetchData<String, CounterOp>> {
        let _guard = self.shared.push_lock.lock().await;
        let remote = &self.shared.remote;
        remote.push(vec![commit.clone()]).await?;

        let heads = remote.get_heads().await?;
        if heads.len() == 1 {
            let level = self.shared.level(&commit.id);
            self.shared.head.send_replace(commit.id.clone());
            return Ok(FetchData::new(commit.id.clone(), level, Vec::new()));
        }

        let mut merged = merge(&self.system, remote, commit_id_cmp, heads.iter().cloned()).await?;
        let diffs = merged.remove(&commit.id).unwrap_or_default();
        let id = remote.create_id().await?;
        let level = heads.iter().map(|h| self.shared.level(h)).max().unwrap_or(0) + 1;
        let mut parents: Vec<(String, Vec<CounterOp>)> = heads
            .into_iter()
            .map(|h| {
                let ops = if h == commit.id {
                    diffs.clone()
                } else {
                    merged.remove(&h).unwrap_or_default()
                };
                (h, ops)
            })
            .collect();
        parents.sort_by(|a, b| a.0.cmp(&b.0));

        remote.push(vec![OtCommit::of_merge(id.clone(), parents)]).await?;
        self.shared.levels.lock().insert(id.clone(), level);
        self.shared.head.send_replace(id.clone());
        Ok(FetchData::new(id, level, diffs))
    }
}

type Manager = OtStateManager<String, CounterOp, DagNode>;

fn manager(shared: &Arc<Shared>) -> Manager {
    let system: Arc<dyn OtSystem<CounterOp>> = Arc::new(counter_system());
    OtStateManager::new(|| 0, DagNode::new(shared), system)
}

#[tokio::test]
async fn test_sequential_clients_converge() {
    let shared = Shared::new().await;
    let (a, b) = (manager(&shared), manager(&shared));
    a.checkout().await.unwrap();
    b.checkout().await.unwrap();

    a.add(vec![add(0, 5)]).unwrap();
    b.add(vec![add(0, 3)]).unwrap();
    a.sync().await.unwrap();
    b.sync().await.unwrap();
    a.sync().await.unwrap();

    assert_eq!(a.state(), 8);
    assert_eq!(b.state(), 8);
    assert_eq!(a.revision(), b.revision());
    assert_eq!(a.level(), Some(2));
}

#[tokio::test]
async fn test_forked_pushes_are_merged() {
    let shared = Shared::new().await;
    let (a, b) = (manager(&shared), manager(&shared));
    a.checkout().await.unwrap();
    b.checkout().await.unwrap();

    a.add(vec![add(0, 5)]).unwrap();
    b.add(vec![add(0, 3)]).unwrap();
    let (first, second) = tokio::join!(a.sync(), b.sync());
    first.unwrap();
    second.unwrap();
    a.sync().await.unwrap();

    assert_eq!(a.state(), 8);
    assert_eq!(b.state(), 8);
    assert_eq!(a.revision(), b.revision());
    assert!(shared
        .remote
        .commits()
        .iter()
        .any(|commit| commit.is_merge()));

    let late = manager(&shared);
    late.checkout().await.unwrap();
    assert_eq!(late.state(), 8);
}

#[tokio::test]
async fn test_concurrent_syncs_on_one_client_commit_once() {
    let shared = Shared::new().await;
    let a = manager(&shared);
    a.checkout().await.unwrap();
    a.add(vec![add(0, 1), add(1, 1)]).unwrap();

    let results = join_all((0..4).map(|_| a.sync())).await;

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(shared.remote.len(), 2);
    assert_eq!(a.state(), 2);
}

#[tokio::test]
async fn test_listener_receives_remote_changes() {
    let shared = Shared::new().await;
    let (a, b) = (manager(&shared), manager(&shared));
    a.checkout().await.unwrap();
    b.checkout().await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    b.add_change_listener(move || {
        let _ = tx.send(());
    });
    assert!(b.is_polling());

    a.add(vec![add(0, 42)]).unwrap();
    a.sync().await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no change notification")
        .expect("listener dropped");
    assert_eq!(b.state(), 42);
    assert_eq!(b.revision(), a.revision());
}

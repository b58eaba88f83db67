use crate::core::error::Result;
use crate::dag::OtCommit;
use crate::system::TransformResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

/// An application-defined operation over some state.
///
/// Operations must be pure with respect to `apply`. Applying a sequence is
/// a left fold, so order within a sequence is always meaningful.
pub trait OtOperation: Clone + Debug + Send + Sync + 'static {
    type State: Clone + Send + Sync + 'static;

    fn apply(&self, state: Self::State) -> Result<Self::State>;
}

/// An operation type whose variants carry an explicit discriminant.
///
/// `OtSystemImpl` keys its registries by `Tag` and by ordered `(Tag, Tag)`
/// pairs.
pub trait TaggedOperation: Clone + Debug + Send + Sync + 'static {
    type Tag: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn tag(&self) -> Self::Tag;
}

/// One concrete variant of a tagged operation type.
///
/// Lets the builder accept functions over the variant payload (`&AddOp`)
/// instead of the whole enum.
pub trait OpVariant<O: TaggedOperation>: Sized + 'static {
    fn tag() -> O::Tag;

    fn extract(op: &O) -> Option<&Self>;
}

/// Marker for types usable as commit ids.
pub trait CommitId: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> CommitId for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// The OT algebra consumed by the merge algorithm and the state manager.
pub trait OtSystem<O>: Send + Sync {
    /// Whether `op` is a no-op transition.
    fn is_empty(&self, op: &O) -> bool;

    /// Residuals for two concurrent sequences. `left_ops` is applied after
    /// `left`, `right_ops` after `right`.
    fn transform(&self, left: &[O], right: &[O]) -> Result<TransformResult<O>>;

    fn squash(&self, ops: &[O]) -> Vec<O>;

    fn invert(&self, ops: &[O]) -> Result<Vec<O>>;
}

/// Revision, depth and diffs returned by every `OtNode` read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchData<K, O> {
    pub revision: K,
    pub level: u64,
    pub diffs: Vec<O>,
}

impl<K, O> FetchData<K, O> {
    pub fn new(revision: K, level: u64, diffs: Vec<O>) -> Self {
        Self {
            revision,
            level,
            diffs,
        }
    }
}

/// Transport used by `OtStateManager`.
///
/// `poll` is a long poll; it is cancelled by dropping the returned future.
#[async_trait]
pub trait OtNode<K, O>: Send + Sync + 'static
where
    K: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    /// Opaque handle produced by `create_commit` and consumed by `push`.
    type Commit: Send + Sync + 'static;

    async fn checkout(&self) -> Result<FetchData<K, O>>;

    async fn fetch(&self, revision: &K) -> Result<FetchData<K, O>>;

    async fn poll(&self, revision: &K) -> Result<FetchData<K, O>>;

    async fn create_commit(&self, parent: &K, diffs: Vec<O>, level: u64) -> Result<Self::Commit>;

    async fn push(&self, commit: &Self::Commit) -> Result<FetchData<K, O>>;
}

/// Commit storage consumed by the search and merge algorithms.
#[async_trait]
pub trait OtRemote<K, O>: Send + Sync
where
    K: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    async fn create_id(&self) -> Result<K>;

    async fn push(&self, commits: Vec<OtCommit<K, O>>) -> Result<()>;

    async fn get_heads(&self) -> Result<HashSet<K>>;

    /// Id of the latest checkpoint commit, if any.
    async fn get_checkpoint(&self) -> Result<Option<K>>;

    async fn get_commit(&self, id: &K) -> Result<Option<OtCommit<K, O>>>;
}

//! N-way merge of divergent commit heads.
//!
//! The merge keeps a local graph of loaded commits plus synthetic merge
//! points, loading commits from the remote lazily (in comparator order)
//! until the frontier reduces to a single node. Each start id then gets the
//! squashed diff along its path to that node.

use super::queue::CmpQueue;
use crate::core::error::{OtError, Result};
use crate::core::traits::{CommitId, OtRemote, OtSystem};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// A node of the local merge graph: a real commit, or a synthetic merge
/// point that only lives for the duration of one `merge` call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Node<K> {
    Commit(K),
    Merge(usize),
}

type Parents<K, O> = Vec<(Node<K>, Vec<O>)>;

/// Outcome of one reduction step over a frontier.
enum Step<K> {
    Done(Node<K>),
    /// Some node's parents are not loaded yet.
    Insufficient,
    /// Merge `sub` first, then merge the result with `partner`.
    Then { sub: Vec<Node<K>>, partner: Node<K> },
    /// Replace the frontier and continue.
    Tail(Vec<Node<K>>),
}

/// Order-preserving dedup.
fn unique<K: CommitId>(nodes: impl IntoIterator<Item = Node<K>>) -> Vec<Node<K>> {
    let mut seen = HashSet::new();
    nodes.into_iter().filter(|n| seen.insert(n.clone())).collect()
}

struct MergeGraph<K, O> {
    parents: HashMap<Node<K>, Parents<K, O>>,
    next_synthetic: usize,
}

impl<K, O> MergeGraph<K, O>
where
    K: CommitId,
    O: Clone,
{
    fn new() -> Self {
        Self {
            parents: HashMap::new(),
            next_synthetic: 0,
        }
    }

    fn contains(&self, node: &Node<K>) -> bool {
        self.parents.contains_key(node)
    }

    fn insert_commit(&mut self, id: K, parents: Vec<(K, Vec<O>)>) {
        let parents = parents
            .into_iter()
            .map(|(parent, ops)| (Node::Commit(parent), ops))
            .collect();
        self.parents.insert(Node::Commit(id), parents);
    }

    fn synthesize(&mut self, parents: Parents<K, O>) -> Node<K> {
        let node = Node::Merge(self.next_synthetic);
        self.next_synthetic += 1;
        self.parents.insert(node.clone(), parents);
        node
    }

    /// Drop every node that is an ancestor of another node in `nodes`.
    fn without_subnodes(&self, nodes: &[Node<K>]) -> Vec<Node<K>> {
        let mut ancestors = HashSet::new();
        let mut worklist: Vec<&Node<K>> = nodes.iter().collect();
        let mut seen: HashSet<&Node<K>> = nodes.iter().collect();

        while let Some(node) = worklist.pop() {
            if let Some(parents) = self.parents.get(node) {
                for (parent, _) in parents {
                    ancestors.insert(parent);
                    if seen.insert(parent) {
                        worklist.push(parent);
                    }
                }
            }
        }

        nodes
            .iter()
            .filter(|n| !ancestors.contains(n))
            .cloned()
            .collect()
    }

    /// Diff from `ancestor` down to `descendant`, walking parent links
    /// depth-first. `None` when `ancestor` is not reachable through the
    /// loaded part of the graph.
    fn find_path(&self, ancestor: &Node<K>, descendant: &Node<K>) -> Option<Vec<O>> {
        if ancestor == descendant {
            return Some(Vec::new());
        }

        let mut visited: HashSet<&Node<K>> = HashSet::new();
        // (node, index of the next parent edge to try)
        let mut frames: Vec<(&Node<K>, usize)> = vec![(descendant, 0)];

        while let Some((node, next)) = frames.last_mut() {
            let edge = self.parents.get(*node).and_then(|p| p.get(*next));
            let Some((parent, _)) = edge else {
                frames.pop();
                continue;
            };
            *next += 1;

            if !visited.insert(parent) {
                continue;
            }
            if parent == ancestor {
                let mut path = Vec::new();
                for (node, next) in frames.iter().rev() {
                    if let Some((_, ops)) = self.parents.get(*node).and_then(|p| p.get(next - 1)) {
                        path.extend(ops.iter().cloned());
                    }
                }
                return Some(path);
            }
            frames.push((parent, 0));
        }

        None
    }

    /// Contributing nodes of `start`: every plain commit reachable from it
    /// (including itself when plain) plus the unloaded frontier.
    fn contributing(
        &self,
        start: &Node<K>,
        memo: &mut HashMap<Node<K>, Vec<Node<K>>>,
    ) -> Vec<Node<K>> {
        let has_parents = |node: &Node<K>| self.parents.get(node).is_some_and(|p| !p.is_empty());

        let mut stack = vec![(start.clone(), false)];
        while let Some((node, expanded)) = stack.pop() {
            if memo.contains_key(&node) || !has_parents(&node) {
                continue;
            }
            let Some(parents) = self.parents.get(&node) else {
                continue;
            };

            if !expanded {
                stack.push((node.clone(), true));
                for (parent, _) in parents.iter().rev() {
                    if !memo.contains_key(parent) && has_parents(parent) {
                        stack.push((parent.clone(), false));
                    }
                }
                continue;
            }

            let own = (parents.len() == 1).then(|| node.clone());
            let inherited = parents.iter().flat_map(|(parent, _)| match memo.get(parent) {
                Some(ops) => ops.clone(),
                None => vec![parent.clone()],
            });
            let result = unique(own.into_iter().chain(inherited));
            memo.insert(node, result);
        }

        memo.get(start)
            .cloned()
            .unwrap_or_else(|| vec![start.clone()])
    }

    fn step<S>(
        &mut self,
        nodes: &[Node<K>],
        memo: &mut HashMap<Node<K>, Vec<Node<K>>>,
        system: &S,
    ) -> Result<Step<K>>
    where
        S: OtSystem<O> + ?Sized,
    {
        match nodes {
            [] => Err(OtError::Internal("empty merge frontier".to_string())),
            [node] => Ok(Step::Done(node.clone())),
            [left, right] => self.step_pair(left, right, memo, system),
            _ => {
                for node in nodes {
                    let Some(parents) = self.parents.get(node) else {
                        return Ok(Step::Insufficient);
                    };
                    if let [(parent, _)] = parents.as_slice() {
                        let rest = nodes
                            .iter()
                            .chain(std::iter::once(parent))
                            .filter(|n| *n != node)
                            .cloned();
                        let sub = self.without_subnodes(&unique(rest));
                        return Ok(Step::Then {
                            sub,
                            partner: node.clone(),
                        });
                    }
                }

                Ok(Step::Then {
                    sub: nodes[1..].to_vec(),
                    partner: nodes[0].clone(),
                })
            }
        }
    }

    fn step_pair<S>(
        &mut self,
        left: &Node<K>,
        right: &Node<K>,
        memo: &mut HashMap<Node<K>, Vec<Node<K>>>,
        system: &S,
    ) -> Result<Step<K>>
    where
        S: OtSystem<O> + ?Sized,
    {
        let (Some(left_parents), Some(right_parents)) =
            (self.parents.get(left), self.parents.get(right))
        else {
            return Ok(Step::Insufficient);
        };
        let (left_count, right_count) = (left_parents.len(), right_parents.len());

        if left_count > 1 && right_count > 1 {
            let left_ops = self.contributing(left, memo);
            let right_ops = self.contributing(right, memo);
            let left_set: HashSet<_> = left_ops.iter().collect();
            let right_set: HashSet<_> = right_ops.iter().collect();

            let need_left: Vec<Node<K>> = right_ops
                .iter()
                .filter(|n| !left_set.contains(n))
                .cloned()
                .collect();
            let need_right_empty = left_ops.iter().all(|n| right_set.contains(n));

            if need_left.is_empty() && need_right_empty {
                let point = self.synthesize(vec![
                    (left.clone(), Vec::new()),
                    (right.clone(), Vec::new()),
                ]);
                return Ok(Step::Done(point));
            }
            if need_left.is_empty() {
                return Ok(Step::Tail(vec![right.clone(), left.clone()]));
            }

            let sub = unique(std::iter::once(left.clone()).chain(need_left));
            return Ok(Step::Then {
                sub,
                partner: right.clone(),
            });
        }

        if left_count == 1 && right_count > 1 {
            return Ok(Step::Tail(vec![right.clone(), left.clone()]));
        }

        let Some((parent_right, right_diff)) = right_parents.first().cloned() else {
            if left_count == 0 {
                return Err(OtError::NoCommonRoot);
            }
            return Ok(Step::Tail(vec![right.clone(), left.clone()]));
        };

        match self.find_path(&parent_right, left) {
            None => Ok(Step::Then {
                sub: unique([left.clone(), parent_right]),
                partner: right.clone(),
            }),
            Some(path) => {
                let transformed = system.transform(&system.squash(&path), &right_diff)?;
                let point = self.synthesize(vec![
                    (left.clone(), transformed.left_ops),
                    (right.clone(), transformed.right_ops),
                ]);
                Ok(Step::Done(point))
            }
        }
    }

    /// Reduce `nodes` to a single merge point, or `None` if more commits
    /// must be loaded first.
    fn reduce<S>(&mut self, nodes: Vec<Node<K>>, system: &S) -> Result<Option<Node<K>>>
    where
        S: OtSystem<O> + ?Sized,
    {
        let mut memo = HashMap::new();
        let mut partners: Vec<Node<K>> = Vec::new();
        let mut current = nodes;

        loop {
            match self.step(&current, &mut memo, system)? {
                Step::Insufficient => return Ok(None),
                Step::Tail(next) => current = next,
                Step::Then { sub, partner } => {
                    partners.push(partner);
                    current = sub;
                }
                Step::Done(node) => match partners.pop() {
                    None => return Ok(Some(node)),
                    Some(partner) => current = unique([node, partner]),
                },
            }
        }
    }
}

/// Compute, for each of `start_ids`, the diff that brings it to one common
/// merged state.
///
/// Commits are loaded from `remote` in `cmp` order, nearest to the heads
/// first. Unknown ids are skipped. Fails with [`OtError::NoCommonRoot`] when
/// the remote is exhausted before the heads meet.
pub async fn merge<K, O, S, R, C>(
    system: &S,
    remote: &R,
    cmp: C,
    start_ids: impl IntoIterator<Item = K>,
) -> Result<HashMap<K, Vec<O>>>
where
    K: CommitId,
    O: Clone + Send + Sync + 'static,
    S: OtSystem<O> + ?Sized,
    R: OtRemote<K, O> + ?Sized,
    C: Fn(&K, &K) -> Ordering,
{
    let mut seen = HashSet::new();
    let start: Vec<K> = start_ids
        .into_iter()
        .filter(|id| seen.insert(id.clone()))
        .collect();
    if start.is_empty() {
        return Ok(HashMap::new());
    }

    let mut graph: MergeGraph<K, O> = MergeGraph::new();
    let mut queue = CmpQueue::new(start.clone(), &cmp);
    let mut queued: HashSet<K> = start.iter().cloned().collect();
    let mut nodes: Vec<Node<K>> = start.iter().cloned().map(Node::Commit).collect();

    let merge_point = loop {
        if let Some(point) = graph.reduce(nodes.clone(), system)? {
            break point;
        }

        let Some(id) = queue.pop() else {
            return Err(OtError::NoCommonRoot);
        };
        let Some(commit) = remote.get_commit(&id).await? else {
            debug!("[OtMerge] commit {:?} not in remote, skipping", id);
            continue;
        };
        debug!(
            "[OtMerge] loaded {:?} ({} parents, {} queued)",
            id,
            commit.parents.len(),
            queue.len()
        );

        for (parent, _) in &commit.parents {
            if !graph.contains(&Node::Commit(parent.clone())) && queued.insert(parent.clone()) {
                queue.push(parent.clone());
            }
        }
        graph.insert_commit(id, commit.parents);
        nodes = graph.without_subnodes(&nodes);
    };

    info!(
        "[OtMerge] merged {} heads after loading {} commits",
        start.len(),
        graph.parents.len() - graph.next_synthetic
    );

    let mut result = HashMap::with_capacity(start.len());
    for id in start {
        let path = graph
            .find_path(&Node::Commit(id.clone()), &merge_point)
            .ok_or_else(|| OtError::Internal(format!("no path from {:?} to merge point", id)))?;
        result.insert(id, system.squash(&path));
    }
    Ok(result)
}

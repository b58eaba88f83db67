//! Counter and toggle operations shared by the unit and integration tests.
//!
//! Integration tests include this file through `tests/common`, so it only
//! names items through the `ot_core` paths.

use ot_core::{
    OpVariant, OtError, OtOperation, OtSystemBuilder, OtSystemImpl, Result, TaggedOperation,
    TransformResult,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AddOp {
    pub prev: i64,
    pub delta: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SetOp {
    pub prev: i64,
    pub next: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CounterOp {
    Add(AddOp),
    Set(SetOp),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CounterTag {
    Add,
    Set,
}

pub fn add(prev: i64, delta: i64) -> CounterOp {
    CounterOp::Add(AddOp { prev, delta })
}

pub fn set(prev: i64, next: i64) -> CounterOp {
    CounterOp::Set(SetOp { prev, next })
}

impl TaggedOperation for CounterOp {
    type Tag = CounterTag;

    fn tag(&self) -> CounterTag {
        match self {
            CounterOp::Add(_) => CounterTag::Add,
            CounterOp::Set(_) => CounterTag::Set,
        }
    }
}

impl OtOperation for CounterOp {
    type State = i64;

    /// Fails when an add overflows.
    fn apply(&self, state: i64) -> Result<i64> {
        match self {
            CounterOp::Add(op) => state
                .checked_add(op.delta)
                .ok_or_else(|| OtError::Apply(format!("counter overflow adding {}", op.delta))),
            CounterOp::Set(op) => Ok(op.next),
        }
    }
}

impl OpVariant<CounterOp> for AddOp {
    fn tag() -> CounterTag {
        CounterTag::Add
    }

    fn extract(op: &CounterOp) -> Option<&Self> {
        match op {
            CounterOp::Add(op) => Some(op),
            _ => None,
        }
    }
}

impl OpVariant<CounterOp> for SetOp {
    fn tag() -> CounterTag {
        CounterTag::Set
    }

    fn extract(op: &CounterOp) -> Option<&Self> {
        match op {
            CounterOp::Set(op) => Some(op),
            _ => None,
        }
    }
}

/// Full counter algebra: adds commute, the larger `set` wins.
pub fn counter_system() -> OtSystemImpl<CounterOp> {
    OtSystemBuilder::new()
        .with_transform_function(|l: &AddOp, r: &AddOp| {
            TransformResult::of(
                vec![add(l.prev + l.delta, r.delta)],
                vec![add(r.prev + r.delta, l.delta)],
            )
        })
        .with_transform_function(|l: &AddOp, r: &SetOp| {
            TransformResult::left(vec![set(l.prev + l.delta, r.next)])
        })
        .with_transform_function(|l: &SetOp, r: &SetOp| {
            if l.next > r.next {
                TransformResult::left(vec![set(l.next, r.next)])
            } else if l.next < r.next {
                TransformResult::right(vec![set(r.next, l.next)])
            } else {
                TransformResult::empty()
            }
        })
        .with_squash_function(|p: &AddOp, n: &AddOp| Some(add(p.prev, p.delta + n.delta)))
        .with_squash_function(|p: &SetOp, n: &SetOp| Some(set(p.prev, n.next)))
        .with_squash_function(|p: &AddOp, n: &SetOp| Some(set(p.prev, n.next)))
        .with_squash_function(|p: &SetOp, n: &AddOp| Some(set(p.prev, p.next + n.delta)))
        .with_empty_predicate(|op: &AddOp| op.delta == 0)
        .with_empty_predicate(|op: &SetOp| op.prev == op.next)
        .with_invert_function(|op: &AddOp| add(op.prev + op.delta, -op.delta))
        .with_invert_function(|op: &SetOp| set(op.next, op.prev))
        .build()
}

/// Adds or removes one key in a set. An empty key is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToggleOp {
    pub key: String,
    pub remove: bool,
}

pub fn toggle(key: &str, remove: bool) -> ToggleOp {
    ToggleOp {
        key: key.to_string(),
        remove,
    }
}

impl TaggedOperation for ToggleOp {
    type Tag = ();

    fn tag(&self) {}
}

impl OpVariant<ToggleOp> for ToggleOp {
    fn tag() {}

    fn extract(op: &ToggleOp) -> Option<&Self> {
        Some(op)
    }
}

impl OtOperation for ToggleOp {
    type State = BTreeSet<String>;

    fn apply(&self, mut state: BTreeSet<String>) -> Result<BTreeSet<String>> {
        if self.remove {
            state.remove(&self.key);
        } else {
            state.insert(self.key.clone());
        }
        Ok(state)
    }
}

pub fn toggle_system() -> OtSystemImpl<ToggleOp> {
    OtSystemBuilder::new()
        .with_transform_function(|l: &ToggleOp, r: &ToggleOp| {
            TransformResult::of(vec![r.clone()], vec![l.clone()])
        })
        .with_squash_function(|p: &ToggleOp, n: &ToggleOp| {
            if p.key != n.key {
                None
            } else if p.remove != n.remove {
                Some(toggle("", true))
            } else {
                Some(p.clone())
            }
        })
        .with_empty_predicate(|op: &ToggleOp| op.key.is_empty())
        .with_invert_function(|op: &ToggleOp| toggle(&op.key, !op.remove))
        .build()
}

//! Registry-driven OT algebra.
//!
//! [`OtSystemImpl`] holds four function families keyed by operation tags and
//! implements `is_empty`, `squash`, `invert` and `transform` on top of them.
//! Instances are built with [`OtSystemBuilder`](super::OtSystemBuilder).

use super::transform_result::{ConflictResolution, TransformResult};
use crate::core::error::{OtError, Result};
use crate::core::traits::{OtSystem, TaggedOperation};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

pub(crate) type TransformerFn<O> = Arc<dyn Fn(&O, &O) -> Result<TransformResult<O>> + Send + Sync>;
pub(crate) type SquasherFn<O> = Arc<dyn Fn(&O, &O) -> Option<O> + Send + Sync>;
pub(crate) type EmptyPredicateFn<O> = Arc<dyn Fn(&O) -> bool + Send + Sync>;
pub(crate) type InverterFn<O> = Arc<dyn Fn(&O) -> Result<O> + Send + Sync>;

pub(crate) type PairMap<O, F> =
    HashMap<(<O as TaggedOperation>::Tag, <O as TaggedOperation>::Tag), F>;
pub(crate) type TagMap<O, F> = HashMap<<O as TaggedOperation>::Tag, F>;

/// OT algebra over a closed set of tagged operation variants.
pub struct OtSystemImpl<O: TaggedOperation> {
    transformers: PairMap<O, TransformerFn<O>>,
    squashers: PairMap<O, SquasherFn<O>>,
    empty_predicates: TagMap<O, EmptyPredicateFn<O>>,
    inverters: TagMap<O, InverterFn<O>>,
}

impl<O: TaggedOperation> Clone for OtSystemImpl<O> {
    fn clone(&self) -> Self {
        Self {
            transformers: self.transformers.clone(),
            squashers: self.squashers.clone(),
            empty_predicates: self.empty_predicates.clone(),
            inverters: self.inverters.clone(),
        }
    }
}

impl<O: TaggedOperation> std::fmt::Debug for OtSystemImpl<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtSystemImpl")
            .field("transformers", &self.transformers.keys().collect::<Vec<_>>())
            .field("squashers", &self.squashers.keys().collect::<Vec<_>>())
            .field(
                "empty_predicates",
                &self.empty_predicates.keys().collect::<Vec<_>>(),
            )
            .field("inverters", &self.inverters.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl<O: TaggedOperation> OtSystemImpl<O> {
    pub(crate) fn from_registries(
        transformers: PairMap<O, TransformerFn<O>>,
        squashers: PairMap<O, SquasherFn<O>>,
        empty_predicates: TagMap<O, EmptyPredicateFn<O>>,
        inverters: TagMap<O, InverterFn<O>>,
    ) -> Self {
        Self {
            transformers,
            squashers,
            empty_predicates,
            inverters,
        }
    }

    /// Transform without resolving a declared conflict.
    fn do_transform(&self, left: &[O], right: &[O]) -> Result<TransformResult<O>> {
        if left.is_empty() && right.is_empty() {
            return Ok(TransformResult::empty());
        }
        if left.is_empty() {
            return Ok(TransformResult::left(right.to_vec()));
        }
        if right.is_empty() {
            return Ok(TransformResult::right(left.to_vec()));
        }

        // Each left operation is moved across the right residue left behind
        // by its predecessors.
        let mut residue = right.to_vec();
        let mut transformed_left = Vec::with_capacity(left.len());
        for op in left {
            let step = self.transform_single(op, &residue)?;
            if step.has_conflict() {
                return Ok(step);
            }
            transformed_left.extend(step.right_ops);
            residue = step.left_ops;
        }

        Ok(TransformResult::of(residue, transformed_left))
    }

    fn transform_single(&self, left: &O, right: &[O]) -> Result<TransformResult<O>> {
        let Some((first, rest)) = right.split_first() else {
            return Ok(TransformResult::right(vec![left.clone()]));
        };

        let head = self.apply_transformer(left, first)?;
        if head.has_conflict() {
            return Ok(head);
        }

        let tail = self.do_transform(&head.right_ops, rest)?;
        if tail.has_conflict() {
            return Ok(tail);
        }

        let mut left_ops = head.left_ops;
        left_ops.extend(tail.left_ops);
        Ok(TransformResult::of(left_ops, tail.right_ops))
    }

    fn resolve_conflict(
        &self,
        resolution: ConflictResolution,
        left: &[O],
        right: &[O],
    ) -> Result<TransformResult<O>> {
        trace!("[OtSystem] resolving transform conflict in favour of {:?}", resolution);
        match resolution {
            ConflictResolution::Left => {
                let mut ops = self.invert(right)?;
                ops.extend_from_slice(left);
                Ok(TransformResult::new(Some(resolution), Vec::new(), self.squash(&ops)))
            }
            ConflictResolution::Right => {
                let mut ops = self.invert(left)?;
                ops.extend_from_slice(right);
                Ok(TransformResult::new(Some(resolution), self.squash(&ops), Vec::new()))
            }
        }
    }

    fn apply_transformer(&self, left: &O, right: &O) -> Result<TransformResult<O>> {
        let transformer = self
            .transformers
            .get(&(left.tag(), right.tag()))
            .ok_or_else(|| OtError::missing_transformer(left.tag(), right.tag()))?;
        transformer(left, right)
    }

    fn try_squash(&self, prev: &O, next: &O) -> Option<O> {
        let squasher = self.squashers.get(&(prev.tag(), next.tag()))?;
        squasher(prev, next)
    }
}

impl<O: TaggedOperation> OtSystem<O> for OtSystemImpl<O> {
    fn is_empty(&self, op: &O) -> bool {
        self.empty_predicates
            .get(&op.tag())
            .is_some_and(|predicate| predicate(op))
    }

    fn transform(&self, left: &[O], right: &[O]) -> Result<TransformResult<O>> {
        let result = self.do_transform(left, right)?;
        match result.conflict_resolution {
            Some(resolution) => self.resolve_conflict(resolution, left, right),
            None => Ok(result),
        }
    }

    fn squash(&self, ops: &[O]) -> Vec<O> {
        if self.squashers.is_empty() || ops.is_empty() {
            return ops.to_vec();
        }

        let mut result = vec![ops[0].clone()];
        for next in &ops[1..] {
            if result.last().is_some_and(|prev| self.is_empty(prev)) {
                result.pop();
            }

            match result.last().and_then(|prev| self.try_squash(prev, next)) {
                Some(squashed) => {
                    if let Some(last) = result.last_mut() {
                        *last = squashed;
                    }
                }
                None => result.push(next.clone()),
            }
        }

        if result.last().is_some_and(|op| self.is_empty(op)) {
            result.pop();
        }

        result
    }

    fn invert(&self, ops: &[O]) -> Result<Vec<O>> {
        ops.iter()
            .rev()
            .map(|op| {
                let inverter = self
                    .inverters
                    .get(&op.tag())
                    .ok_or_else(|| OtError::MissingInverter(format!("{:?}", op.tag())))?;
                inverter(op)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{add, counter_system, set, CounterOp};
    use crate::system::OtSystemBuilder;

    fn apply_all(state: i64, ops: &[CounterOp]) -> i64 {
        use crate::core::traits::OtOperation;
        ops.iter().fold(state, |s, op| op.apply(s).unwrap())
    }

    #[test]
    fn test_add_operations_transform() {
        let system = counter_system();
        let left = vec![add(0, 2), add(2, 1)];
        let right = vec![add(0, 1), add(1, 10), add(11, 100)];

        let result = system.transform(&left, &right).unwrap();

        assert_eq!(
            result,
            TransformResult::of(
                vec![add(3, 1), add(4, 10), add(14, 100)],
                vec![add(111, 2), add(113, 1)]
            )
        );
    }

    #[test]
    fn test_add_and_set_operations_transform() {
        let system = counter_system();
        let left = vec![add(0, 2), set(2, 1), add(1, 2), add(3, 10)];
        let right = vec![set(0, -20), add(-20, 30), add(10, 10)];

        let result = system.transform(&left, &right).unwrap();

        assert_eq!(
            result,
            TransformResult::of(vec![set(13, -20), add(-20, 30), add(10, 10)], vec![])
        );
        assert_eq!(
            apply_all(apply_all(0, &left), &result.left_ops),
            apply_all(apply_all(0, &right), &result.right_ops)
        );
    }

    #[test]
    fn test_squash() {
        let system = counter_system();
        let ops = vec![add(0, 2), set(2, 1), add(1, 2), add(3, 10)];

        assert_eq!(system.squash(&ops), vec![set(0, 13)]);
    }

    #[test]
    fn test_squash_is_stable_and_drops_no_ops() {
        let system = counter_system();
        let ops = vec![add(0, 5), add(5, -5), set(0, 3), set(3, 0)];

        let once = system.squash(&ops);
        assert!(once.is_empty(), "net no-op should squash to nothing: {:?}", once);
        assert_eq!(system.squash(&once), once);

        let ops = vec![add(0, 1), add(1, 2)];
        let once = system.squash(&ops);
        assert_eq!(system.squash(&once), once);
    }

    #[test]
    fn test_invert_reverses_and_undoes() {
        let system = counter_system();
        let ops = vec![add(0, 2), set(2, 7), add(7, 1)];

        let inverted = system.invert(&ops).unwrap();

        assert_eq!(inverted, vec![add(8, -1), set(7, 2), add(2, -2)]);
        assert_eq!(apply_all(apply_all(0, &ops), &inverted), 0);
    }

    #[test]
    fn test_is_empty_without_predicate_is_false() {
        let system: OtSystemImpl<CounterOp> = OtSystemBuilder::new().build();
        assert!(!system.is_empty(&add(0, 0)));
        assert!(counter_system().is_empty(&add(3, 0)));
        assert!(counter_system().is_empty(&set(3, 3)));
    }

    #[test]
    fn test_no_squashers_returns_input() {
        let system: OtSystemImpl<CounterOp> = OtSystemBuilder::new().build();
        let ops = vec![add(0, 0), add(0, 1)];
        assert_eq!(system.squash(&ops), ops);
    }

    #[test]
    fn test_missing_transformer_is_error() {
        let system: OtSystemImpl<CounterOp> = OtSystemBuilder::new().build();
        let err = system.transform(&[add(0, 1)], &[set(0, 2)]).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_missing_inverter_is_error() {
        let system: OtSystemImpl<CounterOp> = OtSystemBuilder::new().build();
        assert!(matches!(
            system.invert(&[add(0, 1)]),
            Err(OtError::MissingInverter(_))
        ));
        assert_eq!(system.invert(&[]).unwrap(), vec![]);
    }

    #[test]
    fn test_empty_sides_pass_through() {
        let system = counter_system();
        let ops = vec![add(0, 1)];

        let result = system.transform(&[], &ops).unwrap();
        assert_eq!(result, TransformResult::of(ops.clone(), vec![]));

        let result = system.transform(&ops, &[]).unwrap();
        assert_eq!(result, TransformResult::of(vec![], ops));
    }
}

//! Fluent construction of an [`OtSystemImpl`].

use super::ot_system::{
    EmptyPredicateFn, InverterFn, OtSystemImpl, PairMap, SquasherFn, TagMap, TransformerFn,
};
use super::transform_result::TransformResult;
use crate::core::error::{OtError, Result};
use crate::core::traits::{OpVariant, TaggedOperation};
use std::collections::HashMap;
use std::sync::Arc;

fn extract<O, V>(op: &O) -> Result<&V>
where
    O: TaggedOperation,
    V: OpVariant<O>,
{
    V::extract(op).ok_or_else(|| OtError::VariantMismatch(format!("{:?}", V::tag())))
}

/// Registers transformers, squashers, empty predicates and inverters per
/// operation variant, then freezes them into an [`OtSystemImpl`].
///
/// # Example
///
/// ```ignore
/// let system = OtSystemBuilder::<CounterOp>::new()
///     .with_transform_function(|l: &AddOp, r: &AddOp| {
///         TransformResult::of(
///             vec![CounterOp::add(l.prev + l.delta, r.delta)],
///             vec![CounterOp::add(r.prev + r.delta, l.delta)],
///         )
///     })
///     .with_empty_predicate(|op: &AddOp| op.delta == 0)
///     .build();
/// ```
pub struct OtSystemBuilder<O: TaggedOperation> {
    transformers: PairMap<O, TransformerFn<O>>,
    squashers: PairMap<O, SquasherFn<O>>,
    empty_predicates: TagMap<O, EmptyPredicateFn<O>>,
    inverters: TagMap<O, InverterFn<O>>,
}

impl<O: TaggedOperation> Default for OtSystemBuilder<O> {
    fn default() -> Self {
        Self {
            transformers: HashMap::new(),
            squashers: HashMap::new(),
            empty_predicates: HashMap::new(),
            inverters: HashMap::new(),
        }
    }
}

impl<O: TaggedOperation> OtSystemBuilder<O> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `transformer` for the ordered pair `(A, B)`.
    ///
    /// For `A != B` the mirrored pair `(B, A)` is derived by swapping the
    /// residuals, so only one direction has to be written.
    #[must_use]
    pub fn with_transform_function<A, B, F>(mut self, transformer: F) -> Self
    where
        A: OpVariant<O>,
        B: OpVariant<O>,
        F: Fn(&A, &B) -> TransformResult<O> + Send + Sync + 'static,
    {
        let transformer = Arc::new(transformer);

        let forward = transformer.clone();
        self.transformers.insert(
            (A::tag(), B::tag()),
            Arc::new(move |left: &O, right: &O| -> Result<TransformResult<O>> {
                Ok(forward(extract::<O, A>(left)?, extract::<O, B>(right)?))
            }),
        );

        if A::tag() != B::tag() {
            self.transformers.insert(
                (B::tag(), A::tag()),
                Arc::new(move |left: &O, right: &O| -> Result<TransformResult<O>> {
                    let result = transformer(extract::<O, A>(right)?, extract::<O, B>(left)?);
                    Ok(result.swapped())
                }),
            );
        }

        self
    }

    /// Register `squasher` for `prev` of variant `A` followed by `next` of
    /// variant `B`. Returning `None` declines.
    #[must_use]
    pub fn with_squash_function<A, B, F>(mut self, squasher: F) -> Self
    where
        A: OpVariant<O>,
        B: OpVariant<O>,
        F: Fn(&A, &B) -> Option<O> + Send + Sync + 'static,
    {
        self.squashers.insert(
            (A::tag(), B::tag()),
            Arc::new(move |prev: &O, next: &O| -> Option<O> {
                squasher(A::extract(prev)?, B::extract(next)?)
            }),
        );
        self
    }

    #[must_use]
    pub fn with_empty_predicate<A, F>(mut self, predicate: F) -> Self
    where
        A: OpVariant<O>,
        F: Fn(&A) -> bool + Send + Sync + 'static,
    {
        self.empty_predicates.insert(
            A::tag(),
            Arc::new(move |op: &O| A::extract(op).is_some_and(|op| predicate(op))),
        );
        self
    }

    #[must_use]
    pub fn with_invert_function<A, F>(mut self, inverter: F) -> Self
    where
        A: OpVariant<O>,
        F: Fn(&A) -> O + Send + Sync + 'static,
    {
        self.inverters.insert(
            A::tag(),
            Arc::new(move |op: &O| -> Result<O> { Ok(inverter(extract::<O, A>(op)?)) }),
        );
        self
    }

    #[must_use]
    pub fn build(self) -> OtSystemImpl<O> {
        OtSystemImpl::from_registries(
            self.transformers,
            self.squashers,
            self.empty_predicates,
            self.inverters,
        )
    }
}

//! Product composition of independent OT systems.
//!
//! A composite operation carries one operation list per component. Every
//! algebra call splits the composite input with the getters, delegates to
//! the component systems and recombines the residuals with the constructor.
//! Three and four components are built by nesting pairs through an internal
//! [`Helper`] operation.

use super::transform_result::TransformResult;
use crate::core::error::Result;
use crate::core::traits::OtSystem;
use std::sync::Arc;

type Constructor<O, O1, O2> = Arc<dyn Fn(Vec<O1>, Vec<O2>) -> O + Send + Sync>;
type Getter<O, P> = Arc<dyn Fn(&O) -> Vec<P> + Send + Sync>;

/// OT system over a composite operation built from two component systems.
pub struct MergedOtSystem<O, O1, O2> {
    constructor: Constructor<O, O1, O2>,
    getter1: Getter<O, O1>,
    system1: Arc<dyn OtSystem<O1>>,
    getter2: Getter<O, O2>,
    system2: Arc<dyn OtSystem<O2>>,
}

impl<O, O1, O2> MergedOtSystem<O, O1, O2>
where
    O: Clone + Send + Sync + 'static,
    O1: Clone + Send + Sync + 'static,
    O2: Clone + Send + Sync + 'static,
{
    pub fn merge2<C, G1, G2>(
        constructor: C,
        getter1: G1,
        system1: Arc<dyn OtSystem<O1>>,
        getter2: G2,
        system2: Arc<dyn OtSystem<O2>>,
    ) -> Self
    where
        C: Fn(Vec<O1>, Vec<O2>) -> O + Send + Sync + 'static,
        G1: Fn(&O) -> Vec<O1> + Send + Sync + 'static,
        G2: Fn(&O) -> Vec<O2> + Send + Sync + 'static,
    {
        Self {
            constructor: Arc::new(constructor),
            getter1: Arc::new(getter1),
            system1,
            getter2: Arc::new(getter2),
            system2,
        }
    }

    fn collect1(&self, ops: &[O]) -> Vec<O1> {
        ops.iter().flat_map(|op| (self.getter1)(op)).collect()
    }

    fn collect2(&self, ops: &[O]) -> Vec<O2> {
        ops.iter().flat_map(|op| (self.getter2)(op)).collect()
    }

    fn combine(&self, ops1: Vec<O1>, ops2: Vec<O2>) -> Vec<O> {
        combine(ops1, ops2, self.constructor.as_ref())
    }
}

/// Composite of three components. Components 1 and 2 are paired first.
#[allow(clippy::too_many_arguments)]
pub fn merge3<O, O1, O2, O3, C, G1, G2, G3>(
    constructor: C,
    getter1: G1,
    system1: Arc<dyn OtSystem<O1>>,
    getter2: G2,
    system2: Arc<dyn OtSystem<O2>>,
    getter3: G3,
    system3: Arc<dyn OtSystem<O3>>,
) -> impl OtSystem<O>
where
    O: Clone + Send + Sync + 'static,
    O1: Clone + Send + Sync + 'static,
    O2: Clone + Send + Sync + 'static,
    O3: Clone + Send + Sync + 'static,
    C: Fn(Vec<O1>, Vec<O2>, Vec<O3>) -> O + Send + Sync + 'static,
    G1: Fn(&O) -> Vec<O1> + Send + Sync + 'static,
    G2: Fn(&O) -> Vec<O2> + Send + Sync + 'static,
    G3: Fn(&O) -> Vec<O3> + Send + Sync + 'static,
{
    let premerged: Arc<dyn OtSystem<Helper<O1, O2>>> = Arc::new(Helper::pair(system1, system2));

    MergedOtSystem::merge2(
        move |helpers: Vec<Helper<O1, O2>>, ops3: Vec<O3>| {
            let helper = Helper::extract(helpers);
            constructor(helper.ops1, helper.ops2, ops3)
        },
        move |op: &O| combine(getter1(op), getter2(op), &Helper::<O1, O2>::new),
        premerged,
        getter3,
        system3,
    )
}

/// Composite of four components, paired as (1, 2) and (3, 4).
#[allow(clippy::too_many_arguments)]
pub fn merge4<O, O1, O2, O3, O4, C, G1, G2, G3, G4>(
    constructor: C,
    getter1: G1,
    system1: Arc<dyn OtSystem<O1>>,
    getter2: G2,
    system2: Arc<dyn OtSystem<O2>>,
    getter3: G3,
    system3: Arc<dyn OtSystem<O3>>,
    getter4: G4,
    system4: Arc<dyn OtSystem<O4>>,
) -> impl OtSystem<O>
where
    O: Clone + Send + Sync + 'static,
    O1: Clone + Send + Sync + 'static,
    O2: Clone + Send + Sync + 'static,
    O3: Clone + Send + Sync + 'static,
    O4: Clone + Send + Sync + 'static,
    C: Fn(Vec<O1>, Vec<O2>, Vec<O3>, Vec<O4>) -> O + Send + Sync + 'static,
    G1: Fn(&O) -> Vec<O1> + Send + Sync + 'static,
    G2: Fn(&O) -> Vec<O2> + Send + Sync + 'static,
    G3: Fn(&O) -> Vec<O3> + Send + Sync + 'static,
    G4: Fn(&O) -> Vec<O4> + Send + Sync + 'static,
{
    let premerged1: Arc<dyn OtSystem<Helper<O1, O2>>> = Arc::new(Helper::pair(system1, system2));
    let premerged2: Arc<dyn OtSystem<Helper<O3, O4>>> = Arc::new(Helper::pair(system3, system4));

    MergedOtSystem::merge2(
        move |helpers1: Vec<Helper<O1, O2>>, helpers2: Vec<Helper<O3, O4>>| {
            let helper1 = Helper::extract(helpers1);
            let helper2 = Helper::extract(helpers2);
            constructor(helper1.ops1, helper1.ops2, helper2.ops1, helper2.ops2)
        },
        move |op: &O| combine(getter1(op), getter2(op), &Helper::<O1, O2>::new),
        premerged1,
        move |op: &O| combine(getter3(op), getter4(op), &Helper::<O3, O4>::new),
        premerged2,
    )
}

/// Zero operations when both component lists are empty, otherwise one.
fn combine<O, O1, O2>(
    ops1: Vec<O1>,
    ops2: Vec<O2>,
    constructor: &dyn Fn(Vec<O1>, Vec<O2>) -> O,
) -> Vec<O> {
    if ops1.is_empty() && ops2.is_empty() {
        Vec::new()
    } else {
        vec![constructor(ops1, ops2)]
    }
}

/// Intermediate operation pairing two components inside a nested merge.
#[derive(Debug, Clone)]
struct Helper<O1, O2> {
    ops1: Vec<O1>,
    ops2: Vec<O2>,
}

impl<O1, O2> Helper<O1, O2>
where
    O1: Clone + Send + Sync + 'static,
    O2: Clone + Send + Sync + 'static,
{
    fn new(ops1: Vec<O1>, ops2: Vec<O2>) -> Self {
        Self { ops1, ops2 }
    }

    fn pair(
        system1: Arc<dyn OtSystem<O1>>,
        system2: Arc<dyn OtSystem<O2>>,
    ) -> MergedOtSystem<Self, O1, O2> {
        MergedOtSystem::merge2(
            Self::new,
            |helper: &Self| helper.ops1.clone(),
            system1,
            |helper: &Self| helper.ops2.clone(),
            system2,
        )
    }

    /// Flatten a combined list back into one helper. Components stay
    /// independent, so several helpers concatenate in order.
    fn extract(helpers: Vec<Self>) -> Self {
        helpers
            .into_iter()
            .fold(Self::new(Vec::new(), Vec::new()), |mut acc, helper| {
                acc.ops1.extend(helper.ops1);
                acc.ops2.extend(helper.ops2);
                acc
            })
    }
}

impl<O, O1, O2> OtSystem<O> for MergedOtSystem<O, O1, O2>
where
    O: Clone + Send + Sync + 'static,
    O1: Clone + Send + Sync + 'static,
    O2: Clone + Send + Sync + 'static,
{
    fn is_empty(&self, op: &O) -> bool {
        (self.getter1)(op).iter().all(|op| self.system1.is_empty(op))
            && (self.getter2)(op).iter().all(|op| self.system2.is_empty(op))
    }

    fn transform(&self, left: &[O], right: &[O]) -> Result<TransformResult<O>> {
        let transform1 = self
            .system1
            .transform(&self.collect1(left), &self.collect1(right))?;
        let transform2 = self
            .system2
            .transform(&self.collect2(left), &self.collect2(right))?;

        Ok(TransformResult::of(
            self.combine(transform1.left_ops, transform2.left_ops),
            self.combine(transform1.right_ops, transform2.right_ops),
        ))
    }

    fn squash(&self, ops: &[O]) -> Vec<O> {
        if ops.is_empty() {
            return Vec::new();
        }
        let squashed1 = self.system1.squash(&self.collect1(ops));
        let squashed2 = self.system2.squash(&self.collect2(ops));
        self.combine(squashed1, squashed2)
    }

    fn invert(&self, ops: &[O]) -> Result<Vec<O>> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }
        let inverted1 = self.system1.invert(&self.collect1(ops))?;
        let inverted2 = self.system2.invert(&self.collect2(ops))?;
        Ok(self.combine(inverted1, inverted2))
    }
}

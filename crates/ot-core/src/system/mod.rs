//! The OT algebra: transform results, the registry-driven system, its
//! builder and product composition.

pub mod builder;
pub mod merged;
pub mod ot_system;
pub mod transform_result;

pub use builder::OtSystemBuilder;
pub use merged::{merge3, merge4, MergedOtSystem};
pub use ot_system::OtSystemImpl;
pub use transform_result::{ConflictResolution, TransformResult};

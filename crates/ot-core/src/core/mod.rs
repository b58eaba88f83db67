//! Error type and the trait seams shared by every other module.

pub mod error;
pub mod traits;

pub use error::{OtError, Result};
pub use traits::{
    CommitId, FetchData, OpVariant, OtNode, OtOperation, OtRemote, OtSystem, TaggedOperation,
};

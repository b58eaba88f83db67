//! [`OtRemote`](crate::core::traits::OtRemote) implementations.

pub mod memory;

pub use memory::InMemoryRemote;

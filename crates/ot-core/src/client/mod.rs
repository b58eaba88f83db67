//! Client side: the synchronization state machine and its configuration.

pub mod config;
pub(crate) mod serial;
pub mod state_manager;

pub use config::StateManagerConfig;
pub use state_manager::{ListenerId, OtStateManager};

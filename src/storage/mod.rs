//! Durable automation state
//!
//! The automation state document is the only shared mutable resource of the
//! control loop. It is owned by [`AutomationStateStore`]; nothing else writes it.

pub mod automation_state;

pub use automation_state::{AutomationStateStore, StateStoreError};

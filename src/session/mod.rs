//! Session lifecycle and the per-user component pool

mod pool;
mod registry;

pub use pool::{ComponentFactory, ComponentPool, UserComponents};
pub use registry::{SessionHandle, SessionRegistry, GUEST_USER};

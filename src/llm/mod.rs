//! Language model providers

mod provider;

pub use provider::*;

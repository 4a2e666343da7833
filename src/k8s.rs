//! Kubernetes access layer.

pub mod accessor;
pub mod api;
pub mod client;
#[cfg(test)]
pub mod memory;

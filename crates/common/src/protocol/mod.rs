// Console wire protocol: push channel frames and HTTP API bodies.

pub mod api;
pub mod frame;

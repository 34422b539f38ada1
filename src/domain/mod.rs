// Domain layer: request/plan models, backend wire schemas and the backend port.

pub mod model;
pub mod payloads;
pub mod ports;

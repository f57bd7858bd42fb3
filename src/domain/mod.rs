//! Domain layer: value types and the ports the application depends on.

pub mod amount;
pub mod payee;
pub mod ports;
pub mod recommendation;

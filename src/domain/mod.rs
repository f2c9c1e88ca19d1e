// Domain layer: cart and wallet models, cart operation inputs/outcomes, and the
// ports the orchestrator talks through.

pub mod cart_ops;
pub mod model;
pub mod ports;

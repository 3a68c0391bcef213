//! Ports layer (Hexagonal Architecture)
//!
//! - Inbound: the API exposed to consensus callers and the API layer
//! - Outbound: node directory, clock and stats sink

mod inbound;
mod outbound;

pub use inbound::*;
pub use outbound::*;

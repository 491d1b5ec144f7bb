//! Server assembly
//!
//! Route table construction and the single-start lifecycle guard used by
//! the relay service.

pub mod lifecycle;
pub mod router;

pub use lifecycle::{LifecycleGuard, ServerState};
pub use router::{Handler, RelayRequest, RelayRouter, RouteTable};

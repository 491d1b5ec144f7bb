//! Core abstractions for the relay
//!
//! Error types, shared data types and the traits at the seams between
//! the orchestrator, the API components and upstream collaborators.

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{RelayError, RelayResult};
pub use traits::*;
pub use types::*;

//! Models returned to callers of the caching layer
//!
//! Tagged read results, write acknowledgements, rate decisions and sessions.

pub mod outcomes;
pub mod session;

// Re-export commonly used types
pub use outcomes::{Fetched, PutAck, RateDecision};
pub use session::Session;

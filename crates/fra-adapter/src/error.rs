//! Adapter error types.
//!
//! Every venue-specific adapter error maps onto the shared error kinds
//! (spec §7) defined in `fra-core`, so callers above the adapter layer
//! never need to match on a venue-specific error type.

pub use fra_core::error::{CoreError as AdapterError, Result as AdapterResult};

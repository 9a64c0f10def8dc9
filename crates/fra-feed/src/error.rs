//! Feed error types.

pub use fra_core::error::{CoreError as FeedError, Result as FeedResult};

//! Notifier error types.

pub use fra_core::error::{CoreError as NotifierError, Result as NotifierResult};

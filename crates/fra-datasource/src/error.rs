//! Data-source manager error types.

pub use fra_core::error::{CoreError as DataSourceError, Result as DataSourceResult};

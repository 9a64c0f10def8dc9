//! Reference `Repository` implementation and audit-log writer (spec §6,
//! §9) for the funding-rate arbitrage engine.
//!
//! Ships two pieces any deployment can swap independently:
//! - [`InMemoryRepository`]: a `Repository` implementation backed by
//!   `DashMap`/`Mutex`, suitable for tests and single-process
//!   deployments. Any conforming store (Postgres, SQLite, ...) can
//!   replace it, since every consumer depends only on `fra_core::Repository`.
//! - [`JsonLinesAuditWriter`]: an append-only, daily-rotating audit log.

pub mod error;
pub mod memory_repository;
pub mod writer;

pub use error::{PersistenceError, PersistenceResult};
pub use memory_repository::InMemoryRepository;
pub use writer::JsonLinesAuditWriter;

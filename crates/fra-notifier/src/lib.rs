//! Notifier Dispatcher (spec §4.10): fans out opportunity/exit events to
//! configured per-user webhooks with per-platform formatting and
//! per-webhook failure isolation.

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod payload;

pub use dispatcher::{DeliveryOutcome, NotifierDispatcher};
pub use error::{NotifierError, NotifierResult};
pub use event::NotifiableEvent;

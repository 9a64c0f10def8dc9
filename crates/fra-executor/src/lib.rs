//! Order execution: position closing and conditional-order trigger
//! detection (spec §4.8, §4.9).

pub mod closer;
pub mod error;
pub mod trigger_detector;

pub use closer::{CloserEvent, Leg, PositionCloser};
pub use error::{ExecutorError, ExecutorResult};
pub use trigger_detector::{CloseStage, TriggerDetector, TriggerDetectorConfig, TriggerEvent, TriggerKind};

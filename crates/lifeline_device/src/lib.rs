#![forbid(unsafe_code)]

pub mod evaluator;
pub mod motion;
pub mod policy;
pub mod signal_cache;
pub mod uplink;

pub use evaluator::{EvaluatorConfig, EvaluatorPhase, PeriodicEvaluator, TickOutcome};
pub use motion::{AccelSample, MotionDetector};
pub use policy::{is_stale_by, QuietHoursPolicy};
pub use signal_cache::{LocalSignalState, SharedSignalCache};
pub use uplink::{UplinkError, UplinkHttpConfig, UplinkRuntime};

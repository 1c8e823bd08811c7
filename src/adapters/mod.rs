//! Concrete implementations of the capability ports.
//!
//! Production adapters (`SystemClock`, `SeededRandom`, `TracingAlertSink`)
//! sit next to the deterministic doubles the environment presets bind for
//! tests (`ManualClock`, `FixedRandom`, `SequenceRandom`, `ScriptedValidator`).

mod alert;
mod clock;
mod random;
mod validator;

pub use alert::{ChannelAlertSink, NoopAlertSink, TracingAlertSink};
pub use clock::{ManualClock, SystemClock};
pub use random::{FixedRandom, SeededRandom, SequenceRandom};
pub use validator::{ScriptedValidator, SimulatedValidator, SimulationProfile, Step};

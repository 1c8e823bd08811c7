//! Capability ports.
//!
//! The runner, the scenario runner and the registry depend only on these
//! contracts. Concrete implementations live in [`crate::adapters`] and
//! [`crate::InMemoryMetrics`], or in the caller's own crate.

mod alert;
mod clock;
mod metrics_sink;
mod random;
mod validator;

pub use alert::{Alert, AlertSink};
pub use clock::Clock;
pub use metrics_sink::MetricsSink;
pub use random::RandomSource;
pub use validator::{ValidatedOperation, Verdict};

#[cfg(test)]
pub use alert::MockAlertSink;
#[cfg(test)]
pub use clock::MockClock;
#[cfg(test)]
pub use metrics_sink::MockMetricsSink;
#[cfg(test)]
pub use random::MockRandomSource;
#[cfg(test)]
pub use validator::MockValidatedOperation;

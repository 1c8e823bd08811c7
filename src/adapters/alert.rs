//! Alert side-channel adapters.

use tokio::sync::mpsc;
use tracing::error;

use crate::error::AlertError;
use crate::ports::{Alert, AlertSink};

/// Discards every alert.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAlertSink;

impl AlertSink for NoopAlertSink {
    fn notify(&self, _alert: &Alert) -> Result<(), AlertError> {
        Ok(())
    }
}

/// Emits each alert as an `error!` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn notify(&self, alert: &Alert) -> Result<(), AlertError> {
        error!(
            scenario = %alert.scenario,
            request_id = %alert.request_id,
            code = alert.code.as_deref().unwrap_or("-"),
            attempt = alert.attempt,
            "system failure alert: {}",
            alert.message
        );
        Ok(())
    }
}

/// Forwards alerts to an unbounded channel without blocking the sender.
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelAlertSink {
    /// Create the sink and the receiving end for the consumer.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AlertSink for ChannelAlertSink {
    fn notify(&self, alert: &Alert) -> Result<(), AlertError> {
        self.tx.send(alert.clone()).map_err(|_| AlertError::Closed)
    }
}

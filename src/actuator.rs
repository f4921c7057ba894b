//! Actuation triggers
//!
//! Throttle and burst-execute are symbolic here: the gate only needs to know
//! which trigger fired. Real hardware/exchange adapters plug in behind the
//! same trait.

use async_trait::async_trait;
use tracing::info;

use crate::error::GateError;
use crate::models::Action;

#[async_trait]
pub trait Actuator: Send + Sync {
    /// Ask the hardware side to cap GPU power. Returns the trigger tag.
    async fn throttle(&self) -> Result<&'static str, GateError>;

    /// Route the trade to the low-latency execution path. Returns the trigger tag.
    async fn execute_burst(&self) -> Result<&'static str, GateError>;

    async fn dispatch(&self, action: Action) -> Result<&'static str, GateError> {
        match action {
            Action::Throttle => self.throttle().await,
            Action::Execute => self.execute_burst().await,
        }
    }
}

/// Fire-and-forget actuator that only logs the OS event it stands in for.
#[derive(Debug, Clone, Default)]
pub struct LoggingActuator {
    /// Label for the device being throttled
    pub device: String,
}

impl LoggingActuator {
    pub fn new(device: impl Into<String>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

#[async_trait]
impl Actuator for LoggingActuator {
    async fn throttle(&self) -> Result<&'static str, GateError> {
        info!(device = %self.device, "🧊 OS_EVENT: throttle command dispatched");
        Ok(Action::Throttle.tag())
    }

    async fn execute_burst(&self) -> Result<&'static str, GateError> {
        info!(device = %self.device, "🚀 OS_EVENT: burst execution routed");
        Ok(Action::Execute.tag())
    }
}

//! Host-facing update events.
//!
//! Event names are a contract with the host UI and must not change.

use crate::upgrade::UpdateInfo;
use serde_json::Value;
use tokio::sync::broadcast;

/// Events emitted by the update controller.
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    /// A newer release is available.
    UpdateAvailable(UpdateInfo),

    /// Download progress in percent.
    UpdateProgress(u8),

    /// Package downloaded and extracted; ready to apply.
    UpdateReady,

    /// A check, download or apply failed.
    UpdateError {
        /// Error message.
        message: String,
    },
}

impl UpdateEvent {
    /// Event name as seen by the host.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::UpdateAvailable(_) => "update-available",
            Self::UpdateProgress(_) => "update-progress",
            Self::UpdateReady => "update-ready",
            Self::UpdateError { .. } => "update-error",
        }
    }

    /// JSON payload delivered alongside the event name.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::UpdateAvailable(info) => serde_json::to_value(info).unwrap_or(Value::Null),
            Self::UpdateProgress(percent) => Value::from(*percent),
            Self::UpdateReady => Value::Null,
            Self::UpdateError { message } => Value::from(message.as_str()),
        }
    }
}

/// Channel for receiving update events.
pub type UpdateEventsChannel = broadcast::Receiver<UpdateEvent>;

/// Sender for update events.
pub type UpdateEventsSender = broadcast::Sender<UpdateEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (UpdateEventsSender, UpdateEventsChannel) {
    broadcast::channel(256)
}

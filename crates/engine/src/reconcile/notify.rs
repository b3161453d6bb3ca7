//! Local notification channel keyed by element.
//!
//! Some server messages target a single rendered element rather than state
//! (resetting a file input, for instance). The bus broadcasts them and each
//! [`ComponentSubscription`] filters for its own `(surface, component)` pair.
//! Dropping a subscription unsubscribes.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::debug;

const CHANNEL_CAPACITY: usize = 64;

/// What happened to an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementNotification {
    ClearFileInput,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressedNotification {
    pub surface_id: String,
    pub component_id: String,
    pub notification: ElementNotification,
}

/// Cloneable publish side of the channel.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<AddressedNotification>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    pub fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publishes to subscribers of `(surface_id, component_id)`. Returns the
    /// number of live subscriptions on the bus.
    pub fn publish(&self, surface_id: &str, component_id: &str, notification: ElementNotification) -> usize {
        let addressed = AddressedNotification {
            surface_id: surface_id.to_string(),
            component_id: component_id.to_string(),
            notification,
        };
        match self.sender.send(addressed) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!(surface_id = %surface_id, component_id = %component_id, "no notification subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self, surface_id: impl Into<String>, component_id: impl Into<String>) -> ComponentSubscription {
        ComponentSubscription {
            surface_id: surface_id.into(),
            component_id: component_id.into(),
            receiver: self.sender.subscribe(),
        }
    }
}

/// Receive side for one element.
pub struct ComponentSubscription {
    surface_id: String,
    component_id: String,
    receiver: broadcast::Receiver<AddressedNotification>,
}

impl ComponentSubscription {
    /// Waits for the next notification addressed to this element. Returns
    /// `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<ElementNotification> {
        loop {
            match self.receiver.recv().await {
                Ok(addressed) if self.matches(&addressed) => return Some(addressed.notification),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => self.note_lag(skipped),
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns a pending notification without waiting.
    pub fn try_recv(&mut self) -> Option<ElementNotification> {
        loop {
            match self.receiver.try_recv() {
                Ok(addressed) if self.matches(&addressed) => return Some(addressed.notification),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => self.note_lag(skipped),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    fn note_lag(&self, skipped: u64) {
        debug!(surface_id = %self.surface_id, component_id = %self.component_id, skipped, "notification subscription lagged");
    }

    fn matches(&self, addressed: &AddressedNotification) -> bool {
        addressed.surface_id == self.surface_id && addressed.component_id == self.component_id
    }
}

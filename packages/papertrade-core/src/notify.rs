//! Trade notifications for observers (UI, loggers, tests).

use crate::engine::RejectReason;
use crate::protective::ExitTrigger;
use crate::types::{OrderRecord, Side};
use serde::Serialize;
use tokio::sync::broadcast;

/// Events published after a ledger transaction commits.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TradeEvent {
    /// An order was executed and recorded.
    OrderFilled { order: OrderRecord },
    /// An order was rejected; the ledger is unchanged.
    OrderRejected {
        symbol: String,
        side: Side,
        reason: RejectReason,
        message: String,
    },
    /// A stop-loss or take-profit threshold fired.
    #[serde(rename_all = "camelCase")]
    ProtectiveExit {
        symbol: String,
        trigger: ExitTrigger,
        trigger_price: f64,
        order: Option<OrderRecord>,
    },
}

/// Broadcast channel of [`TradeEvent`]s.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<TradeEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: TradeEvent) {
        match self.tx.send(event) {
            Ok(subscriber_count) => {
                tracing::debug!(subscriber_count, "Published trade event");
            }
            Err(_) => {
                tracing::trace!("No subscribers for trade event");
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TradeEvent> {
        self.tx.subscribe()
    }
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

// Events emitted by the settlement engine after a successful commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderItemUpdated {
        order_id: Uuid,
        item_id: Uuid,
    },
    OrderSplit {
        original_order_id: Uuid,
        new_order_id: Uuid,
        moved_items: usize,
    },
    DiscountApplied {
        order_id: Uuid,
        amount: Decimal,
    },
    PaymentRecorded {
        order_id: Uuid,
        installment_id: Uuid,
        paid_amount: Decimal,
    },
    StockReserved {
        fabric_stock_id: Uuid,
        order_id: Uuid,
        meters: Decimal,
    },
    StockReleased {
        fabric_stock_id: Uuid,
        order_id: Uuid,
        meters: Decimal,
    },
    StockTransferred {
        from_fabric_stock_id: Uuid,
        to_fabric_stock_id: Uuid,
        order_id: Uuid,
        meters: Decimal,
    },
    AlertsReconciled {
        created: u64,
        resolved: u64,
    },
}

/// Drains the event channel. Runs as a background task for the life of
/// the process; today this only logs, downstream consumers (WhatsApp
/// notifications, dashboards) subscribe in the surrounding application.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        info!(?event, "Processing event");
    }
    info!("Event channel closed; event processor exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn events_round_trip_through_channel() {
        let (tx, mut rx) = mpsc::channel(8);
        let sender = EventSender::new(tx);

        sender
            .send(Event::StockReserved {
                fabric_stock_id: Uuid::new_v4(),
                order_id: Uuid::new_v4(),
                meters: dec!(3.5),
            })
            .await
            .expect("send should succeed");

        match rx.recv().await {
            Some(Event::StockReserved { meters, .. }) => assert_eq!(meters, dec!(3.5)),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn send_fails_after_receiver_dropped() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        let result = sender
            .send(Event::AlertsReconciled {
                created: 0,
                resolved: 0,
            })
            .await;
        assert!(result.is_err());
    }
}

pub mod alerts;
pub mod installments;
pub mod inventory;
pub mod orders;

use std::sync::Arc;

use crate::clock::Clock;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::services::{
    alerts::AlertService, installments::InstallmentService, order_items::OrderItemService,
    order_split::OrderSplitService, orders::OrderService, reservations::ReservationService,
};

/// Aggregated services used by the HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub order_items: Arc<OrderItemService>,
    pub order_split: Arc<OrderSplitService>,
    pub installments: Arc<InstallmentService>,
    pub reservations: Arc<ReservationService>,
    pub alerts: Arc<AlertService>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, clock: Arc<dyn Clock>, event_sender: Arc<EventSender>) -> Self {
        Self {
            orders: Arc::new(OrderService::new(
                db.clone(),
                clock.clone(),
                Some(event_sender.clone()),
            )),
            order_items: Arc::new(OrderItemService::new(
                db.clone(),
                clock.clone(),
                Some(event_sender.clone()),
            )),
            order_split: Arc::new(OrderSplitService::new(
                db.clone(),
                clock.clone(),
                Some(event_sender.clone()),
            )),
            installments: Arc::new(InstallmentService::new(
                db.clone(),
                clock.clone(),
                Some(event_sender),
            )),
            reservations: Arc::new(ReservationService::new(db.clone(), clock.clone())),
            alerts: Arc::new(AlertService::new(db, clock)),
        }
    }
}

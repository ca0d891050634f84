//! Alert reconciliation.
//!
//! Alerts are derived state: this module diffs the desired alert set
//! (computed from current stock and order conditions) against what
//! exists, creating and deleting rows until they match. Running it
//! twice with no state change in between is a no-op. One bad record
//! never aborts the scan; its error is logged and the pass moves on.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::entities::alert::{self, AlertSeverity, AlertType, Entity as AlertEntity};
use crate::entities::accessory_stock::{self, Entity as AccessoryStockEntity};
use crate::entities::fabric_stock::{self, Entity as FabricStockEntity};
use crate::entities::order::{self, Entity as OrderEntity, OrderStatus};
use crate::errors::ServiceError;

/// Available-stock ceiling for the LOW band, as a multiple of minimum.
const LOW_BAND_MULTIPLIER: Decimal = dec!(1.25);
/// Days past delivery before an overdue alert escalates.
const OVERDUE_ESCALATION_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub created: u64,
    pub resolved: u64,
}

impl ReconcileSummary {
    fn absorb(&mut self, (created, resolved): (u64, u64)) {
        self.created += created;
        self.resolved += resolved;
    }
}

#[derive(Clone)]
pub struct AlertService {
    db: Arc<DatabaseConnection>,
    clock: Arc<dyn Clock>,
}

impl AlertService {
    pub fn new(db: Arc<DatabaseConnection>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub async fn list_active(&self) -> Result<Vec<alert::Model>, ServiceError> {
        AlertEntity::find()
            .filter(alert::Column::IsDismissed.eq(false))
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Brings the alert set in line with present reality. Idempotent
    /// set-reconciliation, not a queue.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<ReconcileSummary, ServiceError> {
        let mut summary = ReconcileSummary::default();

        let fabrics = FabricStockEntity::find()
            .filter(fabric_stock::Column::Active.eq(true))
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        for stock in fabrics {
            let label = format!("{} ({} {})", stock.name, stock.brand, stock.color);
            match self
                .reconcile_stock_alert(stock.id, "fabric", stock.available(), stock.minimum, &label, "m")
                .await
            {
                Ok(delta) => summary.absorb(delta),
                Err(e) => warn!(stock_id = %stock.id, error = %e, "Skipping fabric record in alert scan"),
            }
        }

        let accessories = AccessoryStockEntity::find()
            .filter(accessory_stock::Column::Active.eq(true))
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        for stock in accessories {
            let label = format!("{} ({})", stock.name, stock.kind);
            match self
                .reconcile_stock_alert(
                    stock.id,
                    "accessory",
                    Decimal::from(stock.available()),
                    Decimal::from(stock.minimum),
                    &label,
                    "units",
                )
                .await
            {
                Ok(delta) => summary.absorb(delta),
                Err(e) => warn!(stock_id = %stock.id, error = %e, "Skipping accessory record in alert scan"),
            }
        }

        summary.absorb(self.reconcile_overdue_orders().await?);
        summary.absorb(self.reconcile_pending_payments().await?);

        info!(
            created = summary.created,
            resolved = summary.resolved,
            "Alert reconciliation completed"
        );
        Ok(summary)
    }

    async fn find_alert(
        &self,
        related_id: Uuid,
        related_type: &str,
        types: &[AlertType],
    ) -> Result<Option<alert::Model>, ServiceError> {
        let names: Vec<String> = types.iter().map(|t| t.as_str().to_string()).collect();
        AlertEntity::find()
            .filter(alert::Column::RelatedId.eq(related_id))
            .filter(alert::Column::RelatedType.eq(related_type))
            .filter(alert::Column::IsDismissed.eq(false))
            .filter(alert::Column::AlertType.is_in(names))
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    async fn create_alert(
        &self,
        alert_type: AlertType,
        severity: AlertSeverity,
        title: &str,
        message: String,
        related_id: Uuid,
        related_type: &str,
    ) -> Result<(), ServiceError> {
        let now = self.clock.now();
        let model = alert::ActiveModel {
            id: Set(Uuid::new_v4()),
            alert_type: Set(alert_type.as_str().to_string()),
            severity: Set(severity.as_str().to_string()),
            title: Set(title.to_string()),
            message: Set(message),
            related_id: Set(related_id),
            related_type: Set(related_type.to_string()),
            is_dismissed: Set(false),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };
        model
            .insert(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        Ok(())
    }

    async fn delete_alert(&self, alert_id: Uuid) -> Result<(), ServiceError> {
        AlertEntity::delete_by_id(alert_id)
            .exec(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        Ok(())
    }

    /// Ensures the stock-band alert for one record: CRITICAL at or
    /// below minimum, LOW in the headroom band above it, none when
    /// healthy.
    async fn reconcile_stock_alert(
        &self,
        related_id: Uuid,
        related_type: &str,
        available: Decimal,
        minimum: Decimal,
        label: &str,
        unit: &str,
    ) -> Result<(u64, u64), ServiceError> {
        let existing = self
            .find_alert(
                related_id,
                related_type,
                &[AlertType::LowStock, AlertType::CriticalStock],
            )
            .await?;

        if available <= minimum {
            if let Some(existing) = &existing {
                if AlertType::parse(&existing.alert_type) == Some(AlertType::CriticalStock) {
                    return Ok((0, 0));
                }
                self.delete_alert(existing.id).await?;
            }
            self.create_alert(
                AlertType::CriticalStock,
                AlertSeverity::Critical,
                "Critical Stock Alert",
                format!(
                    "{} is below minimum stock. Available: {}{}, Minimum: {}{}",
                    label, available, unit, minimum, unit
                ),
                related_id,
                related_type,
            )
            .await?;
            Ok((1, 0))
        } else if available <= minimum * LOW_BAND_MULTIPLIER {
            if let Some(existing) = &existing {
                if AlertType::parse(&existing.alert_type) == Some(AlertType::LowStock) {
                    return Ok((0, 0));
                }
                self.delete_alert(existing.id).await?;
            }
            self.create_alert(
                AlertType::LowStock,
                AlertSeverity::Medium,
                "Low Stock Warning",
                format!(
                    "{} is running low. Available: {}{}, Minimum: {}{}",
                    label, available, unit, minimum, unit
                ),
                related_id,
                related_type,
            )
            .await?;
            Ok((1, 0))
        } else if let Some(existing) = existing {
            self.delete_alert(existing.id).await?;
            Ok((0, 1))
        } else {
            Ok((0, 0))
        }
    }

    async fn reconcile_overdue_orders(&self) -> Result<(u64, u64), ServiceError> {
        let now = self.clock.now();
        let mut created = 0u64;
        let mut resolved = 0u64;

        let overdue_orders = OrderEntity::find()
            .filter(order::Column::DeliveryDate.is_not_null())
            .filter(order::Column::DeliveryDate.lt(now))
            .filter(order::Column::Status.is_not_in([
                OrderStatus::Delivered.as_str(),
                OrderStatus::Cancelled.as_str(),
            ]))
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        for order in overdue_orders {
            let result: Result<u64, ServiceError> = async {
                let delivery = order.delivery_date.ok_or_else(|| {
                    ServiceError::InternalError("overdue order without delivery date".into())
                })?;
                let days_overdue = (now - delivery).num_days();
                let severity = if days_overdue >= OVERDUE_ESCALATION_DAYS {
                    AlertSeverity::Critical
                } else {
                    AlertSeverity::High
                };

                let existing = self
                    .find_alert(order.id, "order", &[AlertType::OrderOverdue])
                    .await?;
                if let Some(existing) = &existing {
                    if existing.severity == severity.as_str() {
                        return Ok(0);
                    }
                    self.delete_alert(existing.id).await?;
                }
                self.create_alert(
                    AlertType::OrderOverdue,
                    severity,
                    "Order Overdue",
                    format!(
                        "Order {} is {} day(s) past its delivery date",
                        order.order_number, days_overdue
                    ),
                    order.id,
                    "order",
                )
                .await?;
                Ok(1)
            }
            .await;

            match result {
                Ok(c) => created += c,
                Err(e) => warn!(order_id = %order.id, error = %e, "Skipping order in overdue scan"),
            }
        }

        // Resolution pass: any overdue alert whose order is no longer
        // overdue gets retired.
        let overdue_alerts = AlertEntity::find()
            .filter(alert::Column::AlertType.eq(AlertType::OrderOverdue.as_str()))
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        for existing in overdue_alerts {
            let order = OrderEntity::find_by_id(existing.related_id)
                .one(&*self.db)
                .await
                .map_err(ServiceError::DatabaseError)?;
            let still_overdue = order
                .as_ref()
                .map(|o| {
                    let terminal = o.status().map(|s| s.is_terminal()).unwrap_or(false);
                    !terminal && o.delivery_date.map(|d| d < now).unwrap_or(false)
                })
                .unwrap_or(false);
            if !still_overdue {
                self.delete_alert(existing.id).await?;
                resolved += 1;
            }
        }

        Ok((created, resolved))
    }

    async fn reconcile_pending_payments(&self) -> Result<(u64, u64), ServiceError> {
        let mut created = 0u64;
        let mut resolved = 0u64;

        let unpaid_delivered = OrderEntity::find()
            .filter(order::Column::Status.eq(OrderStatus::Delivered.as_str()))
            .filter(order::Column::BalanceAmount.gt(Decimal::ZERO))
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        for order in unpaid_delivered {
            let result: Result<u64, ServiceError> = async {
                let existing = self
                    .find_alert(order.id, "order", &[AlertType::PaymentPending])
                    .await?;
                if existing.is_some() {
                    return Ok(0);
                }
                self.create_alert(
                    AlertType::PaymentPending,
                    AlertSeverity::High,
                    "Payment Pending",
                    format!(
                        "Order {} was delivered with {} outstanding",
                        order.order_number, order.balance_amount
                    ),
                    order.id,
                    "order",
                )
                .await?;
                Ok(1)
            }
            .await;

            match result {
                Ok(c) => created += c,
                Err(e) => {
                    warn!(order_id = %order.id, error = %e, "Skipping order in pending-payment scan")
                }
            }
        }

        let payment_alerts = AlertEntity::find()
            .filter(alert::Column::AlertType.eq(AlertType::PaymentPending.as_str()))
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        for existing in payment_alerts {
            let order = OrderEntity::find_by_id(existing.related_id)
                .one(&*self.db)
                .await
                .map_err(ServiceError::DatabaseError)?;
            let still_pending = order
                .as_ref()
                .map(|o| {
                    o.status() == Some(OrderStatus::Delivered)
                        && o.balance_amount > Decimal::ZERO
                })
                .unwrap_or(false);
            if !still_pending {
                self.delete_alert(existing.id).await?;
                resolved += 1;
            }
        }

        Ok((created, resolved))
    }
}

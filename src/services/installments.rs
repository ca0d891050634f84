//! Payment installment schedules.
//!
//! The advance is installment #1 by convention; plans created here fill
//! in the remaining balance. Recording a payment re-derives the row's
//! status and resettles the order balance in the same transaction.

use chrono::{DateTime, Months, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auth::CallerIdentity;
use crate::clock::Clock;
use crate::entities::order::{self, Entity as OrderEntity};
use crate::entities::order_history::ChangeType;
use crate::entities::payment_installment::{
    self, Entity as InstallmentEntity, InstallmentStatus, PaymentMode,
};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::money::Money;
use crate::services::orders::{paid_installments_sum, record_history};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstallmentFrequency {
    Weekly,
    Biweekly,
    Monthly,
}

impl InstallmentFrequency {
    fn advance(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            InstallmentFrequency::Weekly => from + chrono::Duration::days(7),
            InstallmentFrequency::Biweekly => from + chrono::Duration::days(14),
            InstallmentFrequency::Monthly => from
                .checked_add_months(Months::new(1))
                .unwrap_or_else(|| from + chrono::Duration::days(30)),
        }
    }
}

fn default_frequency() -> InstallmentFrequency {
    InstallmentFrequency::Monthly
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreatePlanRequest {
    #[validate(range(min = 1, max = 12, message = "Plan must have 1 to 12 installments"))]
    pub number_of_installments: i32,
    pub first_installment_amount: Option<Decimal>,
    #[serde(default = "default_frequency")]
    pub frequency: InstallmentFrequency,
    pub start_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct RecordPaymentRequest {
    pub paid_amount: Decimal,
    pub paid_date: Option<DateTime<Utc>>,
    pub payment_mode: Option<String>,
    pub transaction_ref: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InstallmentSummary {
    pub total_installments: usize,
    pub total_paid: Decimal,
    pub total_due: Decimal,
    pub overdue_count: usize,
}

#[derive(Debug, Serialize)]
pub struct OrderInstallments {
    pub installments: Vec<payment_installment::Model>,
    pub summary: InstallmentSummary,
}

#[derive(Clone)]
pub struct InstallmentService {
    db: Arc<DatabaseConnection>,
    clock: Arc<dyn Clock>,
    event_sender: Option<Arc<EventSender>>,
}

impl InstallmentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        clock: Arc<dyn Clock>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            clock,
            event_sender,
        }
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn list_for_order(&self, order_id: Uuid) -> Result<OrderInstallments, ServiceError> {
        let db = &*self.db;
        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let installments = InstallmentEntity::find()
            .filter(payment_installment::Column::OrderId.eq(order_id))
            .order_by_asc(payment_installment::Column::InstallmentNumber)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let now = self.clock.now();
        let total_paid: Decimal = installments.iter().map(|i| i.paid_amount).sum();
        let overdue_count = installments
            .iter()
            .filter(|i| {
                i.status() == Some(InstallmentStatus::Overdue)
                    || (i.status() == Some(InstallmentStatus::Pending) && i.due_date < now)
            })
            .count();

        Ok(OrderInstallments {
            summary: InstallmentSummary {
                total_installments: installments.len(),
                total_paid,
                total_due: order.balance_amount,
                overdue_count,
            },
            installments,
        })
    }

    /// Creates an installment plan over the order's outstanding
    /// balance. The last row absorbs the division remainder so the plan
    /// sums to the balance exactly.
    #[instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn create_plan(
        &self,
        caller: CallerIdentity,
        order_id: Uuid,
        request: CreatePlanRequest,
    ) -> Result<Vec<payment_installment::Model>, ServiceError> {
        request.validate()?;

        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::txn_error)?;

        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let existing = InstallmentEntity::find()
            .filter(payment_installment::Column::OrderId.eq(order_id))
            .order_by_desc(payment_installment::Column::InstallmentNumber)
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        // The advance row (installment #1) may already exist; anything
        // beyond it means a plan was created before.
        if existing.iter().any(|i| i.installment_number > 1) {
            return Err(ServiceError::ValidationError(
                "Installment plan already exists for this order".to_string(),
            ));
        }
        let next_number = existing
            .first()
            .map(|i| i.installment_number + 1)
            .unwrap_or(1);

        let balance = Money::from_decimal(order.balance_amount);
        if balance <= Money::ZERO {
            return Err(ServiceError::ValidationError(
                "Order has no outstanding balance to schedule".to_string(),
            ));
        }

        let n = request.number_of_installments as i64;
        let first = match request.first_installment_amount {
            Some(amount) => {
                let first = Money::from_decimal(amount);
                if first <= Money::ZERO || first > balance {
                    return Err(ServiceError::ValidationError(
                        "First installment amount must be positive and within the balance"
                            .to_string(),
                    ));
                }
                first
            }
            None => Money::from_minor(balance.minor() / n),
        };

        let mut amounts = vec![first];
        if n > 1 {
            let rest = balance - first;
            let each = Money::from_minor(rest.minor() / (n - 1));
            for i in 1..n {
                if i == n - 1 {
                    // Last row absorbs the remainder.
                    let allocated: Money = amounts.iter().copied().sum();
                    amounts.push(balance - allocated);
                } else {
                    amounts.push(each);
                }
            }
        } else {
            amounts[0] = balance;
        }

        let start = request.start_date.unwrap_or_else(|| self.clock.now());
        let now = self.clock.now();
        let mut due = start;
        let mut created = Vec::with_capacity(amounts.len());
        for (idx, amount) in amounts.iter().enumerate() {
            if idx > 0 {
                due = request.frequency.advance(due);
            }
            let model = payment_installment::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                installment_number: Set(next_number + idx as i32),
                amount: Set(amount.to_decimal()),
                due_date: Set(due),
                paid_amount: Set(Decimal::ZERO),
                paid_date: Set(None),
                payment_mode: Set(None),
                transaction_ref: Set(None),
                status: Set(InstallmentStatus::Pending.as_str().to_string()),
                notes: Set(None),
                created_at: Set(now),
                updated_at: Set(Some(now)),
            };
            created.push(
                model
                    .insert(&txn)
                    .await
                    .map_err(ServiceError::DatabaseError)?,
            );
        }

        txn.commit().await.map_err(ServiceError::txn_error)?;

        info!(order_id = %order_id, installments = created.len(), "Installment plan created");
        Ok(created)
    }

    /// Records a payment against one installment and resettles the
    /// order's advance and balance.
    #[instrument(skip(self, request), fields(installment_id = %installment_id))]
    pub async fn record_payment(
        &self,
        caller: CallerIdentity,
        installment_id: Uuid,
        request: RecordPaymentRequest,
    ) -> Result<payment_installment::Model, ServiceError> {
        if request.paid_amount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Paid amount cannot be negative".to_string(),
            ));
        }
        if let Some(mode) = &request.payment_mode {
            mode.parse::<PaymentMode>().map_err(|_| {
                ServiceError::ValidationError(format!("Unknown payment mode: {}", mode))
            })?;
        }

        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::txn_error)?;

        let installment = InstallmentEntity::find_by_id(installment_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Installment {} not found", installment_id))
            })?;

        let now = self.clock.now();
        let status = InstallmentStatus::derive(
            installment.status(),
            installment.amount,
            request.paid_amount,
            installment.due_date,
            now,
        );

        let order_id = installment.order_id;
        let installment_number = installment.installment_number;
        let mut active: payment_installment::ActiveModel = installment.into();
        active.paid_amount = Set(request.paid_amount);
        active.paid_date = Set(request.paid_date.or(Some(now)));
        if request.payment_mode.is_some() {
            active.payment_mode = Set(request.payment_mode.clone());
        }
        if request.transaction_ref.is_some() {
            active.transaction_ref = Set(request.transaction_ref.clone());
        }
        if request.notes.is_some() {
            active.notes = Set(request.notes.clone());
        }
        active.status = Set(status.as_str().to_string());
        active.updated_at = Set(Some(now));
        let updated = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        // Resettle the order: the advance field mirrors installment #1,
        // and the balance always reflects the recorded payments.
        let order = OrderEntity::find_by_id(order_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let total = Money::from_decimal(order.total_amount);
        let discount = Money::from_decimal(order.discount);
        let paid = paid_installments_sum(&txn, order_id).await?;
        let balance = total - discount - paid;

        let version = order.version;
        let mut order_active: order::ActiveModel = order.into();
        if installment_number == 1 {
            order_active.advance_paid = Set(request.paid_amount);
        }
        order_active.balance_amount = Set(balance.to_decimal());
        order_active.version = Set(version + 1);
        order_active.updated_at = Set(Some(now));
        order_active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        record_history(
            &txn,
            self.clock.as_ref(),
            order_id,
            caller.user_id,
            ChangeType::PaymentRecorded,
            format!(
                "Payment of {} recorded against installment #{}",
                request.paid_amount, installment_number
            ),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::txn_error)?;

        info!(installment_id = %installment_id, order_id = %order_id, "Payment recorded");
        if let Some(sender) = &self.event_sender {
            let _ = sender
                .send(Event::PaymentRecorded {
                    order_id,
                    installment_id,
                    paid_amount: request.paid_amount,
                })
                .await;
        }

        Ok(updated)
    }
}

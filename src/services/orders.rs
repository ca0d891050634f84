//! Order-level settlement helpers and the discount operation.
//!
//! The totals recomputation here is shared by every mutation that
//! touches money: `sub_total` is the sum of the items' line totals, GST
//! is recomputed at the order's fixed rate, and the balance is settled
//! against what the installments actually record as paid.

use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::clock::Clock;
use crate::entities::order::{self, Entity as OrderEntity, OrderStatus};
use crate::entities::order_history::{self, ChangeType};
use crate::entities::order_item::{self, Entity as OrderItemEntity};
use crate::entities::payment_installment::{self, Entity as InstallmentEntity, InstallmentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::money::Money;

/// Loads an order and rejects terminal ones. Shared precondition of
/// every mutating operation.
pub async fn load_mutable_order<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<order::Model, ServiceError> {
    let order = OrderEntity::find_by_id(order_id)
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

    let status = order.status().ok_or_else(|| {
        ServiceError::InternalError(format!("order {} has unrecognized status {}", order_id, order.status))
    })?;
    if status.is_terminal() {
        return Err(ServiceError::OrderTerminal(order.status.clone()));
    }
    Ok(order)
}

/// Sum of paid amounts over the order's non-cancelled installments.
/// The advance is installment #1, so it is counted here and never as a
/// separate field.
pub async fn paid_installments_sum<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Money, ServiceError> {
    let installments = InstallmentEntity::find()
        .filter(payment_installment::Column::OrderId.eq(order_id))
        .all(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;

    Ok(installments
        .iter()
        .filter(|i| i.status() != Some(InstallmentStatus::Cancelled))
        .map(|i| Money::from_decimal(i.paid_amount))
        .sum())
}

/// Recomputes sub_total, GST, total and balance from the order's items
/// and installments, bumps the version and persists. Returns the
/// updated order.
pub async fn recompute_order_money<C: ConnectionTrait>(
    conn: &C,
    clock: &dyn Clock,
    order: order::Model,
) -> Result<order::Model, ServiceError> {
    let items = OrderItemEntity::find()
        .filter(order_item::Column::OrderId.eq(order.id))
        .all(conn)
        .await
        .map_err(ServiceError::DatabaseError)?;

    let sub_total: Money = items
        .iter()
        .map(|item| Money::from_decimal(item.total_price))
        .sum();
    let gst = sub_total.gst(order.gst_rate);
    let (cgst, sgst) = gst.half_split();
    let total = sub_total + gst;
    let discount = Money::from_decimal(order.discount);
    let paid = paid_installments_sum(conn, order.id).await?;
    let balance = total - discount - paid;

    let version = order.version;
    let mut active: order::ActiveModel = order.into();
    active.sub_total = Set(sub_total.to_decimal());
    active.gst_amount = Set(gst.to_decimal());
    active.cgst = Set(cgst.to_decimal());
    active.sgst = Set(sgst.to_decimal());
    active.taxable_amount = Set(sub_total.to_decimal());
    active.total_amount = Set(total.to_decimal());
    active.balance_amount = Set(balance.to_decimal());
    active.version = Set(version + 1);
    active.updated_at = Set(Some(clock.now()));

    active.update(conn).await.map_err(ServiceError::DatabaseError)
}

/// Appends one order history row. History is append-only and never read
/// back by settlement logic.
pub async fn record_history<C: ConnectionTrait>(
    conn: &C,
    clock: &dyn Clock,
    order_id: Uuid,
    user_id: Uuid,
    change_type: ChangeType,
    description: String,
) -> Result<(), ServiceError> {
    let entry = order_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        user_id: Set(user_id),
        change_type: Set(change_type.as_str().to_string()),
        description: Set(description),
        created_at: Set(clock.now()),
    };
    entry.insert(conn).await.map_err(ServiceError::DatabaseError)?;
    Ok(())
}

/// New order numbers: ORD-YYYYMMDD-XXXX with a random tail.
pub fn generate_order_number(clock: &dyn Clock) -> String {
    let date = clock.now().format("%Y%m%d");
    let tail = Uuid::new_v4().simple().to_string();
    format!("ORD-{}-{}", date, tail[..6].to_uppercase())
}

#[derive(Debug, Deserialize, Serialize, validator::Validate)]
pub struct ApplyDiscountRequest {
    pub amount: Decimal,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub installments: Vec<payment_installment::Model>,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<order::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    clock: Arc<dyn Clock>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
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
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetail, ServiceError> {
        let db = &*self.db;
        let order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let installments = InstallmentEntity::find()
            .filter(payment_installment::Column::OrderId.eq(order_id))
            .order_by_asc(payment_installment::Column::InstallmentNumber)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(OrderDetail {
            order,
            items,
            installments,
        })
    }

    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        page: u64,
        per_page: u64,
        status: Option<String>,
    ) -> Result<OrderListResponse, ServiceError> {
        if page == 0 {
            return Err(ServiceError::ValidationError(
                "Page number must be greater than 0".to_string(),
            ));
        }

        let db = &*self.db;
        let mut query = OrderEntity::find();
        if let Some(status) = status {
            if OrderStatus::parse(&status).is_none() {
                return Err(ServiceError::ValidationError(format!(
                    "Unknown order status: {}",
                    status
                )));
            }
            query = query.filter(order::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, per_page);

        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;
        let orders = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(OrderListResponse {
            orders,
            total,
            page,
            per_page,
        })
    }

    /// Applies a discount to an open order and resettles the balance.
    #[instrument(skip(self, request), fields(order_id = %order_id, amount = %request.amount))]
    pub async fn apply_discount(
        &self,
        caller: CallerIdentity,
        order_id: Uuid,
        request: ApplyDiscountRequest,
    ) -> Result<order::Model, ServiceError> {
        if request.amount < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "Discount cannot be negative".to_string(),
            ));
        }

        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::txn_error)?;

        let order = load_mutable_order(&txn, order_id).await?;
        let total = Money::from_decimal(order.total_amount);
        let discount = Money::from_decimal(request.amount);
        if discount > total {
            return Err(ServiceError::ValidationError(format!(
                "Discount {} exceeds order total {}",
                discount, total
            )));
        }

        let paid = paid_installments_sum(&txn, order_id).await?;
        let balance = total - discount - paid;

        let old_discount = order.discount;
        let version = order.version;
        let mut active: order::ActiveModel = order.into();
        active.discount = Set(discount.to_decimal());
        active.discount_reason = Set(request.reason.clone());
        active.balance_amount = Set(balance.to_decimal());
        active.version = Set(version + 1);
        active.updated_at = Set(Some(self.clock.now()));
        let updated = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        record_history(
            &txn,
            self.clock.as_ref(),
            order_id,
            caller.user_id,
            ChangeType::DiscountApplied,
            format!(
                "Discount changed from {} to {}",
                old_discount,
                discount.to_decimal()
            ),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::txn_error)?;

        info!(order_id = %order_id, "Discount applied");
        if let Some(sender) = &self.event_sender {
            let _ = sender
                .send(Event::DiscountApplied {
                    order_id,
                    amount: discount.to_decimal(),
                })
                .await;
        }

        Ok(updated)
    }
}

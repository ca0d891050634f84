//! Order splitting.
//!
//! Extracts a subset of line items into a new order. Every cost
//! component is divided through the proration engine at the selected
//! items' share of the item total; the original order keeps exact
//! complements, so each money field conserves to the paisa. Installment
//! schedules are rebuilt for both orders from the divided paid amounts.
//!
//! Advance retention is a business rule, not proration: the original
//! order keeps the advance unless its remaining total can no longer
//! absorb it, in which case it is capped at that total and the excess
//! moves with the split.

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auth::CallerIdentity;
use crate::clock::Clock;
use crate::entities::order;
use crate::entities::order_history::ChangeType;
use crate::entities::order_item::{self, Entity as OrderItemEntity};
use crate::entities::payment_installment::{self, Entity as InstallmentEntity, InstallmentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::money::proration::{allocate, allocate_sequence};
use crate::money::Money;
use crate::services::orders::{generate_order_number, load_mutable_order, record_history};

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct SplitOrderRequest {
    #[validate(length(min = 1, message = "At least one item must be selected"))]
    pub item_ids: Vec<Uuid>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SplitOutcome {
    pub new_order: order::Model,
    pub original_order: order::Model,
}

/// All order-level money components divided by one split, with the new
/// order's share on the left of each pair and the original's complement
/// on the right.
struct ComponentSplit {
    fabric_cost: (Money, Money),
    fabric_wastage_amount: (Money, Money),
    accessories_cost: (Money, Money),
    stitching_cost: (Money, Money),
    hand_stitching_cost: (Money, Money),
    full_canvas_cost: (Money, Money),
    rush_order_cost: (Money, Money),
    complex_design_cost: (Money, Money),
    additional_fittings_cost: (Money, Money),
    premium_lining_cost: (Money, Money),
    designer_consultation_fee: (Money, Money),
}

impl ComponentSplit {
    fn divide(order: &order::Model, ratio: f64) -> Self {
        let split = |amount| {
            let s = allocate(Money::from_decimal(amount), ratio);
            (s.part, s.remainder)
        };
        ComponentSplit {
            fabric_cost: split(order.fabric_cost),
            fabric_wastage_amount: split(order.fabric_wastage_amount),
            accessories_cost: split(order.accessories_cost),
            stitching_cost: split(order.stitching_cost),
            hand_stitching_cost: split(order.hand_stitching_cost),
            full_canvas_cost: split(order.full_canvas_cost),
            rush_order_cost: split(order.rush_order_cost),
            complex_design_cost: split(order.complex_design_cost),
            additional_fittings_cost: split(order.additional_fittings_cost),
            premium_lining_cost: split(order.premium_lining_cost),
            designer_consultation_fee: split(order.designer_consultation_fee),
        }
    }

    fn workmanship_premiums(&self) -> (Money, Money) {
        let new = self.hand_stitching_cost.0
            + self.full_canvas_cost.0
            + self.rush_order_cost.0
            + self.complex_design_cost.0
            + self.additional_fittings_cost.0
            + self.premium_lining_cost.0;
        let remaining = self.hand_stitching_cost.1
            + self.full_canvas_cost.1
            + self.rush_order_cost.1
            + self.complex_design_cost.1
            + self.additional_fittings_cost.1
            + self.premium_lining_cost.1;
        (new, remaining)
    }

    fn sub_totals(&self) -> (Money, Money) {
        let (premium_new, premium_remaining) = self.workmanship_premiums();
        let new = self.fabric_cost.0
            + self.fabric_wastage_amount.0
            + self.accessories_cost.0
            + self.stitching_cost.0
            + premium_new
            + self.designer_consultation_fee.0;
        let remaining = self.fabric_cost.1
            + self.fabric_wastage_amount.1
            + self.accessories_cost.1
            + self.stitching_cost.1
            + premium_remaining
            + self.designer_consultation_fee.1;
        (new, remaining)
    }
}

/// One rebuilt installment row, prior to insertion.
struct RebuiltInstallment {
    amount: Money,
    due_date: DateTime<Utc>,
    paid: Money,
    paid_date: Option<DateTime<Utc>>,
    payment_mode: Option<String>,
    transaction_ref: Option<String>,
    previous_status: Option<InstallmentStatus>,
    notes: Option<String>,
}

#[derive(Clone)]
pub struct OrderSplitService {
    db: Arc<DatabaseConnection>,
    clock: Arc<dyn Clock>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderSplitService {
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

    #[instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn split(
        &self,
        caller: CallerIdentity,
        order_id: Uuid,
        request: SplitOrderRequest,
    ) -> Result<SplitOutcome, ServiceError> {
        request.validate()?;
        let now = self.clock.now();

        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::txn_error)?;

        let original = load_mutable_order(&txn, order_id).await?;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        if items.len() <= 1 {
            return Err(ServiceError::NothingToSplit);
        }

        let item_ids: HashSet<Uuid> = request.item_ids.iter().copied().collect();
        let known: HashSet<Uuid> = items.iter().map(|i| i.id).collect();
        for id in &item_ids {
            if !known.contains(id) {
                return Err(ServiceError::UnknownItem(*id));
            }
        }
        if item_ids.len() >= items.len() {
            return Err(ServiceError::CannotSplitEverything);
        }

        let (selected, remaining): (Vec<_>, Vec<_>) =
            items.into_iter().partition(|i| item_ids.contains(&i.id));

        // Ratio of the selected items' line totals to all line totals;
        // an all-zero order splits evenly.
        let selected_total: Money = selected
            .iter()
            .map(|i| Money::from_decimal(i.total_price))
            .sum();
        let all_total: Money = selected_total
            + remaining
                .iter()
                .map(|i| Money::from_decimal(i.total_price))
                .sum();
        let ratio = if all_total.is_zero() {
            0.5
        } else {
            selected_total.ratio_of(all_total)
        };

        // Divide each cost component independently rather than deriving
        // from the subtotal, so rounding cannot compound across fields.
        let components = ComponentSplit::divide(&original, ratio);
        let (new_sub_total, remaining_sub_total) = components.sub_totals();
        let (new_premiums, remaining_premiums) = components.workmanship_premiums();

        // The new order's GST comes from its own subtotal; the original
        // takes the exact complement so GST and totals conserve.
        let original_gst = Money::from_decimal(original.gst_amount);
        let original_total = Money::from_decimal(original.total_amount);
        let new_gst = new_sub_total.gst(original.gst_rate);
        let remaining_gst = original_gst - new_gst;
        let (new_cgst, new_sgst) = new_gst.half_split();
        let (remaining_cgst, remaining_sgst) = remaining_gst.half_split();
        let new_total = new_sub_total + new_gst;
        let remaining_total = original_total - new_total;

        // Discount follows each side's share of the total, not the item
        // count.
        let discount = Money::from_decimal(original.discount);
        let discount_split = allocate(discount, new_total.ratio_of(original_total));
        let (new_discount, remaining_discount) = (discount_split.part, discount_split.remainder);

        // Advance retention rule (see module docs).
        let advance = Money::from_decimal(original.advance_paid);
        let (remaining_advance, new_advance) = if remaining_total >= advance {
            (advance, Money::ZERO)
        } else {
            (remaining_total, advance - remaining_total)
        };

        let fittings_new = (original.additional_fittings as f64 * ratio).floor() as i32;
        let fittings_remaining = original.additional_fittings - fittings_new;

        // Divide the recorded installment history (beyond the advance)
        // and rebuild both schedules from it.
        let installments = InstallmentEntity::find()
            .filter(payment_installment::Column::OrderId.eq(order_id))
            .order_by_asc(payment_installment::Column::InstallmentNumber)
            .all(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let advance_row = installments
            .iter()
            .find(|i| i.installment_number == 1)
            .filter(|_| advance > Money::ZERO)
            .cloned();
        let regular: Vec<payment_installment::Model> = installments
            .iter()
            .filter(|i| Some(i.id) != advance_row.as_ref().map(|a| a.id))
            .cloned()
            .collect();

        let amounts: Vec<Money> = regular
            .iter()
            .map(|i| Money::from_decimal(i.amount))
            .collect();
        let paids: Vec<Money> = regular
            .iter()
            .map(|i| Money::from_decimal(i.paid_amount))
            .collect();
        let (amount_parts, amount_remainders) = allocate_sequence(&amounts, ratio);
        let (paid_parts, paid_remainders) = allocate_sequence(&paids, ratio);

        let new_paid_total: Money = new_advance + paid_parts.iter().copied().sum();
        let remaining_paid_total: Money = remaining_advance + paid_remainders.iter().copied().sum();

        let new_balance = new_total - new_discount - new_paid_total;
        let remaining_balance = remaining_total - remaining_discount - remaining_paid_total;

        // Create the new order carrying the split breakdown.
        let new_order_id = Uuid::new_v4();
        let new_order_number = generate_order_number(self.clock.as_ref());
        let new_order = order::ActiveModel {
            id: Set(new_order_id),
            order_number: Set(new_order_number.clone()),
            customer_id: Set(original.customer_id),
            user_id: Set(caller.user_id),
            status: Set(original.status.clone()),
            priority: Set(original.priority.clone()),
            order_date: Set(now),
            delivery_date: Set(request.delivery_date.or(original.delivery_date)),
            fabric_cost: Set(components.fabric_cost.0.to_decimal()),
            fabric_wastage_percent: Set(original.fabric_wastage_percent),
            fabric_wastage_amount: Set(components.fabric_wastage_amount.0.to_decimal()),
            accessories_cost: Set(components.accessories_cost.0.to_decimal()),
            stitching_cost: Set(components.stitching_cost.0.to_decimal()),
            stitching_tier: Set(original.stitching_tier.clone()),
            is_hand_stitched: Set(original.is_hand_stitched),
            hand_stitching_cost: Set(components.hand_stitching_cost.0.to_decimal()),
            is_full_canvas: Set(original.is_full_canvas),
            full_canvas_cost: Set(components.full_canvas_cost.0.to_decimal()),
            is_rush_order: Set(original.is_rush_order),
            rush_order_cost: Set(components.rush_order_cost.0.to_decimal()),
            has_complex_design: Set(original.has_complex_design),
            complex_design_cost: Set(components.complex_design_cost.0.to_decimal()),
            additional_fittings: Set(fittings_new),
            additional_fittings_cost: Set(components.additional_fittings_cost.0.to_decimal()),
            has_premium_lining: Set(original.has_premium_lining),
            premium_lining_cost: Set(components.premium_lining_cost.0.to_decimal()),
            workmanship_premiums: Set(new_premiums.to_decimal()),
            designer_consultation_fee: Set(components.designer_consultation_fee.0.to_decimal()),
            sub_total: Set(new_sub_total.to_decimal()),
            gst_rate: Set(original.gst_rate),
            gst_amount: Set(new_gst.to_decimal()),
            cgst: Set(new_cgst.to_decimal()),
            sgst: Set(new_sgst.to_decimal()),
            taxable_amount: Set(new_sub_total.to_decimal()),
            total_amount: Set(new_total.to_decimal()),
            discount: Set(new_discount.to_decimal()),
            discount_reason: Set(original.discount_reason.clone()),
            advance_paid: Set(new_advance.to_decimal()),
            balance_amount: Set(new_balance.to_decimal()),
            notes: Set(Some(request.notes.clone().unwrap_or_else(|| {
                format!("Split from order {}", original.order_number)
            }))),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        };
        let new_order = new_order
            .insert(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        // Move the selected items: delete-and-recreate, preserving all
        // measurement, fabric and quantity fields verbatim.
        for item in &selected {
            let recreated = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(new_order_id),
                garment_pattern_id: Set(item.garment_pattern_id),
                fabric_stock_id: Set(item.fabric_stock_id),
                quantity: Set(item.quantity),
                body_type: Set(item.body_type.clone()),
                estimated_meters: Set(item.estimated_meters),
                actual_meters_used: Set(item.actual_meters_used),
                wastage_meters: Set(item.wastage_meters),
                price_per_unit: Set(item.price_per_unit),
                total_price: Set(item.total_price),
                assigned_tailor_id: Set(item.assigned_tailor_id),
                notes: Set(item.notes.clone()),
                created_at: Set(now),
                updated_at: Set(Some(now)),
            };
            recreated
                .insert(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?;

            OrderItemEntity::delete_by_id(item.id)
                .exec(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?;
        }

        // Rebuild both installment schedules from the divided amounts.
        InstallmentEntity::delete_many()
            .filter(payment_installment::Column::OrderId.eq(order_id))
            .exec(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let advance_due = advance_row
            .as_ref()
            .map(|row| row.due_date)
            .unwrap_or(original.order_date);
        let advance_template = |share: Money| RebuiltInstallment {
            amount: share,
            due_date: advance_due,
            paid: share,
            paid_date: advance_row.as_ref().and_then(|row| row.paid_date),
            payment_mode: advance_row.as_ref().and_then(|row| row.payment_mode.clone()),
            transaction_ref: advance_row
                .as_ref()
                .and_then(|row| row.transaction_ref.clone()),
            previous_status: advance_row.as_ref().and_then(|row| row.status()),
            notes: advance_row.as_ref().and_then(|row| row.notes.clone()),
        };

        let mut original_rows: Vec<RebuiltInstallment> = Vec::new();
        let mut new_rows: Vec<RebuiltInstallment> = Vec::new();
        if remaining_advance > Money::ZERO {
            original_rows.push(advance_template(remaining_advance));
        }
        if new_advance > Money::ZERO {
            new_rows.push(advance_template(new_advance));
        }
        for (idx, row) in regular.iter().enumerate() {
            let shared = |amount: Money, paid: Money| RebuiltInstallment {
                amount,
                due_date: row.due_date,
                paid,
                paid_date: row.paid_date,
                payment_mode: row.payment_mode.clone(),
                transaction_ref: row.transaction_ref.clone(),
                previous_status: row.status(),
                notes: row.notes.clone(),
            };
            original_rows.push(shared(amount_remainders[idx], paid_remainders[idx]));
            new_rows.push(shared(amount_parts[idx], paid_parts[idx]));
        }

        self.insert_installments(&txn, order_id, original_rows, now)
            .await?;
        self.insert_installments(&txn, new_order_id, new_rows, now)
            .await?;

        // Settle the original order on the complements.
        let version = original.version;
        let original_number = original.order_number.clone();
        let mut active: order::ActiveModel = original.into();
        active.fabric_cost = Set(components.fabric_cost.1.to_decimal());
        active.fabric_wastage_amount = Set(components.fabric_wastage_amount.1.to_decimal());
        active.accessories_cost = Set(components.accessories_cost.1.to_decimal());
        active.stitching_cost = Set(components.stitching_cost.1.to_decimal());
        active.hand_stitching_cost = Set(components.hand_stitching_cost.1.to_decimal());
        active.full_canvas_cost = Set(components.full_canvas_cost.1.to_decimal());
        active.rush_order_cost = Set(components.rush_order_cost.1.to_decimal());
        active.complex_design_cost = Set(components.complex_design_cost.1.to_decimal());
        active.additional_fittings = Set(fittings_remaining);
        active.additional_fittings_cost = Set(components.additional_fittings_cost.1.to_decimal());
        active.premium_lining_cost = Set(components.premium_lining_cost.1.to_decimal());
        active.workmanship_premiums = Set(remaining_premiums.to_decimal());
        active.designer_consultation_fee =
            Set(components.designer_consultation_fee.1.to_decimal());
        active.sub_total = Set(remaining_sub_total.to_decimal());
        active.gst_amount = Set(remaining_gst.to_decimal());
        active.cgst = Set(remaining_cgst.to_decimal());
        active.sgst = Set(remaining_sgst.to_decimal());
        active.taxable_amount = Set(remaining_sub_total.to_decimal());
        active.total_amount = Set(remaining_total.to_decimal());
        active.discount = Set(remaining_discount.to_decimal());
        active.advance_paid = Set(remaining_advance.to_decimal());
        active.balance_amount = Set(remaining_balance.to_decimal());
        active.version = Set(version + 1);
        active.updated_at = Set(Some(now));
        let updated_original = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        record_history(
            &txn,
            self.clock.as_ref(),
            order_id,
            caller.user_id,
            ChangeType::OrderSplit,
            format!(
                "Split {} item(s) to new order {}",
                selected.len(),
                new_order_number
            ),
        )
        .await?;
        record_history(
            &txn,
            self.clock.as_ref(),
            new_order_id,
            caller.user_id,
            ChangeType::OrderCreated,
            format!("Created from split of order {}", original_number),
        )
        .await?;

        txn.commit().await.map_err(ServiceError::txn_error)?;

        info!(
            order_id = %order_id,
            new_order_id = %new_order_id,
            moved_items = selected.len(),
            "Order split"
        );
        if let Some(sender) = &self.event_sender {
            let _ = sender
                .send(Event::OrderSplit {
                    original_order_id: order_id,
                    new_order_id,
                    moved_items: selected.len(),
                })
                .await;
        }

        Ok(SplitOutcome {
            new_order,
            original_order: updated_original,
        })
    }

    async fn insert_installments<C: ConnectionTrait>(
        &self,
        conn: &C,
        order_id: Uuid,
        rows: Vec<RebuiltInstallment>,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        for (idx, row) in rows.into_iter().enumerate() {
            let status = InstallmentStatus::derive(
                row.previous_status,
                row.amount.to_decimal(),
                row.paid.to_decimal(),
                row.due_date,
                now,
            );
            let model = payment_installment::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                installment_number: Set((idx + 1) as i32),
                amount: Set(row.amount.to_decimal()),
                due_date: Set(row.due_date),
                paid_amount: Set(row.paid.to_decimal()),
                paid_date: Set(row.paid_date),
                payment_mode: Set(row.payment_mode),
                transaction_ref: Set(row.transaction_ref),
                status: Set(status.as_str().to_string()),
                notes: Set(row.notes),
                created_at: Set(now),
                updated_at: Set(Some(now)),
            };
            model
                .insert(conn)
                .await
                .map_err(ServiceError::DatabaseError)?;
        }
        Ok(())
    }
}

//! Order item mutation.
//!
//! Applies a garment or fabric substitution (plus quantity, tailor and
//! notes edits) to one line item, moving the fabric reservation and
//! resettling the order's totals in the same transaction. A failure at
//! any step leaves stock reservations, the item and the order exactly
//! as they were.

use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::auth::CallerIdentity;
use crate::clock::Clock;
use crate::entities::fabric_stock::Entity as FabricStockEntity;
use crate::entities::garment_pattern::{self, Entity as GarmentPatternEntity};
use crate::entities::order;
use crate::entities::order_history::ChangeType;
use crate::entities::order_item::{self, BodyType, Entity as OrderItemEntity};
use crate::entities::user::Entity as UserEntity;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::money::Money;
use crate::services::orders::{load_mutable_order, record_history, recompute_order_money};
use crate::services::reservations;

/// Fields a caller may change on a line item. `assigned_tailor_id` and
/// `notes` distinguish "absent" from "explicitly cleared" via the
/// nested option.
#[derive(Debug, Default, Deserialize, Serialize, Validate)]
pub struct UpdateOrderItemRequest {
    pub garment_pattern_id: Option<Uuid>,
    pub fabric_stock_id: Option<Uuid>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: Option<i32>,
    #[serde(default)]
    pub assigned_tailor_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub notes: Option<Option<String>>,
}

#[derive(Debug, Serialize)]
pub struct UpdatedOrderItem {
    pub item: order_item::Model,
    pub order: order::Model,
}

/// Legacy path: re-derives the fabric requirement after a garment
/// pattern substitution. Kept for backward compatibility; current UI
/// flows replace the line instead of re-patterning it, so this is not
/// reachable from the standard screens.
async fn apply_legacy_pattern_change<C: ConnectionTrait>(
    conn: &C,
    pattern_id: Uuid,
    body_type: BodyType,
) -> Result<(garment_pattern::Model, Decimal), ServiceError> {
    let pattern = GarmentPatternEntity::find_by_id(pattern_id)
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| {
            ServiceError::InvalidReference(format!("garment pattern {} not found", pattern_id))
        })?;

    let meters = pattern.estimated_meters_for(body_type);
    Ok((pattern, meters))
}

async fn validate_tailor<C: ConnectionTrait>(
    conn: &C,
    tailor_id: Uuid,
) -> Result<(), ServiceError> {
    let user = UserEntity::find_by_id(tailor_id)
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::InvalidReference(format!("user {} not found", tailor_id)))?;

    if !user.active {
        return Err(ServiceError::InvalidAssignment(format!(
            "{} is not an active user",
            user.name
        )));
    }
    if !user.is_tailor() {
        return Err(ServiceError::InvalidAssignment(format!(
            "{} does not have the TAILOR role",
            user.name
        )));
    }
    Ok(())
}

#[derive(Clone)]
pub struct OrderItemService {
    db: Arc<DatabaseConnection>,
    clock: Arc<dyn Clock>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderItemService {
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

    #[instrument(skip(self, request), fields(order_id = %order_id, item_id = %item_id))]
    pub async fn update_item(
        &self,
        caller: CallerIdentity,
        order_id: Uuid,
        item_id: Uuid,
        request: UpdateOrderItemRequest,
    ) -> Result<UpdatedOrderItem, ServiceError> {
        request.validate()?;

        let db = &*self.db;
        let txn = db.begin().await.map_err(ServiceError::txn_error)?;

        let order = load_mutable_order(&txn, order_id).await?;

        let item = OrderItemEntity::find_by_id(item_id)
            .filter(order_item::Column::OrderId.eq(order_id))
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or(ServiceError::UnknownItem(item_id))?;

        let body_type = BodyType::parse(&item.body_type).ok_or_else(|| {
            ServiceError::InternalError(format!(
                "item {} has unrecognized body type {}",
                item.id, item.body_type
            ))
        })?;

        // Reference checks run before any write so every error path
        // leaves the transaction untouched.
        if let Some(Some(tailor_id)) = request.assigned_tailor_id {
            validate_tailor(&txn, tailor_id).await?;
        }

        let mut history_parts: Vec<String> = Vec::new();
        let mut price_affecting = false;

        let mut estimated_meters = item.estimated_meters;
        let mut quantity = item.quantity;
        let mut total_price = Money::from_decimal(item.total_price);
        let mut price_per_unit = item.price_per_unit;

        // Garment substitution re-derives the fabric requirement from
        // the new pattern at the item's body type.
        let garment_change = request
            .garment_pattern_id
            .filter(|id| *id != item.garment_pattern_id);
        if let Some(pattern_id) = garment_change {
            let (pattern, meters) =
                apply_legacy_pattern_change(&txn, pattern_id, body_type).await?;
            estimated_meters = meters;
            let old_pattern = GarmentPatternEntity::find_by_id(item.garment_pattern_id)
                .one(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?;
            history_parts.push(format!(
                "Garment changed from {} to {}",
                old_pattern.map(|p| p.name).unwrap_or_else(|| "?".into()),
                pattern.name
            ));
        }

        if let Some(new_quantity) = request.quantity.filter(|q| *q != item.quantity) {
            quantity = new_quantity;
        }

        // Fabric substitution: move the reservation, then re-price the
        // line at the new fabric's unit price while holding the
        // accessory residue constant.
        let fabric_change = request
            .fabric_stock_id
            .filter(|id| *id != item.fabric_stock_id);
        if let Some(new_fabric_id) = fabric_change {
            let new_fabric = FabricStockEntity::find_by_id(new_fabric_id)
                .one(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?
                .ok_or_else(|| {
                    ServiceError::InvalidReference(format!(
                        "fabric stock {} not found",
                        new_fabric_id
                    ))
                })?;
            let old_fabric = FabricStockEntity::find_by_id(item.fabric_stock_id)
                .one(&txn)
                .await
                .map_err(ServiceError::DatabaseError)?
                .ok_or_else(|| {
                    ServiceError::InvalidReference(format!(
                        "fabric stock {} not found",
                        item.fabric_stock_id
                    ))
                })?;

            let release_meters = item.reserved_meters();
            let reserve_meters = estimated_meters * Decimal::from(quantity);
            if release_meters == reserve_meters {
                reservations::transfer(
                    &txn,
                    self.clock.as_ref(),
                    old_fabric.id,
                    new_fabric.id,
                    reserve_meters,
                    order_id,
                    Some(caller.user_id),
                )
                .await?;
            } else {
                // Pattern and fabric changed together: the released and
                // reserved quantities differ, so the move is recorded as
                // two separate ledger entries.
                reservations::release(
                    &txn,
                    self.clock.as_ref(),
                    old_fabric.id,
                    release_meters,
                    order_id,
                    Some(caller.user_id),
                )
                .await?;
                reservations::reserve(
                    &txn,
                    self.clock.as_ref(),
                    new_fabric.id,
                    reserve_meters,
                    order_id,
                    Some(caller.user_id),
                )
                .await?;
            }

            let old_fabric_cost = Money::from_decimal(
                item.estimated_meters * old_fabric.unit_price * Decimal::from(item.quantity),
            );
            let held_accessories = Money::from_decimal(item.total_price) - old_fabric_cost;
            let new_fabric_cost = Money::from_decimal(
                estimated_meters * new_fabric.unit_price * Decimal::from(quantity),
            );
            total_price = new_fabric_cost + held_accessories;
            price_per_unit = (total_price.to_decimal() / Decimal::from(quantity))
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            price_affecting = true;

            history_parts.push(format!(
                "Fabric changed from {} ({}) to {} ({})",
                old_fabric.name, old_fabric.color, new_fabric.name, new_fabric.color
            ));
        }

        let old_total_price = item.total_price;
        let item_id_for_update = item.id;
        let mut active: order_item::ActiveModel = item.into();
        if let Some(pattern_id) = garment_change {
            active.garment_pattern_id = Set(pattern_id);
            active.estimated_meters = Set(estimated_meters);
        }
        if let Some(new_fabric_id) = fabric_change {
            active.fabric_stock_id = Set(new_fabric_id);
            active.total_price = Set(total_price.to_decimal());
            active.price_per_unit = Set(price_per_unit);
        }
        if request.quantity.is_some() {
            active.quantity = Set(quantity);
        }
        if let Some(tailor) = request.assigned_tailor_id {
            active.assigned_tailor_id = Set(tailor);
        }
        if let Some(notes) = request.notes.clone() {
            active.notes = Set(notes);
        }
        active.updated_at = Set(Some(self.clock.now()));

        let updated_item = active
            .update(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let updated_order = if price_affecting {
            history_parts.push(format!(
                "Item price changed from {} to {}",
                old_total_price,
                total_price.to_decimal()
            ));
            recompute_order_money(&txn, self.clock.as_ref(), order).await?
        } else {
            order
        };

        if !history_parts.is_empty() {
            record_history(
                &txn,
                self.clock.as_ref(),
                order_id,
                caller.user_id,
                ChangeType::ItemUpdated,
                history_parts.join("; "),
            )
            .await?;
        }

        txn.commit().await.map_err(ServiceError::txn_error)?;

        info!(order_id = %order_id, item_id = %item_id_for_update, "Order item updated");
        if let Some(sender) = &self.event_sender {
            let _ = sender
                .send(Event::OrderItemUpdated {
                    order_id,
                    item_id: item_id_for_update,
                })
                .await;
        }

        Ok(UpdatedOrderItem {
            item: updated_item,
            order: updated_order,
        })
    }
}

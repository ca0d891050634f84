//! Reservation ledger for fabric stock.
//!
//! Every change to a fabric record's counters goes through this module
//! and appends exactly one immutable stock movement row, so the audit
//! trail always explains the counters. The free functions are generic
//! over `ConnectionTrait` and run inside the caller's transaction; a
//! failed caller rolls the movement back together with the counter
//! update, so the ledger never records a movement that didn't happen.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::clock::Clock;
use crate::entities::fabric_stock::{self, Entity as FabricStockEntity};
use crate::entities::stock_movement::{self, Entity as StockMovementEntity, MovementType};
use crate::errors::ServiceError;

async fn load_stock<C: ConnectionTrait>(
    conn: &C,
    stock_id: Uuid,
) -> Result<fabric_stock::Model, ServiceError> {
    FabricStockEntity::find_by_id(stock_id)
        .one(conn)
        .await
        .map_err(ServiceError::DatabaseError)?
        .ok_or_else(|| ServiceError::InvalidReference(format!("fabric stock {} not found", stock_id)))
}

fn require_positive(meters: Decimal) -> Result<(), ServiceError> {
    if meters <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "movement quantity must be positive".to_string(),
        ));
    }
    Ok(())
}

async fn append_movement<C: ConnectionTrait>(
    conn: &C,
    now: DateTime<Utc>,
    stock_id: Uuid,
    movement_type: MovementType,
    quantity_meters: Decimal,
    balance_after_meters: Decimal,
    order_id: Option<Uuid>,
    user_id: Option<Uuid>,
    notes: Option<String>,
) -> Result<stock_movement::Model, ServiceError> {
    let movement = stock_movement::ActiveModel {
        id: Set(Uuid::new_v4()),
        fabric_stock_id: Set(stock_id),
        movement_type: Set(movement_type.as_str().to_string()),
        quantity_meters: Set(quantity_meters),
        balance_after_meters: Set(balance_after_meters),
        order_id: Set(order_id),
        user_id: Set(user_id),
        notes: Set(notes),
        created_at: Set(now),
    };

    movement
        .insert(conn)
        .await
        .map_err(ServiceError::DatabaseError)
}

/// Places a soft hold of `meters` on a fabric record for an order.
/// Fails with `InsufficientAvailableStock` when the hold would exceed
/// the physical stock; nothing is written in that case.
pub async fn reserve<C: ConnectionTrait>(
    conn: &C,
    clock: &dyn Clock,
    stock_id: Uuid,
    meters: Decimal,
    order_id: Uuid,
    user_id: Option<Uuid>,
) -> Result<stock_movement::Model, ServiceError> {
    require_positive(meters)?;
    let stock = load_stock(conn, stock_id).await?;
    if !stock.active {
        return Err(ServiceError::InvalidReference(format!(
            "fabric stock {} is inactive",
            stock_id
        )));
    }

    let new_reserved = stock.reserved + meters;
    if new_reserved > stock.current_stock {
        return Err(ServiceError::InsufficientAvailableStock(format!(
            "{} ({}): requested {}m, available {}m",
            stock.name,
            stock.color,
            meters,
            stock.available()
        )));
    }

    let balance_after = stock.current_stock - new_reserved;
    let now = clock.now();

    let mut active: fabric_stock::ActiveModel = stock.into();
    active.reserved = Set(new_reserved);
    active.updated_at = Set(Some(now));
    active.update(conn).await.map_err(ServiceError::DatabaseError)?;

    append_movement(
        conn,
        now,
        stock_id,
        MovementType::OrderReserved,
        meters,
        balance_after,
        Some(order_id),
        user_id,
        None,
    )
    .await
}

/// Releases a hold. The reserved counter clamps at zero so a duplicate
/// release cannot drive it negative.
pub async fn release<C: ConnectionTrait>(
    conn: &C,
    clock: &dyn Clock,
    stock_id: Uuid,
    meters: Decimal,
    order_id: Uuid,
    user_id: Option<Uuid>,
) -> Result<stock_movement::Model, ServiceError> {
    require_positive(meters)?;
    let stock = load_stock(conn, stock_id).await?;

    let new_reserved = (stock.reserved - meters).max(Decimal::ZERO);
    let balance_after = stock.current_stock - new_reserved;
    let now = clock.now();

    let mut active: fabric_stock::ActiveModel = stock.into();
    active.reserved = Set(new_reserved);
    active.updated_at = Set(Some(now));
    active.update(conn).await.map_err(ServiceError::DatabaseError)?;

    append_movement(
        conn,
        now,
        stock_id,
        MovementType::OrderCancelled,
        -meters,
        balance_after,
        Some(order_id),
        user_id,
        None,
    )
    .await
}

/// Moves a hold between two fabric records: a release tagged to the
/// source and a reservation tagged to the destination, so the audit
/// trail shows provenance. Both records and the destination's
/// availability are validated before the first write.
pub async fn transfer<C: ConnectionTrait>(
    conn: &C,
    clock: &dyn Clock,
    from_stock_id: Uuid,
    to_stock_id: Uuid,
    meters: Decimal,
    order_id: Uuid,
    user_id: Option<Uuid>,
) -> Result<(stock_movement::Model, stock_movement::Model), ServiceError> {
    require_positive(meters)?;
    if from_stock_id == to_stock_id {
        return Err(ServiceError::ValidationError(
            "cannot transfer a reservation onto the same fabric record".to_string(),
        ));
    }

    // Validate both ends up front so the error paths write nothing.
    load_stock(conn, from_stock_id).await?;
    let to_stock = load_stock(conn, to_stock_id).await?;
    if !to_stock.active {
        return Err(ServiceError::InvalidReference(format!(
            "fabric stock {} is inactive",
            to_stock_id
        )));
    }
    if to_stock.reserved + meters > to_stock.current_stock {
        return Err(ServiceError::InsufficientAvailableStock(format!(
            "{} ({}): requested {}m, available {}m",
            to_stock.name,
            to_stock.color,
            meters,
            to_stock.available()
        )));
    }

    let out = release(conn, clock, from_stock_id, meters, order_id, user_id).await?;
    let inn = reserve(conn, clock, to_stock_id, meters, order_id, user_id).await?;

    Ok((out, inn))
}

/// Converts a hold into physical usage when a garment is completed:
/// both counters drop by the consumed meters.
pub async fn consume<C: ConnectionTrait>(
    conn: &C,
    clock: &dyn Clock,
    stock_id: Uuid,
    meters: Decimal,
    order_id: Uuid,
    user_id: Option<Uuid>,
) -> Result<stock_movement::Model, ServiceError> {
    require_positive(meters)?;
    let stock = load_stock(conn, stock_id).await?;

    if meters > stock.current_stock {
        return Err(ServiceError::InsufficientAvailableStock(format!(
            "{} ({}): cannot use {}m, only {}m in stock",
            stock.name, stock.color, meters, stock.current_stock
        )));
    }

    let new_current = stock.current_stock - meters;
    let new_reserved = (stock.reserved - meters).max(Decimal::ZERO);
    let balance_after = new_current - new_reserved;
    let now = clock.now();

    let mut active: fabric_stock::ActiveModel = stock.into();
    active.current_stock = Set(new_current);
    active.reserved = Set(new_reserved);
    active.updated_at = Set(Some(now));
    active.update(conn).await.map_err(ServiceError::DatabaseError)?;

    append_movement(
        conn,
        now,
        stock_id,
        MovementType::OrderCompleted,
        -meters,
        balance_after,
        Some(order_id),
        user_id,
        None,
    )
    .await
}

/// Administrative correction of the physical count. Rejected when the
/// result would undercut existing reservations or go negative.
pub async fn adjust<C: ConnectionTrait>(
    conn: &C,
    clock: &dyn Clock,
    stock_id: Uuid,
    delta_meters: Decimal,
    user_id: Option<Uuid>,
    notes: Option<String>,
) -> Result<stock_movement::Model, ServiceError> {
    if delta_meters == Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "adjustment quantity must be non-zero".to_string(),
        ));
    }
    let stock = load_stock(conn, stock_id).await?;

    let new_current = stock.current_stock + delta_meters;
    if new_current < Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "adjustment would make stock negative ({}m)",
            new_current
        )));
    }
    if new_current < stock.reserved {
        return Err(ServiceError::ValidationError(format!(
            "adjustment would leave {}m in stock with {}m reserved",
            new_current, stock.reserved
        )));
    }

    let balance_after = new_current - stock.reserved;
    let now = clock.now();

    let mut active: fabric_stock::ActiveModel = stock.into();
    active.current_stock = Set(new_current);
    active.updated_at = Set(Some(now));
    active.update(conn).await.map_err(ServiceError::DatabaseError)?;

    append_movement(
        conn,
        now,
        stock_id,
        MovementType::Adjustment,
        delta_meters,
        balance_after,
        None,
        user_id,
        notes,
    )
    .await
}

/// Standalone inventory operations exposed over HTTP. The ledger
/// functions above stay free so the item mutator and splitter can call
/// them inside their own transactions.
#[derive(Clone)]
pub struct ReservationService {
    db: Arc<DatabaseConnection>,
    clock: Arc<dyn Clock>,
}

impl ReservationService {
    pub fn new(db: Arc<DatabaseConnection>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    #[instrument(skip(self), fields(stock_id = %stock_id))]
    pub async fn adjust_stock(
        &self,
        stock_id: Uuid,
        delta_meters: Decimal,
        user_id: Uuid,
        notes: Option<String>,
    ) -> Result<stock_movement::Model, ServiceError> {
        let txn = self.db.begin().await.map_err(ServiceError::txn_error)?;
        let movement = adjust(
            &txn,
            self.clock.as_ref(),
            stock_id,
            delta_meters,
            Some(user_id),
            notes,
        )
        .await?;
        txn.commit().await.map_err(ServiceError::txn_error)?;

        info!(stock_id = %stock_id, delta = %delta_meters, "Stock adjusted");
        Ok(movement)
    }

    pub async fn get_fabric(&self, stock_id: Uuid) -> Result<fabric_stock::Model, ServiceError> {
        load_stock(&*self.db, stock_id).await
    }

    pub async fn list_fabric(&self) -> Result<Vec<fabric_stock::Model>, ServiceError> {
        FabricStockEntity::find()
            .filter(fabric_stock::Column::Active.eq(true))
            .order_by_asc(fabric_stock::Column::Name)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Fabric records whose available meters sit at or below minimum.
    pub async fn list_low_stock(&self) -> Result<Vec<fabric_stock::Model>, ServiceError> {
        let all = self.list_fabric().await?;
        Ok(all
            .into_iter()
            .filter(|stock| stock.available() <= stock.minimum)
            .collect())
    }

    pub async fn movement_history(
        &self,
        stock_id: Uuid,
    ) -> Result<Vec<stock_movement::Model>, ServiceError> {
        StockMovementEntity::find()
            .filter(stock_movement::Column::FabricStockId.eq(stock_id))
            .order_by_desc(stock_movement::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MovementType {
    Purchase,
    OrderReserved,
    OrderCancelled,
    OrderCompleted,
    Adjustment,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Purchase => "PURCHASE",
            MovementType::OrderReserved => "ORDER_RESERVED",
            MovementType::OrderCancelled => "ORDER_CANCELLED",
            MovementType::OrderCompleted => "ORDER_COMPLETED",
            MovementType::Adjustment => "ADJUSTMENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PURCHASE" => Some(MovementType::Purchase),
            "ORDER_RESERVED" => Some(MovementType::OrderReserved),
            "ORDER_CANCELLED" => Some(MovementType::OrderCancelled),
            "ORDER_COMPLETED" => Some(MovementType::OrderCompleted),
            "ADJUSTMENT" => Some(MovementType::Adjustment),
            _ => None,
        }
    }
}

/// Append-only audit row for one reservation/release/use event. Rows
/// are never updated or deleted, and never read back for calculation;
/// the fabric record's counters stay authoritative.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "stock_movements")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub fabric_stock_id: Uuid,
    pub movement_type: String,
    /// Signed: positive for reservations and purchases, negative for
    /// releases and usage.
    pub quantity_meters: Decimal,
    /// Available meters (current_stock - reserved) after this event.
    pub balance_after_meters: Decimal,
    pub order_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::fabric_stock::Entity",
        from = "Column::FabricStockId",
        to = "super::fabric_stock::Column::Id"
    )]
    FabricStock,
}

impl Related<super::fabric_stock::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FabricStock.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;

        if insert {
            if let ActiveValue::NotSet = active_model.id {
                active_model.id = Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(Utc::now());
            }
        }

        Ok(active_model)
    }
}

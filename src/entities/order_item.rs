use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Customer body type, used to pick the per-pattern meter adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BodyType {
    Slim,
    Regular,
    Large,
    Xl,
}

impl BodyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyType::Slim => "SLIM",
            BodyType::Regular => "REGULAR",
            BodyType::Large => "LARGE",
            BodyType::Xl => "XL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SLIM" => Some(BodyType::Slim),
            "REGULAR" => Some(BodyType::Regular),
            "LARGE" => Some(BodyType::Large),
            "XL" => Some(BodyType::Xl),
            _ => None,
        }
    }
}

/// One garment line. Owned by exactly one order; moving an item between
/// orders is always delete-and-recreate so history stays attached to
/// the right order.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "order_items")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_id: Uuid,
    pub garment_pattern_id: Uuid,
    pub fabric_stock_id: Uuid,
    pub quantity: i32,
    pub body_type: String,
    pub estimated_meters: Decimal,
    pub actual_meters_used: Option<Decimal>,
    pub wastage_meters: Decimal,
    pub price_per_unit: Decimal,
    pub total_price: Decimal,
    pub assigned_tailor_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
    #[sea_orm(
        belongs_to = "super::garment_pattern::Entity",
        from = "Column::GarmentPatternId",
        to = "super::garment_pattern::Column::Id"
    )]
    GarmentPattern,
    #[sea_orm(
        belongs_to = "super::fabric_stock::Entity",
        from = "Column::FabricStockId",
        to = "super::fabric_stock::Column::Id"
    )]
    FabricStock,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl Related<super::garment_pattern::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GarmentPattern.def()
    }
}

impl Related<super::fabric_stock::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FabricStock.def()
    }
}

impl Model {
    /// Meters this line holds against its fabric record.
    pub fn reserved_meters(&self) -> Decimal {
        self.estimated_meters * Decimal::from(self.quantity)
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(now);
            }
        }
        if let ActiveValue::NotSet = active_model.updated_at {
            active_model.updated_at = Set(Some(now));
        }

        Ok(active_model)
    }
}

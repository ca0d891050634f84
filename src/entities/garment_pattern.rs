use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::order_item::BodyType;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "garment_patterns")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub category: String,
    /// Base fabric requirement in meters for a REGULAR cut.
    pub base_meters: Decimal,
    pub slim_adjustment: Decimal,
    pub regular_adjustment: Decimal,
    pub large_adjustment: Decimal,
    pub xl_adjustment: Decimal,
    pub stitching_price: Decimal,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl Model {
    /// Meters needed for one garment of this pattern at the given body type.
    pub fn estimated_meters_for(&self, body_type: BodyType) -> Decimal {
        let adjustment = match body_type {
            BodyType::Slim => self.slim_adjustment,
            BodyType::Regular => self.regular_adjustment,
            BodyType::Large => self.large_adjustment,
            BodyType::Xl => self.xl_adjustment,
        };
        self.base_meters + adjustment
    }
}

impl ActiveModelBehavior for ActiveModel {}

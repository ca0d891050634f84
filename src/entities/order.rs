use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order life cycle. DELIVERED and CANCELLED are terminal: no mutation
/// operation may touch an order once it reaches either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    New,
    Confirmed,
    InProgress,
    Fitting,
    Ready,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::Fitting => "FITTING",
            OrderStatus::Ready => "READY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NEW" => Some(OrderStatus::New),
            "CONFIRMED" => Some(OrderStatus::Confirmed),
            "IN_PROGRESS" => Some(OrderStatus::InProgress),
            "FITTING" => Some(OrderStatus::Fitting),
            "READY" => Some(OrderStatus::Ready),
            "DELIVERED" => Some(OrderStatus::Delivered),
            "CANCELLED" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    /// User who created the order.
    pub user_id: Uuid,
    pub status: String,
    pub priority: String,
    pub order_date: DateTime<Utc>,
    pub delivery_date: Option<DateTime<Utc>>,

    // Itemized cost breakdown. sub_total is the sum of these components.
    pub fabric_cost: Decimal,
    pub fabric_wastage_percent: Decimal,
    pub fabric_wastage_amount: Decimal,
    pub accessories_cost: Decimal,
    pub stitching_cost: Decimal,
    pub stitching_tier: String,
    pub is_hand_stitched: bool,
    pub hand_stitching_cost: Decimal,
    pub is_full_canvas: bool,
    pub full_canvas_cost: Decimal,
    pub is_rush_order: bool,
    pub rush_order_cost: Decimal,
    pub has_complex_design: bool,
    pub complex_design_cost: Decimal,
    pub additional_fittings: i32,
    pub additional_fittings_cost: Decimal,
    pub has_premium_lining: bool,
    pub premium_lining_cost: Decimal,
    pub workmanship_premiums: Decimal,
    pub designer_consultation_fee: Decimal,

    // Totals. total_amount = sub_total + gst_amount;
    // balance_amount = total_amount - discount - sum(paid installments).
    pub sub_total: Decimal,
    pub gst_rate: i32,
    pub gst_amount: Decimal,
    pub cgst: Decimal,
    pub sgst: Decimal,
    pub taxable_amount: Decimal,
    pub total_amount: Decimal,
    pub discount: Decimal,
    pub discount_reason: Option<String>,
    pub advance_paid: Decimal,
    pub balance_amount: Decimal,

    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
    #[sea_orm(has_many = "super::payment_installment::Entity")]
    PaymentInstallment,
    #[sea_orm(has_many = "super::order_history::Entity")]
    OrderHistory,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl Related<super::payment_installment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PaymentInstallment.def()
    }
}

impl Related<super::order_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderHistory.def()
    }
}

impl Model {
    pub fn status(&self) -> Option<OrderStatus> {
        OrderStatus::parse(&self.status)
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

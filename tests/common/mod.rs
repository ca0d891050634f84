//! Shared harness for service-level tests against an in-memory SQLite
//! database, with a fixed clock so due-date and overdue derivations are
//! deterministic.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use uuid::Uuid;

use darzee_api::auth::CallerIdentity;
use darzee_api::clock::{Clock, FixedClock};
use darzee_api::db::{self, DbConfig, DbPool};
use darzee_api::entities::{
    fabric_stock, garment_pattern, order, order_item, payment_installment, user,
};
use darzee_api::entities::payment_installment::InstallmentStatus;
use darzee_api::entities::user::Role;
use darzee_api::services::alerts::AlertService;
use darzee_api::services::installments::InstallmentService;
use darzee_api::services::order_items::OrderItemService;
use darzee_api::services::order_split::OrderSplitService;
use darzee_api::services::orders::OrderService;

pub const GST_RATE: i32 = 12;

pub struct TestCtx {
    pub db: Arc<DbPool>,
    pub now: DateTime<Utc>,
    pub caller: CallerIdentity,
}

impl TestCtx {
    pub async fn new() -> Self {
        let cfg = DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            ..Default::default()
        };
        let pool = db::establish_connection_with_config(&cfg)
            .await
            .expect("failed to open in-memory database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");

        let now = Utc.with_ymd_and_hms(2025, 6, 15, 10, 0, 0).unwrap();
        let caller = CallerIdentity {
            user_id: Uuid::new_v4(),
            role: Role::Manager,
        };

        Self {
            db: Arc::new(pool),
            now,
            caller,
        }
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::new(FixedClock(self.now))
    }

    pub fn clock_at(&self, at: DateTime<Utc>) -> Arc<dyn Clock> {
        Arc::new(FixedClock(at))
    }

    pub fn order_service(&self) -> OrderService {
        OrderService::new(self.db.clone(), self.clock(), None)
    }

    pub fn order_item_service(&self) -> OrderItemService {
        OrderItemService::new(self.db.clone(), self.clock(), None)
    }

    pub fn order_split_service(&self) -> OrderSplitService {
        OrderSplitService::new(self.db.clone(), self.clock(), None)
    }

    pub fn installment_service(&self) -> InstallmentService {
        InstallmentService::new(self.db.clone(), self.clock(), None)
    }

    pub fn alert_service(&self) -> AlertService {
        AlertService::new(self.db.clone(), self.clock())
    }

    pub fn alert_service_at(&self, at: DateTime<Utc>) -> AlertService {
        AlertService::new(self.db.clone(), self.clock_at(at))
    }

    pub async fn seed_user(&self, name: &str, role: Role, active: bool) -> user::Model {
        let model = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            email: Set(format!("{}@darzee.test", name.to_lowercase().replace(' ', "."))),
            role: Set(role.as_str().to_string()),
            active: Set(active),
            created_at: Set(self.now),
        };
        model.insert(&*self.db).await.expect("failed to seed user")
    }

    pub async fn seed_pattern(&self, name: &str, base_meters: Decimal) -> garment_pattern::Model {
        let model = garment_pattern::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            category: Set("SHERWANI".to_string()),
            base_meters: Set(base_meters),
            slim_adjustment: Set(dec!(-0.25)),
            regular_adjustment: Set(dec!(0)),
            large_adjustment: Set(dec!(0.5)),
            xl_adjustment: Set(dec!(1.0)),
            stitching_price: Set(dec!(2000)),
            active: Set(true),
            created_at: Set(self.now),
            updated_at: Set(None),
        };
        model
            .insert(&*self.db)
            .await
            .expect("failed to seed garment pattern")
    }

    pub async fn seed_fabric(
        &self,
        name: &str,
        unit_price: Decimal,
        current_stock: Decimal,
        reserved: Decimal,
        minimum: Decimal,
    ) -> fabric_stock::Model {
        let model = fabric_stock::ActiveModel {
            id: Set(Uuid::new_v4()),
            sku: Set(format!("FAB-{}", Uuid::new_v4().simple())),
            name: Set(name.to_string()),
            brand: Set("Raymond".to_string()),
            color: Set("Navy".to_string()),
            unit_price: Set(unit_price),
            current_stock: Set(current_stock),
            reserved: Set(reserved),
            minimum: Set(minimum),
            active: Set(true),
            created_at: Set(self.now),
            updated_at: Set(None),
        };
        model
            .insert(&*self.db)
            .await
            .expect("failed to seed fabric stock")
    }

    pub async fn reload_fabric(&self, id: Uuid) -> fabric_stock::Model {
        use sea_orm::EntityTrait;
        fabric_stock::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("query failed")
            .expect("fabric not found")
    }

    pub async fn reload_order(&self, id: Uuid) -> order::Model {
        use sea_orm::EntityTrait;
        order::Entity::find_by_id(id)
            .one(&*self.db)
            .await
            .expect("query failed")
            .expect("order not found")
    }

    pub async fn order_items_of(&self, order_id: Uuid) -> Vec<order_item::Model> {
        use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
        order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await
            .expect("query failed")
    }

    pub async fn installments_of(&self, order_id: Uuid) -> Vec<payment_installment::Model> {
        use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
        payment_installment::Entity::find()
            .filter(payment_installment::Column::OrderId.eq(order_id))
            .order_by_asc(payment_installment::Column::InstallmentNumber)
            .all(&*self.db)
            .await
            .expect("query failed")
    }
}

/// One line item to seed: (total_price, estimated_meters, quantity).
pub struct SeedItem {
    pub total_price: Decimal,
    pub estimated_meters: Decimal,
    pub quantity: i32,
}

impl SeedItem {
    pub fn priced(total_price: Decimal) -> Self {
        Self {
            total_price,
            estimated_meters: dec!(2.5),
            quantity: 1,
        }
    }
}

pub struct SeedOrder {
    pub items: Vec<SeedItem>,
    pub advance: Decimal,
    pub discount: Decimal,
    pub status: &'static str,
    pub delivery_date: Option<DateTime<Utc>>,
    /// Extra cost components beyond fabric (accessories, stitching).
    pub accessories_cost: Decimal,
    pub stitching_cost: Decimal,
    pub designer_fee: Decimal,
}

impl Default for SeedOrder {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            advance: dec!(0),
            discount: dec!(0),
            status: "IN_PROGRESS",
            delivery_date: None,
            accessories_cost: dec!(0),
            stitching_cost: dec!(0),
            designer_fee: dec!(0),
        }
    }
}

impl TestCtx {
    /// Seeds an order whose sub_total is the sum of its items' prices.
    /// The fabric cost component absorbs whatever the named components
    /// leave over, so `sub_total` always equals the component sum. An
    /// advance, when present, is recorded as installment #1 (PAID).
    pub async fn seed_order(
        &self,
        seed: SeedOrder,
        pattern_id: Uuid,
        fabric_id: Uuid,
    ) -> (order::Model, Vec<order_item::Model>) {
        let sub_total: Decimal = seed.items.iter().map(|i| i.total_price).sum();
        let fabric_cost =
            sub_total - seed.accessories_cost - seed.stitching_cost - seed.designer_fee;
        let gst = (sub_total * Decimal::new(GST_RATE as i64, 2)).round_dp(2);
        let sgst = (gst / dec!(2)).round_dp(2);
        let cgst = gst - sgst;
        let total = sub_total + gst;
        let balance = total - seed.discount - seed.advance;

        let order_id = Uuid::new_v4();
        let model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(format!(
                "ORD-TEST-{}",
                &Uuid::new_v4().simple().to_string()[..6]
            )),
            customer_id: Set(Uuid::new_v4()),
            user_id: Set(self.caller.user_id),
            status: Set(seed.status.to_string()),
            priority: Set("NORMAL".to_string()),
            order_date: Set(self.now),
            delivery_date: Set(seed.delivery_date),
            fabric_cost: Set(fabric_cost),
            fabric_wastage_percent: Set(dec!(0)),
            fabric_wastage_amount: Set(dec!(0)),
            accessories_cost: Set(seed.accessories_cost),
            stitching_cost: Set(seed.stitching_cost),
            stitching_tier: Set("STANDARD".to_string()),
            is_hand_stitched: Set(false),
            hand_stitching_cost: Set(dec!(0)),
            is_full_canvas: Set(false),
            full_canvas_cost: Set(dec!(0)),
            is_rush_order: Set(false),
            rush_order_cost: Set(dec!(0)),
            has_complex_design: Set(false),
            complex_design_cost: Set(dec!(0)),
            additional_fittings: Set(0),
            additional_fittings_cost: Set(dec!(0)),
            has_premium_lining: Set(false),
            premium_lining_cost: Set(dec!(0)),
            workmanship_premiums: Set(dec!(0)),
            designer_consultation_fee: Set(seed.designer_fee),
            sub_total: Set(sub_total),
            gst_rate: Set(GST_RATE),
            gst_amount: Set(gst),
            cgst: Set(cgst),
            sgst: Set(sgst),
            taxable_amount: Set(sub_total),
            total_amount: Set(total),
            discount: Set(seed.discount),
            discount_reason: Set(None),
            advance_paid: Set(seed.advance),
            balance_amount: Set(balance),
            notes: Set(None),
            created_at: Set(self.now),
            updated_at: Set(None),
            version: Set(1),
        };
        let order = model.insert(&*self.db).await.expect("failed to seed order");

        let mut items = Vec::new();
        for seed_item in &seed.items {
            let quantity = Decimal::from(seed_item.quantity);
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                garment_pattern_id: Set(pattern_id),
                fabric_stock_id: Set(fabric_id),
                quantity: Set(seed_item.quantity),
                body_type: Set("REGULAR".to_string()),
                estimated_meters: Set(seed_item.estimated_meters),
                actual_meters_used: Set(None),
                wastage_meters: Set(dec!(0)),
                price_per_unit: Set((seed_item.total_price / quantity).round_dp(2)),
                total_price: Set(seed_item.total_price),
                assigned_tailor_id: Set(None),
                notes: Set(None),
                created_at: Set(self.now),
                updated_at: Set(None),
            };
            items.push(item.insert(&*self.db).await.expect("failed to seed item"));
        }

        if seed.advance > dec!(0) {
            let advance_row = payment_installment::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                installment_number: Set(1),
                amount: Set(seed.advance),
                due_date: Set(self.now),
                paid_amount: Set(seed.advance),
                paid_date: Set(Some(self.now)),
                payment_mode: Set(Some("UPI".to_string())),
                transaction_ref: Set(None),
                status: Set(InstallmentStatus::Paid.as_str().to_string()),
                notes: Set(None),
                created_at: Set(self.now),
                updated_at: Set(None),
            };
            advance_row
                .insert(&*self.db)
                .await
                .expect("failed to seed advance installment");
        }

        (order, items)
    }
}

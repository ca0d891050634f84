mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::{SeedItem, SeedOrder, TestCtx};
use darzee_api::entities::stock_movement::MovementType;
use darzee_api::entities::user::Role;
use darzee_api::errors::ServiceError;
use darzee_api::services::order_items::UpdateOrderItemRequest;

fn fabric_change(fabric_stock_id: Uuid) -> UpdateOrderItemRequest {
    UpdateOrderItemRequest {
        fabric_stock_id: Some(fabric_stock_id),
        ..Default::default()
    }
}

// Item: 2.5m x 2 on fabric A at 100/m (fabric 500) + 150 accessories =
// 650. Moving to fabric B at 200/m re-prices to 1000 + 150 = 1150 and
// moves the 5m hold.
#[tokio::test]
async fn fabric_substitution_moves_reservation_and_reprices() {
    let ctx = TestCtx::new().await;
    let pattern = ctx.seed_pattern("Blazer", dec!(2.5)).await;
    let fabric_a = ctx
        .seed_fabric("Fabric A", dec!(100), dec!(20), dec!(5), dec!(2))
        .await;
    let fabric_b = ctx
        .seed_fabric("Fabric B", dec!(200), dec!(20), dec!(0), dec!(2))
        .await;

    let (order, items) = ctx
        .seed_order(
            SeedOrder {
                items: vec![
                    SeedItem {
                        total_price: dec!(650),
                        estimated_meters: dec!(2.5),
                        quantity: 2,
                    },
                    SeedItem::priced(dec!(1000)),
                ],
                ..Default::default()
            },
            pattern.id,
            fabric_a.id,
        )
        .await;
    let item = &items[0];

    let updated = ctx
        .order_item_service()
        .update_item(ctx.caller, order.id, item.id, fabric_change(fabric_b.id))
        .await
        .expect("update should succeed");

    assert_eq!(updated.item.fabric_stock_id, fabric_b.id);
    assert_eq!(updated.item.total_price, dec!(1150.00));
    assert_eq!(updated.item.price_per_unit, dec!(575.00));

    // Reservation moved: 5m off A, 5m onto B.
    let a = ctx.reload_fabric(fabric_a.id).await;
    let b = ctx.reload_fabric(fabric_b.id).await;
    assert_eq!(a.reserved, dec!(0));
    assert_eq!(b.reserved, dec!(5.0));

    // Order money resettled from the items.
    assert_eq!(updated.order.sub_total, dec!(2150.00));
    assert_eq!(updated.order.gst_amount, dec!(258.00));
    assert_eq!(updated.order.total_amount, dec!(2408.00));
    assert_eq!(
        updated.order.total_amount,
        updated.order.sub_total + updated.order.gst_amount
    );
}

#[tokio::test]
async fn fabric_substitution_writes_provenance_movements() {
    let ctx = TestCtx::new().await;
    let pattern = ctx.seed_pattern("Blazer", dec!(2.5)).await;
    let fabric_a = ctx
        .seed_fabric("Fabric A", dec!(100), dec!(20), dec!(5), dec!(2))
        .await;
    let fabric_b = ctx
        .seed_fabric("Fabric B", dec!(200), dec!(20), dec!(0), dec!(2))
        .await;

    let (order, items) = ctx
        .seed_order(
            SeedOrder {
                items: vec![
                    SeedItem {
                        total_price: dec!(650),
                        estimated_meters: dec!(2.5),
                        quantity: 2,
                    },
                    SeedItem::priced(dec!(1000)),
                ],
                ..Default::default()
            },
            pattern.id,
            fabric_a.id,
        )
        .await;

    ctx.order_item_service()
        .update_item(ctx.caller, order.id, items[0].id, fabric_change(fabric_b.id))
        .await
        .expect("update should succeed");

    use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
    use darzee_api::entities::stock_movement;

    let out = stock_movement::Entity::find()
        .filter(stock_movement::Column::FabricStockId.eq(fabric_a.id))
        .all(&*ctx.db)
        .await
        .unwrap();
    let inn = stock_movement::Entity::find()
        .filter(stock_movement::Column::FabricStockId.eq(fabric_b.id))
        .all(&*ctx.db)
        .await
        .unwrap();

    assert_eq!(out.len(), 1);
    assert_eq!(
        MovementType::parse(&out[0].movement_type),
        Some(MovementType::OrderCancelled)
    );
    assert_eq!(out[0].quantity_meters, dec!(-5.0));
    assert_eq!(out[0].order_id, Some(order.id));

    assert_eq!(inn.len(), 1);
    assert_eq!(
        MovementType::parse(&inn[0].movement_type),
        Some(MovementType::OrderReserved)
    );
    assert_eq!(inn[0].quantity_meters, dec!(5.0));
    assert_eq!(inn[0].balance_after_meters, dec!(15.0));
}

// Moving a 5m line onto a fabric with only 2m available must fail
// before anything is written.
#[tokio::test]
async fn insufficient_target_stock_leaves_everything_untouched() {
    let ctx = TestCtx::new().await;
    let pattern = ctx.seed_pattern("Blazer", dec!(2.5)).await;
    let fabric_a = ctx
        .seed_fabric("Fabric A", dec!(100), dec!(20), dec!(5), dec!(2))
        .await;
    let fabric_b = ctx
        .seed_fabric("Fabric B", dec!(200), dec!(2), dec!(0), dec!(1))
        .await;

    let (order, items) = ctx
        .seed_order(
            SeedOrder {
                items: vec![
                    SeedItem {
                        total_price: dec!(650),
                        estimated_meters: dec!(2.5),
                        quantity: 2,
                    },
                    SeedItem::priced(dec!(1000)),
                ],
                ..Default::default()
            },
            pattern.id,
            fabric_a.id,
        )
        .await;

    let err = ctx
        .order_item_service()
        .update_item(ctx.caller, order.id, items[0].id, fabric_change(fabric_b.id))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientAvailableStock(_));

    // Both reserved counters unchanged, no movements recorded.
    let a = ctx.reload_fabric(fabric_a.id).await;
    let b = ctx.reload_fabric(fabric_b.id).await;
    assert_eq!(a.reserved, dec!(5));
    assert_eq!(b.reserved, dec!(0));

    use sea_orm::EntityTrait;
    let movements = darzee_api::entities::stock_movement::Entity::find()
        .all(&*ctx.db)
        .await
        .unwrap();
    assert!(movements.is_empty());

    // Item and order untouched.
    let reloaded_items = ctx.order_items_of(order.id).await;
    let original_item = reloaded_items
        .iter()
        .find(|i| i.id == items[0].id)
        .unwrap();
    assert_eq!(original_item.fabric_stock_id, fabric_a.id);
    assert_eq!(original_item.total_price, items[0].total_price);
    let reloaded_order = ctx.reload_order(order.id).await;
    assert_eq!(reloaded_order.sub_total, order.sub_total);
}

#[tokio::test]
async fn terminal_orders_refuse_item_mutation() {
    let ctx = TestCtx::new().await;
    let pattern = ctx.seed_pattern("Blazer", dec!(2.5)).await;
    let fabric = ctx
        .seed_fabric("Fabric A", dec!(100), dec!(20), dec!(0), dec!(2))
        .await;

    let (order, items) = ctx
        .seed_order(
            SeedOrder {
                items: vec![SeedItem::priced(dec!(650))],
                status: "CANCELLED",
                ..Default::default()
            },
            pattern.id,
            fabric.id,
        )
        .await;

    let err = ctx
        .order_item_service()
        .update_item(
            ctx.caller,
            order.id,
            items[0].id,
            UpdateOrderItemRequest {
                quantity: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::OrderTerminal(_));
}

#[tokio::test]
async fn item_must_belong_to_the_order() {
    let ctx = TestCtx::new().await;
    let pattern = ctx.seed_pattern("Blazer", dec!(2.5)).await;
    let fabric = ctx
        .seed_fabric("Fabric A", dec!(100), dec!(20), dec!(0), dec!(2))
        .await;

    let (order_one, _) = ctx
        .seed_order(
            SeedOrder {
                items: vec![SeedItem::priced(dec!(650))],
                ..Default::default()
            },
            pattern.id,
            fabric.id,
        )
        .await;
    let (_, other_items) = ctx
        .seed_order(
            SeedOrder {
                items: vec![SeedItem::priced(dec!(900))],
                ..Default::default()
            },
            pattern.id,
            fabric.id,
        )
        .await;

    let foreign = other_items[0].id;
    let err = ctx
        .order_item_service()
        .update_item(
            ctx.caller,
            order_one.id,
            foreign,
            UpdateOrderItemRequest {
                quantity: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::UnknownItem(id) if id == foreign);
}

#[tokio::test]
async fn tailor_assignment_requires_the_tailor_role() {
    let ctx = TestCtx::new().await;
    let pattern = ctx.seed_pattern("Blazer", dec!(2.5)).await;
    let fabric = ctx
        .seed_fabric("Fabric A", dec!(100), dec!(20), dec!(0), dec!(2))
        .await;
    let sales = ctx.seed_user("Asha Rao", Role::Sales, true).await;
    let tailor = ctx.seed_user("Mohammed Iqbal", Role::Tailor, true).await;

    let (order, items) = ctx
        .seed_order(
            SeedOrder {
                items: vec![SeedItem::priced(dec!(650))],
                ..Default::default()
            },
            pattern.id,
            fabric.id,
        )
        .await;

    let err = ctx
        .order_item_service()
        .update_item(
            ctx.caller,
            order.id,
            items[0].id,
            UpdateOrderItemRequest {
                assigned_tailor_id: Some(Some(sales.id)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidAssignment(_));

    let err = ctx
        .order_item_service()
        .update_item(
            ctx.caller,
            order.id,
            items[0].id,
            UpdateOrderItemRequest {
                assigned_tailor_id: Some(Some(Uuid::new_v4())),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidReference(_));

    let updated = ctx
        .order_item_service()
        .update_item(
            ctx.caller,
            order.id,
            items[0].id,
            UpdateOrderItemRequest {
                assigned_tailor_id: Some(Some(tailor.id)),
                ..Default::default()
            },
        )
        .await
        .expect("assignment should succeed");
    assert_eq!(updated.item.assigned_tailor_id, Some(tailor.id));
}

// The garment-pattern path re-derives the fabric requirement from the
// new pattern at the item's body type, without touching the price.
#[tokio::test]
async fn pattern_substitution_rederives_estimated_meters() {
    let ctx = TestCtx::new().await;
    let old_pattern = ctx.seed_pattern("Blazer", dec!(2.5)).await;
    let new_pattern = ctx.seed_pattern("Long Sherwani", dec!(4.0)).await;
    let fabric = ctx
        .seed_fabric("Fabric A", dec!(100), dec!(20), dec!(0), dec!(2))
        .await;

    let (order, items) = ctx
        .seed_order(
            SeedOrder {
                items: vec![SeedItem::priced(dec!(650))],
                ..Default::default()
            },
            old_pattern.id,
            fabric.id,
        )
        .await;

    let updated = ctx
        .order_item_service()
        .update_item(
            ctx.caller,
            order.id,
            items[0].id,
            UpdateOrderItemRequest {
                garment_pattern_id: Some(new_pattern.id),
                ..Default::default()
            },
        )
        .await
        .expect("update should succeed");

    // REGULAR body type: base 4.0 + 0 adjustment.
    assert_eq!(updated.item.garment_pattern_id, new_pattern.id);
    assert_eq!(updated.item.estimated_meters, dec!(4.0));
    assert_eq!(updated.item.total_price, items[0].total_price);

    let err = ctx
        .order_item_service()
        .update_item(
            ctx.caller,
            order.id,
            items[0].id,
            UpdateOrderItemRequest {
                garment_pattern_id: Some(Uuid::new_v4()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidReference(_));
}

#[tokio::test]
async fn price_change_keeps_subtotal_consistent_with_items() {
    let ctx = TestCtx::new().await;
    let pattern = ctx.seed_pattern("Blazer", dec!(2.5)).await;
    let fabric_a = ctx
        .seed_fabric("Fabric A", dec!(123.45), dec!(50), dec!(10), dec!(2))
        .await;
    let fabric_b = ctx
        .seed_fabric("Fabric B", dec!(87.65), dec!(50), dec!(0), dec!(2))
        .await;

    let (order, items) = ctx
        .seed_order(
            SeedOrder {
                items: vec![
                    SeedItem {
                        total_price: dec!(710.13),
                        estimated_meters: dec!(2.5),
                        quantity: 2,
                    },
                    SeedItem {
                        total_price: dec!(333.33),
                        estimated_meters: dec!(2.5),
                        quantity: 2,
                    },
                ],
                ..Default::default()
            },
            pattern.id,
            fabric_a.id,
        )
        .await;

    let updated = ctx
        .order_item_service()
        .update_item(ctx.caller, order.id, items[0].id, fabric_change(fabric_b.id))
        .await
        .expect("update should succeed");

    let all_items = ctx.order_items_of(order.id).await;
    let item_sum: rust_decimal::Decimal = all_items.iter().map(|i| i.total_price).sum();
    assert_eq!(updated.order.sub_total, item_sum);
    assert_eq!(
        updated.order.total_amount,
        updated.order.sub_total + updated.order.gst_amount
    );
    assert_eq!(
        updated.order.balance_amount,
        updated.order.total_amount - updated.order.discount
    );
}
